//! Record types exchanged with the LLM, the HTTP API and the exporter.
//!
//! Amounts and quantities stay strings on purpose: the model copies them from
//! the invoice with their currency symbols ("$10.00", "3 pcs"), and nothing
//! downstream does arithmetic on them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sentinel used for every item column of a document that has no items.
pub const NOT_AVAILABLE: &str = "N/A";

/// One purchased-item row of an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub item: String,
    pub unit_price: String,
    pub quantity: String,
    pub sum: String,
}

/// One extracted invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub company: String,
    pub address: String,
    pub total_sum: String,
    pub items: Vec<LineItem>,
}

impl Document {
    /// Validate an arbitrary JSON value against the record schema.
    ///
    /// Unknown keys are ignored. Missing keys and non-string values are
    /// rejected with a description of the first offending field.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// Column names of the exported sheet, in order.
pub const FLAT_COLUMNS: [&str; 7] = [
    "company",
    "address",
    "total_sum",
    "item",
    "unit_price",
    "quantity",
    "sum",
];

/// One spreadsheet row: a document's header fields merged with one of its items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatRow {
    pub company: String,
    pub address: String,
    pub total_sum: String,
    pub item: String,
    pub unit_price: String,
    pub quantity: String,
    pub sum: String,
}

impl FlatRow {
    /// Cell values in [`FLAT_COLUMNS`] order.
    pub fn cells(&self) -> [&str; 7] {
        [
            self.company.as_str(),
            self.address.as_str(),
            self.total_sum.as_str(),
            self.item.as_str(),
            self.unit_price.as_str(),
            self.quantity.as_str(),
            self.sum.as_str(),
        ]
    }
}
