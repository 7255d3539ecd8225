//! Flatten nested documents into one spreadsheet row per line item.

use crate::schema::{Document, FlatRow, LineItem, NOT_AVAILABLE};

/// Flatten documents into rows, preserving document order and item order.
///
/// A document with no items still produces exactly one row, with every item
/// column set to [`NOT_AVAILABLE`].
pub fn flatten_documents(documents: &[Document]) -> Vec<FlatRow> {
    documents.iter().flat_map(flatten_document).collect()
}

/// Rows for a single document.
pub fn flatten_document(doc: &Document) -> Vec<FlatRow> {
    if doc.items.is_empty() {
        return vec![row(doc, None)];
    }
    doc.items.iter().map(|item| row(doc, Some(item))).collect()
}

fn row(doc: &Document, item: Option<&LineItem>) -> FlatRow {
    let na = || NOT_AVAILABLE.to_string();
    FlatRow {
        company: doc.company.clone(),
        address: doc.address.clone(),
        total_sum: doc.total_sum.clone(),
        item: item.map_or_else(na, |i| i.item.clone()),
        unit_price: item.map_or_else(na, |i| i.unit_price.clone()),
        quantity: item.map_or_else(na, |i| i.quantity.clone()),
        sum: item.map_or_else(na, |i| i.sum.clone()),
    }
}
