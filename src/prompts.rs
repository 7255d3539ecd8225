//! System prompt for LLM-based invoice extraction.
//!
//! The prompt lives here so it can be reviewed and tested without a model.
//! Callers can override it via [`crate::config::ServiceConfig::system_prompt`].

/// Default system prompt: describe the target JSON record.
///
/// The field names and the "N/A" convention must stay in sync with
/// [`crate::schema::Document`]; `prompt_mentions_every_field` checks this.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an expert at extracting structured information from documents.
Extract the following information in JSON format:
{
  "company": "Company name (string)",
  "address": "Company address (string)",
  "total_sum": "Total sum of purchase (string with currency)",
  "items": [
    {
      "item": "Item name (string)",
      "unit_price": "Unit price (string with currency)",
      "quantity": "Quantity (string)",
      "sum": "Sum for this item (string with currency)"
    }
  ]
}

If any field is not found in the text, use "N/A" as the value.
Make sure all numerical values are extracted as strings with their currency symbols if present.
The response must be valid JSON."#;

/// Wrap the extracted document text as the user turn.
pub fn document_message(text: &str) -> String {
    text.trim().to_string()
}
