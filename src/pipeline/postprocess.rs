//! Post-processing: turn raw model output into a validated [`Document`].
//!
//! The model is asked for a bare JSON object, and usually complies. When it
//! does not, the failures are cosmetic: a ```` ```json ```` fence, a sentence
//! of preamble, a byte-order mark, a trailing comma before `}`. These rules
//! repair exactly those and nothing else. Missing fields or non-string
//! values are still rejected by schema validation.
//!
//! ## Rule Order
//!
//! The strict parse runs first; cleanup is only attempted when it fails,
//! so valid output is never rewritten.
//!
//! 1. Strip invisible characters (BOM, zero-width spaces)
//! 2. Strip outer code fences
//! 3. Cut to the outermost `{ ... }`
//! 4. Drop trailing commas before `}` / `]`, outside string literals

use crate::schema::Document;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Parse model output into a [`Document`].
///
/// The error string says whether the text was not JSON at all or was JSON
/// of the wrong shape; it ends up in [`crate::error::DocumentError`].
pub fn parse_document(raw: &str) -> Result<Document, String> {
    let value = match serde_json::from_str::<Value>(raw) {
        Ok(v) => v,
        Err(_) => {
            let cleaned = clean_json(raw);
            serde_json::from_str::<Value>(&cleaned)
                .map_err(|e| format!("response is not valid JSON: {e}"))?
        }
    };
    Document::from_value(value).map_err(|e| format!("schema validation failed: {e}"))
}

/// Apply every cleanup rule, in order.
pub fn clean_json(input: &str) -> String {
    let s = remove_invisible_chars(input);
    let s = strip_code_fences(&s);
    let s = outermost_object(&s);
    remove_trailing_commas(&s)
}

// ── Rule 1: Invisible characters ─────────────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(c, '\u{FEFF}' | '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}'))
        .collect()
}

// ── Rule 2: Code fences ──────────────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json|JSON)?\s*\n(.*?)\n?```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    match RE_OUTER_FENCES.captures(trimmed) {
        Some(caps) => caps[1].to_string(),
        None => trimmed.to_string(),
    }
}

// ── Rule 3: Outermost object ─────────────────────────────────────────────────

fn outermost_object(input: &str) -> String {
    match (input.find('{'), input.rfind('}')) {
        (Some(start), Some(end)) if start < end => input[start..=end].to_string(),
        _ => input.to_string(),
    }
}

// ── Rule 4: Trailing commas ──────────────────────────────────────────────────

/// Drop a comma whose next non-whitespace character closes an object or
/// array. Commas inside string literals are left alone.
fn remove_trailing_commas(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
            if matches!(next, Some('}' | ']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{"company":"Acme","address":"1 Rd","total_sum":"$10","items":[{"item":"Bolt","unit_price":"$1","quantity":"10","sum":"$10"}]}"#;

    #[test]
    fn strict_json_parses() {
        let doc = parse_document(VALID).unwrap();
        assert_eq!(doc.company, "Acme");
        assert_eq!(doc.items[0].quantity, "10");
    }

    #[test]
    fn fenced_json_parses() {
        let raw = format!("```json\n{VALID}\n```");
        assert_eq!(parse_document(&raw).unwrap().total_sum, "$10");
    }

    #[test]
    fn preamble_and_bom_are_dropped() {
        let raw = format!("\u{FEFF}Here is the extracted data:\n{VALID}\nLet me know!");
        assert_eq!(parse_document(&raw).unwrap().address, "1 Rd");
    }

    #[test]
    fn trailing_commas_are_dropped() {
        let raw = r#"{"company":"A","address":"B","total_sum":"C","items":[],}"#;
        assert!(parse_document(raw).unwrap().items.is_empty());
    }

    #[test]
    fn trailing_comma_rule_skips_strings() {
        assert_eq!(remove_trailing_commas(r#"{"a":[1, 2, ],}"#), r#"{"a":[1, 2 ]}"#);
        assert_eq!(
            remove_trailing_commas(r#"{"item":"Bolts ,} and ,]","q":"say \",}\"",}"#),
            r#"{"item":"Bolts ,} and ,]","q":"say \",}\""}"#
        );
    }

    #[test]
    fn string_values_survive_cleanup() {
        let raw = r#"Result: {"company":"Odd ,} Co","address":"B","total_sum":"C","items":[],}"#;
        assert_eq!(parse_document(raw).unwrap().company, "Odd ,} Co");
    }

    #[test]
    fn not_json_is_reported() {
        let err = parse_document("I could not find an invoice.").unwrap_err();
        assert!(err.contains("not valid JSON"), "got: {err}");
    }

    #[test]
    fn wrong_shape_is_reported() {
        let err = parse_document(r#"{"company":"A","items":[]}"#).unwrap_err();
        assert!(err.contains("schema validation"), "got: {err}");
    }

    #[test]
    fn commas_inside_values_survive() {
        let raw = r#"```
{"company":"A, Inc.","address":"1 Rd, Town","total_sum":"$1,000","items":[]}
```"#;
        let doc = parse_document(raw).unwrap();
        assert_eq!(doc.company, "A, Inc.");
        assert_eq!(doc.total_sum, "$1,000");
    }
}
