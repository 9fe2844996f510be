//! JSON parsing helpers for model responses
//!
//! Models wrap their JSON in prose or code fences and are loose with types.
//! Nothing in here returns an error: an unusable reply becomes an empty
//! `ExtractedInvoiceData`, and callers decide whether that is enough.

use chrono::NaiveDate;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::models::ExtractedInvoiceData;

/// Date layouts models commonly return, tried in order
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%b %d %Y",
    "%B %d %Y",
    "%d %b %Y",
    "%d %B %Y",
    "%d %b, %Y",
    "%d %B, %Y",
];

/// Parse an invoice extraction reply into structured data
pub fn parse_invoice_response(response: &str) -> ExtractedInvoiceData {
    match find_json_object(response) {
        Some(object) => invoice_from_object(&object),
        None => {
            warn!(
                response = %truncate_for_log(response),
                "No JSON object found in model reply"
            );
            ExtractedInvoiceData::default()
        }
    }
}

/// Locate the first JSON object embedded in free text
///
/// Pass 1 scans from each `{` to its balanced `}` (aware of strings and
/// escapes) and takes the first slice that parses as an object. Pass 2 takes
/// everything between the first `{` and the last `}`.
pub fn find_json_object(text: &str) -> Option<Map<String, Value>> {
    for (start, _) in text.match_indices('{') {
        if let Some(end) = balanced_end(text, start) {
            if let Ok(Value::Object(map)) = serde_json::from_str(&text[start..=end]) {
                return Some(map);
            }
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if start >= end {
        return None;
    }
    match serde_json::from_str(&text[start..=end]) {
        Ok(Value::Object(map)) => {
            debug!("JSON object recovered by first/last brace fallback");
            Some(map)
        }
        _ => None,
    }
}

/// Byte index of the `}` closing the `{` at `start`
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + i);
                }
            }
            _ => {}
        }
    }

    None
}

fn invoice_from_object(object: &Map<String, Value>) -> ExtractedInvoiceData {
    ExtractedInvoiceData {
        company_name: field(object, &["company_name", "companyName", "vendor"])
            .and_then(coerce_string),
        amount: field(object, &["amount", "total", "amount_due"]).and_then(coerce_amount),
        sales_email: field(object, &["sales_email", "salesEmail", "email"])
            .and_then(coerce_string)
            .and_then(|e| normalize_email(&e)),
        due_date: field(object, &["due_date", "dueDate"])
            .and_then(coerce_string)
            .and_then(|s| normalize_due_date(&s)),
        category: field(object, &["category"]).and_then(coerce_string),
        is_new_category: field(object, &["isNewCategory", "is_new_category"])
            .map(coerce_bool)
            .unwrap_or(false),
    }
}

/// First present key wins
fn field<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| object.get(*k))
}

/// Non-empty trimmed string, treating placeholder words as absent
pub fn coerce_string(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };

    match s.to_lowercase().as_str() {
        "" | "null" | "none" | "n/a" | "unknown" => None,
        _ => Some(s),
    }
}

/// First bare address in a decorated string
///
/// Handles `Name <a@b.com>`, `a@b.com (Accounts)`, `mailto:a@b.com` and
/// lists; anything without a usable address becomes `None`.
pub fn normalize_email(raw: &str) -> Option<String> {
    raw.split(|c: char| {
        c.is_whitespace() || matches!(c, ',' | ';' | '<' | '>' | '(' | ')' | '[' | ']' | '"' | '\'')
    })
    .map(|token| {
        let token = token
            .strip_prefix("mailto:")
            .or_else(|| token.strip_prefix("MAILTO:"))
            .unwrap_or(token);
        token.trim_matches(|c: char| matches!(c, '.' | ':'))
    })
    .find(|token| match token.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    })
    .map(String::from)
}

/// Positive finite amount from a number or a formatted string
///
/// Currency symbols, codes, whitespace and thousands separators are dropped.
pub fn coerce_amount(value: &Value) -> Option<f64> {
    let amount = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            cleaned.parse::<f64>().ok()?
        }
        _ => return None,
    };

    (amount.is_finite() && amount > 0.0).then_some(amount)
}

/// Bool from a JSON bool or a "true"/"false" string
pub fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes"),
        _ => false,
    }
}

/// Normalize a date string to a calendar date
///
/// Relative terms ("Net 30", "Due on receipt") and unknown layouts give `None`.
pub fn normalize_due_date(raw: &str) -> Option<NaiveDate> {
    let cleaned = raw.trim().replace('.', "");
    if cleaned.is_empty() {
        return None;
    }

    // ISO timestamps: keep the date part
    let candidate = match cleaned.get(..10) {
        Some(prefix) if cleaned.len() > 10 && cleaned.as_bytes()[10] == b'T' => prefix,
        _ => cleaned.as_str(),
    };

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(candidate, fmt).ok())
}

fn truncate_for_log(s: &str) -> String {
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s.to_string()
    }
}
