//! Chat command routing
//!
//! Classifies a free-form message into one intent. Rules are tried in order
//! and the first match wins.

use regex::Regex;
use serde::Serialize;

use crate::error::Result;

/// Messages at or below this many characters are never treated as invoices
pub const INVOICE_TEXT_MIN_CHARS: usize = 50;

const INVOICE_KEYWORDS: [&str; 3] = ["invoice", "amount", "due date"];

/// What a chat message asks for
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum CommandIntent {
    /// "pay expense #12"
    PayById { expense_id: i64 },
    /// "send $100 to vendor@example.com"
    PayByEmail { amount: f64, email: String },
    /// Pasted invoice text
    InvoiceText { text: String },
    /// Anything else, answered read-only
    GeneralQuery { text: String },
}

impl CommandIntent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PayById { .. } => "pay_by_id",
            Self::PayByEmail { .. } => "pay_by_email",
            Self::InvoiceText { .. } => "invoice_text",
            Self::GeneralQuery { .. } => "general_query",
        }
    }
}

/// Compiled routing rules
#[derive(Debug, Clone)]
pub struct CommandRouter {
    pay_by_id: Regex,
    pay_by_email: Regex,
}

impl CommandRouter {
    pub fn new() -> Result<Self> {
        Ok(Self {
            pay_by_id: Regex::new(r"(?i)\bpay\s+(?:expense|invoice)\s*#?\s*(\d+)")?,
            pay_by_email: Regex::new(
                r"(?i)\bsend\s+\$\s*([\d,]+(?:\.\d+)?)\s*(?:usdc\s+)?to\s+([A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,})",
            )?,
        })
    }

    /// Classify a message
    pub fn route(&self, text: &str) -> CommandIntent {
        if let Some(caps) = self.pay_by_id.captures(text) {
            // Ids too large for i64 fall through to the other rules
            if let Ok(expense_id) = caps[1].parse::<i64>() {
                return CommandIntent::PayById { expense_id };
            }
        }

        if let Some(caps) = self.pay_by_email.captures(text) {
            let amount = caps[1].replace(',', "").parse::<f64>().ok();
            if let Some(amount) = amount.filter(|a| a.is_finite()) {
                return CommandIntent::PayByEmail {
                    amount,
                    email: caps[2].to_string(),
                };
            }
        }

        if looks_like_invoice(text) {
            return CommandIntent::InvoiceText {
                text: text.to_string(),
            };
        }

        CommandIntent::GeneralQuery {
            text: text.to_string(),
        }
    }
}

fn looks_like_invoice(text: &str) -> bool {
    if text.chars().count() <= INVOICE_TEXT_MIN_CHARS {
        return false;
    }
    let lower = text.to_lowercase();
    INVOICE_KEYWORDS.iter().any(|k| lower.contains(k))
        || (text.contains('$') && text.chars().any(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(text: &str) -> CommandIntent {
        CommandRouter::new().unwrap().route(text)
    }

    #[test]
    fn test_pay_by_id() {
        assert_eq!(route("pay expense #5"), CommandIntent::PayById { expense_id: 5 });
        assert_eq!(route("Please PAY invoice 42 now"), CommandIntent::PayById { expense_id: 42 });
        assert_eq!(route("pay expense # 7"), CommandIntent::PayById { expense_id: 7 });
    }

    #[test]
    fn test_pay_by_id_beats_invoice_text() {
        let text = "pay invoice #3, the invoice amount is $1,200.00 and the due date is next week";
        assert_eq!(route(text), CommandIntent::PayById { expense_id: 3 });
    }

    #[test]
    fn test_pay_by_email() {
        assert_eq!(
            route("send $1,250.50 to billing@acme.com"),
            CommandIntent::PayByEmail {
                amount: 1250.5,
                email: "billing@acme.com".to_string()
            }
        );
        assert_eq!(
            route("Send $ 100 USDC to ap@vendor.io please"),
            CommandIntent::PayByEmail {
                amount: 100.0,
                email: "ap@vendor.io".to_string()
            }
        );
    }

    #[test]
    fn test_invoice_text_needs_length_and_signal() {
        let invoice = "INVOICE from TechSupplies Inc. Total amount due: $891.00, due date 2024-12-15";
        assert!(matches!(route(invoice), CommandIntent::InvoiceText { .. }));

        let dollars = "We bought three monitors last week for the new hires, $450 each in total";
        assert!(matches!(route(dollars), CommandIntent::InvoiceText { .. }));

        // Short messages are queries even with keywords
        assert!(matches!(
            route("what is the invoice amount?"),
            CommandIntent::GeneralQuery { .. }
        ));
    }

    #[test]
    fn test_exactly_fifty_chars_is_query() {
        let text = format!("invoice{}", "x".repeat(43));
        assert_eq!(text.chars().count(), 50);
        assert!(matches!(route(&text), CommandIntent::GeneralQuery { .. }));

        let longer = format!("{}y", text);
        assert!(matches!(route(&longer), CommandIntent::InvoiceText { .. }));
    }

    #[test]
    fn test_general_query() {
        assert_eq!(
            route("How much did we spend on software this month?"),
            CommandIntent::GeneralQuery {
                text: "How much did we spend on software this month?".to_string()
            }
        );
        assert!(matches!(
            route("Can you explain what the categories are used for in this workspace overall"),
            CommandIntent::GeneralQuery { .. }
        ));
    }

    #[test]
    fn test_intent_serializes_with_tag() {
        let json = serde_json::to_value(CommandIntent::PayById { expense_id: 9 }).unwrap();
        assert_eq!(json["intent"], "pay_by_id");
        assert_eq!(json["expense_id"], 9);
    }
}
