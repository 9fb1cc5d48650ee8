use std::sync::OnceLock;

use bizscan_core::{Identifier, StatusRecord};
use regex::Regex;

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_identifier, r"[0-9]{3}-[0-9]{2}-[0-9]{5}");
re!(re_status, r"<smpcBmanTrtCntn>([^<]+)");
re!(re_description, r"<trtCntn>([^<]+)");

// ── Public extraction API ─────────────────────────────────────────────────────

/// First business-registration number in recognized text, as written.
pub fn extract_identifier(text: &str) -> Option<Identifier> {
    re_identifier()
        .find(text)
        .and_then(|m| Identifier::parse(m.as_str()).ok())
}

/// Status and description from a raw registry response.
///
/// This is pattern matching over the body, not XML parsing. The description is
/// taken from the first `<trtCntn>` after the status element, or the first one
/// anywhere when there is no status.
pub fn extract_status(response: &str) -> StatusRecord {
    let status = re_status().captures(response);
    let desc_from = status
        .as_ref()
        .and_then(|c| c.get(0))
        .map_or(0, |m| m.end());
    let description = re_description()
        .captures(&response[desc_from..])
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    StatusRecord::new(
        status.and_then(|c| c.get(1)).map(|m| m.as_str().to_string()),
        description,
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
