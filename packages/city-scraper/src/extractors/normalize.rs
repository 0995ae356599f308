//! Text cleanup and value typing shared by extractors.

use regex::Regex;
use std::sync::LazyLock;

use crate::types::record::FieldValue;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Optional currency sign, digits with or without thousands separators,
/// optional fraction.
static NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[$€£]?\s*(-?(?:\d{1,3}(?:,\d{3})+|\d+))(\.\d+)?$").expect("valid regex")
});

const PLACEHOLDERS: [&str; 5] = ["n/a", "na", "-", "--", "none"];

/// Trim and collapse whitespace, non-breaking spaces included.
///
/// Returns `None` for empty text and "not available" placeholders, so the
/// field is left out of the record.
pub fn clean_text(raw: &str) -> Option<String> {
    let text = WHITESPACE.replace_all(raw.trim(), " ").into_owned();

    if text.is_empty() || PLACEHOLDERS.contains(&text.to_ascii_lowercase().as_str()) {
        return None;
    }
    Some(text)
}

/// Type a cleaned value: money and plain numbers become numeric, the rest
/// stays text.
///
/// Values with a leading zero (ZIP codes, parcel numbers) stay text.
pub fn parse_value(text: &str) -> FieldValue {
    let Some(caps) = NUMBER.captures(text) else {
        return FieldValue::Text(text.to_string());
    };

    let integer = caps[1].replace(',', "");
    let unsigned = integer.trim_start_matches('-');
    if unsigned.len() > 1 && unsigned.starts_with('0') {
        return FieldValue::Text(text.to_string());
    }

    match caps.get(2) {
        Some(fraction) => format!("{integer}{}", fraction.as_str())
            .parse::<f64>()
            .map(FieldValue::Float)
            .unwrap_or_else(|_| FieldValue::Text(text.to_string())),
        None => integer
            .parse::<i64>()
            .map(FieldValue::Integer)
            .unwrap_or_else(|_| FieldValue::Text(text.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  1234   Oak\n St "), Some("1234 Oak St".to_string()));
        assert_eq!(clean_text("\u{a0}12\u{a0}Elm\u{a0}"), Some("12 Elm".to_string()));
        assert_eq!(clean_text("   "), None);
        assert_eq!(clean_text("N/A"), None);
        assert_eq!(clean_text("-"), None);
    }

    #[test]
    fn test_parse_money_and_numbers() {
        assert_eq!(parse_value("$425,000"), FieldValue::Integer(425_000));
        assert_eq!(parse_value("1,850"), FieldValue::Integer(1850));
        assert_eq!(parse_value("2.5"), FieldValue::Float(2.5));
        assert_eq!(parse_value("-3"), FieldValue::Integer(-3));
        assert_eq!(parse_value("0"), FieldValue::Integer(0));
    }

    #[test]
    fn test_text_stays_text() {
        assert_eq!(parse_value("1234 Oak St"), FieldValue::from("1234 Oak St"));
        assert_eq!(parse_value("PROP-AUS-1000"), FieldValue::from("PROP-AUS-1000"));
        assert_eq!(parse_value("02134"), FieldValue::from("02134"));
        assert_eq!(parse_value("1,85"), FieldValue::from("1,85"));
    }
}
