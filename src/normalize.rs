//! Normalization of raw scraped text into canonical column values
//!
//! Catalogue pages deliver prices with currency marks (sometimes mangled by
//! a wrong charset, e.g. `Â£51.77`), stock as prose, ratings as CSS class
//! words and dates as free text. These helpers turn them into the values the
//! store accepts; range checks stay with the store.

use regex::Regex;
use std::sync::OnceLock;

use crate::{Error, Result};

fn trailing_count() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+\d+$").expect("valid regex"))
}

fn first_number() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("valid regex"))
}

fn four_digit_year() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{4})\b").expect("valid regex"))
}

fn iso_date() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid regex"))
}

/// Trim and collapse internal whitespace
pub fn clean_name(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Category links carry an item count (`"Travel 11"`); drop it
pub fn clean_category_name(raw: &str) -> String {
    let name = clean_name(raw);
    trailing_count().replace(&name, "").into_owned()
}

/// Strip surrounding straight or curly quotation marks
pub fn clean_quote_text(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c: char| matches!(c, '"' | '\u{201C}' | '\u{201D}'))
        .trim()
        .to_string()
}

/// Parse a listed price such as `£51.77`, `51.77` or `1,299.00`.
///
/// Negative amounts parse; the store rejects them.
pub fn parse_price(raw: &str) -> Result<f64> {
    let numeric: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();

    if !numeric.chars().any(|c| c.is_ascii_digit()) {
        return Err(Error::Parse(format!("price {:?}", raw)));
    }
    numeric
        .parse::<f64>()
        .map_err(|_| Error::Parse(format!("price {:?}", raw)))
}

/// Units in stock from availability prose.
///
/// `"In stock (22 available)"` gives 22, a bare `"In stock"` counts as one,
/// anything else (`"Out of stock"`, unknown text) as zero.
pub fn parse_stock(raw: &str) -> u32 {
    let lower = raw.to_lowercase();
    if lower.contains("out of stock") || lower.contains("unavailable") {
        return 0;
    }
    if let Some(m) = first_number().find(&lower) {
        return m.as_str().parse().unwrap_or(u32::MAX);
    }
    if lower.contains("in stock") || lower.contains("available") {
        return 1;
    }
    0
}

/// Star rating from a class word (`"star-rating Three"`) or a digit
pub fn parse_rating(raw: &str) -> Option<u8> {
    raw.split_whitespace().find_map(|word| match word.to_lowercase().as_str() {
        "one" | "1" => Some(1),
        "two" | "2" => Some(2),
        "three" | "3" => Some(3),
        "four" | "4" => Some(4),
        "five" | "5" => Some(5),
        _ => None,
    })
}

/// First four-digit year in free text
pub fn parse_year(raw: &str) -> Option<i32> {
    four_digit_year()
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Canonical date column value.
///
/// ISO dates pass through; otherwise the year is kept as `YYYY-01-01`.
pub fn normalize_date(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if iso_date().is_match(trimmed) {
        return Some(trimmed.to_string());
    }
    parse_year(trimmed).map(|year| format!("{:04}-01-01", year))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_names() {
        assert_eq!(clean_name("  Jane   Doe \n"), "Jane Doe");
        assert_eq!(clean_category_name("\n  Travel\n  11 "), "Travel");
        assert_eq!(clean_category_name("Historical Fiction"), "Historical Fiction");
    }

    #[test]
    fn test_clean_quote_text() {
        assert_eq!(
            clean_quote_text("\u{201C}The world as we have created it is a process of our thinking.\u{201D}"),
            "The world as we have created it is a process of our thinking."
        );
        assert_eq!(clean_quote_text("  \"text1\" "), "text1");
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price("£51.77").unwrap(), 51.77);
        assert_eq!(parse_price("Â£12.50").unwrap(), 12.50);
        assert_eq!(parse_price("1,299.00").unwrap(), 1299.0);
        assert_eq!(parse_price("-3.00").unwrap(), -3.0);
        assert!(parse_price("free").is_err());
        assert!(parse_price("1.2.3").is_err());
    }

    #[test]
    fn test_parse_stock() {
        assert_eq!(parse_stock("In stock (22 available)"), 22);
        assert_eq!(parse_stock("In stock"), 1);
        assert_eq!(parse_stock("Out of stock"), 0);
        assert_eq!(parse_stock(""), 0);
    }

    #[test]
    fn test_parse_rating() {
        assert_eq!(parse_rating("star-rating Three"), Some(3));
        assert_eq!(parse_rating("Five"), Some(5));
        assert_eq!(parse_rating("2"), Some(2));
        assert_eq!(parse_rating("star-rating"), None);
    }

    #[test]
    fn test_dates() {
        assert_eq!(parse_year("Available since March 2016"), Some(2016));
        assert_eq!(normalize_date("March 14, 1879"), Some("1879-01-01".to_string()));
        assert_eq!(normalize_date("1879-03-14"), Some("1879-03-14".to_string()));
        assert_eq!(normalize_date("unknown"), None);
    }
}
