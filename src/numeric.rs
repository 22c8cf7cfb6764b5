//! Heuristic numeric parsing of free-form price and sales text.
//!
//! Prices arrive as "$15.99" or "¥29.9", sales as "10.2k", "5000+" or "1.2w".
//! None of these functions fail: unparseable input degrades to 0 (price) or
//! `None` (sales) and callers pick the default that suits them.

use once_cell::sync::Lazy;
use regex::Regex;

static NON_NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9.]").unwrap());
static LEADING_FLOAT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+\.?\d*|\.\d+)").unwrap());
static SIGNED_FLOAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)").unwrap());

/// Parse the longest leading float in `text` (digits with at most one dot)
fn leading_float(text: &str) -> Option<f64> {
    LEADING_FLOAT
        .find(text)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// Strip everything except digits and dots, then parse the leading number
fn stripped_number(text: &str) -> Option<f64> {
    let digits = NON_NUMERIC.replace_all(text, "");
    leading_float(&digits)
}

/// Numeric value of a price string, 0 when nothing parses
pub fn parse_price(text: &str) -> f64 {
    stripped_number(text).unwrap_or(0.0)
}

/// Scale applied for a magnitude suffix found anywhere in lowercase sales text
fn magnitude(lower: &str) -> f64 {
    if lower.contains('k') {
        1_000.0
    } else if lower.contains('w') || lower.contains('万') {
        10_000.0
    } else if lower.contains('m') {
        1_000_000.0
    } else {
        1.0
    }
}

/// Numeric sales value with its magnitude suffix applied
pub fn parse_sales(text: &str) -> Option<f64> {
    let lower = text.to_lowercase().replace(',', "");
    let value = stripped_number(&lower)?;
    Some(value * magnitude(&lower))
}

/// Parse a user-entered filter bound; blank or garbage means "no constraint".
///
/// A leading sign is honoured, so "-5" is a real (unsatisfiable) bound.
pub fn parse_bound(text: &str) -> Option<f64> {
    SIGNED_FLOAT
        .find(text.trim())
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// Estimated revenue: price number times sales number (1 when sales is missing)
pub fn estimate_revenue(price: &str, sales: Option<&str>) -> f64 {
    let units = sales.and_then(parse_sales).unwrap_or(1.0);
    let revenue = parse_price(price) * units;
    if revenue.is_finite() && revenue >= 0.0 {
        revenue
    } else {
        0.0
    }
}
