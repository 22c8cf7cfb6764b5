use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

use crate::numeric::parse_bound;

/// Sentinel shown in the category picker for "no category constraint"
pub const ALL_CATEGORIES: &str = "所有类目";

/// Categories offered by the category picker
pub const PRODUCT_CATEGORIES: &[&str] = &[
    ALL_CATEGORIES,
    "女装服饰",
    "男装服饰",
    "美妆个护",
    "3C数码",
    "家居百货",
    "鞋包配饰",
    "运动户外",
    "母婴玩具",
    "食品饮料",
];

/// One product entry in the catalog, in canonical form
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    pub id: String,
    pub product_name: String,
    /// Free-form, keeps the currency symbol
    pub price: String,
    pub sales_volume: String,
    /// Heuristic price x sales estimate, always finite and non-negative
    pub revenue: f64,
    pub product_link: Option<String>,
    pub shop_name: String,
    pub shop_link: Option<String>,
    pub raw_content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Loosely typed record as returned by the generative service.
///
/// Any field may be missing or carry the wrong JSON type; numbers and
/// booleans are kept as their text form, everything else becomes `None`.
#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RawProductRecord {
    #[serde(deserialize_with = "lenient_string")]
    pub product_name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub price: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub sales_volume: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub product_link: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub shop_name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub shop_link: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub raw_content: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub category: Option<String>,
}

impl RawProductRecord {
    /// Build from one element of the service reply; non-objects yield an empty record
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(_) => Self::deserialize(value).unwrap_or_default(),
            other => {
                log::debug!("Raw element is not an object: {}", other);
                Self::default()
            }
        }
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

/// Category constraint of a filter
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CategoryFilter {
    #[default]
    All,
    Exact(String),
}

impl CategoryFilter {
    /// Parse picker text; blank or the sentinel means no constraint
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == ALL_CATEGORIES {
            CategoryFilter::All
        } else {
            CategoryFilter::Exact(trimmed.to_string())
        }
    }

    pub fn matches(&self, category: Option<&str>) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Exact(wanted) => category == Some(wanted.as_str()),
        }
    }
}

impl fmt::Display for CategoryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategoryFilter::All => f.write_str(ALL_CATEGORIES),
            CategoryFilter::Exact(name) => f.write_str(name),
        }
    }
}

/// Four independent constraints; `None` means "no constraint"
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterConfig {
    pub category: CategoryFilter,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_sales: Option<f64>,
}

impl FilterConfig {
    /// Build from the four free-text inputs of the filter panel
    pub fn from_text(category: &str, min_price: &str, max_price: &str, min_sales: &str) -> Self {
        Self {
            category: CategoryFilter::parse(category),
            min_price: parse_bound(min_price),
            max_price: parse_bound(max_price),
            min_sales: parse_bound(min_sales),
        }
    }

    pub fn is_unconstrained(&self) -> bool {
        self.category == CategoryFilter::All
            && self.min_price.is_none()
            && self.max_price.is_none()
            && self.min_sales.is_none()
    }
}
