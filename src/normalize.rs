use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{HarvestError, Result};
use crate::model::{ProductRecord, RawProductRecord};
use crate::numeric::estimate_revenue;

/// Trimmed, non-empty text or `None`
fn present(field: Option<String>) -> Option<String> {
    field
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Convert one raw element into a canonical record
fn normalize_one(raw: RawProductRecord, provenance: &str) -> ProductRecord {
    let price = raw.price.unwrap_or_default();
    let sales_volume = raw.sales_volume.unwrap_or_default();
    let revenue = estimate_revenue(&price, Some(sales_volume.as_str()));

    ProductRecord {
        id: Uuid::new_v4().to_string(),
        product_name: raw.product_name.unwrap_or_default(),
        price,
        sales_volume,
        revenue,
        product_link: present(raw.product_link),
        shop_name: raw.shop_name.unwrap_or_default(),
        shop_link: present(raw.shop_link),
        raw_content: present(raw.raw_content).unwrap_or_else(|| provenance.to_string()),
        timestamp: Utc::now(),
        category: present(raw.category),
    }
}

/// Normalize a raw batch; order is preserved and nothing is dropped
pub fn normalize(raw: Vec<RawProductRecord>, provenance: &str) -> Vec<ProductRecord> {
    let records: Vec<ProductRecord> = raw
        .into_iter()
        .map(|r| normalize_one(r, provenance))
        .collect();
    log::debug!("Normalized {} record(s) from {}", records.len(), provenance);
    records
}

/// Read a raw batch from an already-parsed JSON payload
pub fn parse_raw_batch(value: &Value) -> Result<Vec<RawProductRecord>> {
    match value {
        Value::Array(items) => Ok(items.iter().map(RawProductRecord::from_value).collect()),
        Value::Object(_) => Err(HarvestError::MalformedRecord(
            "expected an array of records, got a single object".to_string(),
        )),
        other => Err(HarvestError::MalformedRecord(format!(
            "expected an array of records, got: {}",
            other
        ))),
    }
}
