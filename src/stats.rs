use serde::Serialize;

use crate::model::ProductRecord;
use crate::numeric::parse_price;

const UNKNOWN_SHOP: &str = "未知店铺";
const UNKNOWN_CATEGORY: &str = "未知";
const TOP_SHOPS: usize = 5;

/// Price buckets as (label, lower bound inclusive, upper bound exclusive)
const PRICE_BUCKETS: [(&str, f64, f64); 4] = [
    ("< 20", 0.0, 20.0),
    ("20-50", 20.0, 50.0),
    ("50-100", 50.0, 100.0),
    ("> 100", 100.0, f64::INFINITY),
];

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Bucket {
    pub label: String,
    pub count: usize,
}

/// Aggregate numbers shown above the catalog
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CatalogStats {
    pub total: usize,
    pub average_price: f64,
    pub total_revenue: f64,
    /// Percent of records carrying a product link, 0-100
    pub link_coverage: f64,
    pub price_distribution: Vec<Bucket>,
    pub top_shops: Vec<Bucket>,
    pub categories: Vec<Bucket>,
}

/// Count occurrences preserving first-seen order, then sort by count descending
fn tally<'a>(keys: impl Iterator<Item = &'a str>) -> Vec<Bucket> {
    let mut buckets: Vec<Bucket> = Vec::new();
    for key in keys {
        match buckets.iter_mut().find(|b| b.label == key) {
            Some(bucket) => bucket.count += 1,
            None => buckets.push(Bucket {
                label: key.to_string(),
                count: 1,
            }),
        }
    }
    // stable: ties keep first-seen order
    buckets.sort_by(|a, b| b.count.cmp(&a.count));
    buckets
}

impl CatalogStats {
    pub fn compute<'a>(records: impl IntoIterator<Item = &'a ProductRecord>) -> Self {
        let records: Vec<&ProductRecord> = records.into_iter().collect();
        let total = records.len();
        let prices: Vec<f64> = records.iter().map(|r| parse_price(&r.price)).collect();

        let average_price = if total > 0 {
            prices.iter().sum::<f64>() / total as f64
        } else {
            0.0
        };
        let total_revenue: f64 = records.iter().map(|r| r.revenue).sum();
        let with_links = records.iter().filter(|r| r.product_link.is_some()).count();
        let link_coverage = if total > 0 {
            with_links as f64 * 100.0 / total as f64
        } else {
            0.0
        };

        let price_distribution: Vec<Bucket> = PRICE_BUCKETS
            .iter()
            .map(|(label, low, high)| Bucket {
                label: label.to_string(),
                count: prices.iter().filter(|p| **p >= *low && **p < *high).count(),
            })
            .collect();

        let mut top_shops = tally(records.iter().map(|r| {
            if r.shop_name.trim().is_empty() {
                UNKNOWN_SHOP
            } else {
                r.shop_name.as_str()
            }
        }));
        top_shops.truncate(TOP_SHOPS);

        let categories = tally(
            records
                .iter()
                .map(|r| r.category.as_deref().unwrap_or(UNKNOWN_CATEGORY)),
        );

        Self {
            total,
            average_price,
            total_revenue,
            link_coverage,
            price_distribution,
            top_shops,
            categories,
        }
    }

    /// Average price rounded for display, e.g. "$12.50"
    pub fn average_price_display(&self) -> String {
        format!("${:.2}", self.average_price)
    }

    pub fn link_coverage_display(&self) -> String {
        format!("{:.0}%", self.link_coverage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(shop: &str, price: &str, link: bool, category: Option<&str>) -> ProductRecord {
        ProductRecord {
            id: uuid::Uuid::new_v4().to_string(),
            product_name: "p".to_string(),
            price: price.to_string(),
            sales_volume: String::new(),
            revenue: crate::numeric::parse_price(price),
            product_link: link.then(|| "https://tiktok.com/product/1".to_string()),
            shop_name: shop.to_string(),
            shop_link: None,
            raw_content: String::new(),
            timestamp: Utc::now(),
            category: category.map(str::to_string),
        }
    }

    #[test]
    fn empty_catalog() {
        let stats = CatalogStats::compute(std::iter::empty());
        assert_eq!(stats.total, 0);
        assert_eq!(stats.average_price_display(), "$0.00");
        assert_eq!(stats.link_coverage_display(), "0%");
        assert!(stats.top_shops.is_empty());
    }

    #[test]
    fn every_record_lands_in_one_bucket() {
        let records = vec![
            record("A", "$5", true, None),
            record("A", "$20", false, None),
            record("B", "$49.99", false, Some("家居百货")),
            record("C", "$100", true, None),
            record("", "免费", false, None),
        ];
        let stats = CatalogStats::compute(&records);
        let counts: Vec<usize> = stats.price_distribution.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![2, 2, 0, 1]);
        assert_eq!(counts.iter().sum::<usize>(), records.len());
        assert_eq!(stats.link_coverage_display(), "40%");
    }

    #[test]
    fn top_shops_ranked_with_unknown_label() {
        let records = vec![
            record("B", "$1", false, None),
            record("A", "$1", false, None),
            record("A", "$1", false, None),
            record(" ", "$1", false, None),
        ];
        let stats = CatalogStats::compute(&records);
        assert_eq!(stats.top_shops[0], Bucket { label: "A".into(), count: 2 });
        assert_eq!(stats.top_shops[1].label, "B");
        assert_eq!(stats.top_shops[2].label, UNKNOWN_SHOP);
        assert_eq!(stats.categories[0], Bucket { label: UNKNOWN_CATEGORY.into(), count: 4 });
    }

    #[test]
    fn average_and_revenue() {
        let records = vec![record("A", "$10", false, None), record("A", "$15", false, None)];
        let stats = CatalogStats::compute(&records);
        assert_eq!(stats.average_price_display(), "$12.50");
        assert_eq!(stats.total_revenue, 25.0);
    }
}
