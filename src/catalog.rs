use crate::model::{FilterConfig, ProductRecord};
use crate::numeric::{parse_price, parse_sales};

/// In-memory product catalog, newest batch first.
///
/// Records enter only through [`Catalog::prepend_batch`] and leave only
/// through [`Catalog::clear`]; there is no update in place.
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    records: Vec<ProductRecord>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a batch ahead of existing records, keeping the batch's own order
    pub fn prepend_batch(&mut self, batch: Vec<ProductRecord>) {
        log::info!(
            "📥 Adding {} record(s) to catalog ({} already stored)",
            batch.len(),
            self.records.len()
        );
        self.records.splice(0..0, batch);
    }

    /// Drop every record, returning how many were removed
    pub fn clear(&mut self) -> usize {
        let removed = self.records.len();
        self.records.clear();
        log::info!("🗑️  Cleared {} record(s) from catalog", removed);
        removed
    }

    pub fn records(&self) -> &[ProductRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Visible subset for a search term and filter
    pub fn filtered(&self, query: &CatalogQuery) -> Vec<&ProductRecord> {
        query.apply(&self.records)
    }
}

/// Search term plus filter constraints applied to the catalog
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogQuery {
    pub search: String,
    pub filters: FilterConfig,
}

impl CatalogQuery {
    pub fn new(search: impl Into<String>, filters: FilterConfig) -> Self {
        Self {
            search: search.into(),
            filters,
        }
    }

    /// True when anything narrows the view
    pub fn is_active(&self) -> bool {
        !self.search.trim().is_empty() || !self.filters.is_unconstrained()
    }

    pub fn matches(&self, record: &ProductRecord) -> bool {
        let term = self.search.trim().to_lowercase();
        if !term.is_empty()
            && !record.product_name.to_lowercase().contains(&term)
            && !record.shop_name.to_lowercase().contains(&term)
        {
            return false;
        }

        let filters = &self.filters;
        if !filters.category.matches(record.category.as_deref()) {
            return false;
        }

        let price = parse_price(&record.price);
        if filters.min_price.is_some_and(|min| price < min) {
            return false;
        }
        if filters.max_price.is_some_and(|max| price > max) {
            return false;
        }

        if let Some(min_sales) = filters.min_sales {
            let sales = parse_sales(&record.sales_volume).unwrap_or(0.0);
            if sales < min_sales {
                return false;
            }
        }

        true
    }

    pub fn apply<'a>(&self, records: &'a [ProductRecord]) -> Vec<&'a ProductRecord> {
        records.iter().filter(|r| self.matches(r)).collect()
    }
}
