//! Product catalog ingestion: schema-constrained extraction through a
//! generative model, record normalization, filtering, statistics and
//! flat-file export.

pub mod catalog;
pub mod error;
pub mod export;
pub mod model;
pub mod normalize;
pub mod numeric;
pub mod request;
pub mod service;
pub mod session;
pub mod stats;

pub use catalog::{Catalog, CatalogQuery};
pub use error::HarvestError;
pub use export::ExportFormat;
pub use model::{CategoryFilter, FilterConfig, ProductRecord, RawProductRecord};
pub use request::{ExtractionMode, Extractor};
pub use service::{CompletionRequest, CompletionService, GeminiService, ServiceConfig, ServiceError};
pub use session::{CrawlPhase, CrawlSession, SessionOptions, SessionPacing};
pub use stats::CatalogStats;
