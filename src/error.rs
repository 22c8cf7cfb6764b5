use thiserror::Error;

use crate::request::ExtractionMode;

/// Error taxonomy for the ingestion pipeline
#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Empty input: nothing to extract from")]
    EmptyInput,
    /// Carries the user-facing message of the mode that failed.
    #[error("{message}")]
    ExtractionService {
        mode: ExtractionMode,
        message: String,
    },
    #[error("Malformed record batch: {0}")]
    MalformedRecord(String),
    #[error("Export failed: {0}")]
    Export(String),
    #[error("Target page returned 404 or the link is dead: {0}")]
    TargetNotFound(String),
    #[error("Invalid crawl transition: {from} -> {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<csv::Error> for HarvestError {
    fn from(err: csv::Error) -> Self {
        HarvestError::Export(format!("csv: {}", err))
    }
}

impl From<std::io::Error> for HarvestError {
    fn from(err: std::io::Error) -> Self {
        HarvestError::Export(format!("io: {}", err))
    }
}

impl From<rust_xlsxwriter::XlsxError> for HarvestError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        HarvestError::Export(format!("xlsx: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, HarvestError>;
