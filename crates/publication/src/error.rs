//! Error types for the publication crate.

use geoserver_client::CatalogError;
use staging::StagingError;
use thiserror::Error;

/// Errors that can occur while publishing a product.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Unknown satellite '{0}' (expected one of electro_l2, himawari8, goes16, goes17)")]
    UnknownSatellite(String),

    #[error("No configuration for product '{0}'")]
    UnknownProduct(String),

    #[error("Key for product '{key}' handed to the '{publisher}' publisher")]
    ProductMismatch { publisher: String, key: String },

    #[error("Invalid {field} '{value}': {reason}")]
    InvalidKey {
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Staging error: {0}")]
    Staging(#[from] StagingError),

    #[error("Staging task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type for publication operations.
pub type Result<T> = std::result::Result<T, PublishError>;
