//! Error types for catalog operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using CatalogError.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Outcome of a failed catalog call.
///
/// Every variant carries the name of the operation that produced it so that
/// a logged error can be traced back to a single REST call.
#[derive(Debug, Error)]
pub enum CatalogError {
    // === Transport ===
    #[error("{operation}: request failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    // === Rejected by the catalog ===
    #[error("{operation}: credentials rejected (status {status})")]
    Unauthorized { operation: &'static str, status: u16 },

    #[error("{operation}: '{name}' already exists (status {status})")]
    AlreadyExists {
        operation: &'static str,
        name: String,
        status: u16,
    },

    #[error("{operation}: resource not found (status {status})")]
    NotFound { operation: &'static str, status: u16 },

    #[error("{operation}: rejected with status {status}: {body}")]
    Rejected {
        operation: &'static str,
        status: u16,
        body: String,
    },

    // === Local files ===
    #[error("{operation}: local file not found: {}", path.display())]
    LocalFileMissing {
        operation: &'static str,
        path: PathBuf,
    },

    #[error("{operation}: failed to read {}: {source}", path.display())]
    LocalRead {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // === Defects ===
    #[error("{operation}: malformed response: {message}")]
    MalformedResponse {
        operation: &'static str,
        message: String,
    },

    #[error("{operation}: failed to encode payload: {message}")]
    Encode {
        operation: &'static str,
        message: String,
    },
}

impl CatalogError {
    /// Name of the catalog operation that failed.
    pub fn operation(&self) -> &'static str {
        match self {
            CatalogError::Transport { operation, .. }
            | CatalogError::Unauthorized { operation, .. }
            | CatalogError::AlreadyExists { operation, .. }
            | CatalogError::NotFound { operation, .. }
            | CatalogError::Rejected { operation, .. }
            | CatalogError::LocalFileMissing { operation, .. }
            | CatalogError::LocalRead { operation, .. }
            | CatalogError::MalformedResponse { operation, .. }
            | CatalogError::Encode { operation, .. } => operation,
        }
    }

    /// HTTP status of the response, when the catalog answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            CatalogError::Unauthorized { status, .. }
            | CatalogError::AlreadyExists { status, .. }
            | CatalogError::NotFound { status, .. }
            | CatalogError::Rejected { status, .. } => Some(*status),
            CatalogError::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, CatalogError::AlreadyExists { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CatalogError::NotFound { .. })
    }

    /// True for conditions that indicate a bug or an incompatible catalog
    /// rather than an expected failure mode.
    pub fn is_defect(&self) -> bool {
        matches!(
            self,
            CatalogError::MalformedResponse { .. } | CatalogError::Encode { .. }
        )
    }

    /// Classify a non-2xx response.
    ///
    /// `name` is the resource being created, used for 409 responses.
    pub(crate) fn from_status(operation: &'static str, status: u16, name: &str, body: String) -> Self {
        match status {
            401 | 403 => CatalogError::Unauthorized { operation, status },
            404 => CatalogError::NotFound { operation, status },
            409 => CatalogError::AlreadyExists {
                operation,
                name: name.to_string(),
                status,
            },
            _ => CatalogError::Rejected {
                operation,
                status,
                body,
            },
        }
    }
}
