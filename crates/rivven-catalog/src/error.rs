//! Catalog errors
//!
//! Registry failures never surface here: they are absorbed by the resolution
//! cache and turned into cache state plus events. These errors only come out of
//! construction and configuration paths.

use thiserror::Error;

/// Catalog error types
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid registry URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;
