//! Crawl-Ingest: a bounded-scope crawl-to-warehouse pipeline
//!
//! This crate crawls a site from a seed URL, keeps the traversal inside an
//! origin-exact scope, and streams one warehouse row per fetched page
//! (URL, cookies, title, meta description, local storage) into a
//! day-partitioned table that is provisioned before the crawl starts.

pub mod config;
pub mod crawler;
pub mod output;
pub mod record;
pub mod sink;
pub mod state;
pub mod url;

use thiserror::Error;

/// Main error type for Crawl-Ingest operations
///
/// Only configuration and provisioning failures end a run; per-page
/// failures are contained by the coordinator and never surface here.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Provisioning failed: {0}")]
    Provisioning(#[from] sink::SinkError),

    #[error("Warehouse error: {0}")]
    Warehouse(#[from] sink::WarehouseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("Invalid pipeline transition: {from} -> {to}")]
    InvalidTransition {
        from: state::PipelineState,
        to: state::PipelineState,
    },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain: {0}")]
    InvalidDomain(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Crawl-Ingest operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, Decision, Depth, FrontierController};
pub use output::CrawlSummary;
pub use record::{IngestionRecord, ResultMapper};
pub use sink::Sink;
pub use state::PipelineState;
pub use url::{ScopeRule, UrlScope};

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_unreadable_config_is_a_config_error() {
        let err: IngestError = config::load_config(Path::new("/nonexistent/crawl-ingest.toml"))
            .unwrap_err()
            .into();
        assert!(matches!(err, IngestError::Config(ConfigError::Io(_))));
    }
}
