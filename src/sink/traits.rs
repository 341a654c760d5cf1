//! Warehouse traits and error types
//!
//! This module defines the three calls a warehouse backend must support and
//! the error classes they report.

use crate::sink::schema::{TableSchema, TimePartitioning};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Errors that can occur during warehouse operations
///
/// `AlreadyExists` is its own variant so callers never need to inspect
/// messages to tell it apart from real failures.
#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    #[error("Warehouse API error ({status} {reason}): {message}")]
    Api {
        status: u16,
        reason: String,
        message: String,
    },

    #[error("Rows rejected: {0}")]
    InsertRejected(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Warehouse task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl WarehouseError {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}

/// Result type for warehouse operations
pub type WarehouseResult<T> = Result<T, WarehouseError>;

/// A table within a dataset
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub dataset_id: String,
    pub table_id: String,
}

impl TableRef {
    pub fn new(dataset_id: impl Into<String>, table_id: impl Into<String>) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            table_id: table_id.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset_id, self.table_id)
    }
}

/// Trait for warehouse backend implementations
///
/// Implementations must be safe to call concurrently; the sink issues
/// writes from many tasks at once.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Creates a dataset
    ///
    /// # Returns
    ///
    /// * `Err(WarehouseError::AlreadyExists)` - The dataset is already present
    async fn create_dataset(&self, dataset_id: &str) -> WarehouseResult<()>;

    /// Creates a time-partitioned table
    async fn create_table(
        &self,
        table: &TableRef,
        schema: &TableSchema,
        partitioning: TimePartitioning,
    ) -> WarehouseResult<()>;

    /// Appends rows to a table
    async fn insert_rows(
        &self,
        table: &TableRef,
        rows: Vec<serde_json::Value>,
    ) -> WarehouseResult<()>;
}
