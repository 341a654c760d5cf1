//! Warehouse sink for ingestion records
//!
//! This module handles everything between a mapped record and the
//! warehouse:
//! - Idempotent provisioning of the dataset and day-partitioned table
//! - Appending one record per call
//! - The BigQuery REST and SQLite backends

mod bigquery;
mod schema;
mod sqlite;
mod traits;

pub use bigquery::{BigQueryWarehouse, DEFAULT_ENDPOINT};
pub use schema::{
    ingestion_table_schema, FieldMode, FieldSchema, FieldType, TableSchema, TimePartitioning,
};
pub use sqlite::SqliteWarehouse;
pub use traits::{TableRef, Warehouse, WarehouseError, WarehouseResult};

use crate::config::{WarehouseBackend, WarehouseConfig};
use crate::record::IngestionRecord;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors reported by the sink
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Could not provision {resource}: {source}")]
    Provisioning {
        resource: String,
        #[source]
        source: WarehouseError,
    },

    #[error("Write of {url} failed: {source}")]
    Write {
        url: String,
        #[source]
        source: WarehouseError,
    },

    #[error("Could not serialize record for {url}: {source}")]
    Serialize {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Appends ingestion records to one warehouse table
///
/// Cloning is cheap; clones share the backend, so each write can run in its
/// own task.
#[derive(Clone)]
pub struct Sink {
    warehouse: Arc<dyn Warehouse>,
    table: TableRef,
    schema: Arc<TableSchema>,
}

impl Sink {
    pub fn new(warehouse: Arc<dyn Warehouse>, table: TableRef) -> Self {
        Self {
            warehouse,
            table,
            schema: Arc::new(ingestion_table_schema()),
        }
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    /// Creates the dataset and then the day-partitioned table
    ///
    /// A resource that already exists counts as created, so this can run
    /// any number of times.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Both resources exist
    /// * `Err(SinkError::Provisioning)` - Any failure other than "already exists"
    pub async fn ensure_schema(&self) -> SinkResult<()> {
        info!(
            "Creating table {} in dataset {}",
            self.table.table_id, self.table.dataset_id
        );

        match self.warehouse.create_dataset(&self.table.dataset_id).await {
            Ok(()) => debug!("Created dataset {}", self.table.dataset_id),
            Err(e) if e.is_already_exists() => {
                debug!("Dataset {} already exists", self.table.dataset_id)
            }
            Err(source) => {
                return Err(SinkError::Provisioning {
                    resource: format!("dataset {}", self.table.dataset_id),
                    source,
                })
            }
        }

        match self
            .warehouse
            .create_table(&self.table, &self.schema, TimePartitioning::Day)
            .await
        {
            Ok(()) => debug!("Created table {}", self.table),
            Err(e) if e.is_already_exists() => debug!("Table {} already exists", self.table),
            Err(source) => {
                return Err(SinkError::Provisioning {
                    resource: format!("table {}", self.table),
                    source,
                })
            }
        }

        Ok(())
    }

    /// Appends one record
    ///
    /// Returns once the warehouse has acknowledged the row.
    pub async fn write(&self, record: &IngestionRecord) -> SinkResult<()> {
        let row = serde_json::to_value(record).map_err(|source| SinkError::Serialize {
            url: record.requested_url.clone(),
            source,
        })?;

        self.warehouse
            .insert_rows(&self.table, vec![row])
            .await
            .map_err(|source| SinkError::Write {
                url: record.requested_url.clone(),
                source,
            })
    }
}

/// Opens the warehouse backend named in the configuration
///
/// # Arguments
///
/// * `config` - The validated warehouse section
///
/// # Returns
///
/// * `Ok(Arc<dyn Warehouse>)` - Ready-to-use backend
/// * `Err(WarehouseError)` - The database could not be opened or the access
///   token is missing
pub fn open_warehouse(
    config: &WarehouseConfig,
    client: reqwest::Client,
) -> WarehouseResult<Arc<dyn Warehouse>> {
    match config.backend {
        WarehouseBackend::Bigquery => {
            let token = std::env::var(&config.access_token_env).map_err(|_| {
                WarehouseError::Auth(format!(
                    "Environment variable {} is not set",
                    config.access_token_env
                ))
            })?;
            let project_id = config
                .project_id
                .clone()
                .ok_or_else(|| WarehouseError::Auth("No project-id configured".to_string()))?;
            let endpoint = config
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

            Ok(Arc::new(BigQueryWarehouse::new(
                client, endpoint, project_id, token,
            )))
        }
        WarehouseBackend::Sqlite => {
            let path = config.database_path.as_deref().unwrap_or("warehouse.db");
            Ok(Arc::new(SqliteWarehouse::new(Path::new(path))?))
        }
    }
}
