//! SQLite warehouse implementation
//!
//! Datasets and tables are registered in two catalog tables; each warehouse
//! table becomes a physical table named `<dataset>__<table>` with one column
//! per top-level schema field plus `partition_day` and `inserted_at`.
//! Nested and repeated fields are stored as JSON text.

use crate::sink::schema::{FieldMode, FieldSchema, FieldType, TableSchema, TimePartitioning};
use crate::sink::traits::{TableRef, Warehouse, WarehouseError, WarehouseResult};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

const CATALOG_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS warehouse_datasets (
    dataset_id TEXT PRIMARY KEY,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS warehouse_tables (
    dataset_id TEXT NOT NULL REFERENCES warehouse_datasets(dataset_id),
    table_id TEXT NOT NULL,
    schema_json TEXT NOT NULL,
    partitioning TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (dataset_id, table_id)
);
"#;

/// SQLite warehouse backend
///
/// Statements run on tokio's blocking pool so concurrent writes never stall
/// runtime worker threads on the connection lock.
pub struct SqliteWarehouse {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteWarehouse {
    /// Opens or creates a warehouse database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    pub fn new(path: &Path) -> WarehouseResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
        ",
        )?;
        conn.execute_batch(CATALOG_SQL)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Creates an in-memory warehouse
    pub fn new_in_memory() -> WarehouseResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(CATALOG_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        lock(&self.conn)
    }

    /// Runs `work` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, work: F) -> WarehouseResult<T>
    where
        F: FnOnce(&mut Connection) -> WarehouseResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = lock(&conn);
            work(&mut *guard)
        })
        .await?
    }

    /// Number of rows in a table
    pub fn row_count(&self, table: &TableRef) -> WarehouseResult<i64> {
        let name = physical_table_name(table)?;
        let conn = self.conn();
        let count = conn.query_row(&format!("SELECT COUNT(*) FROM \"{}\"", name), [], |row| {
            row.get(0)
        })?;
        Ok(count)
    }
}

fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    // A panic mid-statement leaves SQLite consistent; keep using it
    conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn table_schema(conn: &Connection, table: &TableRef) -> WarehouseResult<TableSchema> {
    let schema_json: Option<String> = conn
        .query_row(
            "SELECT schema_json FROM warehouse_tables WHERE dataset_id = ?1 AND table_id = ?2",
            params![table.dataset_id, table.table_id],
            |row| row.get(0),
        )
        .optional()?;

    let schema_json =
        schema_json.ok_or_else(|| WarehouseError::NotFound(format!("Table {}", table)))?;
    Ok(serde_json::from_str(&schema_json)?)
}

#[async_trait]
impl Warehouse for SqliteWarehouse {
    async fn create_dataset(&self, dataset_id: &str) -> WarehouseResult<()> {
        validate_identifier(dataset_id)?;
        let dataset_id = dataset_id.to_string();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO warehouse_datasets (dataset_id, created_at) VALUES (?1, ?2)",
                params![dataset_id, Utc::now().to_rfc3339()],
            )
            .map_err(|e| classify_insert(e, format!("Dataset {}", dataset_id)))?;
            Ok(())
        })
        .await
    }

    async fn create_table(
        &self,
        table: &TableRef,
        schema: &TableSchema,
        partitioning: TimePartitioning,
    ) -> WarehouseResult<()> {
        let name = physical_table_name(table)?;
        let table = table.clone();
        let schema_json = serde_json::to_string(schema)?;
        let partitioning = serde_json::to_string(&partitioning)?;
        let ddl = create_table_sql(&name, schema);

        self.with_conn(move |conn| {
            let dataset_exists: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM warehouse_datasets WHERE dataset_id = ?1",
                    params![table.dataset_id],
                    |row| row.get(0),
                )
                .optional()?;
            if dataset_exists.is_none() {
                return Err(WarehouseError::NotFound(format!(
                    "Dataset {}",
                    table.dataset_id
                )));
            }

            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO warehouse_tables (dataset_id, table_id, schema_json, partitioning, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    table.dataset_id,
                    table.table_id,
                    schema_json,
                    partitioning,
                    Utc::now().to_rfc3339()
                ],
            )
            .map_err(|e| classify_insert(e, format!("Table {}", table)))?;
            tx.execute_batch(&ddl)?;
            tx.commit()?;

            tracing::debug!("Created SQLite table {}", name);
            Ok(())
        })
        .await
    }

    async fn insert_rows(&self, table: &TableRef, rows: Vec<Value>) -> WarehouseResult<()> {
        let name = physical_table_name(table)?;
        let table = table.clone();

        self.with_conn(move |conn| {
            let schema = table_schema(conn, &table)?;

            let columns: Vec<String> = schema
                .fields
                .iter()
                .map(|f| format!("\"{}\"", f.name))
                .chain(["partition_day".to_string(), "inserted_at".to_string()])
                .collect();
            let placeholders: Vec<String> =
                (1..=columns.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "INSERT INTO \"{}\" ({}) VALUES ({})",
                name,
                columns.join(", "),
                placeholders.join(", ")
            );

            let now = Utc::now();
            let partition_day = now.format("%Y-%m-%d").to_string();
            let inserted_at = now.to_rfc3339();

            let tx = conn.transaction()?;
            for (index, row) in rows.iter().enumerate() {
                let mut values = row_values(&schema, row).map_err(|reason| {
                    WarehouseError::InsertRejected(format!("row {}: {}", index, reason))
                })?;
                values.push(SqlValue::Text(partition_day.clone()));
                values.push(SqlValue::Text(inserted_at.clone()));
                tx.execute(&sql, params_from_iter(values))?;
            }
            tx.commit()?;

            Ok(())
        })
        .await
    }
}

fn classify_insert(error: rusqlite::Error, resource: String) -> WarehouseError {
    match &error {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            WarehouseError::AlreadyExists(resource)
        }
        _ => WarehouseError::Sqlite(error),
    }
}

fn validate_identifier(id: &str) -> WarehouseResult<()> {
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(WarehouseError::Api {
            status: 400,
            reason: "invalid".to_string(),
            message: format!("Invalid identifier '{}'", id),
        });
    }
    Ok(())
}

fn physical_table_name(table: &TableRef) -> WarehouseResult<String> {
    validate_identifier(&table.dataset_id)?;
    validate_identifier(&table.table_id)?;
    Ok(format!("{}__{}", table.dataset_id, table.table_id))
}

fn create_table_sql(name: &str, schema: &TableSchema) -> String {
    let mut columns: Vec<String> = schema
        .fields
        .iter()
        .map(|field| {
            let not_null = if field.mode == FieldMode::Required {
                " NOT NULL"
            } else {
                ""
            };
            format!(
                "\"{}\" {}{}",
                field.name,
                field.field_type.sqlite_type(),
                not_null
            )
        })
        .collect();
    columns.push("partition_day TEXT NOT NULL".to_string());
    columns.push("inserted_at TEXT NOT NULL".to_string());

    format!(
        "CREATE TABLE \"{name}\" ({columns});
         CREATE INDEX \"idx_{name}_partition\" ON \"{name}\"(partition_day);",
        name = name,
        columns = columns.join(", ")
    )
}

/// Converts a JSON row into column values in schema order
fn row_values(schema: &TableSchema, row: &Value) -> Result<Vec<SqlValue>, String> {
    let object = row.as_object().ok_or("row is not a JSON object")?;

    if let Some(unknown) = object.keys().find(|key| schema.field(key).is_none()) {
        return Err(format!("no such field: {}", unknown));
    }

    schema
        .fields
        .iter()
        .map(|field| column_value(field, object.get(&field.name)))
        .collect()
}

fn column_value(field: &FieldSchema, value: Option<&Value>) -> Result<SqlValue, String> {
    let value = match value {
        None | Some(Value::Null) => {
            return match field.mode {
                FieldMode::Required => {
                    Err(format!("missing required field: {}", field.name))
                }
                _ => Ok(SqlValue::Null),
            };
        }
        Some(value) => value,
    };

    if field.is_nested() {
        return Ok(SqlValue::Text(value.to_string()));
    }

    match (field.field_type, value) {
        (FieldType::Boolean, Value::Bool(b)) => Ok(SqlValue::Integer(i64::from(*b))),
        (FieldType::Integer, Value::Number(n)) => n
            .as_i64()
            .map(SqlValue::Integer)
            .ok_or_else(|| format!("{} is not an integer", field.name)),
        (FieldType::String | FieldType::Timestamp, Value::String(s)) => {
            Ok(SqlValue::Text(s.clone()))
        }
        _ => Err(format!("invalid value for {}: {}", field.name, value)),
    }
}
