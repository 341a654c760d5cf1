//! Table schema for ingestion records
//!
//! The schema serializes to the warehouse's JSON field-list format and is
//! also what the SQLite backend derives its columns from.

use serde::{Deserialize, Serialize};

/// Column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    String,
    Integer,
    Boolean,
    Timestamp,
    Record,
}

impl FieldType {
    /// SQLite column affinity for a top-level field of this type
    pub fn sqlite_type(&self) -> &'static str {
        match self {
            Self::Integer | Self::Boolean => "INTEGER",
            Self::String | Self::Timestamp | Self::Record => "TEXT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldMode {
    Nullable,
    Required,
    Repeated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub mode: FieldMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldSchema>,
}

impl FieldSchema {
    fn new(name: &str, field_type: FieldType, mode: FieldMode) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            mode,
            fields: Vec::new(),
        }
    }

    fn nullable(name: &str, field_type: FieldType) -> Self {
        Self::new(name, field_type, FieldMode::Nullable)
    }

    fn repeated_record(name: &str, fields: Vec<FieldSchema>) -> Self {
        Self {
            fields,
            ..Self::new(name, FieldType::Record, FieldMode::Repeated)
        }
    }

    /// True if the column holds nested or repeated data
    pub fn is_nested(&self) -> bool {
        self.field_type == FieldType::Record || self.mode == FieldMode::Repeated
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub fields: Vec<FieldSchema>,
}

impl TableSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Partitioning granularity for the ingestion table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimePartitioning {
    Day,
}

/// Schema of the ingestion table, one row per fetched page
pub fn ingestion_table_schema() -> TableSchema {
    use FieldType::*;

    let cookie_fields = vec![
        FieldSchema::nullable("name", String),
        FieldSchema::nullable("value", String),
        FieldSchema::nullable("domain", String),
        FieldSchema::nullable("path", String),
        FieldSchema::nullable("expires", Timestamp),
        FieldSchema::nullable("size", Integer),
        FieldSchema::nullable("httpOnly", Boolean),
        FieldSchema::nullable("secure", Boolean),
        FieldSchema::nullable("session", Boolean),
        FieldSchema::nullable("sameSite", String),
    ];

    let storage_fields = vec![
        FieldSchema::nullable("name", String),
        FieldSchema::nullable("value", String),
    ];

    TableSchema {
        fields: vec![
            FieldSchema::new("requested_url", String, FieldMode::Required),
            FieldSchema::nullable("final_url", String),
            FieldSchema::nullable("http_status", Integer),
            FieldSchema::nullable("content_type", String),
            FieldSchema::nullable("external", Boolean),
            FieldSchema::nullable("previous_url", String),
            FieldSchema::nullable("document_title", String),
            FieldSchema::nullable("meta_description", String),
            FieldSchema::repeated_record("cookies", cookie_fields),
            FieldSchema::repeated_record("local_storage", storage_fields),
        ],
    }
}
