//! BigQuery REST warehouse implementation
//!
//! Uses three endpoints of the v2 API: `datasets.insert`, `tables.insert`
//! and `tabledata.insertAll`. Authentication is a bearer token supplied by
//! the caller.

use crate::sink::schema::{TableSchema, TimePartitioning};
use crate::sink::traits::{TableRef, Warehouse, WarehouseError, WarehouseResult};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

/// Production endpoint
pub const DEFAULT_ENDPOINT: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Error envelope returned by the API
#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: ErrorBody,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    errors: Vec<ErrorItem>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorItem {
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllResponse {
    #[serde(default)]
    insert_errors: Vec<Value>,
}

/// BigQuery warehouse backend
pub struct BigQueryWarehouse {
    client: Client,
    endpoint: String,
    project_id: String,
    access_token: String,
}

impl BigQueryWarehouse {
    /// Creates a backend for `project_id`
    ///
    /// # Arguments
    ///
    /// * `client` - HTTP client used for every call
    /// * `endpoint` - Base URL, e.g. `DEFAULT_ENDPOINT`
    /// * `project_id` - Project that owns the dataset
    /// * `access_token` - OAuth bearer token
    pub fn new(
        client: Client,
        endpoint: impl Into<String>,
        project_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            project_id: project_id.into(),
            access_token: access_token.into(),
        }
    }

    fn project_url(&self) -> String {
        format!("{}/projects/{}", self.endpoint, self.project_id)
    }

    async fn post(&self, url: String, body: Value) -> WarehouseResult<Response> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(classify_error(response).await)
        }
    }
}

/// Maps a non-success response to a `WarehouseError`
///
/// Status code first, then the structured status string and reasons. The
/// message text is only consulted when neither is conclusive.
async fn classify_error(response: Response) -> WarehouseError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let envelope: ErrorEnvelope = serde_json::from_str(&text).unwrap_or_default();
    let body = envelope.error;

    let already_exists = status == StatusCode::CONFLICT
        || body.status == "ALREADY_EXISTS"
        || body.errors.iter().any(|e| e.reason == "duplicate")
        || body.message.starts_with("Already Exists");

    if already_exists {
        return WarehouseError::AlreadyExists(body.message);
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            WarehouseError::Auth(format!("{}: {}", status.as_u16(), body.message))
        }
        StatusCode::NOT_FOUND => WarehouseError::NotFound(body.message),
        _ => WarehouseError::Api {
            status: status.as_u16(),
            reason: body
                .errors
                .first()
                .map(|e| e.reason.clone())
                .filter(|r| !r.is_empty())
                .unwrap_or(body.status),
            message: if body.message.is_empty() { text } else { body.message },
        },
    }
}

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    async fn create_dataset(&self, dataset_id: &str) -> WarehouseResult<()> {
        let body = json!({
            "datasetReference": {
                "projectId": self.project_id,
                "datasetId": dataset_id,
            }
        });
        self.post(format!("{}/datasets", self.project_url()), body)
            .await?;
        Ok(())
    }

    async fn create_table(
        &self,
        table: &TableRef,
        schema: &TableSchema,
        partitioning: TimePartitioning,
    ) -> WarehouseResult<()> {
        let body = json!({
            "tableReference": {
                "projectId": self.project_id,
                "datasetId": table.dataset_id,
                "tableId": table.table_id,
            },
            "schema": schema,
            "timePartitioning": { "type": partitioning },
        });
        self.post(
            format!("{}/datasets/{}/tables", self.project_url(), table.dataset_id),
            body,
        )
        .await?;
        Ok(())
    }

    async fn insert_rows(&self, table: &TableRef, rows: Vec<Value>) -> WarehouseResult<()> {
        let rows: Vec<Value> = rows.into_iter().map(|row| json!({ "json": row })).collect();
        let body = json!({
            "kind": "bigquery#tableDataInsertAllRequest",
            "rows": rows,
        });

        let response = self
            .post(
                format!(
                    "{}/datasets/{}/tables/{}/insertAll",
                    self.project_url(),
                    table.dataset_id,
                    table.table_id
                ),
                body,
            )
            .await?;

        let result: InsertAllResponse = response.json().await?;
        if !result.insert_errors.is_empty() {
            return Err(WarehouseError::InsertRejected(serde_json::to_string(
                &result.insert_errors,
            )?));
        }
        Ok(())
    }
}
