use serde::Deserialize;

/// Main configuration structure for Crawl-Ingest
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// URL the crawl starts from
    pub start_url: String,

    /// Domain that defines the crawl scope (e.g., "example.com" or "example.com:8080")
    pub domain: String,

    /// Optional path prefix that further narrows the scope (e.g., "/blog/")
    #[serde(default)]
    pub base_path: Option<String>,

    /// Never fetch pages outside the scope when set
    #[serde(default)]
    pub skip_external: bool,

    /// Write only the requested URL, the external flag and client-side storage
    #[serde(default)]
    pub cookies_only: bool,

    #[serde(default)]
    pub fetcher: FetcherConfig,

    pub warehouse: WarehouseConfig,
}

/// Fetch engine tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FetcherConfig {
    /// Maximum number of concurrent page fetches
    #[serde(default = "default_max_concurrent_pages")]
    pub max_concurrent_pages: u32,

    /// Per-request timeout (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Maximum number of redirects followed per request
    #[serde(default = "default_max_redirects")]
    pub max_redirects: u32,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Wall-clock limit for the whole crawl (seconds); unlimited when absent
    #[serde(default)]
    pub crawl_timeout_secs: Option<u64>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent_pages: default_max_concurrent_pages(),
            request_timeout_secs: default_request_timeout_secs(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
            crawl_timeout_secs: None,
        }
    }
}

fn default_max_concurrent_pages() -> u32 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_redirects() -> u32 {
    10
}

fn default_user_agent() -> String {
    format!("crawl-ingest/{}", env!("CARGO_PKG_VERSION"))
}

/// Which warehouse implementation receives the rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarehouseBackend {
    Bigquery,
    Sqlite,
}

/// Warehouse destination configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WarehouseConfig {
    pub backend: WarehouseBackend,

    /// Dataset that holds the crawl table
    pub dataset_id: String,

    /// Table the rows are appended to
    pub table_id: String,

    /// Cloud project (BigQuery only)
    #[serde(default)]
    pub project_id: Option<String>,

    /// Override for the BigQuery REST endpoint
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Environment variable holding the OAuth access token (BigQuery only)
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,

    /// Path to the SQLite database file (SQLite only)
    #[serde(default)]
    pub database_path: Option<String>,
}

fn default_access_token_env() -> String {
    "BIGQUERY_ACCESS_TOKEN".to_string()
}
