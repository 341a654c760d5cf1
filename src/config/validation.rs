use crate::config::types::{Config, FetcherConfig, WarehouseBackend, WarehouseConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_start_url(&config.start_url)?;
    validate_domain(&config.domain)?;
    if let Some(base_path) = &config.base_path {
        validate_base_path(base_path)?;
    }
    validate_fetcher_config(&config.fetcher)?;
    validate_warehouse_config(&config.warehouse)?;
    Ok(())
}

/// Validates the seed URL: must parse, use HTTP(S) and carry a host
fn validate_start_url(start_url: &str) -> Result<(), ConfigError> {
    let url = Url::parse(start_url).map_err(|e| {
        ConfigError::InvalidUrl(format!("Invalid start_url '{}': {}", start_url, e))
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "start_url '{}' must use HTTP or HTTPS",
            start_url
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "start_url '{}' has no host",
            start_url
        )));
    }

    Ok(())
}

/// Validates the scope domain, which may carry an explicit port
fn validate_domain(domain: &str) -> Result<(), ConfigError> {
    let host = match domain.rsplit_once(':') {
        Some((host, port)) => {
            port.parse::<u16>().map_err(|_| {
                ConfigError::InvalidDomain(format!("Domain '{}' has an invalid port", domain))
            })?;
            host
        }
        None => domain,
    };

    validate_domain_string(host)
}

/// Validates a host name
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidDomain(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidDomain(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidDomain(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidDomain(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::InvalidDomain(format!(
            "Domain '{}' must contain at least one dot (e.g., 'example.com')",
            domain
        )));
    }

    Ok(())
}

fn validate_base_path(base_path: &str) -> Result<(), ConfigError> {
    if !base_path.starts_with('/') {
        return Err(ConfigError::Validation(format!(
            "base_path must start with '/', got '{}'",
            base_path
        )));
    }

    if base_path.contains(['?', '#']) {
        return Err(ConfigError::Validation(format!(
            "base_path cannot contain a query or fragment, got '{}'",
            base_path
        )));
    }

    Ok(())
}

/// Validates fetch engine tuning
fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_pages < 1 || config.max_concurrent_pages > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_pages must be between 1 and 100, got {}",
            config.max_concurrent_pages
        )));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.max_redirects > 20 {
        return Err(ConfigError::Validation(format!(
            "max_redirects must be <= 20, got {}",
            config.max_redirects
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.crawl_timeout_secs == Some(0) {
        return Err(ConfigError::Validation(
            "crawl_timeout_secs must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates the warehouse destination
fn validate_warehouse_config(config: &WarehouseConfig) -> Result<(), ConfigError> {
    validate_identifier("dataset_id", &config.dataset_id)?;
    validate_identifier("table_id", &config.table_id)?;

    match config.backend {
        WarehouseBackend::Bigquery => {
            let project_id = config.project_id.as_deref().unwrap_or("");
            if project_id.is_empty() {
                return Err(ConfigError::Validation(
                    "project_id is required for the bigquery backend".to_string(),
                ));
            }

            if !project_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | ':' | '.'))
            {
                return Err(ConfigError::Validation(format!(
                    "project_id '{}' contains invalid characters",
                    project_id
                )));
            }

            if let Some(endpoint) = &config.endpoint {
                Url::parse(endpoint).map_err(|e| {
                    ConfigError::InvalidUrl(format!("Invalid endpoint '{}': {}", endpoint, e))
                })?;
            }

            if config.access_token_env.is_empty() {
                return Err(ConfigError::Validation(
                    "access_token_env cannot be empty".to_string(),
                ));
            }
        }
        WarehouseBackend::Sqlite => {
            if config.database_path.as_deref().unwrap_or("").is_empty() {
                return Err(ConfigError::Validation(
                    "database_path is required for the sqlite backend".to_string(),
                ));
            }
        }
    }

    Ok(())
}

/// Dataset and table ids: letters, digits and underscores, at most 1024 chars
fn validate_identifier(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() || value.len() > 1024 {
        return Err(ConfigError::Validation(format!(
            "{} must be between 1 and 1024 characters",
            field
        )));
    }

    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ConfigError::Validation(format!(
            "{} '{}' may only contain letters, digits and underscores",
            field, value
        )));
    }

    Ok(())
}
