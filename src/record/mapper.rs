//! Projection of fetch results into ingestion records

use crate::record::types::{
    format_instant, Cookie, CookieRecord, FetchResult, IngestionRecord, PageDetails,
    SameSitePolicy, StorageEntry,
};
use crate::url::{normalize_url, ScopeRule};
use crate::UrlError;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::trace;

/// Errors raised while mapping a single fetch result
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("Final URL '{url}' is not usable: {source}")]
    FinalUrl {
        url: String,
        #[source]
        source: UrlError,
    },

    #[error("Cookie '{name}' on {url} has an unrepresentable expiry ({expires})")]
    CookieExpiry {
        url: String,
        name: String,
        expires: f64,
    },
}

impl MappingError {
    /// The requested or final URL the failure relates to
    pub fn url(&self) -> &str {
        match self {
            Self::FinalUrl { url, .. } => url,
            Self::CookieExpiry { url, .. } => url,
        }
    }
}

/// Pure transformation from `FetchResult` to `IngestionRecord`
///
/// The external flag uses the same `ScopeRule` the frontier admits with, so a
/// page is redacted exactly when it would have been treated as off-origin.
#[derive(Debug, Clone)]
pub struct ResultMapper {
    scope: ScopeRule,
    cookies_only: bool,
}

impl ResultMapper {
    pub fn new(scope: ScopeRule) -> Self {
        Self {
            scope,
            cookies_only: false,
        }
    }

    /// Leaves page-level fields out of every record
    pub fn with_cookies_only(mut self, cookies_only: bool) -> Self {
        self.cookies_only = cookies_only;
        self
    }

    pub fn scope(&self) -> &ScopeRule {
        &self.scope
    }

    /// Maps one fetch result
    ///
    /// # Arguments
    ///
    /// * `result` - The captured page data
    ///
    /// # Returns
    ///
    /// * `Ok(IngestionRecord)` - Record ready for the sink; cookies and local
    ///   storage are empty when the final URL is out of scope
    /// * `Err(MappingError)` - The final URL is unusable or a cookie expiry
    ///   cannot be represented
    pub fn map(&self, result: &FetchResult) -> Result<IngestionRecord, MappingError> {
        let final_url =
            normalize_url(&result.final_url).map_err(|source| MappingError::FinalUrl {
                url: result.final_url.clone(),
                source,
            })?;
        let external = self.scope.is_external(&final_url);

        let (cookies, local_storage) = if external {
            trace!(url = %result.requested_url, "Redacting off-origin page");
            (Vec::new(), Vec::new())
        } else {
            let cookies = result
                .cookies
                .iter()
                .map(|cookie| map_cookie(&result.requested_url, cookie))
                .collect::<Result<Vec<_>, _>>()?;
            let local_storage = result
                .local_storage
                .iter()
                .map(|(name, value)| StorageEntry {
                    name: name.clone(),
                    value: value.clone(),
                })
                .collect();
            (cookies, local_storage)
        };

        let page = if self.cookies_only {
            None
        } else {
            Some(PageDetails {
                final_url: result.final_url.clone(),
                http_status: result.http_status,
                content_type: result.content_type.clone(),
                previous_url: result.previous_url.clone(),
                document_title: result.page_title.clone(),
                meta_description: result.meta_description.clone(),
            })
        };

        Ok(IngestionRecord {
            requested_url: result.requested_url.clone(),
            external,
            cookies,
            local_storage,
            page,
        })
    }
}

fn map_cookie(url: &str, cookie: &Cookie) -> Result<CookieRecord, MappingError> {
    let expires_at =
        epoch_seconds_to_instant(cookie.expires).ok_or_else(|| MappingError::CookieExpiry {
            url: url.to_string(),
            name: cookie.name.clone(),
            expires: cookie.expires,
        })?;

    trace!(cookie = %cookie.name, expires = %format_instant(&expires_at), "Mapped cookie");

    Ok(CookieRecord {
        name: cookie.name.clone(),
        value: cookie.value.clone(),
        domain: cookie.domain.clone(),
        path: cookie.path.clone(),
        expires_at,
        size: cookie.size,
        http_only: cookie.http_only,
        secure: cookie.secure,
        session: cookie.session,
        same_site: cookie.same_site.unwrap_or(SameSitePolicy::Unspecified),
    })
}

/// Converts Unix-epoch seconds to an instant, keeping millisecond precision
///
/// Returns `None` for non-finite values and values outside chrono's range.
pub fn epoch_seconds_to_instant(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let millis = (seconds * 1000.0).round();
    if millis < i64::MIN as f64 || millis > i64::MAX as f64 {
        return None;
    }
    DateTime::from_timestamp_millis(millis as i64)
}
