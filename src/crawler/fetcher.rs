//! Page fetch adapter
//!
//! This module defines the capability the coordinator fetches through and
//! the HTTP implementation of it:
//! - Building HTTP clients from the fetcher configuration
//! - GET requests following redirects hop by hop up to a limit
//! - `Set-Cookie` capture on every hop and HTML field extraction
//! - Error classification

use crate::config::FetcherConfig;
use crate::crawler::cookies::{applies_to, parse_set_cookie, store_cookie};
use crate::crawler::parser::parse_html;
use crate::record::{Cookie, FetchResult};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{CONTENT_TYPE, COOKIE, LOCATION, REFERER, SET_COOKIE};
use reqwest::{redirect::Policy, Client, Response};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors for a single fetch
///
/// Only transport-level failures are errors; any HTTP status, including
/// 4xx and 5xx, is a successful fetch with that status recorded.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Could not connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Fetch of {url} failed: {message}")]
    Other { url: String, message: String },
}

impl FetchError {
    /// Classifies a reqwest error for `url`
    pub fn from_reqwest(url: &str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else if error.is_connect() {
            Self::Connect {
                url: url.to_string(),
                message: error.to_string(),
            }
        } else {
            Self::Http {
                url: url.to_string(),
                source: error,
            }
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Timeout { url }
            | Self::Connect { url, .. }
            | Self::Http { url, .. }
            | Self::Other { url, .. } => url,
        }
    }
}

/// A completed fetch: the captured page data and its outbound links
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub result: FetchResult,
    pub links: Vec<String>,
}

/// Capability to fetch one page
///
/// Implementations must be cheap to share across tasks; the coordinator
/// calls `fetch` concurrently from several spawned tasks.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches `url`, sending `referrer` as the page it was linked from
    async fn fetch(&self, url: &Url, referrer: Option<&str>) -> Result<FetchedPage, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// The client does not follow redirects itself; `HttpFetcher` walks them so
/// it can see the cookies set on each hop.
///
/// # Arguments
///
/// * `config` - The fetcher configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use crawl_ingest::config::FetcherConfig;
/// use crawl_ingest::crawler::build_http_client;
///
/// let client = build_http_client(&FetcherConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &FetcherConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(config.request_timeout_secs.min(10)))
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true)
        .build()
}

/// HTTP implementation of `PageFetcher`
///
/// Runs no scripts, so local storage is always empty.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_redirects: u32,
}

impl HttpFetcher {
    /// Wraps a client built by `build_http_client`
    pub fn new(client: Client) -> Self {
        Self {
            client,
            max_redirects: FetcherConfig::default().max_redirects,
        }
    }

    pub fn from_config(config: &FetcherConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(config)?).with_max_redirects(config.max_redirects))
    }

    pub fn with_max_redirects(mut self, max_redirects: u32) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    /// Sends one GET, with the cookies captured so far that apply to `url`
    async fn get(
        &self,
        url: &Url,
        referrer: Option<&str>,
        cookies: &[Cookie],
    ) -> Result<Response, reqwest::Error> {
        let mut request = self.client.get(url.clone());
        if let Some(referrer) = referrer {
            request = request.header(REFERER, referrer);
        }

        let jar: Vec<String> = cookies
            .iter()
            .filter(|cookie| applies_to(cookie, url))
            .map(|cookie| format!("{}={}", cookie.name, cookie.value))
            .collect();
        if !jar.is_empty() {
            request = request.header(COOKIE, jar.join("; "));
        }

        request.send().await
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, referrer: Option<&str>) -> Result<FetchedPage, FetchError> {
        let mut current = url.clone();
        let mut cookies: Vec<Cookie> = Vec::new();
        let mut hops = 0;

        let response = loop {
            let response = self
                .get(&current, referrer, &cookies)
                .await
                .map_err(|e| FetchError::from_reqwest(url.as_str(), e))?;

            let now = Utc::now();
            for raw in response.headers().get_all(SET_COOKIE) {
                if let Some(cookie) = raw
                    .to_str()
                    .ok()
                    .and_then(|raw| parse_set_cookie(raw, &current, now))
                {
                    store_cookie(&mut cookies, cookie);
                }
            }

            let next = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|location| current.join(location).ok());
            let next = match next {
                Some(next) if response.status().is_redirection() => next,
                _ => break response,
            };

            if hops >= self.max_redirects {
                return Err(FetchError::Other {
                    url: url.to_string(),
                    message: format!("more than {} redirects", self.max_redirects),
                });
            }
            tracing::trace!("Redirect {} -> {}", current, next);
            hops += 1;
            current = next;
        };

        let final_url = current;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let is_html = content_type
            .as_deref()
            .map(|ct| ct.to_ascii_lowercase().contains("html"))
            .unwrap_or(false);

        let parsed = if is_html {
            let body = response
                .text()
                .await
                .map_err(|e| FetchError::from_reqwest(url.as_str(), e))?;
            parse_html(&body, &final_url)
        } else {
            Default::default()
        };

        tracing::debug!(
            "Fetched {} -> {} ({}, {} links)",
            url,
            final_url,
            status.as_u16(),
            parsed.links.len()
        );

        let mut result = FetchResult::new(url.as_str(), final_url.as_str());
        result.http_status = status.as_u16();
        result.content_type = content_type;
        result.cookies = cookies;
        result.page_title = parsed.title;
        result.meta_description = parsed.meta_description;
        result.previous_url = referrer.map(str::to_string);

        Ok(FetchedPage {
            result,
            links: parsed.links,
        })
    }
}
