//! Raw fetch results and the warehouse-shaped records derived from them

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// Cookie `SameSite` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SameSitePolicy {
    Strict,
    Lax,
    None,
    /// The cookie did not declare a policy
    Unspecified,
}

impl SameSitePolicy {
    /// Parses a `SameSite` attribute value, case-insensitively
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" => Some(Self::Strict),
            "lax" => Some(Self::Lax),
            "none" => Some(Self::None),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
            Self::Unspecified => "Unspecified",
        }
    }
}

/// A cookie as captured by the fetch layer
#[derive(Debug, Clone, PartialEq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// Expiry as Unix-epoch seconds; -1 for session cookies
    pub expires: f64,
    pub size: u64,
    pub http_only: bool,
    pub secure: bool,
    pub session: bool,
    pub same_site: Option<SameSitePolicy>,
}

/// Everything the fetch layer captured for one page
///
/// Produced once per completed fetch and never modified afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    /// URL that was requested
    pub requested_url: String,

    /// URL after redirects
    pub final_url: String,

    pub http_status: u16,

    /// `Content-Type` response header
    pub content_type: Option<String>,

    /// Cookies in the order the page set them
    pub cookies: Vec<Cookie>,

    /// Local storage contents (name -> value)
    pub local_storage: BTreeMap<String, String>,

    /// Text of the `<title>` element
    pub page_title: Option<String>,

    /// Content of `<meta name="description">`
    pub meta_description: Option<String>,

    /// Page on which the link to this page was found
    pub previous_url: Option<String>,
}

impl FetchResult {
    /// A bare result for `url` with a 200 status and nothing captured
    pub fn new(requested_url: impl Into<String>, final_url: impl Into<String>) -> Self {
        Self {
            requested_url: requested_url.into(),
            final_url: final_url.into(),
            http_status: 200,
            content_type: None,
            cookies: Vec::new(),
            local_storage: BTreeMap::new(),
            page_title: None,
            meta_description: None,
            previous_url: None,
        }
    }
}

/// A cookie as written to the warehouse
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    #[serde(rename = "expires", serialize_with = "serialize_instant")]
    pub expires_at: DateTime<Utc>,
    pub size: u64,
    pub http_only: bool,
    pub secure: bool,
    pub session: bool,
    pub same_site: SameSitePolicy,
}

/// One local storage entry as written to the warehouse
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageEntry {
    pub name: String,
    pub value: String,
}

/// Page-level fields; absent in cookies-only mode
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageDetails {
    pub final_url: String,
    pub http_status: u16,
    pub content_type: Option<String>,
    pub previous_url: Option<String>,
    pub document_title: Option<String>,
    pub meta_description: Option<String>,
}

/// Canonical warehouse row for one fetched page
///
/// `cookies` and `local_storage` are always empty when `external` is true.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestionRecord {
    pub requested_url: String,
    pub external: bool,
    pub cookies: Vec<CookieRecord>,
    pub local_storage: Vec<StorageEntry>,
    #[serde(flatten)]
    pub page: Option<PageDetails>,
}

impl IngestionRecord {
    pub fn is_external(&self) -> bool {
        self.external
    }
}

/// Formats an instant as ISO-8601 with millisecond precision and a `Z` suffix
///
/// ```
/// use chrono::DateTime;
/// use crawl_ingest::record::format_instant;
///
/// let instant = DateTime::from_timestamp(1591696664, 0).unwrap();
/// assert_eq!(format_instant(&instant), "2020-06-09T09:57:44.000Z");
/// ```
pub fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn serialize_instant<S: Serializer>(
    instant: &DateTime<Utc>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_instant(instant))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_same_site_parse() {
        assert_eq!(SameSitePolicy::parse("Strict"), Some(SameSitePolicy::Strict));
        assert_eq!(SameSitePolicy::parse(" lax "), Some(SameSitePolicy::Lax));
        assert_eq!(SameSitePolicy::parse("NONE"), Some(SameSitePolicy::None));
        assert_eq!(SameSitePolicy::parse("sometimes"), None);
    }

    #[test]
    fn test_record_serializes_flat() {
        let record = IngestionRecord {
            requested_url: "https://example.com/".to_string(),
            external: false,
            cookies: vec![CookieRecord {
                name: "sid".to_string(),
                value: "abc".to_string(),
                domain: "example.com".to_string(),
                path: "/".to_string(),
                expires_at: DateTime::from_timestamp(0, 0).unwrap(),
                size: 6,
                http_only: true,
                secure: false,
                session: false,
                same_site: SameSitePolicy::Unspecified,
            }],
            local_storage: vec![StorageEntry {
                name: "theme".to_string(),
                value: "dark".to_string(),
            }],
            page: Some(PageDetails {
                final_url: "https://example.com/".to_string(),
                http_status: 200,
                content_type: Some("text/html".to_string()),
                previous_url: None,
                document_title: Some("Home".to_string()),
                meta_description: None,
            }),
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({
                "requested_url": "https://example.com/",
                "external": false,
                "cookies": [{
                    "name": "sid",
                    "value": "abc",
                    "domain": "example.com",
                    "path": "/",
                    "expires": "1970-01-01T00:00:00.000Z",
                    "size": 6,
                    "httpOnly": true,
                    "secure": false,
                    "session": false,
                    "sameSite": "Unspecified"
                }],
                "local_storage": [{"name": "theme", "value": "dark"}],
                "final_url": "https://example.com/",
                "http_status": 200,
                "content_type": "text/html",
                "previous_url": null,
                "document_title": "Home",
                "meta_description": null
            })
        );
    }

    #[test]
    fn test_cookies_only_record_omits_page_fields() {
        let record = IngestionRecord {
            requested_url: "https://example.com/".to_string(),
            external: false,
            cookies: vec![],
            local_storage: vec![],
            page: None,
        };

        let value = serde_json::to_value(&record).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 4);
        assert!(!object.contains_key("final_url"));
    }
}
