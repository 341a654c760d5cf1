//! URL handling module for Crawl-Ingest
//!
//! This module provides URL normalization, domain extraction, host matching
//! and the origin-exact scope rule shared by the frontier and the record
//! mapper.

mod domain;
mod matcher;
mod normalize;
mod scope;

pub use domain::{extract_domain, strip_www};
pub use matcher::matches_host;
pub use normalize::normalize_url;
pub use scope::{ScopeRule, UrlScope};
