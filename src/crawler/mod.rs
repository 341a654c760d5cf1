//! Crawler module for admission, fetching and pipeline coordination
//!
//! This module contains the core crawling logic, including:
//! - Origin-scoped admission of discovered URLs
//! - Request queueing and concurrency limiting
//! - The page fetch capability and its HTTP implementation
//! - HTML and `Set-Cookie` extraction
//! - Overall pipeline coordination

mod cookies;
mod coordinator;
mod fetcher;
mod frontier;
mod parser;
mod scheduler;

pub use cookies::{parse_set_cookie, SESSION_EXPIRY};
pub use coordinator::{run_crawl, Coordinator};
pub use fetcher::{build_http_client, FetchError, FetchedPage, HttpFetcher, PageFetcher};
pub use frontier::{CrawlRequest, Decision, Depth, FrontierController};
pub use parser::{parse_html, ParsedPage};
pub use scheduler::{QueuedRequest, ScheduledFetch, Scheduler};
