//! Run statistics
//!
//! The coordinator owns one `CrawlSummary` and updates it from its single
//! event loop; once the run is done the summary is immutable.

use std::time::Duration;

/// Totals for one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    /// Records durably written to the warehouse
    pub pages_crawled: u64,

    /// Fetches that returned a page (any HTTP status)
    pub pages_fetched: u64,

    /// Fetches that failed at the transport level
    pub fetch_failures: u64,

    /// Fetched pages whose record could not be built
    pub mapping_failures: u64,

    /// Records the warehouse did not acknowledge
    pub write_failures: u64,

    /// Discovered URLs rejected by admission
    pub urls_skipped: u64,

    /// Whether the crawl deadline cut the run short
    pub deadline_exceeded: bool,

    /// Wall-clock time from provisioning to the last write
    pub elapsed: Duration,
}

impl CrawlSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total per-page failures of any kind
    pub fn total_failures(&self) -> u64 {
        self.fetch_failures + self.mapping_failures + self.write_failures
    }

    /// Every fetched page was mapped and written
    pub fn is_clean(&self) -> bool {
        self.total_failures() == 0 && !self.deadline_exceeded
    }
}

/// Prints the summary to stdout
///
/// # Arguments
///
/// * `summary` - The finished run's totals
pub fn print_summary(summary: &CrawlSummary) {
    println!("Crawl took {} milliseconds.", summary.elapsed.as_millis());
    println!("Crawled {} files.", summary.pages_crawled);

    if summary.is_clean() && summary.urls_skipped == 0 {
        return;
    }

    println!();
    println!("  Pages fetched:    {}", summary.pages_fetched);
    println!("  URLs skipped:     {}", summary.urls_skipped);
    println!("  Fetch failures:   {}", summary.fetch_failures);
    println!("  Mapping failures: {}", summary.mapping_failures);
    println!("  Write failures:   {}", summary.write_failures);

    if summary.deadline_exceeded {
        println!("  Stopped early: crawl deadline elapsed");
    }
}
