//! Output module for reporting run results
//!
//! This module handles:
//! - The `CrawlSummary` counters kept by the coordinator
//! - Printing the summary when the binary finishes

pub mod stats;

pub use stats::{print_summary, CrawlSummary};
