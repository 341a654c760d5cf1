//! Admission control for discovered URLs
//!
//! The frontier controller is a pure predicate: given a request it decides
//! whether to fetch it and how much traversal budget the fetched page gets.
//! It holds no queue; the scheduler owns bookkeeping.

use crate::url::{ScopeRule, UrlScope};
use crate::UrlError;
use std::fmt;
use tracing::trace;
use url::Url;

/// Remaining traversal budget, counted in pages
///
/// `Limited(1)` means "this page only". `Limited(0)` behaves the same way:
/// a page with no budget left is never expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Depth {
    /// No limit; only ever given to the seed and its in-scope descendants
    Unbounded,
    Limited(u32),
}

impl Depth {
    /// Returns true if a page with this budget may have its links followed
    pub fn can_expand(&self) -> bool {
        match self {
            Self::Unbounded => true,
            Self::Limited(n) => *n > 1,
        }
    }

    /// The budget one hop further down
    pub fn descend(&self) -> Depth {
        match self {
            Self::Unbounded => Self::Unbounded,
            Self::Limited(n) => Self::Limited(n.saturating_sub(1)),
        }
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbounded => write!(f, "unbounded"),
            Self::Limited(n) => write!(f, "{}", n),
        }
    }
}

/// A URL presented for admission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlRequest {
    /// Raw URL as discovered
    pub url: String,

    /// Budget inherited from the page that linked here
    pub remaining_depth: Depth,

    /// Page on which the URL was found
    pub referrer: Option<String>,
}

impl CrawlRequest {
    /// The start URL, with an unbounded budget
    pub fn seed(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            remaining_depth: Depth::Unbounded,
            referrer: None,
        }
    }

    /// A link found on `referrer`, carrying the budget granted to that page
    pub fn discovered(url: impl Into<String>, depth: Depth, referrer: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            remaining_depth: depth,
            referrer: Some(referrer.into()),
        }
    }
}

/// Outcome of admission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Do not fetch
    Skip,

    /// Fetch, but do not follow the page's links
    FetchOnly,

    /// Fetch and follow links; children inherit `remaining_depth`
    FetchAndExpand { remaining_depth: Depth },
}

impl Decision {
    /// Budget granted to the fetched page, `None` when skipped
    pub fn remaining_depth(&self) -> Option<Depth> {
        match self {
            Self::Skip => None,
            Self::FetchOnly => Some(Depth::Limited(1)),
            Self::FetchAndExpand { remaining_depth } => Some(*remaining_depth),
        }
    }

    pub fn is_admitted(&self) -> bool {
        !matches!(self, Self::Skip)
    }

    pub fn expands(&self) -> bool {
        matches!(self, Self::FetchAndExpand { .. })
    }
}

/// Decides per discovered URL whether and how deep to crawl it
#[derive(Debug, Clone)]
pub struct FrontierController {
    scope: ScopeRule,
    skip_external: bool,
}

impl FrontierController {
    pub fn new(scope: ScopeRule, skip_external: bool) -> Self {
        Self {
            scope,
            skip_external,
        }
    }

    pub fn scope(&self) -> &ScopeRule {
        &self.scope
    }

    /// Admission decision for a request
    ///
    /// Malformed URLs are `Skip`; this never fails.
    pub fn admit(&self, request: &CrawlRequest) -> Decision {
        match self.evaluate(request) {
            Ok((_, decision)) => decision,
            Err(e) => {
                trace!(url = %request.url, error = %e, "Skipping malformed URL");
                Decision::Skip
            }
        }
    }

    /// Like `admit`, but also returns the normalized URL to fetch
    ///
    /// # Arguments
    ///
    /// * `request` - The URL and the budget it inherits
    ///
    /// # Returns
    ///
    /// * `Ok((Url, Decision))` - The normalized URL and its decision
    /// * `Err(UrlError)` - The URL is unparsable, non-HTTP(S) or has no host
    pub fn evaluate(&self, request: &CrawlRequest) -> Result<(Url, Decision), UrlError> {
        let (url, scope) = self.scope.classify_str(&request.url)?;

        let decision = match scope {
            UrlScope::Internal => {
                if request.remaining_depth.can_expand() {
                    Decision::FetchAndExpand {
                        remaining_depth: request.remaining_depth.descend(),
                    }
                } else {
                    Decision::FetchOnly
                }
            }
            UrlScope::External if self.skip_external => Decision::Skip,
            UrlScope::External => Decision::FetchOnly,
        };

        trace!(url = %url, depth = %request.remaining_depth, ?decision, "Admission");
        Ok((url, decision))
    }

    /// Admits the start URL
    ///
    /// The seed is always fetched: an out-of-scope seed that skip-external
    /// would reject is fetched without expansion instead.
    pub fn admit_seed(&self, url: &str) -> Result<(Url, Decision), UrlError> {
        let (url, decision) = self.evaluate(&CrawlRequest::seed(url))?;
        let decision = match decision {
            Decision::Skip => Decision::FetchOnly,
            other => other,
        };
        Ok((url, decision))
    }
}
