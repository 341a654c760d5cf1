//! Crawl queue and concurrency limiting
//!
//! This module handles:
//! - FIFO queue of admitted URLs
//! - De-duplication of requested and redirect-target URLs
//! - Global concurrency limiting via a semaphore

use crate::crawler::frontier::Decision;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use url::Url;

/// An admitted URL waiting to be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedRequest {
    /// The normalized URL to fetch
    pub url: Url,

    /// The admission decision for this URL
    pub decision: Decision,

    /// Page on which the URL was found
    pub referrer: Option<String>,
}

/// A queued request together with its concurrency permit
///
/// The permit is released when this value (or the task owning it) drops.
pub struct ScheduledFetch {
    pub request: QueuedRequest,
    pub permit: OwnedSemaphorePermit,
}

/// Scheduler owns the pending queue and the fetch permits
///
/// It is driven by a single task and never blocks: `next_ready` returns
/// `None` both when the queue is empty and when every permit is taken.
pub struct Scheduler {
    /// Global semaphore for limiting concurrent fetches
    semaphore: Arc<Semaphore>,

    /// URLs admitted but not yet started
    pending: VecDeque<QueuedRequest>,

    /// Every URL ever enqueued or reached through a redirect
    seen: HashSet<String>,
}

impl Scheduler {
    /// Creates a new scheduler
    ///
    /// # Arguments
    ///
    /// * `max_concurrent` - Upper bound on fetches in flight
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            pending: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    /// Adds a request unless its URL was seen before
    ///
    /// # Returns
    ///
    /// * `true` - The request was queued
    /// * `false` - A request for the same URL was already queued or fetched
    pub fn enqueue(&mut self, request: QueuedRequest) -> bool {
        if !self.seen.insert(request.url.as_str().to_string()) {
            tracing::trace!("Already seen: {}", request.url);
            return false;
        }
        self.pending.push_back(request);
        true
    }

    /// Records a URL as seen without queueing it
    ///
    /// Used for redirect targets so they are not requested a second time.
    pub fn mark_seen(&mut self, url: &str) -> bool {
        self.seen.insert(url.to_string())
    }

    pub fn is_seen(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    /// Takes the next request if one is queued and a permit is free
    pub fn next_ready(&mut self) -> Option<ScheduledFetch> {
        if self.pending.is_empty() {
            return None;
        }

        let permit = self.semaphore.clone().try_acquire_owned().ok()?;
        let request = self.pending.pop_front()?;

        tracing::debug!("Scheduling {}", request.url);
        Some(ScheduledFetch { request, permit })
    }

    /// Drops every queued request, returning how many were abandoned
    pub fn abandon(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    /// Returns the number of queued requests
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of permits currently free
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}
