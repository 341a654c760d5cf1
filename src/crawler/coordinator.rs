//! Pipeline coordinator - main crawl orchestration logic
//!
//! This module contains the run loop that ties the pipeline together:
//! - Provisioning the warehouse before anything is fetched
//! - Feeding admitted URLs to the fetcher under a concurrency limit
//! - Mapping every completed fetch and handing the record to the sink
//! - Admitting discovered links
//! - Draining outstanding writes and reporting the summary
//!
//! All bookkeeping happens on the task that calls `run`. Fetches and writes
//! run in spawned tasks and report back through two `JoinSet`s, so counters
//! and the queue are never touched concurrently.

use crate::config::Config;
use crate::crawler::fetcher::{FetchError, FetchedPage, HttpFetcher, PageFetcher};
use crate::crawler::frontier::{CrawlRequest, FrontierController};
use crate::crawler::scheduler::{QueuedRequest, ScheduledFetch, Scheduler};
use crate::output::CrawlSummary;
use crate::record::ResultMapper;
use crate::sink::{open_warehouse, Sink, SinkResult, TableRef, Warehouse};
use crate::state::PipelineState;
use crate::url::{normalize_url, ScopeRule, UrlScope};
use crate::IngestError;
use std::future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, trace, warn};

/// Result of one spawned fetch
struct FetchOutcome {
    request: QueuedRequest,
    result: Result<FetchedPage, FetchError>,
}

/// Result of one spawned write
struct WriteOutcome {
    url: String,
    result: SinkResult<()>,
}

/// Something the run loop has to react to
enum Event {
    Fetched(Result<FetchOutcome, JoinError>),
    Written(Result<WriteOutcome, JoinError>),
    DeadlineElapsed,
}

/// Main pipeline coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    frontier: FrontierController,
    mapper: ResultMapper,
    sink: Sink,
    fetcher: Arc<dyn PageFetcher>,
    seed: QueuedRequest,
    state: PipelineState,
}

impl Coordinator {
    /// Creates a coordinator in the `Idle` state
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration
    /// * `fetcher` - Page fetch capability
    /// * `warehouse` - Backend the sink writes to
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to run
    /// * `Err(IngestError)` - The scope domain or start URL is unusable
    pub fn new(
        config: Config,
        fetcher: Arc<dyn PageFetcher>,
        warehouse: Arc<dyn Warehouse>,
    ) -> Result<Self, IngestError> {
        let scope = ScopeRule::new(&config.domain, config.base_path.as_deref())?;
        let frontier = FrontierController::new(scope.clone(), config.skip_external);
        let mapper = ResultMapper::new(scope).with_cookies_only(config.cookies_only);

        let (seed_url, seed_decision) = frontier.admit_seed(&config.start_url)?;
        let seed = QueuedRequest {
            url: seed_url,
            decision: seed_decision,
            referrer: None,
        };

        let table = TableRef::new(
            config.warehouse.dataset_id.clone(),
            config.warehouse.table_id.clone(),
        );

        Ok(Self {
            config: Arc::new(config),
            frontier,
            mapper,
            sink: Sink::new(warehouse, table),
            fetcher,
            seed,
            state: PipelineState::Idle,
        })
    }

    /// Creates a coordinator with the HTTP fetcher and the configured warehouse
    pub fn from_config(config: Config) -> Result<Self, IngestError> {
        let fetcher = Arc::new(HttpFetcher::from_config(&config.fetcher)?);
        let warehouse = open_warehouse(&config.warehouse, reqwest::Client::new())?;
        Self::new(config, fetcher, warehouse)
    }

    /// Current lifecycle state
    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn transition(&mut self, next: PipelineState) -> Result<(), IngestError> {
        if !self.state.can_transition_to(next) {
            return Err(IngestError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        debug!("Pipeline {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }

    /// Runs the pipeline to completion
    ///
    /// Provisions the warehouse, crawls until nothing is queued or in
    /// flight (or the deadline passes), then waits for every write.
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlSummary)` - The run reached `Done`
    /// * `Err(IngestError)` - Provisioning failed (state is `Failed`) or the
    ///   coordinator was not `Idle`
    pub async fn run(&mut self) -> Result<CrawlSummary, IngestError> {
        let started = Instant::now();

        self.transition(PipelineState::Provisioning)?;
        if let Err(e) = self.sink.ensure_schema().await {
            error!("Provisioning failed: {}", e);
            self.transition(PipelineState::Failed)?;
            return Err(e.into());
        }

        self.transition(PipelineState::Running)?;
        let mut summary = CrawlSummary::new();
        let mut writes: JoinSet<WriteOutcome> = JoinSet::new();
        self.crawl(&mut summary, &mut writes).await;

        self.transition(PipelineState::Draining)?;
        if !writes.is_empty() {
            info!("Waiting for {} outstanding writes", writes.len());
        }
        while let Some(joined) = writes.join_next().await {
            Self::handle_write(joined, &mut summary);
        }

        summary.elapsed = started.elapsed();
        self.transition(PipelineState::Done)?;

        info!(
            "Crawl completed: {} pages written in {:?}",
            summary.pages_crawled, summary.elapsed
        );

        Ok(summary)
    }

    /// The `Running` phase
    async fn crawl(&self, summary: &mut CrawlSummary, writes: &mut JoinSet<WriteOutcome>) {
        info!("Starting crawl from {}", self.seed.url);

        let mut scheduler = Scheduler::new(self.config.fetcher.max_concurrent_pages as usize);
        let mut fetches: JoinSet<FetchOutcome> = JoinSet::new();
        scheduler.enqueue(self.seed.clone());

        let crawl_timeout = self.config.fetcher.crawl_timeout_secs;
        let deadline = async move {
            match crawl_timeout {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        loop {
            while let Some(scheduled) = scheduler.next_ready() {
                self.spawn_fetch(&mut fetches, scheduled);
            }

            if fetches.is_empty() && scheduler.is_empty() {
                info!("Frontier is empty, crawl complete");
                break;
            }

            let event = tokio::select! {
                Some(joined) = fetches.join_next() => Event::Fetched(joined),
                Some(joined) = writes.join_next(), if !writes.is_empty() => Event::Written(joined),
                _ = &mut deadline => Event::DeadlineElapsed,
            };

            match event {
                Event::Fetched(joined) => {
                    self.handle_fetch(joined, &mut scheduler, summary, writes, true);

                    if summary.pages_fetched > 0 && summary.pages_fetched % 10 == 0 {
                        info!(
                            "Progress: {} pages fetched, {} queued, {} in flight",
                            summary.pages_fetched,
                            scheduler.pending_len(),
                            fetches.len()
                        );
                    }
                }
                Event::Written(joined) => Self::handle_write(joined, summary),
                Event::DeadlineElapsed => {
                    summary.deadline_exceeded = true;
                    let abandoned = scheduler.abandon();
                    warn!(
                        "Crawl deadline elapsed; aborting {} in-flight fetches and abandoning {} queued URLs",
                        fetches.len(),
                        abandoned
                    );

                    // Results that were already complete are still written
                    fetches.abort_all();
                    while let Some(joined) = fetches.join_next().await {
                        self.handle_fetch(joined, &mut scheduler, summary, writes, false);
                    }
                    break;
                }
            }
        }
    }

    fn spawn_fetch(&self, fetches: &mut JoinSet<FetchOutcome>, scheduled: ScheduledFetch) {
        let fetcher = Arc::clone(&self.fetcher);
        let ScheduledFetch { request, permit } = scheduled;

        fetches.spawn(async move {
            let result = fetcher
                .fetch(&request.url, request.referrer.as_deref())
                .await;
            drop(permit);
            FetchOutcome { request, result }
        });
    }

    /// Handles one completed fetch task
    ///
    /// Discovered links are admitted only when `expand` is set and the page's
    /// decision allows expansion.
    fn handle_fetch(
        &self,
        joined: Result<FetchOutcome, JoinError>,
        scheduler: &mut Scheduler,
        summary: &mut CrawlSummary,
        writes: &mut JoinSet<WriteOutcome>,
        expand: bool,
    ) {
        let FetchOutcome { request, result } = match joined {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => return,
            Err(e) => {
                error!("Fetch task failed: {}", e);
                summary.fetch_failures += 1;
                return;
            }
        };

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                warn!(url = %request.url, error = %e, "Fetch failed");
                summary.fetch_failures += 1;
                return;
            }
        };

        summary.pages_fetched += 1;
        info!("Crawled {}", page.result.final_url);

        // A redirect target is not requested again later
        if page.result.final_url != request.url.as_str() {
            if let Ok(final_url) = normalize_url(&page.result.final_url) {
                scheduler.mark_seen(final_url.as_str());
            }
        }

        if expand && request.decision.expands() {
            // Scope follows the page that was actually served
            if self.lands_in_scope(&page.result.final_url) {
                self.admit_links(&request, &page.links, scheduler, summary);
            } else {
                debug!(
                    "Not expanding {}: redirected out of scope to {}",
                    request.url, page.result.final_url
                );
            }
        }

        match self.mapper.map(&page.result) {
            Ok(record) => {
                let sink = self.sink.clone();
                writes.spawn(async move {
                    let result = sink.write(&record).await;
                    WriteOutcome {
                        url: record.requested_url,
                        result,
                    }
                });
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Could not map fetch result");
                summary.mapping_failures += 1;
            }
        }
    }

    fn lands_in_scope(&self, final_url: &str) -> bool {
        matches!(
            self.frontier.scope().classify_str(final_url),
            Ok((_, UrlScope::Internal))
        )
    }

    fn admit_links(
        &self,
        parent: &QueuedRequest,
        links: &[String],
        scheduler: &mut Scheduler,
        summary: &mut CrawlSummary,
    ) {
        let depth = match parent.decision.remaining_depth() {
            Some(depth) => depth,
            None => return,
        };

        for link in links {
            let candidate = CrawlRequest::discovered(link.as_str(), depth, parent.url.as_str());
            match self.frontier.evaluate(&candidate) {
                Ok((url, decision)) if decision.is_admitted() => {
                    scheduler.enqueue(QueuedRequest {
                        url,
                        decision,
                        referrer: candidate.referrer,
                    });
                }
                Ok(_) => {
                    trace!("Skipping {} (out of scope)", link);
                    summary.urls_skipped += 1;
                }
                Err(e) => {
                    trace!("Skipping {}: {}", link, e);
                    summary.urls_skipped += 1;
                }
            }
        }
    }

    fn handle_write(joined: Result<WriteOutcome, JoinError>, summary: &mut CrawlSummary) {
        match joined {
            Ok(WriteOutcome { result: Ok(()), .. }) => summary.pages_crawled += 1,
            Ok(WriteOutcome {
                url,
                result: Err(e),
            }) => {
                warn!(url = %url, error = %e, "Write failed");
                summary.write_failures += 1;
            }
            Err(e) => {
                error!("Write task failed: {}", e);
                summary.write_failures += 1;
            }
        }
    }
}

/// Runs a complete pipeline from configuration
///
/// # Arguments
///
/// * `config` - Validated configuration
///
/// # Returns
///
/// * `Ok(CrawlSummary)` - Totals for the finished run
/// * `Err(IngestError)` - Setup or provisioning failed
pub async fn run_crawl(config: Config) -> Result<CrawlSummary, IngestError> {
    let mut coordinator = Coordinator::from_config(config)?;
    coordinator.run().await
}
