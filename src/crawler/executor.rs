//! Crawl executor - worker pool, work queue and termination detection
//!
//! The executor owns one crawl run from seed to result:
//! - Resolving the crawl host from the seed URL
//! - Spawning a fixed pool of workers over a shared, unbounded work queue
//! - Waiting until the shared pending-task counter returns to zero
//! - Closing sinks and the queue, then reporting a `CrawlResult`

use crate::config::ExecutorConfig;
use crate::crawler::context::CrawlContext;
use crate::crawler::fetcher::HttpClient;
use crate::crawler::sinks::SinkRegistry;
use crate::crawler::strategy::Crawler;
use crate::crawler::worker::{run_worker, Dispatcher};
use crate::output::CrawlResult;
use crate::url::crawl_host;
use crate::SkraperError;
use chrono::Utc;
use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

/// Runs crawls with a fixed number of concurrent workers
///
/// # Example
///
/// ```no_run
/// use skraper::config::{HttpConfig, UserAgentConfig};
/// use skraper::crawler::{CrawlerExecutor, ReqwestHttpClient, SelectorCrawler};
/// use std::sync::Arc;
/// use tokio::sync::mpsc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// # let user_agent = UserAgentConfig {
/// #     crawler_name: "Skraper".to_string(),
/// #     crawler_version: "0.1".to_string(),
/// #     contact_url: "https://example.com/about".to_string(),
/// # };
/// let http = ReqwestHttpClient::from_config(&user_agent, &HttpConfig::default())?;
/// let executor = CrawlerExecutor::new(4, Arc::new(http));
///
/// let (items_tx, mut items_rx) = mpsc::channel::<String>(64);
/// executor.register_sink(items_tx);
/// tokio::spawn(async move {
///     while let Some(item) = items_rx.recv().await {
///         println!("{}", item);
///     }
/// });
///
/// let crawler = SelectorCrawler::new("div.item", Some("a.next"))?;
/// let result = executor.start("https://example.com/list", Arc::new(crawler)).await?;
/// println!("{} items, {} errors", result.items_crawled, result.errors.len());
/// # Ok(())
/// # }
/// ```
pub struct CrawlerExecutor {
    concurrency: usize,
    poll_interval: Duration,
    http: Arc<dyn HttpClient>,
    sinks: Arc<SinkRegistry>,
}

impl CrawlerExecutor {
    pub const DEFAULT_CONCURRENCY: usize = 10;
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
    pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

    /// Creates an executor running `concurrency` workers that fetch through `http`
    ///
    /// # Arguments
    ///
    /// * `concurrency` - Number of worker tasks; zero is rejected by [`start`](Self::start)
    /// * `http` - Client every worker fetches pages through
    pub fn new(concurrency: usize, http: Arc<dyn HttpClient>) -> Self {
        Self {
            concurrency,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            http,
            sinks: Arc::new(SinkRegistry::new()),
        }
    }

    pub fn from_config(config: &ExecutorConfig, http: Arc<dyn HttpClient>) -> Self {
        Self::new(config.concurrency, http).with_poll_interval(config.poll_interval())
    }

    /// Sets how often the pending-task counter is checked for completion
    ///
    /// Intervals below [`MIN_POLL_INTERVAL`](Self::MIN_POLL_INTERVAL),
    /// including zero, are raised to it.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Self::MIN_POLL_INTERVAL);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Routes every item of type `T` to `sender`
    ///
    /// Call before [`start`](Self::start). Registering another sender for the
    /// same type replaces the previous one; this is not an error. The sender
    /// is dropped when the crawl ends, closing the channel.
    pub fn register_sink<T: Any + Send>(&self, sender: mpsc::Sender<T>) {
        self.sinks.register(sender);
    }

    pub fn sinks(&self) -> &SinkRegistry {
        &self.sinks
    }

    /// Crawls from `seed_url` with `crawler` until no work remains
    ///
    /// Page failures do not fail the crawl; they are collected in
    /// [`CrawlResult::errors`].
    ///
    /// # Arguments
    ///
    /// * `seed_url` - Absolute HTTP(S) URL of the first page; its scheme and
    ///   authority become the host relative follow-ups are resolved against
    /// * `crawler` - Strategy for the seed page
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlResult)` - The crawl ran to completion, possibly with page errors
    /// * `Err(SkraperError)` - The crawl could not be set up: zero concurrency,
    ///   an invalid seed URL, or a work queue closed before the seed was sent
    pub async fn start(
        &self,
        seed_url: &str,
        crawler: Arc<dyn Crawler>,
    ) -> Result<CrawlResult, SkraperError> {
        if self.concurrency == 0 {
            return Err(SkraperError::ZeroConcurrency);
        }

        let host = crawl_host(seed_url)?;
        let started_at = Utc::now();
        let clock = Instant::now();

        tracing::info!(
            "Starting crawl of {} (host {}) with {} workers",
            seed_url,
            host,
            self.concurrency
        );

        let (queue_tx, queue_rx) = mpsc::unbounded_channel::<CrawlContext>();
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let dispatcher = Arc::new(Dispatcher::new(queue_tx.clone(), Arc::clone(&self.sinks)));

        let mut workers = JoinSet::new();
        for id in 0..self.concurrency {
            workers.spawn(run_worker(
                id,
                Arc::clone(&queue_rx),
                Arc::clone(&self.http),
                Arc::clone(&dispatcher),
            ));
        }

        // The seed acquires its task slot on creation, before the first poll
        let seed = CrawlContext::seed(host, crawler, seed_url);
        let state = Arc::clone(seed.state());
        queue_tx
            .send(seed)
            .map_err(|_| SkraperError::QueueClosed)?;

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let pending = state.pending_tasks();
            tracing::trace!(
                "Pending tasks: {}, pages visited: {}, items crawled: {}",
                pending,
                state.pages_visited(),
                state.items_crawled()
            );
            if pending == 0 {
                break;
            }
        }

        let closed = self.sinks.close_all();
        tracing::debug!("Closed {} sinks", closed);

        // Every worker is idle on the queue once the counter is zero
        drop(dispatcher);
        drop(queue_tx);
        workers.shutdown().await;

        let result = CrawlResult {
            pages_visited: state.pages_visited(),
            items_crawled: state.items_crawled(),
            errors: state.errors(),
            started_at,
            finished_at: Utc::now(),
            elapsed: clock.elapsed(),
        };

        tracing::info!(
            "Crawling ended in {:?}: {} pages visited, {} items crawled, {} errors",
            result.elapsed,
            result.pages_visited,
            result.items_crawled,
            result.errors.len()
        );

        Ok(result)
    }
}

impl std::fmt::Debug for CrawlerExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrawlerExecutor")
            .field("concurrency", &self.concurrency)
            .field("poll_interval", &self.poll_interval)
            .field("sinks", &self.sinks)
            .finish_non_exhaustive()
    }
}
