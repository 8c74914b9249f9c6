//! Crawl contexts: one unit of pending work each
//!
//! Every context of a crawl run shares one `CrawlState` holding the pending
//! task counter, the page/item counters and the error list. Creating a
//! context acquires a task slot; releasing (or dropping) it gives the slot
//! back exactly once. The executor treats a counter of zero as "no context
//! is queued or in flight", which is only sound because of that pairing.

use crate::crawler::strategy::Crawler;
use crate::output::PageError;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Counters and error list shared by every context of one crawl run
#[derive(Debug, Default)]
pub struct CrawlState {
    pending_tasks: AtomicUsize,
    pages_visited: AtomicU64,
    items_crawled: AtomicU64,
    errors: Mutex<Vec<PageError>>,
}

impl CrawlState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Contexts created but not yet released
    pub fn pending_tasks(&self) -> usize {
        self.pending_tasks.load(Ordering::SeqCst)
    }

    pub fn pages_visited(&self) -> u64 {
        self.pages_visited.load(Ordering::SeqCst)
    }

    pub fn items_crawled(&self) -> u64 {
        self.items_crawled.load(Ordering::SeqCst)
    }

    /// Snapshot of the errors recorded so far, in recording order
    pub fn errors(&self) -> Vec<PageError> {
        self.lock_errors().clone()
    }

    pub fn error_count(&self) -> usize {
        self.lock_errors().len()
    }

    pub fn record_error(&self, error: PageError) {
        tracing::warn!("Page error on {}: {}", error.page_url, error.cause);
        self.lock_errors().push(error);
    }

    pub(crate) fn increment_pages_visited(&self) -> u64 {
        self.pages_visited.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn increment_items_crawled(&self) -> u64 {
        self.items_crawled.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn acquire(&self) {
        self.pending_tasks.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self) {
        let previous = self.pending_tasks.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(previous > 0, "pending task counter underflow");
    }

    // A panic while holding the lock cannot leave a half-pushed error behind
    fn lock_errors(&self) -> MutexGuard<'_, Vec<PageError>> {
        self.errors.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One page to fetch, the strategy to parse it with, and the shared run state
///
/// Contexts are never cloned or edited: following a link builds a new
/// context with [`CrawlContext::follow`].
pub struct CrawlContext {
    host: Arc<str>,
    crawler: Arc<dyn Crawler>,
    document_url: String,
    state: Arc<CrawlState>,
    released: bool,
}

impl CrawlContext {
    /// Creates the first context of a crawl run, with fresh shared state
    pub fn seed(
        host: impl Into<Arc<str>>,
        crawler: Arc<dyn Crawler>,
        document_url: impl Into<String>,
    ) -> Self {
        Self::with_state(host, crawler, document_url, CrawlState::new())
    }

    /// Creates a context attached to an existing run state
    pub fn with_state(
        host: impl Into<Arc<str>>,
        crawler: Arc<dyn Crawler>,
        document_url: impl Into<String>,
        state: Arc<CrawlState>,
    ) -> Self {
        state.acquire();
        Self {
            host: host.into(),
            crawler,
            document_url: document_url.into(),
            state,
            released: false,
        }
    }

    /// Derives the context for a follow-up page
    ///
    /// The child shares this context's host and run state; only the strategy
    /// and URL differ. Its task slot is acquired here, before the parent can
    /// be released.
    pub fn follow(&self, crawler: Arc<dyn Crawler>, document_url: impl Into<String>) -> Self {
        Self::with_state(
            Arc::clone(&self.host),
            crawler,
            document_url,
            Arc::clone(&self.state),
        )
    }

    /// Gives this context's task slot back; calling it again has no effect
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.state.release();
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Scheme and authority of the seed URL
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn crawler(&self) -> &Arc<dyn Crawler> {
        &self.crawler
    }

    pub fn document_url(&self) -> &str {
        &self.document_url
    }

    /// Run state shared with every other context of this crawl
    pub fn state(&self) -> &Arc<CrawlState> {
        &self.state
    }

    pub fn pending_tasks(&self) -> usize {
        self.state.pending_tasks()
    }

    pub fn pages_visited(&self) -> u64 {
        self.state.pages_visited()
    }

    pub fn items_crawled(&self) -> u64 {
        self.state.items_crawled()
    }

    pub fn errors(&self) -> Vec<PageError> {
        self.state.errors()
    }

    pub fn record_error(&self, error: PageError) {
        self.state.record_error(error);
    }
}

impl Drop for CrawlContext {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for CrawlContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrawlContext")
            .field("host", &self.host)
            .field("crawler", &self.crawler.name())
            .field("document_url", &self.document_url)
            .field("released", &self.released)
            .finish()
    }
}
