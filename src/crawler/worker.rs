//! Per-context processing run by every executor worker
//!
//! A worker takes one context off the work queue and:
//! 1. Fetches its URL (async, on the runtime)
//! 2. Parses the page and drives the strategy's outcomes (on the blocking
//!    pool, where the parsed tree lives and sink sends may block)
//! 3. Releases the context once every outcome has been acted on
//!
//! Failures at any step are recorded against the page and never escape the
//! worker.

use crate::crawler::context::CrawlContext;
use crate::crawler::fetcher::{HttpClient, HttpResponse, TransportError};
use crate::crawler::parser::Document;
use crate::crawler::sinks::SinkRegistry;
use crate::crawler::strategy::ParseOutcome;
use crate::output::{CrawlFailure, PageError};
use crate::url::resolve_follow_up;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

pub(crate) type WorkSender = mpsc::UnboundedSender<CrawlContext>;
pub(crate) type WorkReceiver = mpsc::UnboundedReceiver<CrawlContext>;

/// Acts on strategy outcomes: enqueues follow-ups and dispatches items
pub(crate) struct Dispatcher {
    queue: WorkSender,
    sinks: Arc<SinkRegistry>,
}

impl Dispatcher {
    pub(crate) fn new(queue: WorkSender, sinks: Arc<SinkRegistry>) -> Self {
        Self { queue, sinks }
    }

    /// Runs a fetched page through its strategy
    pub(crate) fn handle_response(&self, ctx: &CrawlContext, response: HttpResponse) {
        match response {
            HttpResponse::Success { body, .. } => self.handle_document(ctx, &body),
            failure => self.handle_failure(ctx, &failure),
        }
    }

    fn handle_document(&self, ctx: &CrawlContext, body: &str) {
        let document = Document::parse(ctx.document_url(), body);
        let crawler = Arc::clone(ctx.crawler());

        for outcome in crawler.parse(&document, ctx) {
            match outcome {
                Ok(outcome) => self.process_or_record(outcome, ctx),
                Err(e) => ctx.record_error(PageError::new(
                    ctx.document_url(),
                    CrawlFailure::Strategy(format!("{:#}", e)),
                )),
            }
        }
    }

    fn handle_failure(&self, ctx: &CrawlContext, response: &HttpResponse) {
        let cause = response
            .cause()
            .cloned()
            .unwrap_or_else(|| TransportError::Request("unknown transport failure".to_string()));
        ctx.record_error(PageError::new(
            ctx.document_url(),
            CrawlFailure::Transport(cause),
        ));

        let outcome = ctx.crawler().on_error(ctx.document_url(), response);
        self.process_or_record(outcome, ctx);
    }

    /// The fetch never produced a response: the client task panicked or was
    /// cancelled. Recorded as is, then offered to `on_error` like any other
    /// failed fetch.
    pub(crate) fn handle_fetch_failure(&self, ctx: &CrawlContext, failure: CrawlFailure) {
        let response = HttpResponse::Failure {
            status: None,
            body: String::new(),
            headers: Default::default(),
            cause: TransportError::Request(failure.to_string()),
        };
        ctx.record_error(PageError::new(ctx.document_url(), failure));

        let outcome = ctx.crawler().on_error(ctx.document_url(), &response);
        self.process_or_record(outcome, ctx);
    }

    fn process_or_record(&self, outcome: ParseOutcome, ctx: &CrawlContext) {
        if let Err(failure) = self.process(outcome, ctx) {
            ctx.record_error(PageError::new(ctx.document_url(), failure));
        }
    }

    /// Applies one outcome on behalf of `ctx`
    ///
    /// Follow-up contexts are enqueued here, while `ctx` still holds its
    /// task slot, so the pending counter cannot touch zero in between.
    pub(crate) fn process(&self, outcome: ParseOutcome, ctx: &CrawlContext) -> Result<(), CrawlFailure> {
        match outcome {
            ParseOutcome::NextPage { url, crawler } => {
                ctx.state().increment_pages_visited();

                let next_url = resolve_follow_up(ctx.host(), &url).map_err(|e| {
                    CrawlFailure::FollowUp {
                        url: url.clone(),
                        reason: e.to_string(),
                    }
                })?;
                tracing::debug!("Next URL -> {} ({})", next_url, crawler.name());

                let next = ctx.follow(crawler, next_url);
                self.queue.send(next).map_err(|_| CrawlFailure::FollowUp {
                    url,
                    reason: "work queue is closed".to_string(),
                })
            }
            ParseOutcome::Item(item) => {
                ctx.state().increment_items_crawled();
                tracing::debug!("Item from {} -> {}", ctx.document_url(), item.type_name());
                self.sinks.dispatch(item).map(|_| ())
            }
            ParseOutcome::NoOp => Ok(()),
        }
    }
}

/// Worker loop: take a context, process it, release it, repeat
pub(crate) async fn run_worker(
    id: usize,
    queue: Arc<Mutex<WorkReceiver>>,
    http: Arc<dyn HttpClient>,
    dispatcher: Arc<Dispatcher>,
) {
    tracing::trace!("Worker {} started", id);

    loop {
        let next = {
            let mut receiver = queue.lock().await;
            receiver.recv().await
        };

        let Some(ctx) = next else {
            break;
        };

        process_context(ctx, &http, &dispatcher).await;
    }

    tracing::trace!("Worker {} stopped", id);
}

/// Processes one context from fetch to release
///
/// Everything that runs strategy code (parsing, `on_error`, even `name`)
/// happens inside the panic guard, so a misbehaving strategy costs one page
/// and never the worker.
pub(crate) async fn process_context(
    mut ctx: CrawlContext,
    http: &Arc<dyn HttpClient>,
    dispatcher: &Arc<Dispatcher>,
) {
    tracing::debug!("Fetching page {}", ctx.document_url());

    let fetched = fetch_page(http, ctx.document_url()).await;

    let dispatcher = Arc::clone(dispatcher);
    let handle = tokio::task::spawn_blocking(move || {
        let processed = panic::catch_unwind(AssertUnwindSafe(|| {
            tracing::debug!(
                "Crawling page {} with {}",
                ctx.document_url(),
                ctx.crawler().name()
            );
            match fetched {
                Ok(response) => dispatcher.handle_response(&ctx, response),
                Err(failure) => dispatcher.handle_fetch_failure(&ctx, failure),
            }
        }));

        if let Err(payload) = processed {
            ctx.record_error(PageError::new(
                ctx.document_url(),
                CrawlFailure::Panicked(panic_message(payload.as_ref())),
            ));
        }

        ctx.release();
    });

    if let Err(e) = handle.await {
        tracing::error!("Page processing task did not complete: {}", e);
    }
}

/// Fetches in a separate task so a misbehaving client cannot take the worker down
async fn fetch_page(http: &Arc<dyn HttpClient>, url: &str) -> Result<HttpResponse, CrawlFailure> {
    let http = Arc::clone(http);
    let url = url.to_string();

    tokio::spawn(async move { http.get(&url).await })
        .await
        .map_err(|e| {
            if e.is_panic() {
                CrawlFailure::Panicked(format!(
                    "HTTP client panicked: {}",
                    panic_message(e.into_panic().as_ref())
                ))
            } else {
                CrawlFailure::Transport(TransportError::Request(e.to_string()))
            }
        })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
