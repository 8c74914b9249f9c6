//! End-to-end executor scenarios against an in-memory HTTP client

use async_trait::async_trait;
use skraper::crawler::{
    CrawlContext, CrawlState, Crawler, CrawlerExecutor, Document, HttpClient, HttpResponse,
    Outcomes, ParseOutcome, SelectorCrawler, TransportError,
};
use skraper::output::CrawlFailure;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

const ITEM_LIST: &str = include_str!("../fixtures/test_1.html");
const EMPTY_LIST: &str = include_str!("../fixtures/empty_list.html");

/// Serves canned responses; unknown URLs answer 404
#[derive(Default)]
struct StubHttp {
    pages: HashMap<String, HttpResponse>,
    /// Number of leading requests per URL answered with 503
    failures_first: HashMap<String, usize>,
    delay: Option<Duration>,
    hits: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StubHttp {
    fn new() -> Self {
        Self::default()
    }

    fn page(mut self, url: &str, body: &str) -> Self {
        self.pages
            .insert(url.to_string(), HttpResponse::success(200, body));
        self
    }

    fn response(mut self, url: &str, response: HttpResponse) -> Self {
        self.pages.insert(url.to_string(), response);
        self
    }

    fn flaky(mut self, url: &str, failures: usize) -> Self {
        self.failures_first.insert(url.to_string(), failures);
        self
    }

    fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn hits(&self, url: &str) -> usize {
        self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl HttpClient for StubHttp {
    async fn get_with_params(&self, url: &str, _params: &[(String, String)]) -> HttpResponse {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let hit = {
            let mut hits = self.hits.lock().unwrap();
            let count = hits.entry(url.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let response = match self.failures_first.get(url) {
            Some(&failures) if hit <= failures => HttpResponse::failure(503, "busy"),
            _ => self
                .pages
                .get(url)
                .cloned()
                .unwrap_or_else(|| HttpResponse::failure(404, "not found")),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }
}

fn executor(concurrency: usize, http: Arc<StubHttp>) -> CrawlerExecutor {
    CrawlerExecutor::new(concurrency, http).with_poll_interval(Duration::from_millis(10))
}

fn drain<T>(rx: &mut mpsc::Receiver<T>) -> Vec<T> {
    let mut items = Vec::new();
    while let Ok(item) = rx.try_recv() {
        items.push(item);
    }
    items
}

/// Seed page links to `/page2`; `/page2` yields its items
struct TwoStep {
    items: SelectorCrawler,
}

impl Crawler for TwoStep {
    fn name(&self) -> &str {
        "two-step"
    }

    fn parse<'a>(&'a self, document: &'a Document, context: &'a CrawlContext) -> Outcomes<'a> {
        if document.url().ends_with("/page2") {
            return self.items.parse(document, context);
        }
        Box::new(std::iter::once(Ok::<_, anyhow::Error>(ParseOutcome::follow(
            "/page2", context,
        ))))
    }
}

/// Yields a scripted sequence of outcomes for every page
struct Scripted {
    script: fn(&Document) -> Vec<anyhow::Result<ParseOutcome>>,
}

impl Crawler for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn parse<'a>(&'a self, document: &'a Document, _context: &'a CrawlContext) -> Outcomes<'a> {
        Box::new((self.script)(document).into_iter())
    }
}

/// Yields one item, then panics while producing the next
#[derive(Default)]
struct PanicsMidway {
    state: Mutex<Option<Arc<CrawlState>>>,
}

impl Crawler for PanicsMidway {
    fn name(&self) -> &str {
        "panics-midway"
    }

    fn parse<'a>(&'a self, _document: &'a Document, context: &'a CrawlContext) -> Outcomes<'a> {
        *self.state.lock().unwrap() = Some(Arc::clone(context.state()));
        let mut step = 0;
        Box::new(std::iter::from_fn(move || {
            step += 1;
            match step {
                1 => Some(Ok::<_, anyhow::Error>(ParseOutcome::item(
                    "before".to_string(),
                ))),
                _ => panic!("strategy blew up"),
            }
        }))
    }
}

/// Retries a failed fetch once, parsing the retried page with `inner`
struct RetryOnce {
    inner: Arc<dyn Crawler>,
}

impl Crawler for RetryOnce {
    fn name(&self) -> &str {
        "retry-once"
    }

    fn parse<'a>(&'a self, document: &'a Document, context: &'a CrawlContext) -> Outcomes<'a> {
        self.inner.parse(document, context)
    }

    fn on_error(&self, url: &str, _response: &HttpResponse) -> ParseOutcome {
        ParseOutcome::next_page(url, Arc::clone(&self.inner))
    }
}

/// Remembers the run state it sees so tests can inspect it afterwards
struct StateRecorder {
    state: Mutex<Option<Arc<CrawlState>>>,
}

impl Crawler for StateRecorder {
    fn name(&self) -> &str {
        "state-recorder"
    }

    fn parse<'a>(&'a self, _document: &'a Document, context: &'a CrawlContext) -> Outcomes<'a> {
        *self.state.lock().unwrap() = Some(Arc::clone(context.state()));
        Box::new(std::iter::empty())
    }
}

#[tokio::test]
async fn test_single_page_items_reach_sink() {
    let http = Arc::new(StubHttp::new().page("http://test.com", ITEM_LIST));
    let executor = executor(2, http);
    let (tx, mut rx) = mpsc::channel::<String>(16);
    executor.register_sink(tx);

    let crawler = SelectorCrawler::new("div.item", None).unwrap();
    let result = executor
        .start("http://test.com", Arc::new(crawler))
        .await
        .unwrap();

    assert_eq!(result.pages_visited, 0);
    assert_eq!(result.items_crawled, 4);
    assert!(result.errors.is_empty());
    assert_eq!(
        drain(&mut rx),
        vec!["First item", "Second item", "Third item", "Fourth item"]
    );
}

#[tokio::test]
async fn test_follow_relative_link() {
    let http = Arc::new(
        StubHttp::new()
            .page("http://test.com", EMPTY_LIST)
            .page("http://test.com/page2", "<div class=\"item\">a</div><div class=\"item\">b</div>"),
    );
    let executor = executor(2, http.clone());
    let (tx, mut rx) = mpsc::channel::<String>(16);
    executor.register_sink(tx);

    let crawler = TwoStep {
        items: SelectorCrawler::new("div.item", None).unwrap(),
    };
    let result = executor
        .start("http://test.com", Arc::new(crawler))
        .await
        .unwrap();

    assert_eq!(result.pages_visited, 1);
    assert_eq!(result.items_crawled, 2);
    assert!(result.is_complete());
    assert_eq!(http.hits("http://test.com/page2"), 1);
    assert_eq!(drain(&mut rx), vec!["a", "b"]);
}

/// Follows `/page2` first, then yields the page's items; stops on a page without items
struct NextThenItems;

impl Crawler for NextThenItems {
    fn name(&self) -> &str {
        "next-then-items"
    }

    fn parse<'a>(&'a self, document: &'a Document, context: &'a CrawlContext) -> Outcomes<'a> {
        let texts = document.select_text("div.item").unwrap_or_default();
        if texts.is_empty() {
            return Box::new(std::iter::empty());
        }
        let next = Ok::<_, anyhow::Error>(ParseOutcome::follow("/page2", context));
        Box::new(
            std::iter::once(next).chain(texts.into_iter().map(|t| Ok(ParseOutcome::item(t)))),
        )
    }
}

#[tokio::test]
async fn test_next_page_before_items_terminates() {
    let http = Arc::new(
        StubHttp::new()
            .page(
                "http://test.com",
                r#"<div class="item">first</div><div class="item">second</div>"#,
            )
            .page("http://test.com/page2", EMPTY_LIST),
    );
    let executor = executor(2, http.clone());

    let result = executor
        .start("http://test.com", Arc::new(NextThenItems))
        .await
        .unwrap();

    assert_eq!(result.items_crawled, 2);
    assert_eq!(result.pages_visited, 1);
    assert!(result.errors.is_empty());
    assert_eq!(http.hits("http://test.com/page2"), 1);
}

#[tokio::test]
async fn test_host_relative_links_are_fetched_as_written() {
    let http = Arc::new(
        StubHttp::new()
            .page("http://test.com", "<p>index</p>")
            .page("http://test.com/a/../b", "<p>b</p>")
            .page("http://test.com/s?q=a b", "<p>search</p>"),
    );
    let executor = executor(2, http.clone());

    let crawler = Scripted {
        script: |document| {
            if document.url() != "http://test.com" {
                return Vec::new();
            }
            vec![
                Ok(ParseOutcome::next_page("/a/../b", Arc::new(Scripted { script: |_| Vec::new() }))),
                Ok(ParseOutcome::next_page("/s?q=a b", Arc::new(Scripted { script: |_| Vec::new() }))),
            ]
        },
    };
    let result = executor
        .start("http://test.com", Arc::new(crawler))
        .await
        .unwrap();

    assert_eq!(result.pages_visited, 2);
    assert!(result.is_complete());
    assert_eq!(http.hits("http://test.com/a/../b"), 1);
    assert_eq!(http.hits("http://test.com/s?q=a b"), 1);
    assert_eq!(http.hits("http://test.com/b"), 0);
}

#[tokio::test]
async fn test_pagination_with_selector_crawler() {
    let http = Arc::new(
        StubHttp::new()
            .page(
                "http://test.com/list",
                r#"<div class="item">one</div><a class="next" href="/list?page=2">next</a>"#,
            )
            .page(
                "http://test.com/list?page=2",
                r#"<div class="item">two</div><a class="next" href="http://test.com/list?page=3">next</a>"#,
            )
            .page("http://test.com/list?page=3", r#"<div class="item">three</div>"#),
    );
    let executor = executor(3, http);
    let (tx, mut rx) = mpsc::channel::<String>(16);
    executor.register_sink(tx);

    let crawler = SelectorCrawler::new("div.item", Some("a.next")).unwrap();
    let result = executor
        .start("http://test.com/list", Arc::new(crawler))
        .await
        .unwrap();

    assert_eq!(result.pages_visited, 2);
    assert_eq!(result.items_crawled, 3);
    assert!(result.is_complete());
    assert_eq!(drain(&mut rx), vec!["one", "two", "three"]);
}

#[tokio::test]
async fn test_seed_transport_failure() {
    let http = Arc::new(StubHttp::new().response("http://test.com", HttpResponse::failure(500, "")));
    let executor = executor(2, http);

    let crawler = SelectorCrawler::new("div.item", None).unwrap();
    let result = executor
        .start("http://test.com", Arc::new(crawler))
        .await
        .unwrap();

    assert_eq!(result.pages_visited, 0);
    assert_eq!(result.items_crawled, 0);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].page_url, "http://test.com");
    assert_eq!(
        result.errors[0].cause,
        CrawlFailure::Transport(TransportError::Status(500))
    );
    assert!(!result.is_partial());
}

#[tokio::test]
async fn test_items_without_sink_are_counted() {
    let http = Arc::new(StubHttp::new().page("http://test.com", ITEM_LIST));
    let executor = executor(2, http);

    let crawler = SelectorCrawler::new("div.item", None).unwrap();
    let result = executor
        .start("http://test.com", Arc::new(crawler))
        .await
        .unwrap();

    assert_eq!(result.items_crawled, 4);
    assert!(result.errors.is_empty());
}

#[tokio::test]
async fn test_items_route_by_runtime_type() {
    let http = Arc::new(StubHttp::new().page("http://test.com", ITEM_LIST));
    let executor = executor(2, http);
    let (text_tx, mut text_rx) = mpsc::channel::<String>(16);
    let (count_tx, mut count_rx) = mpsc::channel::<usize>(16);
    executor.register_sink(text_tx);
    executor.register_sink(count_tx);

    let crawler = Scripted {
        script: |document| {
            let texts = document.select_text("div.item").unwrap_or_default();
            let count = texts.len();
            texts
                .into_iter()
                .map(|t| Ok(ParseOutcome::item(t)))
                .chain(std::iter::once(Ok(ParseOutcome::item(count))))
                .chain(std::iter::once(Ok(ParseOutcome::item(1.5f64))))
                .collect()
        },
    };
    let result = executor
        .start("http://test.com", Arc::new(crawler))
        .await
        .unwrap();

    assert_eq!(result.items_crawled, 6);
    assert!(result.errors.is_empty());
    assert_eq!(drain(&mut text_rx).len(), 4);
    assert_eq!(drain(&mut count_rx), vec![4]);
}

#[tokio::test]
async fn test_newest_sink_registration_wins() {
    let http = Arc::new(StubHttp::new().page("http://test.com", ITEM_LIST));
    let executor = executor(1, http);
    let (old_tx, mut old_rx) = mpsc::channel::<String>(16);
    let (new_tx, mut new_rx) = mpsc::channel::<String>(16);
    executor.register_sink(old_tx);
    executor.register_sink(new_tx);

    let crawler = SelectorCrawler::new("div.item", None).unwrap();
    executor
        .start("http://test.com", Arc::new(crawler))
        .await
        .unwrap();

    assert_eq!(old_rx.recv().await, None);
    assert_eq!(drain(&mut new_rx).len(), 4);
}

#[tokio::test]
async fn test_sinks_closed_when_start_returns() {
    let http = Arc::new(StubHttp::new().page("http://test.com", ITEM_LIST));
    let executor = executor(2, http);
    let (tx, mut rx) = mpsc::channel::<String>(16);
    executor.register_sink(tx);

    let crawler = SelectorCrawler::new("div.item", None).unwrap();
    executor
        .start("http://test.com", Arc::new(crawler))
        .await
        .unwrap();

    let mut received = 0;
    while rx.recv().await.is_some() {
        received += 1;
    }
    assert_eq!(received, 4);
    assert!(executor.sinks().is_empty());
}

#[tokio::test]
async fn test_slow_sink_applies_backpressure() {
    let http = Arc::new(StubHttp::new().page("http://test.com", ITEM_LIST));
    let executor = executor(2, http);
    let (tx, mut rx) = mpsc::channel::<String>(1);
    executor.register_sink(tx);

    let consumer = tokio::spawn(async move {
        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
            items.push(item);
        }
        items
    });

    let crawler = SelectorCrawler::new("div.item", None).unwrap();
    let result = executor
        .start("http://test.com", Arc::new(crawler))
        .await
        .unwrap();

    assert!(result.is_complete());
    assert_eq!(consumer.await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_closed_sink_is_recorded() {
    let http = Arc::new(StubHttp::new().page("http://test.com", ITEM_LIST));
    let executor = executor(2, http);
    let (tx, rx) = mpsc::channel::<String>(16);
    executor.register_sink(tx);
    drop(rx);

    let crawler = SelectorCrawler::new("div.item", None).unwrap();
    let result = executor
        .start("http://test.com", Arc::new(crawler))
        .await
        .unwrap();

    assert_eq!(result.items_crawled, 4);
    assert_eq!(result.errors.len(), 4);
    assert!(result
        .errors
        .iter()
        .all(|e| matches!(e.cause, CrawlFailure::Sink { .. })));
}

#[tokio::test]
async fn test_strategy_error_does_not_stop_page() {
    let http = Arc::new(StubHttp::new().page("http://test.com", ITEM_LIST));
    let executor = executor(2, http);

    let crawler = Scripted {
        script: |_| {
            vec![
                Err(anyhow::anyhow!("price missing")),
                Ok(ParseOutcome::item("kept".to_string())),
                Ok(ParseOutcome::NoOp),
            ]
        },
    };
    let result = executor
        .start("http://test.com", Arc::new(crawler))
        .await
        .unwrap();

    assert_eq!(result.items_crawled, 1);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(
        result.errors[0].cause,
        CrawlFailure::Strategy("price missing".to_string())
    );
    assert!(result.is_partial());
}

#[tokio::test]
async fn test_invalid_follow_up_is_recorded() {
    let http = Arc::new(StubHttp::new().page("http://test.com", ITEM_LIST));
    let executor = executor(2, http);

    let crawler = Scripted {
        script: |_| vec![Ok(ParseOutcome::item("kept".to_string()))],
    };
    let crawler: Arc<dyn Crawler> = Arc::new(crawler);
    let follow_empty = Scripted {
        script: |_| Vec::new(),
    };
    let follow_empty: Arc<dyn Crawler> = Arc::new(follow_empty);

    struct BadLink {
        next: Arc<dyn Crawler>,
        inner: Arc<dyn Crawler>,
    }

    impl Crawler for BadLink {
        fn name(&self) -> &str {
            "bad-link"
        }

        fn parse<'a>(&'a self, document: &'a Document, context: &'a CrawlContext) -> Outcomes<'a> {
            let bad = Ok::<_, anyhow::Error>(ParseOutcome::next_page("", Arc::clone(&self.next)));
            Box::new(std::iter::once(bad).chain(self.inner.parse(document, context)))
        }
    }

    let result = executor
        .start(
            "http://test.com",
            Arc::new(BadLink {
                next: follow_empty,
                inner: crawler,
            }),
        )
        .await
        .unwrap();

    assert_eq!(result.pages_visited, 1);
    assert_eq!(result.items_crawled, 1);
    assert_eq!(result.errors.len(), 1);
    assert!(matches!(result.errors[0].cause, CrawlFailure::FollowUp { .. }));
}

#[tokio::test]
async fn test_panicking_strategy_is_isolated() {
    let http = Arc::new(StubHttp::new().page("http://test.com", ITEM_LIST));
    let executor = executor(2, http);
    let (tx, mut rx) = mpsc::channel::<String>(16);
    executor.register_sink(tx);

    let strategy = Arc::new(PanicsMidway::default());
    let result = executor
        .start("http://test.com", strategy.clone())
        .await
        .unwrap();

    assert_eq!(result.items_crawled, 1);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(
        result.errors[0].cause,
        CrawlFailure::Panicked("strategy blew up".to_string())
    );
    assert_eq!(drain(&mut rx), vec!["before"]);

    let state = strategy.state.lock().unwrap().clone().unwrap();
    assert_eq!(state.pending_tasks(), 0);
}

#[tokio::test]
async fn test_on_error_retry() {
    let http = Arc::new(
        StubHttp::new()
            .page("http://test.com/list", ITEM_LIST)
            .flaky("http://test.com/list", 1),
    );
    let executor = executor(2, http.clone());

    let crawler = RetryOnce {
        inner: Arc::new(SelectorCrawler::new("div.item", None).unwrap()),
    };
    let result = executor
        .start("http://test.com/list", Arc::new(crawler))
        .await
        .unwrap();

    assert_eq!(http.hits("http://test.com/list"), 2);
    assert_eq!(result.pages_visited, 1);
    assert_eq!(result.items_crawled, 4);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(
        result.errors[0].cause,
        CrawlFailure::Transport(TransportError::Status(503))
    );
}

#[tokio::test]
async fn test_pending_tasks_zero_when_start_returns() {
    let http = Arc::new(StubHttp::new().page("http://test.com", ITEM_LIST));
    let executor = executor(4, http);
    let recorder = Arc::new(StateRecorder {
        state: Mutex::new(None),
    });

    executor
        .start("http://test.com", recorder.clone())
        .await
        .unwrap();

    let state = recorder.state.lock().unwrap().clone().unwrap();
    assert_eq!(state.pending_tasks(), 0);
}

#[tokio::test]
async fn test_fan_out_respects_concurrency() {
    const PAGES: usize = 20;
    let mut stub = StubHttp::new()
        .page("http://test.com", "<p>index</p>")
        .delayed(Duration::from_millis(5));
    for i in 0..PAGES {
        stub = stub.page(&format!("http://test.com/p/{}", i), "<p>leaf</p>");
    }
    let http = Arc::new(stub);
    let executor = executor(4, http.clone());
    let (tx, mut rx) = mpsc::channel::<String>(PAGES * 2);
    executor.register_sink(tx);

    struct FanOut;

    impl Crawler for FanOut {
        fn name(&self) -> &str {
            "fan-out"
        }

        fn parse<'a>(&'a self, document: &'a Document, context: &'a CrawlContext) -> Outcomes<'a> {
            if document.url() == "http://test.com" {
                Box::new((0..PAGES).map(move |i| {
                    Ok::<_, anyhow::Error>(ParseOutcome::follow(format!("/p/{}", i), context))
                }))
            } else {
                Box::new(std::iter::once(Ok::<_, anyhow::Error>(ParseOutcome::item(
                    document.url().to_string(),
                ))))
            }
        }
    }

    let result = executor
        .start("http://test.com", Arc::new(FanOut))
        .await
        .unwrap();

    assert_eq!(result.pages_visited, PAGES as u64);
    assert_eq!(result.items_crawled, PAGES as u64);
    assert!(result.is_complete());
    assert!(http.max_in_flight.load(Ordering::SeqCst) <= 4);

    let mut urls = drain(&mut rx);
    urls.sort();
    urls.dedup();
    assert_eq!(urls.len(), PAGES);
}

#[tokio::test]
async fn test_no_deduplication_of_follow_ups() {
    let http = Arc::new(
        StubHttp::new()
            .page("http://test.com", "<p>index</p>")
            .page("http://test.com/same", "<p>leaf</p>"),
    );
    let executor = executor(2, http.clone());

    let crawler = Scripted {
        script: |document| {
            if document.url() == "http://test.com" {
                Vec::new()
            } else {
                vec![Ok(ParseOutcome::NoOp)]
            }
        },
    };
    let crawler: Arc<dyn Crawler> = Arc::new(crawler);

    struct Twice {
        leaf: Arc<dyn Crawler>,
    }

    impl Crawler for Twice {
        fn name(&self) -> &str {
            "twice"
        }

        fn parse<'a>(&'a self, _document: &'a Document, _context: &'a CrawlContext) -> Outcomes<'a> {
            Box::new(
                (0..2).map(move |_| {
                    Ok::<_, anyhow::Error>(ParseOutcome::next_page("/same", Arc::clone(&self.leaf)))
                }),
            )
        }
    }

    let result = executor
        .start("http://test.com", Arc::new(Twice { leaf: crawler }))
        .await
        .unwrap();

    assert_eq!(result.pages_visited, 2);
    assert_eq!(http.hits("http://test.com/same"), 2);
}
