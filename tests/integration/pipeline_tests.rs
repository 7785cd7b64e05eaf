use futures::future::BoxFuture;
use metascrape::config::{
    BrowserConfig, Config, FetchConfig, InputConfig, OutputConfig, PipelineConfig,
};
use metascrape::crawler::{
    build_http_client, plan, run_pipeline, Coordinator, FetchError, MarkupExtractor,
    PageFetcher, PageRenderer, Record, Scheduler,
};
use metascrape::storage::{CsvStore, FailureLog};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const PAGE: &str = r#"<html><head>
<title>Fallback title</title>
<meta property="og:title" content="Sunset timelapse">
<meta name="adsbytrafficjunkycontext" data-context-tag="nature,sky">
<script>var flashvars = {'video_date_published' : '20230115'};</script>
</head><body>
<span class="votesUp" data-rating="42"></span>
<div class="views"><span class="count">12.3K</span></div>
<div class="categoriesWrapper"><a class="item">Nature</a><a class="item">Timelapse</a></div>
</body></html>"#;

fn ok_page() -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(PAGE)
        .insert_header("content-type", "text/html")
}

/// Serves the test page for every `/v/<number>` path
async fn mount_pages(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/v/\d+$"))
        .respond_with(ok_page())
        .mount(server)
        .await;
}

fn page_urls(server: &MockServer, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("{}/v/{}", server.uri(), i))
        .collect()
}

fn write_input(dir: &Path, urls: &[String]) -> PathBuf {
    let path = dir.join("input.csv");
    let mut text = String::from("id,url\n");
    for (i, url) in urls.iter().enumerate() {
        text.push_str(&format!("{},{}\n", i, url));
    }
    std::fs::write(&path, text).unwrap();
    path
}

/// Creates a test configuration with no pacing and the browser disabled
fn create_test_config(dir: &Path, urls: &[String]) -> Config {
    Config {
        pipeline: PipelineConfig {
            batch_size: 100,
            concurrency: 30,
            pacing_min_ms: 0,
            pacing_max_ms: 0,
            retry_pass: true,
        },
        fetch: FetchConfig {
            max_attempts: 2,
            timeout_secs: 5,
            backoff_base_ms: 1,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64)".to_string(),
        },
        browser: BrowserConfig {
            enabled: false,
            ..BrowserConfig::default()
        },
        input: InputConfig {
            path: write_input(dir, urls),
            delimiter: ",".to_string(),
            url_column: "url".to_string(),
            limit: None,
        },
        output: OutputConfig {
            path: dir.join("output.csv"),
            retry_path: dir.join("output.retry.csv"),
            failure_log: dir.join("failed_urls.log"),
        },
    }
}

fn build_fetcher(config: &Config) -> PageFetcher {
    let client = build_http_client(&config.fetch, config.pipeline.concurrency).unwrap();
    let log = FailureLog::open(&config.output.failure_log).unwrap();
    PageFetcher::new(
        client,
        config.pipeline.concurrency,
        config.fetch.clone(),
        Arc::new(MarkupExtractor::new()),
        Arc::new(log),
    )
}

fn failure_lines(config: &Config) -> Vec<String> {
    std::fs::read_to_string(&config.output.failure_log)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

fn with_views(url: &str) -> Record {
    Record {
        views: Some(1),
        ..Record::empty(url)
    }
}

#[tokio::test]
async fn test_full_run_writes_one_row_per_url() {
    let server = MockServer::start().await;
    mount_pages(&server).await;
    let dir = TempDir::new().unwrap();
    let urls = page_urls(&server, 250);
    let config = create_test_config(dir.path(), &urls);
    let output = config.output.path.clone();

    let summary = run_pipeline(config).await.unwrap();

    assert_eq!(summary.input_urls, 250);
    assert_eq!(summary.work_set, 250);
    assert_eq!(summary.retried, 0);
    assert_eq!(summary.rows, 250);
    assert_eq!(summary.with_metadata, 250);
    assert_eq!(summary.remaining, 0);

    let rows = CsvStore::new(&output).load().unwrap();
    let unique: HashSet<&str> = rows.iter().map(|r| r.url.as_str()).collect();
    assert_eq!(rows.len(), 250);
    assert_eq!(unique.len(), 250);

    let row = &rows[0];
    assert_eq!(row.upload_date.unwrap().to_string(), "2023-01-15");
    assert_eq!(row.votes_up, Some(42));
    assert_eq!(row.views, Some(12_300));
    assert_eq!(row.categories, vec!["Nature", "Timelapse"]);
    assert_eq!(row.tags, vec!["nature", "sky"]);
    assert_eq!(row.title.as_deref(), Some("Sunset timelapse"));
}

#[tokio::test]
async fn test_batches_are_sized_and_sequential() {
    let server = MockServer::start().await;
    mount_pages(&server).await;
    let dir = TempDir::new().unwrap();
    let urls = page_urls(&server, 250);
    let config = create_test_config(dir.path(), &urls);

    let scheduler = Scheduler::new(config.pipeline.clone(), Arc::new(build_fetcher(&config)));
    let mut sink: Vec<Vec<Record>> = Vec::new();
    let report = scheduler.run(&urls, &mut sink).await.unwrap();

    assert_eq!(report.batches, 3);
    assert_eq!(report.records, 250);
    let sizes: Vec<usize> = sink.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![100, 100, 50]);

    // Completion order inside a batch is arbitrary, membership is not.
    for (batch, chunk) in sink.iter().zip(urls.chunks(100)) {
        let got: HashSet<&str> = batch.iter().map(|r| r.url.as_str()).collect();
        let want: HashSet<&str> = chunk.iter().map(String::as_str).collect();
        assert_eq!(got, want);
    }
}

/// Serves the test page slowly and remembers when each request arrived
struct SlowPage {
    delay: Duration,
    arrivals: Arc<Mutex<Vec<Instant>>>,
}

impl Respond for SlowPage {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.arrivals.lock().unwrap().push(Instant::now());
        ok_page().set_delay(self.delay)
    }
}

/// Largest number of arrivals inside any window of length `window`
fn peak_arrivals(arrivals: &[Instant], window: Duration) -> usize {
    let mut sorted = arrivals.to_vec();
    sorted.sort();
    (0..sorted.len())
        .map(|i| {
            sorted[i..]
                .iter()
                .take_while(|t| t.duration_since(sorted[i]) < window)
                .count()
        })
        .max()
        .unwrap_or(0)
}

#[tokio::test]
async fn test_in_flight_requests_never_exceed_concurrency() {
    let delay = Duration::from_millis(200);
    let arrivals = Arc::new(Mutex::new(Vec::new()));
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/v/\d+$"))
        .respond_with(SlowPage {
            delay,
            arrivals: arrivals.clone(),
        })
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let urls = page_urls(&server, 30);
    let mut config = create_test_config(dir.path(), &urls);
    config.pipeline.batch_size = 100;
    config.pipeline.concurrency = 5;

    let scheduler = Scheduler::new(config.pipeline.clone(), Arc::new(build_fetcher(&config)));
    let mut sink: Vec<Vec<Record>> = Vec::new();
    let report = scheduler.run(&urls, &mut sink).await.unwrap();

    assert_eq!(report.batches, 1);
    assert_eq!(report.with_metadata, 30);

    // A request keeps its permit for at least `delay` after it reaches the
    // server, so arrivals closer together than that overlapped in flight.
    let arrivals = arrivals.lock().unwrap();
    assert_eq!(arrivals.len(), 30);
    let peak = peak_arrivals(&arrivals, delay * 3 / 4);
    assert!(peak <= 5, "{} requests in flight at once", peak);
    assert!(peak >= 2, "requests were not concurrent");
}

#[tokio::test]
async fn test_resume_only_fetches_missing_urls() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/v/\d+$"))
        .respond_with(ok_page())
        .expect(150)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let urls = page_urls(&server, 250);
    let config = create_test_config(dir.path(), &urls);

    let done: Vec<Record> = urls[..100].iter().map(|u| with_views(u)).collect();
    CsvStore::new(&config.output.path).append_batch(&done).unwrap();

    let before = plan(&config.output, &urls).unwrap();
    assert_eq!(before.work_set.len(), 150);
    assert_eq!(before.work_set, urls[100..].to_vec());

    let summary = run_pipeline(config.clone()).await.unwrap();
    assert_eq!(summary.work_set, 150);
    assert_eq!(summary.rows, 250);
    assert_eq!(summary.remaining, 0);

    // Rows from the earlier run are kept as they were.
    let rows = CsvStore::new(&config.output.path).load().unwrap();
    assert_eq!(rows[0].views, Some(1));
    assert_eq!(rows[0].title, None);
}

#[tokio::test]
async fn test_second_run_has_nothing_to_do() {
    let server = MockServer::start().await;
    mount_pages(&server).await;
    let dir = TempDir::new().unwrap();
    let urls = page_urls(&server, 20);
    let config = create_test_config(dir.path(), &urls);

    run_pipeline(config.clone()).await.unwrap();
    let requests = server.received_requests().await.unwrap().len();

    let summary = run_pipeline(config).await.unwrap();

    assert_eq!(summary.work_set, 0);
    assert_eq!(summary.rows, 20);
    assert_eq!(server.received_requests().await.unwrap().len(), requests);
}

#[tokio::test]
async fn test_retry_pass_recovers_and_merges() {
    let server = MockServer::start().await;
    mount_pages(&server).await;
    // Fails both main-pass attempts, succeeds on the retry pass.
    Mock::given(method("GET"))
        .and(path("/v/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v/flaky"))
        .respond_with(ok_page())
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let flaky = format!("{}/v/flaky", server.uri());
    let mut urls = page_urls(&server, 5);
    urls.push(flaky.clone());
    let config = create_test_config(dir.path(), &urls);

    let summary = run_pipeline(config.clone()).await.unwrap();

    assert_eq!(summary.retried, 1);
    assert_eq!(summary.rows, 6);
    assert_eq!(summary.with_metadata, 6);
    assert_eq!(summary.remaining, 0);
    assert!(!config.output.retry_path.exists());

    let rows = CsvStore::new(&config.output.path).load().unwrap();
    let flaky_rows: Vec<&Record> = rows.iter().filter(|r| r.url == flaky).collect();
    assert_eq!(flaky_rows.len(), 1);
    assert_eq!(flaky_rows[0].votes_up, Some(42));

    assert_eq!(
        failure_lines(&config),
        vec![format!("{} | HttpStatus: HTTP 500", flaky)]
    );
}

#[tokio::test]
async fn test_permanent_failure_is_logged_and_kept_once() {
    let server = MockServer::start().await;
    mount_pages(&server).await;
    Mock::given(method("GET"))
        .and(path("/v/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let gone = format!("{}/v/gone", server.uri());
    let mut urls = page_urls(&server, 3);
    urls.push(gone.clone());
    let config = create_test_config(dir.path(), &urls);

    let summary = run_pipeline(config.clone()).await.unwrap();

    assert_eq!(summary.retried, 1);
    assert_eq!(summary.rows, 4);
    assert_eq!(summary.with_metadata, 3);
    assert_eq!(summary.without_metadata(), 1);
    assert_eq!(summary.remaining, 1);

    // One line per terminal failure: the main pass and the retry pass.
    let expected = format!("{} | HttpStatus: HTTP 404", gone);
    assert_eq!(failure_lines(&config), vec![expected.clone(), expected]);

    let rows = CsvStore::new(&config.output.path).load().unwrap();
    let gone_rows: Vec<&Record> = rows.iter().filter(|r| r.url == gone).collect();
    assert_eq!(gone_rows.len(), 1);
    assert!(!gone_rows[0].has_metadata());

    // The next run picks the failed URL up again.
    let next = plan(&config.output, &urls).unwrap();
    assert_eq!(next.work_set, vec![gone.clone()]);
    assert_eq!(next.failed, vec![gone]);
}

#[tokio::test]
async fn test_no_retry_pass_leaves_failures_pending() {
    let server = MockServer::start().await;
    mount_pages(&server).await;
    Mock::given(method("GET"))
        .and(path("/v/broken"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut urls = page_urls(&server, 2);
    urls.push(format!("{}/v/broken", server.uri()));
    let mut config = create_test_config(dir.path(), &urls);
    config.pipeline.retry_pass = false;

    let summary = run_pipeline(config.clone()).await.unwrap();

    assert_eq!(summary.retried, 0);
    assert_eq!(summary.remaining, 1);
    assert_eq!(failure_lines(&config).len(), 1);
    assert!(!config.output.retry_path.exists());
}

#[tokio::test]
async fn test_rerun_compacts_rows_of_refetched_urls() {
    let server = MockServer::start().await;
    mount_pages(&server).await;
    let dir = TempDir::new().unwrap();
    let urls = page_urls(&server, 4);
    let mut config = create_test_config(dir.path(), &urls);
    config.pipeline.retry_pass = false;

    // An earlier run left two URLs without metadata.
    let store = CsvStore::new(&config.output.path);
    store
        .append_batch(&[
            with_views(&urls[0]),
            Record::empty(&urls[1]),
            with_views(&urls[2]),
            Record::empty(&urls[3]),
        ])
        .unwrap();

    let summary = run_pipeline(config).await.unwrap();

    assert_eq!(summary.work_set, 2);
    assert_eq!(summary.rows, 4);
    assert_eq!(summary.with_metadata, 4);

    let rows = store.load().unwrap();
    let order: Vec<&str> = rows.iter().map(|r| r.url.as_str()).collect();
    assert_eq!(order, urls.iter().map(String::as_str).collect::<Vec<_>>());
    assert_eq!(rows[1].votes_up, Some(42));
}

#[tokio::test]
async fn test_leftover_retry_table_is_merged_before_planning() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/v/\d+$"))
        .respond_with(ok_page())
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let urls = page_urls(&server, 3);
    let config = create_test_config(dir.path(), &urls);

    CsvStore::new(&config.output.path)
        .append_batch(&[with_views(&urls[0]), Record::empty(&urls[1])])
        .unwrap();
    CsvStore::new(&config.output.retry_path)
        .append_batch(&[with_views(&urls[1])])
        .unwrap();

    let summary = run_pipeline(config.clone()).await.unwrap();

    assert_eq!(summary.work_set, 1);
    assert_eq!(summary.rows, 3);
    assert!(!config.output.retry_path.exists());
}

struct FakeRenderer {
    calls: AtomicUsize,
}

impl PageRenderer for FakeRenderer {
    fn render<'a>(&'a self, _url: &'a str) -> BoxFuture<'a, Result<String, FetchError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(PAGE.to_string()) })
    }
}

#[tokio::test]
async fn test_browser_fallback_fills_blocked_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let urls = page_urls(&server, 3);
    let config = create_test_config(dir.path(), &urls);

    let renderer = Arc::new(FakeRenderer {
        calls: AtomicUsize::new(0),
    });
    let fetcher = build_fetcher(&config).with_fallback(renderer.clone(), 2);
    let coordinator = Coordinator::with_fetcher(config.clone(), Arc::new(fetcher));

    let summary = coordinator.run(&urls).await.unwrap();

    assert_eq!(summary.with_metadata, 3);
    assert_eq!(summary.retried, 0);
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 3);
    assert!(failure_lines(&config).is_empty());

    // Every URL went through all HTTP attempts before the fallback.
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3 * config.fetch.max_attempts as usize);
}
