//! Integration tests for the crawler
//!
//! These tests use wiremock to serve a small archive and run the full
//! harvest cycle end-to-end with the real reqwest fetcher and SQLite sink.

use archive_harvester::config::{parse_config, Config};
use archive_harvester::crawler::{run_crawl, Coordinator, ReqwestFetcher};
use archive_harvester::extract::{record_id, CssSelector};
use archive_harvester::storage::{RunStatus, Sink, SqliteSink};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration for an archive served by `base_url`
fn create_test_config(base_url: &str, db_path: &Path, end_date: &str, categories: &[&str]) -> Config {
    let categories: String = categories
        .iter()
        .map(|id| format!("[[category]]\nid = \"{}\"\n\n", id))
        .collect();

    let toml = format!(
        r#"
[crawl]
start-date = "1397/07/18"
end-date = "{end_date}"
max-pages-per-target = 5
batch-size = 2

{categories}
[archive]
url-template = "{base_url}/archive/{{year}}/{{month}}/{{day}}/{{category}}/{{page}}"
link-selectors = ["ul.list a::attr(href)"]
next-page-selector = "a.next"
link-pattern = "/news/\\d+"

[[field]]
name = "title"
selectors = ["h1.title", "h1"]
required = true

[[field]]
name = "body"
selectors = ["div.body p"]
required = true
multiple = true

[[field]]
name = "published"
selectors = ["div.date"]
required = true

[date]
field = "published"
format = "local-month-name"

[governor]
max-in-flight = 4
min-delay-ms = 0
max-delay-ms = 50
backoff-base-ms = 5
max-retries = 2
request-timeout-secs = 5

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[output]
database-path = "{db_path}"
"#,
        end_date = end_date,
        categories = categories,
        base_url = base_url,
        db_path = db_path.display(),
    );

    parse_config(&toml).expect("test config is valid")
}

fn archive_page(links: &[&str], has_next: bool) -> String {
    let mut html = String::from(r#"<html><body><ul class="list">"#);
    for link in links {
        html.push_str(&format!(r#"<li><a href="{}">item</a></li>"#, link));
    }
    html.push_str("</ul>");
    if has_next {
        html.push_str(r#"<a class="next" href="?p=next">بعدی</a>"#);
    }
    html.push_str("</body></html>");
    html
}

fn item_page(title: &str, date: &str, body: Option<&str>) -> String {
    let body = body
        .map(|b| format!(r#"<div class="body"><p>{}</p></div>"#, b))
        .unwrap_or_default();
    format!(
        r#"<html><body>
            <h1 class="title">{}</h1>
            <div class="date">تاریخ انتشار: ۰۹:۰۰ - {}</div>
            {}
        </body></html>"#,
        title, date, body
    )
}

async fn mount_html(server: &MockServer, at: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html; charset=utf-8"),
        )
        .mount(server)
        .await;
}

async fn run(config: &Config) -> archive_harvester::crawler::CrawlReport {
    let sink = SqliteSink::new(&config.output.database_path).expect("Failed to open database");
    let fetcher = ReqwestFetcher::new(&config.user_agent).expect("Failed to build client");
    let selector = CssSelector::new(config.selector_exprs()).expect("Failed to compile selectors");

    Coordinator::new(config, Box::new(sink), Arc::new(fetcher), Arc::new(selector))
        .expect("Failed to create coordinator")
        .with_config_hash("integration")
        .run(CancellationToken::new())
        .await
        .expect("Crawl failed")
}

#[tokio::test]
async fn test_harvest_single_target() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_html(
        &mock_server,
        "/archive/1397/07/18/1/1",
        archive_page(
            &[
                "/news/101/budget-approved?utm_source=rss",
                "/news/102",
                "/news/103",
                "/tags/economy",
            ],
            false,
        ),
    )
    .await;
    mount_html(
        &mock_server,
        "/news/101",
        item_page("Budget approved", "۱۸ مهر ۱۳۹۷", Some("The budget passed.")),
    )
    .await;
    mount_html(
        &mock_server,
        "/news/102",
        item_page("Rates held", "۱۸ مهر ۱۳۹۷", Some("Rates unchanged.")),
    )
    .await;
    // Missing body: skipped, not fatal
    mount_html(&mock_server, "/news/103", item_page("No body", "۱۸ مهر ۱۳۹۷", None)).await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("harvest.db");
    let config = create_test_config(&base_url, &db_path, "1397/07/18", &["1"]);

    let report = run(&config).await;

    assert_eq!(report.records_flushed, 2);
    assert_eq!(report.targets_exhausted, 1);
    assert_eq!(report.skipped.get("missing-required-field"), Some(&1));

    let sink = SqliteSink::new(&db_path).unwrap();
    assert_eq!(sink.count_records().unwrap(), 2);

    // Link pattern truncates to the canonical item URL
    let url = format!("{}/news/101", base_url);
    let record = sink.get_record(&record_id(&url)).unwrap().expect("record stored");
    assert_eq!(record.fields["title"], "Budget approved");
    assert_eq!(record.fields["body"], "The budget passed.");
    assert_eq!(record.date_iso.to_string(), "2018-10-10");
    assert_eq!(record.category.as_str(), "1");

    let checkpoint = sink.read_checkpoint().unwrap().expect("checkpoint written");
    assert_eq!(
        checkpoint.last_completed_target.unwrap().to_string(),
        "1397/07/18 [1] p1"
    );
    assert_eq!(checkpoint.config_hash.as_deref(), Some("integration"));
    assert_eq!(
        sink.get_latest_run().unwrap().unwrap().status,
        RunStatus::Completed
    );
}

#[tokio::test]
async fn test_pagination_follows_next_page() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_html(
        &mock_server,
        "/archive/1397/07/18/1/1",
        archive_page(&["/news/201", "/news/202"], true),
    )
    .await;
    // Page 2 repeats an item already seen on page 1
    mount_html(
        &mock_server,
        "/archive/1397/07/18/1/2",
        archive_page(&["/news/202", "/news/203"], false),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/archive/1397/07/18/1/3"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    for id in ["201", "203"] {
        mount_html(
            &mock_server,
            &format!("/news/{}", id),
            item_page(id, "۱۸ مهر ۱۳۹۷", Some("text")),
        )
        .await;
    }
    Mock::given(method("GET"))
        .and(path("/news/202"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(item_page("202", "۱۸ مهر ۱۳۹۷", Some("text"))),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("harvest.db");
    let config = create_test_config(&base_url, &db_path, "1397/07/18", &["1"]);

    let report = run(&config).await;

    assert_eq!(report.records_flushed, 3);
    assert_eq!(report.targets_exhausted, 1);
}

#[tokio::test]
async fn test_transient_failures_isolate_target() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    // Category 1 keeps failing: first attempt plus max-retries = 3 requests
    Mock::given(method("GET"))
        .and(path("/archive/1397/07/18/1/1"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    mount_html(
        &mock_server,
        "/archive/1397/07/18/2/1",
        archive_page(&["/news/301"], false),
    )
    .await;
    mount_html(
        &mock_server,
        "/news/301",
        item_page("Still harvested", "۱۸ مهر ۱۳۹۷", Some("text")),
    )
    .await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("harvest.db");
    let config = create_test_config(&base_url, &db_path, "1397/07/18", &["1", "2"]);

    let report = run(&config).await;

    assert_eq!(report.targets_failed, 1);
    assert_eq!(report.targets_exhausted, 1);
    assert_eq!(report.records_flushed, 1);
    assert!(report.governor.retries >= 2);

    let sink = SqliteSink::new(&db_path).unwrap();
    let failed = sink.get_failed_targets().unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].category, "1");
    assert_eq!(failed[0].date, "1397/07/18");

    // Failed targets count as finished for the checkpoint
    let checkpoint = sink.read_checkpoint().unwrap().unwrap();
    assert_eq!(
        checkpoint.last_completed_target.unwrap().to_string(),
        "1397/07/18 [2] p1"
    );
}

#[tokio::test]
async fn test_rate_limit_then_success() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/archive/1397/07/18/1/1"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    mount_html(
        &mock_server,
        "/archive/1397/07/18/1/1",
        archive_page(&["/news/401"], false),
    )
    .await;
    mount_html(
        &mock_server,
        "/news/401",
        item_page("After throttling", "۱۸ مهر ۱۳۹۷", Some("text")),
    )
    .await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("harvest.db");
    let config = create_test_config(&base_url, &db_path, "1397/07/18", &["1"]);

    let report = run(&config).await;

    assert_eq!(report.records_flushed, 1);
    assert_eq!(report.governor.retries, 1);
    assert_eq!(report.governor.transient_failures, 1);
}

#[tokio::test]
async fn test_resume_from_checkpoint() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    // Day one is only ever fetched by the first run
    Mock::given(method("GET"))
        .and(path("/archive/1397/07/18/1/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(archive_page(&["/news/501"], false)))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/archive/1397/07/19/1/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(archive_page(&["/news/502"], false)))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_html(
        &mock_server,
        "/news/501",
        item_page("Day one", "۱۸ مهر ۱۳۹۷", Some("text")),
    )
    .await;
    mount_html(
        &mock_server,
        "/news/502",
        item_page("Day two", "۱۹ مهر ۱۳۹۷", Some("text")),
    )
    .await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("harvest.db");

    let first = create_test_config(&base_url, &db_path, "1397/07/18", &["1"]);
    assert_eq!(run(&first).await.records_flushed, 1);

    // Extending the range resumes after the checkpoint
    let second = create_test_config(&base_url, &db_path, "1397/07/19", &["1"]);
    let report = run(&second).await;
    assert_eq!(report.targets_exhausted, 1);
    assert_eq!(report.records_flushed, 1);

    let sink = SqliteSink::new(&db_path).unwrap();
    assert_eq!(sink.count_records().unwrap(), 2);
    assert_eq!(
        sink.read_checkpoint()
            .unwrap()
            .unwrap()
            .last_completed_target
            .unwrap()
            .to_string(),
        "1397/07/19 [1] p1"
    );
}

#[tokio::test]
async fn test_fresh_run_ignores_checkpoint() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/archive/1397/07/18/1/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(archive_page(&["/news/601"], false)))
        .expect(2)
        .mount(&mock_server)
        .await;
    mount_html(
        &mock_server,
        "/news/601",
        item_page("Again", "۱۸ مهر ۱۳۹۷", Some("text")),
    )
    .await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("harvest.db");
    let config = create_test_config(&base_url, &db_path, "1397/07/18", &["1"]);

    run_crawl(&config, "hash", false, CancellationToken::new())
        .await
        .unwrap();
    let report = run_crawl(&config, "hash", true, CancellationToken::new())
        .await
        .unwrap();

    // Re-harvesting upserts the same record instead of duplicating it
    assert_eq!(report.records_flushed, 1);
    assert_eq!(SqliteSink::new(&db_path).unwrap().count_records().unwrap(), 1);
}

#[tokio::test]
async fn test_cancellation_leaves_resumable_state() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_html(
        &mock_server,
        "/archive/1397/07/18/1/1",
        archive_page(&["/news/701"], false),
    )
    .await;
    // Slow item page: the run is cancelled while it is in flight
    Mock::given(method("GET"))
        .and(path("/news/701"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(item_page("Slow", "۱۸ مهر ۱۳۹۷", Some("text")))
                .set_delay(std::time::Duration::from_secs(3)),
        )
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("harvest.db");
    let config = create_test_config(&base_url, &db_path, "1397/07/18", &["1"]);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            cancel.cancel();
        });
    }

    let report = run_crawl(&config, "hash", false, cancel).await.unwrap();
    assert!(report.cancelled);
    assert_eq!(report.targets_cancelled, 1);
    assert_eq!(report.records_flushed, 0);

    // The interrupted target was not marked complete
    let sink = SqliteSink::new(&db_path).unwrap();
    assert!(sink.read_checkpoint().unwrap().is_none());
    assert_eq!(
        sink.get_latest_run().unwrap().unwrap().status,
        RunStatus::Interrupted
    );
}

#[tokio::test]
async fn test_cancellation_flushes_partial_batch() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_html(
        &mock_server,
        "/archive/1397/07/18/1/1",
        archive_page(&["/news/801"], false),
    )
    .await;
    mount_html(
        &mock_server,
        "/news/801",
        item_page("Finished before the stop", "۱۸ مهر ۱۳۹۷", Some("text")),
    )
    .await;
    mount_html(
        &mock_server,
        "/archive/1397/07/18/2/1",
        archive_page(&["/news/802"], false),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/news/802"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(item_page("Slow", "۱۸ مهر ۱۳۹۷", Some("text")))
                .set_delay(std::time::Duration::from_secs(4)),
        )
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("harvest.db");
    // batch-size is 2, so the single record of category 1 stays buffered
    let config = create_test_config(&base_url, &db_path, "1397/07/18", &["1", "2"]);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            cancel.cancel();
        });
    }

    let report = run_crawl(&config, "hash", false, cancel).await.unwrap();
    assert!(report.cancelled);
    assert_eq!(report.targets_exhausted, 1);
    assert_eq!(report.targets_cancelled, 1);
    assert_eq!(report.records_flushed, 1);

    let sink = SqliteSink::new(&db_path).unwrap();
    let url = format!("{}/news/801", base_url);
    assert!(sink.get_record(&record_id(&url)).unwrap().is_some());
    assert_eq!(sink.count_records().unwrap(), 1);
    assert_eq!(
        sink.read_checkpoint()
            .unwrap()
            .unwrap()
            .last_completed_target
            .unwrap()
            .to_string(),
        "1397/07/18 [1] p1"
    );
    assert_eq!(
        sink.get_latest_run().unwrap().unwrap().status,
        RunStatus::Interrupted
    );
}
