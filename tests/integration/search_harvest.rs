//! Planned-batch search harvests

use std::time::Duration;
use tempfile::TempDir;
use tweet_harvester::config::HarvestOptions;
use tweet_harvester::fetcher::FetcherError;
use tweet_harvester::harvester::Harvester;
use tweet_harvester::query::{FieldGroups, TimeWindow};
use tweet_harvester::Category;

use crate::support::{tweets_page, MockTransport};

const SEARCH: &str = "/2/tweets/search/all";

fn window() -> TimeWindow {
    let start = "2021-01-01T00:00:00Z".parse().unwrap();
    let end = "2021-02-01T00:00:00Z".parse().unwrap();
    TimeWindow::new(Some(start), Some(end)).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_search_issues_planned_batches_with_tokens() {
    let transport = MockTransport::new();
    transport
        .respond_ok(SEARCH, tweets_page(&["1", "2"], Some("n1")))
        .respond_ok(SEARCH, tweets_page(&["3"], Some("n2")));

    let run_dir = TempDir::new().unwrap();
    let harvester = Harvester::new(transport.clone(), FieldGroups::default(), HarvestOptions::default());
    let report = harvester
        .search("rustlang", window(), 105, run_dir.path())
        .await
        .unwrap();

    let calls = transport.calls_to(SEARCH);
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].param("max_results"), Some("95"));
    assert_eq!(calls[1].param("max_results"), Some("10"));
    assert_eq!(calls[0].param("next_token"), None);
    assert_eq!(calls[1].param("next_token"), Some("n1"));
    assert_eq!(calls[0].param("query"), Some("rustlang"));
    assert_eq!(calls[0].param("start_time"), Some("2021-01-01T00:00:00Z"));
    assert_eq!(calls[0].param("end_time"), Some("2021-02-01T00:00:00Z"));

    // full-archive search allows one request per second
    assert!(calls[1].at - calls[0].at >= Duration::from_secs(1));

    assert_eq!(report.row_count(Category::Tweets), 3);
    assert!(run_dir.path().join("data_tweets.csv").exists());
    assert!(run_dir.path().join("query.json").exists());
}

#[tokio::test(start_paused = true)]
async fn test_search_ends_when_tokens_run_out() {
    let transport = MockTransport::new();
    transport.respond_ok(SEARCH, tweets_page(&["1"], None));

    let run_dir = TempDir::new().unwrap();
    let harvester = Harvester::new(transport.clone(), FieldGroups::default(), HarvestOptions::default());
    let report = harvester
        .search("rustlang", TimeWindow::default(), 250, run_dir.path())
        .await
        .unwrap();

    // three batches were planned but the stream ended after the first
    assert_eq!(transport.calls_to(SEARCH).len(), 1);
    assert_eq!(report.pagination.requests, 1);
}

#[tokio::test(start_paused = true)]
async fn test_search_small_budget_rounds_up_to_minimum() {
    let transport = MockTransport::new();
    transport.respond_ok(SEARCH, tweets_page(&["1"], None));

    let run_dir = TempDir::new().unwrap();
    let harvester = Harvester::new(transport.clone(), FieldGroups::default(), HarvestOptions::default());
    harvester
        .search("rustlang", TimeWindow::default(), 5, run_dir.path())
        .await
        .unwrap();

    assert_eq!(transport.calls_to(SEARCH)[0].param("max_results"), Some("10"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_batch_keeps_token_position() {
    let transport = MockTransport::new();
    transport
        .respond_ok(SEARCH, tweets_page(&["1"], Some("n1")))
        .respond(
            SEARCH,
            Err(FetcherError::ApiError {
                status: 400,
                message: "bad request".into(),
            }),
        )
        .respond_ok(SEARCH, tweets_page(&["2"], None));

    let run_dir = TempDir::new().unwrap();
    let options = HarvestOptions {
        batch_size: 10,
        ..HarvestOptions::default()
    };
    let harvester = Harvester::new(transport.clone(), FieldGroups::default(), options);
    let report = harvester
        .search("rustlang", TimeWindow::default(), 30, run_dir.path())
        .await
        .unwrap();

    let calls = transport.calls_to(SEARCH);
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[2].param("next_token"), Some("n1"));
    assert_eq!(report.pagination.failed_pages, 1);
    assert_eq!(report.row_count(Category::Tweets), 2);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_batch_size_fails_before_any_request() {
    let transport = MockTransport::new();
    let options = HarvestOptions {
        batch_size: 5,
        ..HarvestOptions::default()
    };
    let run_dir = TempDir::new().unwrap();
    let harvester = Harvester::new(transport.clone(), FieldGroups::default(), options);

    assert!(harvester
        .search("rustlang", TimeWindow::default(), 100, run_dir.path())
        .await
        .is_err());
    assert!(transport.calls().is_empty());
}
