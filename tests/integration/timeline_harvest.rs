//! Timeline harvests against an in-process transport

use serde_json::json;
use tempfile::TempDir;
use tweet_harvester::config::HarvestOptions;
use tweet_harvester::harvester::{HarvestError, Harvester};
use tweet_harvester::query::{FieldGroups, TimeWindow};
use tweet_harvester::resolver::{IdentifierKind, ResolveError};
use tweet_harvester::shutdown::ShutdownCoordinator;
use tweet_harvester::{AccumulationMode, Category};

use crate::support::{read_csv_rows, tweets_page, MockTransport};

fn handles(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[tokio::test(start_paused = true)]
async fn test_timeline_follows_tokens_until_exhausted() {
    let transport = MockTransport::new();
    transport
        .resolves("alice", "1")
        .respond_ok("/2/users/1/tweets", tweets_page(&["10", "11"], Some("t1")))
        .respond_ok("/2/users/1/tweets", tweets_page(&["12"], None))
        .respond_ok("/2/users/1/tweets", tweets_page(&["99"], None));

    let run_dir = TempDir::new().unwrap();
    let harvester = Harvester::new(transport.clone(), FieldGroups::default(), HarvestOptions::default());
    let report = harvester
        .timelines(&handles(&["alice"]), IdentifierKind::Handle, TimeWindow::default(), run_dir.path())
        .await
        .unwrap();

    // the page without a token ends the stream; the third page is never requested
    let calls = transport.calls_to("/2/users/1/tweets");
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].param("pagination_token"), None);
    assert_eq!(calls[1].param("pagination_token"), Some("t1"));
    assert_eq!(calls[0].param("max_results"), Some("100"));

    let completed = report.completed();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].row_count(Category::Tweets), 3);
    assert_eq!(completed[0].pagination.pages, 2);

    let target_dir = run_dir.path().join("alice");
    let rows = read_csv_rows(&target_dir.join("data_tweets.csv"));
    let ids: Vec<&str> = rows.iter().map(|r| r["id"].as_str()).collect();
    assert_eq!(ids, vec!["10", "11", "12"]);
    assert!(target_dir.join("query.json").exists());
}

#[tokio::test(start_paused = true)]
async fn test_unresolvable_target_does_not_abort_others() {
    let transport = MockTransport::new();
    transport
        .resolves("first", "1")
        .respond_ok(
            "/2/users/by/username/ghost",
            json!({"errors": [{"detail": "Could not find user with username: [ghost]."}]}),
        )
        .resolves("third", "3")
        .respond_ok("/2/users/1/tweets", tweets_page(&["10"], None))
        .respond_ok("/2/users/3/tweets", tweets_page(&["30", "31"], None));

    let run_dir = TempDir::new().unwrap();
    let harvester = Harvester::new(transport.clone(), FieldGroups::default(), HarvestOptions::default());
    let report = harvester
        .timelines(
            &handles(&["first", "ghost", "third"]),
            IdentifierKind::Handle,
            TimeWindow::default(),
            run_dir.path(),
        )
        .await
        .unwrap();

    assert_eq!(report.completed().len(), 2);
    let failed = report.failed();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].0, "ghost");
    assert!(matches!(
        failed[0].1,
        HarvestError::Resolve(ResolveError::NotFound { .. })
    ));

    assert!(run_dir.path().join("first/data_tweets.csv").exists());
    assert!(run_dir.path().join("third/data_tweets.csv").exists());
    assert!(!run_dir.path().join("ghost").exists());
    assert!(transport.calls_to("/2/users/ghost/tweets").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_targets_keep_separate_tables() {
    let transport = MockTransport::new();
    // both timelines contain tweet 5; each target keeps its own copy
    transport
        .respond_ok("/2/users/1/tweets", tweets_page(&["5", "6"], None))
        .respond_ok("/2/users/2/tweets", tweets_page(&["5"], None));

    let run_dir = TempDir::new().unwrap();
    let harvester = Harvester::new(transport.clone(), FieldGroups::default(), HarvestOptions::default());
    let report = harvester
        .timelines(&handles(&["1", "2"]), IdentifierKind::NumericId, TimeWindow::default(), run_dir.path())
        .await
        .unwrap();

    // numeric ids need no resolve request
    assert!(transport
        .calls()
        .iter()
        .all(|c| !c.path.starts_with("/2/users/by/username")));
    assert_eq!(report.completed().len(), 2);
    assert_eq!(read_csv_rows(&run_dir.path().join("1/data_tweets.csv")).len(), 2);
    assert_eq!(read_csv_rows(&run_dir.path().join("2/data_tweets.csv")).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_output_user_tags_primary_rows() {
    let transport = MockTransport::new();
    transport
        .resolves("alice", "1")
        .respond_ok("/2/users/1/tweets", tweets_page(&["10", "11"], None));

    let options = HarvestOptions {
        tag_target: true,
        ..HarvestOptions::default()
    };
    let run_dir = TempDir::new().unwrap();
    let harvester = Harvester::new(transport, FieldGroups::default(), options);
    harvester
        .timelines(&handles(&["alice"]), IdentifierKind::Handle, TimeWindow::default(), run_dir.path())
        .await
        .unwrap();

    let rows = read_csv_rows(&run_dir.path().join("alice/data_tweets.csv"));
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r["handle"] == "alice"));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_skips_remaining_targets() {
    let transport = MockTransport::new();
    let shutdown = ShutdownCoordinator::shared();
    shutdown.request_shutdown();

    let run_dir = TempDir::new().unwrap();
    let harvester = Harvester::new(transport.clone(), FieldGroups::default(), HarvestOptions::default())
        .with_shutdown(Some(shutdown));
    let report = harvester
        .timelines(&handles(&["1", "2"]), IdentifierKind::NumericId, TimeWindow::default(), run_dir.path())
        .await
        .unwrap();

    assert!(report.cancelled);
    assert!(report.targets.is_empty());
    assert!(transport.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_handle_spellings_are_one_target() {
    let transport = MockTransport::new();
    transport
        .resolves("jack", "1")
        .respond_ok("/2/users/1/tweets", tweets_page(&["10", "11"], None))
        .respond_ok("/2/users/1/tweets", tweets_page(&["12"], None));

    let options = HarvestOptions {
        accumulation: AccumulationMode::Streaming,
        ..HarvestOptions::default()
    };
    let run_dir = TempDir::new().unwrap();
    let harvester = Harvester::new(transport.clone(), FieldGroups::default(), options);
    let report = harvester
        .timelines(
            &handles(&["jack", "@jack", " jack "]),
            IdentifierKind::Handle,
            TimeWindow::default(),
            run_dir.path(),
        )
        .await
        .unwrap();

    assert_eq!(report.targets.len(), 1);
    assert_eq!(report.completed()[0].target.as_deref(), Some("jack"));
    assert_eq!(transport.calls_to("/2/users/by/username/jack").len(), 1);
    assert_eq!(transport.calls_to("/2/users/1/tweets").len(), 1);

    let rows = read_csv_rows(&run_dir.path().join("jack/data_tweets.csv"));
    let ids: Vec<&str> = rows.iter().map(|r| r["id"].as_str()).collect();
    assert_eq!(ids, vec!["10", "11"]);
}

#[tokio::test(start_paused = true)]
async fn test_numeric_ids_compared_after_trimming() {
    let transport = MockTransport::new();
    transport.respond_ok("/2/users/7/tweets", tweets_page(&["70"], None));

    let run_dir = TempDir::new().unwrap();
    let harvester = Harvester::new(transport.clone(), FieldGroups::default(), HarvestOptions::default());
    let report = harvester
        .timelines(&handles(&["7", " 7"]), IdentifierKind::NumericId, TimeWindow::default(), run_dir.path())
        .await
        .unwrap();

    assert_eq!(report.targets.len(), 1);
    assert_eq!(transport.calls_to("/2/users/7/tweets").len(), 1);
}
