//! Batched tweet and user lookups

use serde_json::json;
use tempfile::TempDir;
use tweet_harvester::config::HarvestOptions;
use tweet_harvester::harvester::Harvester;
use tweet_harvester::output::json::TableDocument;
use tweet_harvester::output::SaveFormat;
use tweet_harvester::query::{Expansion, FieldGroups};
use tweet_harvester::resolver::IdentifierKind;
use tweet_harvester::Category;

use crate::support::{read_csv_rows, tweets_page, MockTransport};

#[tokio::test(start_paused = true)]
async fn test_tweet_lookup_batches_ids() {
    let ids: Vec<String> = (1..=105).map(|i| i.to_string()).collect();
    let transport = MockTransport::new();
    transport
        .respond_ok("/2/tweets", tweets_page(&["1", "2"], None))
        .respond_ok("/2/tweets", tweets_page(&["104", "105"], None));

    let options = HarvestOptions {
        save_format: SaveFormat::Json,
        ..HarvestOptions::default()
    };
    let run_dir = TempDir::new().unwrap();
    let harvester = Harvester::new(transport.clone(), FieldGroups::default(), options);
    let report = harvester.lookup_tweets(&ids, run_dir.path()).await.unwrap();

    let calls = transport.calls_to("/2/tweets");
    assert_eq!(calls.len(), 2);
    let first: Vec<&str> = calls[0].param("ids").unwrap().split(',').collect();
    let second: Vec<&str> = calls[1].param("ids").unwrap().split(',').collect();
    assert_eq!(first.len(), 95);
    assert_eq!(second.len(), 10);
    assert_eq!(first[0], "1");
    assert_eq!(second[9], "105");

    assert_eq!(report.row_count(Category::Tweets), 4);
    let document = TableDocument::read(&run_dir.path().join("data_tweets.json")).unwrap();
    assert_eq!(document.data.len(), 4);
    assert_eq!(document.schema.primary_key, vec!["id".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_tweet_lookup_skips_invalid_ids() {
    let transport = MockTransport::new();
    transport.respond_ok("/2/tweets", tweets_page(&["7"], None));

    let run_dir = TempDir::new().unwrap();
    let harvester = Harvester::new(transport.clone(), FieldGroups::default(), HarvestOptions::default());
    let ids = vec!["7".to_string(), "not-an-id".to_string()];
    let report = harvester.lookup_tweets(&ids, run_dir.path()).await.unwrap();

    assert_eq!(report.skipped, vec!["not-an-id"]);
    assert_eq!(transport.calls_to("/2/tweets")[0].param("ids"), Some("7"));
}

#[tokio::test(start_paused = true)]
async fn test_user_lookup_routes_profiles_and_pinned_tweets() {
    let transport = MockTransport::new();
    transport.respond_ok(
        "/2/users/by",
        json!({
            "data": [
                {"id": "1", "username": "alice", "name": "Alice", "pinned_tweet_id": "100"},
                {"id": "2", "username": "bob", "name": "Bob"}
            ],
            "includes": {"tweets": [{"id": "100", "text": "pinned"}]}
        }),
    );

    let fields = FieldGroups {
        expansions: vec![Expansion::PinnedTweetId, Expansion::AuthorId],
        ..FieldGroups::default()
    };
    let run_dir = TempDir::new().unwrap();
    let harvester = Harvester::new(transport.clone(), fields, HarvestOptions::default());
    let identifiers = vec!["@alice".to_string(), "bob".to_string()];
    let report = harvester
        .lookup_users(&identifiers, IdentifierKind::Handle, run_dir.path())
        .await
        .unwrap();

    let calls = transport.calls_to("/2/users/by");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].param("usernames"), Some("alice,bob"));
    // tweet expansions are dropped for user lookups
    assert_eq!(calls[0].param("expansions"), Some("pinned_tweet_id"));

    assert_eq!(report.row_count(Category::Users), 2);
    assert_eq!(report.row_count(Category::Tweets), 1);
    let users = read_csv_rows(&run_dir.path().join("data_users.csv"));
    assert_eq!(users[0]["username"], "alice");
    let pinned = read_csv_rows(&run_dir.path().join("data_tweets.csv"));
    assert_eq!(pinned[0]["id"], "100");
}

#[tokio::test(start_paused = true)]
async fn test_user_lookup_by_id_uses_ids_param() {
    let transport = MockTransport::new();
    transport.respond_ok("/2/users", json!({"data": [{"id": "12", "username": "jack"}]}));

    let run_dir = TempDir::new().unwrap();
    let harvester = Harvester::new(transport.clone(), FieldGroups::default(), HarvestOptions::default());
    let report = harvester
        .lookup_users(&["12".to_string()], IdentifierKind::NumericId, run_dir.path())
        .await
        .unwrap();

    assert_eq!(transport.calls_to("/2/users")[0].param("ids"), Some("12"));
    assert_eq!(report.row_count(Category::Users), 1);
}
