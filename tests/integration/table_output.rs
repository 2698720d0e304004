//! Accumulation modes persisted through a directory sink

use serde_json::{json, Value};
use tempfile::TempDir;
use tweet_harvester::accumulator::{AccumulateError, AccumulationMode, TableSelection};
use tweet_harvester::fetcher::Page;
use tweet_harvester::normalizer::FlatNormalizer;
use tweet_harvester::output::json::TableDocument;
use tweet_harvester::output::{DirectorySink, SaveFormat};
use tweet_harvester::{Category, EntityKind, ResponseAccumulator};

use crate::support::read_csv_rows;

fn accumulator(mode: AccumulationMode, dir: &TempDir, format: SaveFormat) -> ResponseAccumulator {
    ResponseAccumulator::new(
        mode,
        EntityKind::Tweet,
        TableSelection::all(),
        Box::new(FlatNormalizer::default()),
        Box::new(DirectorySink::new(dir.path(), format)),
    )
}

/// Page of tweets each replying to `referenced`, with `referenced` included
fn page(ids: &[&str], referenced: &str) -> Page {
    let body = json!({
        "data": ids.iter().map(|id| json!({
            "id": id,
            "text": "reply",
            "referenced_tweets": [{"type": "replied_to", "id": referenced}]
        })).collect::<Vec<Value>>(),
        "includes": {
            "tweets": [{"id": referenced, "text": "original"}],
            "users": [{"id": "u1", "username": "alice"}]
        }
    });
    match Page::parse(body) {
        tweet_harvester::fetcher::FetchOutcome::Page(page) => page,
        other => panic!("expected page, got {other:?}"),
    }
}

#[test]
fn test_buffered_deduplicates_across_pages() {
    let dir = TempDir::new().unwrap();
    let mut acc = accumulator(AccumulationMode::Buffered, &dir, SaveFormat::Csv);

    acc.merge(&page(&["1", "2"], "100")).unwrap();
    acc.merge(&page(&["2", "3"], "100")).unwrap();
    // nothing is written before the flush
    assert!(!dir.path().join("data_tweets.csv").exists());
    acc.flush().unwrap();

    assert_eq!(read_csv_rows(&dir.path().join("data_tweets.csv")).len(), 3);
    assert_eq!(read_csv_rows(&dir.path().join("data_refs.csv")).len(), 1);
    assert_eq!(read_csv_rows(&dir.path().join("data_users.csv")).len(), 1);

    let links = read_csv_rows(&dir.path().join("data_ref_links.csv"));
    assert_eq!(links.len(), 3);
    assert!(links
        .iter()
        .all(|l| l["referenced_id"] == "100" && l["relation_type"] == "replied_to"));
}

#[test]
fn test_streaming_appends_every_page() {
    let dir = TempDir::new().unwrap();
    let mut acc = accumulator(AccumulationMode::Streaming, &dir, SaveFormat::Csv);

    acc.merge(&page(&["1", "2"], "100")).unwrap();
    assert_eq!(read_csv_rows(&dir.path().join("data_tweets.csv")).len(), 2);

    acc.merge(&page(&["2", "3"], "100")).unwrap();
    acc.flush().unwrap();

    // rows after k pages equal the sum of every page's rows, repeats included
    assert_eq!(read_csv_rows(&dir.path().join("data_tweets.csv")).len(), 4);
    assert_eq!(read_csv_rows(&dir.path().join("data_refs.csv")).len(), 2);
    assert_eq!(acc.row_count(Category::Refs), 2);
    assert!(acc.table(Category::Tweets).is_empty());
}

/// Page of the given raw tweets, nothing included
fn raw_page(tweets: Vec<Value>) -> Page {
    match Page::parse(json!({ "data": tweets })) {
        tweet_harvester::fetcher::FetchOutcome::Page(page) => page,
        other => panic!("expected page, got {other:?}"),
    }
}

#[test]
fn test_streaming_keeps_columns_first_seen_on_later_pages() {
    let dir = TempDir::new().unwrap();
    let mut acc = accumulator(AccumulationMode::Streaming, &dir, SaveFormat::Csv);

    acc.merge(&raw_page(vec![json!({"id": "1", "text": "a"})])).unwrap();
    acc.merge(&raw_page(vec![json!({
        "id": "2",
        "text": "b",
        "geo": {"place_id": "P"},
        "in_reply_to_user_id": "9"
    })]))
    .unwrap();
    acc.flush().unwrap();

    let rows = read_csv_rows(&dir.path().join("data_tweets.csv"));
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["geo.place_id"], "");
    assert_eq!(rows[1]["geo.place_id"], "P");
    assert_eq!(rows[1]["in_reply_to_user_id"], "9");
    assert_eq!(rows[0]["text"], "a");
}

#[test]
fn test_streaming_json_keeps_columns_first_seen_on_later_pages() {
    let dir = TempDir::new().unwrap();
    let mut acc = accumulator(AccumulationMode::Streaming, &dir, SaveFormat::Json);

    acc.merge(&raw_page(vec![json!({"id": "1", "text": "a"})])).unwrap();
    acc.merge(&raw_page(vec![json!({"id": "2", "geo": {"place_id": "P"}})]))
        .unwrap();
    acc.flush().unwrap();

    let document = TableDocument::read(&dir.path().join("data_tweets.json")).unwrap();
    let names: Vec<&str> = document.schema.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["id", "text", "geo.place_id"]);
    assert_eq!(document.data[1]["geo.place_id"], json!("P"));
    assert_eq!(document.data[1]["text"], Value::Null);
}

#[test]
fn test_streaming_json_document_grows() {
    let dir = TempDir::new().unwrap();
    let mut acc = accumulator(AccumulationMode::Streaming, &dir, SaveFormat::Json);

    acc.merge(&page(&["1"], "100")).unwrap();
    acc.merge(&page(&["2"], "100")).unwrap();
    acc.flush().unwrap();

    let document = TableDocument::read(&dir.path().join("data_tweets.json")).unwrap();
    let ids: Vec<&str> = document
        .data
        .iter()
        .filter_map(|row| row.get("id").and_then(Value::as_str))
        .collect();
    assert_eq!(ids, vec!["1", "2"]);
}

#[test]
fn test_merge_after_flush_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut acc = accumulator(AccumulationMode::Buffered, &dir, SaveFormat::Csv);
    acc.merge(&page(&["1"], "100")).unwrap();
    acc.flush().unwrap();
    acc.flush().unwrap();

    assert!(matches!(
        acc.merge(&page(&["2"], "100")),
        Err(AccumulateError::AlreadyFlushed)
    ));
    assert_eq!(read_csv_rows(&dir.path().join("data_tweets.csv")).len(), 1);
}
