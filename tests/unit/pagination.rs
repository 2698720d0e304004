//! Unit tests for PaginationDriver against a scripted page source

use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use tweet_harvester::fetcher::{
    Endpoint, FetchOutcome, FetcherError, Page, PageRequest, PageSource, PaginationDriver,
};
use tweet_harvester::harvester::config::{EMPTY_RETRY_LIMIT, FAILED_PAGE_LIMIT};

/// Page source replaying fixed outcomes and recording the requests it saw
struct ScriptedSource {
    outcomes: VecDeque<FetchOutcome>,
    seen: Vec<PageRequest>,
}

impl ScriptedSource {
    fn new(outcomes: Vec<FetchOutcome>) -> Self {
        Self {
            outcomes: outcomes.into(),
            seen: Vec::new(),
        }
    }

    fn tokens(&self, key: &str) -> Vec<Option<String>> {
        self.seen
            .iter()
            .map(|r| r.param(key).map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl PageSource for ScriptedSource {
    async fn fetch(&mut self, request: &PageRequest) -> FetchOutcome {
        self.seen.push(request.clone());
        self.outcomes
            .pop_front()
            .unwrap_or(FetchOutcome::Empty { next_token: None })
    }
}

fn page(ids: &[&str], next: Option<&str>) -> FetchOutcome {
    Page::parse(json!({
        "data": ids.iter().map(|id| json!({"id": id})).collect::<Vec<_>>(),
        "meta": {"next_token": next}
    }))
}

fn count_rows(page: &Page) -> Result<usize, String> {
    Ok(page.data.len())
}

fn timeline() -> PageRequest {
    PageRequest::new(Endpoint::UserTweets {
        user_id: "42".into(),
    })
}

#[tokio::test]
async fn test_k_pages_issue_exactly_k_requests() {
    let mut source = ScriptedSource::new(vec![
        page(&["1"], Some("a")),
        page(&["2"], Some("b")),
        page(&["3"], None),
        page(&["never"], None),
    ]);

    let summary = PaginationDriver::new(&mut source)
        .run_tokens(&timeline(), count_rows)
        .await;

    assert_eq!(summary.requests, 3);
    assert_eq!(summary.records, 3);
    assert_eq!(
        source.tokens("pagination_token"),
        vec![None, Some("a".into()), Some("b".into())]
    );
}

#[tokio::test]
async fn test_empty_with_token_advances() {
    let mut source = ScriptedSource::new(vec![
        FetchOutcome::Empty {
            next_token: Some("skip".into()),
        },
        page(&["1"], None),
    ]);

    let summary = PaginationDriver::new(&mut source)
        .run_tokens(&timeline(), count_rows)
        .await;

    assert_eq!(summary.empty_pages, 1);
    assert_eq!(summary.pages, 1);
    assert_eq!(source.tokens("pagination_token")[1].as_deref(), Some("skip"));
}

#[tokio::test]
async fn test_empty_without_token_is_bounded() {
    let mut source = ScriptedSource::new(Vec::new());

    let summary = PaginationDriver::new(&mut source)
        .run_tokens(&timeline(), count_rows)
        .await;

    assert_eq!(summary.requests, EMPTY_RETRY_LIMIT + 1);
    assert!(source.tokens("pagination_token").iter().all(Option::is_none));
}

#[tokio::test]
async fn test_failures_end_run_after_limit() {
    let failed = || {
        FetchOutcome::Failed(FetcherError::MaxRetriesExceeded {
            attempts: 5,
            last_error: "server error 500".into(),
        })
    };
    let mut source = ScriptedSource::new(vec![
        page(&["1"], Some("a")),
        failed(),
        failed(),
        failed(),
        failed(),
    ]);

    let summary = PaginationDriver::new(&mut source)
        .run_tokens(&timeline(), count_rows)
        .await;

    assert_eq!(summary.failed_pages, FAILED_PAGE_LIMIT);
    assert_eq!(summary.requests, 1 + FAILED_PAGE_LIMIT);
    assert!(summary.last_error.unwrap().contains("max retries"));
}

#[tokio::test]
async fn test_lookup_plan_sends_each_batch_once() {
    let requests: Vec<PageRequest> = ["1,2", "3"]
        .iter()
        .map(|ids| PageRequest::new(Endpoint::TweetsById).with_param("ids", ids))
        .collect();
    let mut source = ScriptedSource::new(vec![
        FetchOutcome::Empty { next_token: None },
        page(&["3"], None),
    ]);

    let summary = PaginationDriver::new(&mut source)
        .run_plan(&requests, false, count_rows)
        .await;

    assert_eq!(summary.requests, 2);
    assert_eq!(summary.empty_pages, 1);
    assert_eq!(
        source.tokens("ids"),
        vec![Some("1,2".into()), Some("3".into())]
    );
}
