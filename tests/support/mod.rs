//! In-process transport double with call recording

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use tweet_harvester::fetcher::{FetcherError, FetcherResult, Transport};

/// One request seen by [`MockTransport`]
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub path: String,
    pub params: Vec<(String, String)>,
    pub at: Instant,
}

impl RecordedCall {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Queued responses per request path; an exhausted path answers 404
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<String, VecDeque<FetcherResult<Value>>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, path: &str, response: FetcherResult<Value>) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn respond_ok(&self, path: &str, body: Value) -> &Self {
        self.respond(path, Ok(body))
    }

    /// Queue a successful handle lookup
    pub fn resolves(&self, handle: &str, id: &str) -> &Self {
        self.respond_ok(
            &format!("/2/users/by/username/{handle}"),
            json!({"data": {"id": id, "name": handle, "username": handle}}),
        )
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, path: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.path == path)
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get_json(&self, path: &str, params: &[(String, String)]) -> FetcherResult<Value> {
        self.calls.lock().unwrap().push(RecordedCall {
            path: path.to_string(),
            params: params.to_vec(),
            at: Instant::now(),
        });
        self.routes
            .lock()
            .unwrap()
            .get_mut(path)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Err(FetcherError::ApiError {
                    status: 404,
                    message: format!("no mock response for {path}"),
                })
            })
    }
}

/// Tweets page with optional continuation token
pub fn tweets_page(ids: &[&str], next_token: Option<&str>) -> Value {
    let data: Vec<Value> = ids
        .iter()
        .map(|id| json!({"id": id, "text": format!("tweet {id}"), "author_id": "1"}))
        .collect();
    let mut meta = json!({"result_count": ids.len()});
    if let Some(token) = next_token {
        meta["next_token"] = json!(token);
    }
    json!({"data": data, "meta": meta})
}

/// Rows of a CSV table as header-keyed maps
pub fn read_csv_rows(path: &std::path::Path) -> Vec<HashMap<String, String>> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let headers = reader.headers().unwrap().clone();
    reader
        .records()
        .map(|r| {
            let record = r.unwrap();
            headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.to_string(), v.to_string()))
                .collect()
        })
        .collect()
}
