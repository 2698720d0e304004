//! Unit tests for HttpTransport status mapping against a mock server

use mockito::{Matcher, Server};
use tweet_harvester::config::Credentials;
use tweet_harvester::fetcher::http::HttpTransport;
use tweet_harvester::fetcher::{FetcherError, Transport};

fn transport(base_url: &str) -> HttpTransport {
    HttpTransport::new(base_url, Credentials::new("test-token")).unwrap()
}

fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn test_success_sends_bearer_token_and_query() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/2/tweets")
        .match_header("authorization", "Bearer test-token")
        .match_query(Matcher::UrlEncoded("ids".into(), "1,2".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"data": [{"id": "1"}, {"id": "2"}]}"#)
        .create_async()
        .await;

    let body = transport(&server.url())
        .get_json("/2/tweets", &params(&[("ids", "1,2")]))
        .await
        .unwrap();

    assert_eq!(body["data"][1]["id"], "2");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/2/tweets/search/all")
        .match_query(Matcher::Any)
        .with_status(503)
        .with_body("Service Unavailable")
        .create_async()
        .await;

    let err = transport(&server.url())
        .get_json("/2/tweets/search/all", &params(&[("query", "rust")]))
        .await
        .unwrap_err();

    assert!(matches!(err, FetcherError::ServerError { status: 503, .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_too_many_requests_carries_reset() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/2/users/1/tweets")
        .with_status(429)
        .with_header("x-rate-limit-reset", "1700000000")
        .with_body(r#"{"title": "Too Many Requests"}"#)
        .create_async()
        .await;

    let err = transport(&server.url())
        .get_json("/2/users/1/tweets", &[])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        FetcherError::RateLimited {
            reset: Some(1700000000)
        }
    ));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_client_error_is_not_transient() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/2/users/by/username/nobody")
        .with_status(401)
        .with_body(r#"{"title": "Unauthorized"}"#)
        .create_async()
        .await;

    let err = transport(&server.url())
        .get_json("/2/users/by/username/nobody", &[])
        .await
        .unwrap_err();

    assert!(matches!(err, FetcherError::ApiError { status: 401, .. }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_invalid_json_is_parse_error() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/2/tweets")
        .with_status(200)
        .with_body("<html>not json</html>")
        .create_async()
        .await;

    let err = transport(&server.url())
        .get_json("/2/tweets", &[])
        .await
        .unwrap_err();

    assert!(matches!(err, FetcherError::ParseError(_)));
}

#[tokio::test]
async fn test_unreachable_host_is_network_error() {
    // nothing listens on port 9 of localhost
    let err = transport("http://127.0.0.1:9")
        .get_json("/2/tweets", &[])
        .await
        .unwrap_err();

    assert!(matches!(err, FetcherError::NetworkError(_)));
    assert!(err.is_transient());
}
