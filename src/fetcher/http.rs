//! reqwest-backed [`Transport`]
//!
//! Sends bearer-authenticated GETs and classifies the response:
//! - 2xx: body decoded as JSON
//! - 429: [`FetcherError::RateLimited`] with the `x-rate-limit-reset` epoch
//! - other 4xx: [`FetcherError::ApiError`]
//! - 5xx: [`FetcherError::ServerError`]
//! - connect / timeout failures: [`FetcherError::NetworkError`]
//!
//! Retrying is left to [`super::executor::RequestExecutor`].

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::{FetcherError, FetcherResult, Transport};
use crate::config::Credentials;

/// HTTP connect timeout
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Overall request timeout
const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Error bodies are truncated to this many characters
const MAX_ERROR_BODY: usize = 512;

/// Header carrying the epoch second at which the rate limit window resets
const RATE_LIMIT_RESET_HEADER: &str = "x-rate-limit-reset";

/// HTTP transport bound to one base URL and one set of credentials
pub struct HttpTransport {
    client: Client,
    base_url: String,
    credentials: Credentials,
}

impl HttpTransport {
    /// Create a transport with connect and request timeouts.
    ///
    /// # Errors
    /// Returns [`FetcherError::ClientSetup`] if the TLS backend cannot be
    /// initialised or the credentials are empty.
    pub fn new(base_url: impl Into<String>, credentials: Credentials) -> FetcherResult<Self> {
        if credentials.is_empty() {
            return Err(FetcherError::ClientSetup(
                "bearer token is empty".to_string(),
            ));
        }
        let client = Client::builder()
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .timeout(HTTP_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| FetcherError::ClientSetup(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        })
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn parse_reset_header(headers: &HeaderMap) -> Option<i64> {
        let raw = headers.get(RATE_LIMIT_RESET_HEADER)?.to_str().ok()?;
        match raw.trim().parse::<i64>() {
            Ok(reset) => Some(reset),
            Err(e) => {
                warn!(value = raw, error = %e, "Failed to parse rate limit reset header");
                None
            }
        }
    }
}

fn truncate(body: String) -> String {
    if body.chars().count() <= MAX_ERROR_BODY {
        body
    } else {
        body.chars().take(MAX_ERROR_BODY).collect()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_json(&self, path: &str, params: &[(String, String)]) -> FetcherResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, params = params.len(), "Sending GET request");

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.credentials.bearer_token())
            .query(params)
            .send()
            .await
            .map_err(|e| FetcherError::NetworkError(e.to_string()))?;

        let status = response.status();

        if status.as_u16() == 429 {
            let reset = Self::parse_reset_header(response.headers());
            return Err(FetcherError::RateLimited { reset });
        }

        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetcherError::ServerError {
                status: status.as_u16(),
                body: truncate(body),
            });
        }

        if status.is_client_error() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(FetcherError::ApiError {
                status: status.as_u16(),
                message: truncate(body),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| FetcherError::ParseError(format!("Failed to decode response body: {e}")))
    }
}
