//! Pagination driver
//!
//! Drives a [`PageSource`] either by continuation token (timelines) or by a
//! finite list of planned requests (search batches, id lookups), handing
//! every page with data to a merge callback.
//!
//! Loop bounds:
//! - a page without `next_token` ends a token run; no further request is sent
//! - an empty response without a token is retried with the same token at most
//!   [`EMPTY_RETRY_LIMIT`] times in a row
//! - a failed request is retried with the same token at most
//!   [`FAILED_PAGE_LIMIT`] times in a row
//! - a plan run issues at most one request per planned entry

use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

use super::{FetchOutcome, Page, PageRequest, PageSource};
use crate::harvester::config::{EMPTY_RETRY_LIMIT, FAILED_PAGE_LIMIT};
use crate::shutdown::SharedShutdown;

/// Driver state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Requesting pages
    Running,
    /// Re-requesting the same token after an empty response
    EmptyRetry,
    /// Finished
    Done,
}

/// Counters for one pagination run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PaginationSummary {
    /// Requests issued through the page source
    pub requests: u32,
    /// Responses with data
    pub pages: u32,
    /// Responses without data
    pub empty_pages: u32,
    /// Failed requests
    pub failed_pages: u32,
    /// Pages rejected by the merge callback
    pub malformed_pages: u32,
    /// Rows reported by the merge callback
    pub records: usize,
    /// Stopped by a shutdown request
    pub cancelled: bool,
    /// Last failure seen, if any
    pub last_error: Option<String>,
}

impl PaginationSummary {
    fn merge_page<F, E>(&mut self, page: &Page, on_page: &mut F)
    where
        F: FnMut(&Page) -> Result<usize, E>,
        E: fmt::Display,
    {
        self.pages += 1;
        match on_page(page) {
            Ok(records) => {
                self.records += records;
                debug!(
                    page = self.pages,
                    entities = page.entity_count(),
                    records,
                    total = self.records,
                    "Merged page"
                );
            }
            Err(e) => {
                self.malformed_pages += 1;
                self.last_error = Some(e.to_string());
                warn!(page = self.pages, error = %e, "Skipping malformed page");
            }
        }
    }
}

/// Drives repeated page requests against one [`PageSource`]
pub struct PaginationDriver<'a, S: PageSource + ?Sized> {
    source: &'a mut S,
    shutdown: Option<SharedShutdown>,
    empty_retry_limit: u32,
    failed_page_limit: u32,
}

impl<'a, S: PageSource + ?Sized> PaginationDriver<'a, S> {
    /// Driver over `source` with the default loop bounds
    pub fn new(source: &'a mut S) -> Self {
        Self {
            source,
            shutdown: None,
            empty_retry_limit: EMPTY_RETRY_LIMIT,
            failed_page_limit: FAILED_PAGE_LIMIT,
        }
    }

    /// Stop between pages once `shutdown` is requested
    pub fn with_shutdown(mut self, shutdown: Option<SharedShutdown>) -> Self {
        self.shutdown = shutdown;
        self
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|s| s.is_shutdown_requested())
            .unwrap_or(false)
    }

    /// Follow continuation tokens from `request` until the stream ends.
    ///
    /// `on_page` merges one page and returns the number of rows it added; an
    /// `Err` skips that page without ending the run.
    pub async fn run_tokens<F, E>(&mut self, request: &PageRequest, mut on_page: F) -> PaginationSummary
    where
        F: FnMut(&Page) -> Result<usize, E>,
        E: fmt::Display,
    {
        let mut summary = PaginationSummary::default();
        let mut state = DriverState::Running;
        let mut token: Option<String> = None;
        let mut empty_streak = 0;
        let mut failure_streak = 0;

        while state != DriverState::Done {
            if self.shutdown_requested() {
                info!(pages = summary.pages, "Shutdown requested, stopping pagination");
                summary.cancelled = true;
                break;
            }

            let current = request.at_token(token.as_deref());
            summary.requests += 1;

            state = match self.source.fetch(&current).await {
                FetchOutcome::Page(page) => {
                    empty_streak = 0;
                    failure_streak = 0;
                    summary.merge_page(&page, &mut on_page);
                    match page.next_token {
                        Some(next) => {
                            token = Some(next);
                            DriverState::Running
                        }
                        None => DriverState::Done,
                    }
                }
                FetchOutcome::Empty {
                    next_token: Some(next),
                } => {
                    summary.empty_pages += 1;
                    empty_streak = 0;
                    failure_streak = 0;
                    debug!("Empty response with continuation token, advancing");
                    token = Some(next);
                    DriverState::Running
                }
                FetchOutcome::Empty { next_token: None } => {
                    summary.empty_pages += 1;
                    empty_streak += 1;
                    if empty_streak > self.empty_retry_limit {
                        debug!(empty_streak, "Repeated empty responses, stream exhausted");
                        DriverState::Done
                    } else {
                        debug!(empty_streak, "Empty response, retrying same token");
                        DriverState::EmptyRetry
                    }
                }
                FetchOutcome::Failed(e) => {
                    summary.failed_pages += 1;
                    summary.last_error = Some(e.to_string());
                    failure_streak += 1;
                    if failure_streak >= self.failed_page_limit {
                        warn!(
                            failures = failure_streak,
                            error = %e,
                            "Page keeps failing, ending pagination early"
                        );
                        DriverState::Done
                    } else {
                        warn!(
                            failures = failure_streak,
                            error = %e,
                            "Page request failed, retrying same token"
                        );
                        DriverState::Running
                    }
                }
            };
        }

        info!(
            requests = summary.requests,
            pages = summary.pages,
            records = summary.records,
            "Token pagination finished"
        );
        summary
    }

    /// Issue `requests` in order, one per planned batch.
    ///
    /// With `follow_tokens` each request after the first carries the latest
    /// continuation token, and a response without one ends the run even if
    /// batches remain. A failed or empty batch is consumed, not retried.
    pub async fn run_plan<F, E>(
        &mut self,
        requests: &[PageRequest],
        follow_tokens: bool,
        mut on_page: F,
    ) -> PaginationSummary
    where
        F: FnMut(&Page) -> Result<usize, E>,
        E: fmt::Display,
    {
        let mut summary = PaginationSummary::default();
        let mut token: Option<String> = None;

        for (index, planned) in requests.iter().enumerate() {
            if self.shutdown_requested() {
                info!(batch = index, "Shutdown requested, stopping planned batches");
                summary.cancelled = true;
                break;
            }

            let current = if follow_tokens {
                planned.at_token(token.as_deref())
            } else {
                planned.clone()
            };
            summary.requests += 1;
            debug!(batch = index + 1, of = requests.len(), "Requesting planned batch");

            let next_token = match self.source.fetch(&current).await {
                FetchOutcome::Page(page) => {
                    summary.merge_page(&page, &mut on_page);
                    page.next_token
                }
                FetchOutcome::Empty { next_token } => {
                    summary.empty_pages += 1;
                    next_token
                }
                FetchOutcome::Failed(e) => {
                    summary.failed_pages += 1;
                    summary.last_error = Some(e.to_string());
                    warn!(batch = index + 1, error = %e, "Planned batch failed, skipping");
                    // keep the position we had
                    token.clone()
                }
            };

            if follow_tokens {
                match next_token {
                    Some(next) => token = Some(next),
                    None => {
                        if index + 1 < requests.len() {
                            debug!(
                                remaining = requests.len() - index - 1,
                                "No continuation token, ending before plan is exhausted"
                            );
                        }
                        break;
                    }
                }
            }
        }

        info!(
            requests = summary.requests,
            pages = summary.pages,
            records = summary.records,
            "Planned pagination finished"
        );
        summary
    }
}
