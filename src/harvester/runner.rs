//! The harvester: one entry point per query shape

use indicatif::ProgressBar;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};

use super::batch::plan_batches;
use super::config::MAX_LOOKUP_BATCH;
use super::report::{write_metadata, RunReport, TargetOutcome, TimelineReport};
use super::{HarvestError, HarvestResult};
use crate::accumulator::{ResponseAccumulator, TableSelection, TargetAccumulators};
use crate::config::HarvestOptions;
use crate::fetcher::{Endpoint, PageRequest, PaginationDriver, RequestExecutor, Transport};
use crate::metrics::TargetMetrics;
use crate::normalizer::FlatNormalizer;
use crate::output::DirectorySink;
use crate::query::{
    FieldGroups, FieldPolicy, QueryDescriptor, QueryMode, QueryTarget, TimeWindow,
};
use crate::resolver::{normalize_handle, IdentifierKind, IdentifierResolver};
use crate::shutdown::SharedShutdown;

/// Runs harvests against one transport with fixed field groups and options
pub struct Harvester {
    transport: Arc<dyn Transport>,
    fields: FieldGroups,
    options: HarvestOptions,
    shutdown: Option<SharedShutdown>,
    progress: Option<ProgressBar>,
}

impl Harvester {
    /// Create a harvester
    pub fn new(transport: Arc<dyn Transport>, fields: FieldGroups, options: HarvestOptions) -> Self {
        Self {
            transport,
            fields,
            options,
            shutdown: None,
            progress: None,
        }
    }

    /// Stop between pages and between targets once `shutdown` is requested
    pub fn with_shutdown(mut self, shutdown: Option<SharedShutdown>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Report merged rows to `progress`; its message names the current target
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Harvest options in effect
    pub fn options(&self) -> &HarvestOptions {
        &self.options
    }

    /// Fail early when the field policy rejects a group `mode` does not support
    pub fn check_fields(&self, mode: QueryMode) -> HarvestResult<()> {
        if self.options.field_policy == FieldPolicy::Reject {
            self.fields.for_mode(mode, FieldPolicy::Reject)?;
        }
        Ok(())
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|s| s.is_shutdown_requested())
            .unwrap_or(false)
    }

    fn progress_start(&self, message: String) {
        if let Some(progress) = &self.progress {
            progress.set_position(0);
            progress.set_message(message);
        }
    }

    fn progress_rows(&self, rows: usize) -> usize {
        if let Some(progress) = &self.progress {
            progress.inc(rows as u64);
        }
        rows
    }

    fn accumulator(&self, descriptor: &QueryDescriptor, dir: &Path) -> ResponseAccumulator {
        let mode = descriptor.mode();
        ResponseAccumulator::new(
            self.options.accumulation,
            mode.primary_entity(),
            TableSelection::for_query(mode, descriptor.fields()),
            Box::new(FlatNormalizer::new(self.options.full_save)),
            Box::new(DirectorySink::new(dir, self.options.save_format)),
        )
    }

    /// Harvest the timeline of every identifier, each into
    /// `run_dir/<identifier>/`.
    ///
    /// Identifiers are compared after normalization, so `jack` and `@jack`
    /// are one target and the second is skipped. A target that fails (unresolvable handle, unwritable output) is
    /// recorded in the report and the remaining targets still run. Only an
    /// unusable field selection or run directory fails the whole call.
    pub async fn timelines(
        &self,
        identifiers: &[String],
        kind: IdentifierKind,
        window: TimeWindow,
        run_dir: &Path,
    ) -> HarvestResult<TimelineReport> {
        self.fields
            .for_mode(QueryMode::Timeline, self.options.field_policy)?;
        create_dir(run_dir)?;

        info!(
            targets = identifiers.len(),
            kind = %kind,
            dir = %run_dir.display(),
            "Starting timeline harvest"
        );

        let mut accumulators = TargetAccumulators::new();
        let mut seen = HashSet::new();
        let mut report = TimelineReport::default();
        for identifier in identifiers {
            if self.shutdown_requested() {
                info!(
                    remaining = identifiers.len() - report.targets.len(),
                    "Shutdown requested, skipping remaining targets"
                );
                report.cancelled = true;
                break;
            }
            let target = normalize_identifier(identifier, kind)
                .unwrap_or_else(|| identifier.trim().to_string());
            if !seen.insert(target.clone()) {
                warn!(target = %identifier, normalized = %target, "Duplicate target, skipping");
                continue;
            }

            let metrics = TargetMetrics::start(QueryMode::Timeline.as_str(), target.as_str());
            let span = info_span!("timeline_target", target = %target);
            let result = self
                .timeline_target(&target, kind, window, run_dir, &mut accumulators)
                .instrument(span)
                .await;

            match &result {
                Ok(run) => metrics.record_success(run.total_rows()),
                Err(e) => {
                    warn!(target = %identifier, error = %e, "Timeline target failed, continuing");
                    metrics.record_failure(&e.to_string());
                }
            }
            report.targets.push(TargetOutcome {
                identifier: identifier.clone(),
                result,
            });
        }

        info!(
            completed = report.completed().len(),
            failed = report.failed().len(),
            accumulated = accumulators.len(),
            "Timeline harvest finished"
        );
        Ok(report)
    }

    async fn timeline_target(
        &self,
        identifier: &str,
        kind: IdentifierKind,
        window: TimeWindow,
        run_dir: &Path,
        accumulators: &mut TargetAccumulators,
    ) -> HarvestResult<RunReport> {
        let user_id = IdentifierResolver::new(self.transport.as_ref())
            .resolve(identifier, kind)
            .await?;
        let descriptor = QueryDescriptor::new(
            QueryTarget::Timeline {
                identifier: identifier.to_string(),
                kind,
                window,
                page_size: self.options.page_size,
            },
            &self.fields,
            self.options.field_policy,
        )?;

        let dir = run_dir.join(target_dir_name(identifier));
        create_dir(&dir)?;
        write_metadata(&dir, &descriptor, &self.options)?;

        self.progress_start(format!("timeline {identifier}"));
        let mut accumulator = self.accumulator(&descriptor, &dir);
        if self.options.tag_target {
            accumulator = accumulator.with_tag(kind.column_name(), identifier);
        }
        let accumulator = accumulators.insert(identifier, accumulator);

        let request = PageRequest::new(Endpoint::UserTweets { user_id })
            .with_params(descriptor.fields().to_params())
            .with_params(window.to_params())
            .with_param("max_results", self.options.page_size);

        let mut executor = RequestExecutor::new(Arc::clone(&self.transport));
        let summary = PaginationDriver::new(&mut executor)
            .with_shutdown(self.shutdown.clone())
            .run_tokens(&request, |page| {
                accumulator
                    .merge(page)
                    .map(|stats| self.progress_rows(stats.total()))
            })
            .await;
        accumulator.flush()?;

        let mut report = RunReport::new(QueryMode::Timeline, &dir, summary, accumulator);
        report.target = Some(identifier.to_string());
        info!(
            http_requests = executor.requests_sent(),
            pages = report.pagination.pages,
            rows = report.total_rows(),
            "Timeline target finished"
        );
        Ok(report)
    }

    /// Full-archive search for up to roughly `max_results` tweets.
    ///
    /// The total is split by [`plan_batches`] and the batches are issued in
    /// order, each continuing from the previous continuation token.
    pub async fn search(
        &self,
        keyword: &str,
        window: TimeWindow,
        max_results: usize,
        run_dir: &Path,
    ) -> HarvestResult<RunReport> {
        let descriptor = QueryDescriptor::new(
            QueryTarget::Search {
                keyword: keyword.to_string(),
                window,
                max_results,
                batch_size: self.options.batch_size,
            },
            &self.fields,
            self.options.field_policy,
        )?;
        let plan = plan_batches(max_results, self.options.batch_size)?;

        let base = PageRequest::new(Endpoint::SearchAll)
            .with_param("query", keyword)
            .with_params(descriptor.fields().to_params())
            .with_params(window.to_params());
        let requests: Vec<PageRequest> = plan
            .iter()
            .map(|size| base.clone().with_param("max_results", size))
            .collect();

        self.run_planned(&descriptor, &requests, true, Vec::new(), run_dir)
            .instrument(info_span!("search", query = %keyword, max_results))
            .await
    }

    /// Look up tweets by id in batches.
    ///
    /// Ids that are not numeric are skipped and listed in the report.
    pub async fn lookup_tweets(&self, ids: &[String], run_dir: &Path) -> HarvestResult<RunReport> {
        let (ids, skipped) = partition_identifiers(ids, IdentifierKind::NumericId);
        let batch_size = self.options.batch_size.min(MAX_LOOKUP_BATCH);
        let descriptor = QueryDescriptor::new(
            QueryTarget::TweetLookup {
                ids: ids.clone(),
                batch_size,
            },
            &self.fields,
            self.options.field_policy,
        )?;

        let requests = id_batches(&ids, batch_size)?
            .into_iter()
            .map(|batch| {
                PageRequest::new(Endpoint::TweetsById)
                    .with_param("ids", batch.join(","))
                    .with_params(descriptor.fields().to_params())
            })
            .collect::<Vec<_>>();

        self.run_planned(&descriptor, &requests, false, skipped, run_dir)
            .instrument(info_span!("lookup_tweets", ids = ids.len()))
            .await
    }

    /// Look up user profiles by handle or numeric id in batches.
    ///
    /// Profiles go to the `users` table; pinned tweets, when expanded, go to
    /// `tweets`. Invalid identifiers are skipped and listed in the report.
    pub async fn lookup_users(
        &self,
        identifiers: &[String],
        kind: IdentifierKind,
        run_dir: &Path,
    ) -> HarvestResult<RunReport> {
        let (identifiers, skipped) = partition_identifiers(identifiers, kind);
        let batch_size = self.options.batch_size.min(MAX_LOOKUP_BATCH);
        let descriptor = QueryDescriptor::new(
            QueryTarget::UserLookup {
                identifiers: identifiers.clone(),
                kind,
                batch_size,
            },
            &self.fields,
            self.options.field_policy,
        )?;

        let (endpoint, param) = match kind {
            IdentifierKind::Handle => (Endpoint::UsersByUsername, "usernames"),
            IdentifierKind::NumericId => (Endpoint::UsersById, "ids"),
        };
        let requests = id_batches(&identifiers, batch_size)?
            .into_iter()
            .map(|batch| {
                PageRequest::new(endpoint.clone())
                    .with_param(param, batch.join(","))
                    .with_params(descriptor.fields().to_params())
            })
            .collect::<Vec<_>>();

        self.run_planned(&descriptor, &requests, false, skipped, run_dir)
            .instrument(info_span!("lookup_users", users = identifiers.len(), kind = %kind))
            .await
    }

    async fn run_planned(
        &self,
        descriptor: &QueryDescriptor,
        requests: &[PageRequest],
        follow_tokens: bool,
        skipped: Vec<String>,
        run_dir: &Path,
    ) -> HarvestResult<RunReport> {
        let mode = descriptor.mode();
        create_dir(run_dir)?;
        write_metadata(run_dir, descriptor, &self.options)?;
        info!(
            mode = %mode,
            batches = requests.len(),
            dir = %run_dir.display(),
            "Starting harvest run"
        );

        let metrics = TargetMetrics::start(mode.as_str(), run_dir.display().to_string());
        self.progress_start(mode.to_string());
        let mut accumulator = self.accumulator(descriptor, run_dir);
        let mut executor = RequestExecutor::new(Arc::clone(&self.transport));
        let summary = PaginationDriver::new(&mut executor)
            .with_shutdown(self.shutdown.clone())
            .run_plan(requests, follow_tokens, |page| {
                accumulator
                    .merge(page)
                    .map(|stats| self.progress_rows(stats.total()))
            })
            .await;

        if let Err(e) = accumulator.flush() {
            metrics.record_failure(&e.to_string());
            return Err(e.into());
        }

        let mut report = RunReport::new(mode, run_dir, summary, &accumulator);
        report.skipped = skipped;
        metrics.record_success(report.total_rows());
        info!(
            requests = report.pagination.requests,
            http_requests = executor.requests_sent(),
            rows = report.total_rows(),
            "Harvest run finished"
        );
        Ok(report)
    }
}

fn create_dir(dir: &Path) -> HarvestResult<()> {
    std::fs::create_dir_all(dir)
        .map_err(|e| HarvestError::Io(format!("failed to create {}: {e}", dir.display())))
}

/// Directory name for a timeline target
fn target_dir_name(identifier: &str) -> String {
    let name: String = identifier
        .trim()
        .trim_start_matches('@')
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() {
        "_".to_string()
    } else {
        name
    }
}

/// Canonical form of `identifier`, or `None` when it is not a valid `kind`
fn normalize_identifier(identifier: &str, kind: IdentifierKind) -> Option<String> {
    match kind {
        IdentifierKind::Handle => normalize_handle(identifier),
        IdentifierKind::NumericId => {
            let id = identifier.trim();
            (!id.is_empty() && id.chars().all(|c| c.is_ascii_digit())).then(|| id.to_string())
        }
    }
}

/// Split identifiers into valid (normalized) and skipped
fn partition_identifiers(raw: &[String], kind: IdentifierKind) -> (Vec<String>, Vec<String>) {
    let mut valid = Vec::new();
    let mut skipped = Vec::new();
    for identifier in raw {
        match normalize_identifier(identifier, kind) {
            Some(value) => valid.push(value),
            None => {
                warn!(identifier = %identifier, kind = %kind, "Skipping invalid identifier");
                skipped.push(identifier.clone());
            }
        }
    }
    (valid, skipped)
}

/// Slice `ids` into request batches sized by the batch plan
fn id_batches(ids: &[String], ceiling: usize) -> HarvestResult<Vec<&[String]>> {
    let plan = plan_batches(ids.len(), ceiling)?;
    let mut batches = Vec::with_capacity(plan.len());
    let mut rest = ids;
    for size in plan {
        if rest.is_empty() {
            break;
        }
        let (head, tail) = rest.split_at(size.min(rest.len()));
        batches.push(head);
        rest = tail;
    }
    batches.extend(rest.chunks(ceiling));
    Ok(batches)
}
