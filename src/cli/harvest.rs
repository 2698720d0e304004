//! Harvest command implementations

use chrono::{DateTime, Local, NaiveDate, Utc};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::{Cli, CliError, OutputFormat};
use crate::config::HarvestConfig;
use crate::fetcher::http::HttpTransport;
use crate::harvester::{Harvester, RunReport, TimelineReport};
use crate::query::{QueryMode, TimeWindow};
use crate::resolver::IdentifierKind;
use crate::shutdown::SharedShutdown;
use crate::targets::{read_column, TargetList, TargetListSource, DEFAULT_SKIP_COLUMN};

/// Run directory timestamp format
const RUN_DIR_FORMAT: &str = "%Y-%m-%d %H.%M.%S";

/// Try to parse datetime from RFC3339 format.
///
/// Inputs without a timezone designator are taken as UTC.
fn try_parse_datetime_rfc3339(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(&format!("{input}Z")) {
        return Some(dt.with_timezone(&Utc));
    }

    None
}

/// Parse a start time from YYYY-MM-DD (start of day, UTC) or RFC3339
fn parse_start_time_flexible(input: &str) -> Result<DateTime<Utc>, CliError> {
    if let Some(ts) = try_parse_datetime_rfc3339(input) {
        return Ok(ts);
    }

    let date = NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|e| CliError::InvalidArgument(format!("Invalid start time: {e}")))?;
    let datetime = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| CliError::InvalidArgument("Invalid start time".to_string()))?;
    Ok(datetime.and_utc())
}

/// Parse an end time from YYYY-MM-DD or RFC3339.
///
/// A bare date means the end of that day, so the date is fully included.
fn parse_end_time_flexible(input: &str) -> Result<DateTime<Utc>, CliError> {
    if let Some(ts) = try_parse_datetime_rfc3339(input) {
        return Ok(ts);
    }

    let date = NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|e| CliError::InvalidArgument(format!("Invalid end time: {e}")))?;
    let datetime = date
        .and_hms_opt(23, 59, 59)
        .ok_or_else(|| CliError::InvalidArgument("Invalid end time".to_string()))?;
    Ok(datetime.and_utc())
}

fn parse_window(start: Option<&str>, end: Option<&str>) -> Result<TimeWindow, CliError> {
    let start = start.map(parse_start_time_flexible).transpose()?;
    let end = end.map(parse_end_time_flexible).transpose()?;
    Ok(TimeWindow::new(start, end)?)
}

/// Create `<root>/<mode>/<timestamp>` for one run
pub fn create_run_dir(
    root: &Path,
    mode: QueryMode,
    now: DateTime<Local>,
) -> Result<PathBuf, CliError> {
    let dir = root
        .join(mode.as_str())
        .join(now.format(RUN_DIR_FORMAT).to_string());
    std::fs::create_dir_all(&dir)
        .map_err(|e| CliError::Io(format!("Failed to create run directory {}: {e}", dir.display())))?;
    info!(dir = %dir.display(), "Created run directory");
    Ok(dir)
}

/// Harvest targets given inline or through a CSV list
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Comma separated handles
    #[arg(long, value_delimiter = ',', conflicts_with_all = ["author_ids", "user_csv"])]
    pub handles: Vec<String>,

    /// Comma separated numeric author ids
    #[arg(long, value_delimiter = ',', conflicts_with = "user_csv")]
    pub author_ids: Vec<String>,

    /// CSV file listing the targets
    #[arg(long)]
    pub user_csv: Option<PathBuf>,

    /// Column of `--user-csv` holding handles
    #[arg(long, requires = "user_csv", conflicts_with = "author_id_column")]
    pub handle_column: Option<String>,

    /// Column of `--user-csv` holding numeric author ids
    #[arg(long, requires = "user_csv")]
    pub author_id_column: Option<String>,

    /// Leave out rows whose skip column is 1
    #[arg(long, requires = "user_csv")]
    pub use_skip: bool,

    /// Name of the skip column
    #[arg(long, default_value = DEFAULT_SKIP_COLUMN)]
    pub skip_column: String,
}

impl TargetArgs {
    fn list_source(&self) -> TargetListSource {
        TargetListSource {
            handle_column: self.handle_column.clone(),
            author_id_column: self.author_id_column.clone(),
            skip_column: self.use_skip.then(|| self.skip_column.clone()),
        }
    }

    /// How the targets are identified
    pub fn kind(&self) -> Result<IdentifierKind, CliError> {
        if !self.handles.is_empty() {
            Ok(IdentifierKind::Handle)
        } else if !self.author_ids.is_empty() {
            Ok(IdentifierKind::NumericId)
        } else if self.user_csv.is_some() {
            Ok(self.list_source().column()?.1)
        } else {
            Err(CliError::InvalidArgument(
                "no targets given: use --handles, --author-ids or --user-csv".to_string(),
            ))
        }
    }

    /// Resolve the argument combination into a target list
    pub fn load(&self) -> Result<TargetList, CliError> {
        let kind = self.kind()?;
        let identifiers = match &self.user_csv {
            Some(path) => self.list_source().read(path)?.identifiers,
            None if kind == IdentifierKind::Handle => self.handles.clone(),
            None => self.author_ids.clone(),
        };
        Ok(TargetList { kind, identifiers })
    }
}

/// Arguments for timeline harvests
#[derive(Args, Debug)]
pub struct TimelineArgs {
    /// Targets
    #[command(flatten)]
    pub targets: TargetArgs,

    /// Add the target identifier as a column of every tweet row
    #[arg(long)]
    pub output_user: bool,

    /// Start time (YYYY-MM-DD or RFC3339)
    #[arg(long)]
    pub start_time: Option<String>,

    /// End time (YYYY-MM-DD or RFC3339)
    #[arg(long)]
    pub end_time: Option<String>,
}

/// Arguments for full-archive search
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Search query
    #[arg(long)]
    pub query: String,

    /// Tweets to collect (the last batch may round up to the API minimum)
    #[arg(long, default_value = "100")]
    pub max_results: usize,

    /// Start time (YYYY-MM-DD or RFC3339)
    #[arg(long)]
    pub start_time: Option<String>,

    /// End time (YYYY-MM-DD or RFC3339)
    #[arg(long)]
    pub end_time: Option<String>,
}

/// Arguments for tweet lookup
#[derive(Args, Debug)]
pub struct LookupArgs {
    /// Comma separated tweet ids
    #[arg(long, value_delimiter = ',', conflicts_with = "id_csv")]
    pub ids: Vec<String>,

    /// CSV file listing tweet ids
    #[arg(long)]
    pub id_csv: Option<PathBuf>,

    /// Column of `--id-csv` holding the ids
    #[arg(long, default_value = "tweet_id")]
    pub id_column: String,
}

/// Arguments for user lookup
#[derive(Args, Debug)]
pub struct UsersArgs {
    /// Targets
    #[command(flatten)]
    pub targets: TargetArgs,
}

/// Configured harvester plus the CLI state around it
struct HarvestContext {
    harvester: Harvester,
    output_dir: PathBuf,
    output_format: OutputFormat,
    progress: ProgressBar,
}

impl HarvestContext {
    fn from_cli(cli: &Cli, shutdown: SharedShutdown, tag_target: bool) -> Result<Self, CliError> {
        let config = HarvestConfig::from_file(&cli.config)?;
        let mut options = config.options();
        if let Some(format) = cli.save_format {
            options.save_format = format;
        }
        if let Some(mode) = cli.accumulation {
            options.accumulation = mode;
        }
        options.tag_target = tag_target;
        options.validate()?;

        let transport = HttpTransport::new(options.base_url.clone(), config.credentials())?;
        let output_dir = cli
            .output_dir
            .clone()
            .unwrap_or_else(|| config.local.output_dir.clone());
        let progress = create_spinner();

        let harvester = Harvester::new(
            Arc::new(transport),
            config.twitter.query_params.clone(),
            options,
        )
        .with_shutdown(Some(shutdown))
        .with_progress(progress.clone());

        Ok(Self {
            harvester,
            output_dir,
            output_format: cli.output_format,
            progress,
        })
    }

    /// Create the run directory once the field groups are known to be usable
    fn run_dir(&self, mode: QueryMode) -> Result<PathBuf, CliError> {
        self.harvester.check_fields(mode)?;
        create_run_dir(&self.output_dir, mode, Local::now())
    }
}

impl TimelineArgs {
    /// Execute timeline harvest
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let window = parse_window(self.start_time.as_deref(), self.end_time.as_deref())?;
        let list = self.targets.load()?;
        if list.identifiers.is_empty() {
            return Err(CliError::InvalidArgument("target list is empty".to_string()));
        }

        let ctx = HarvestContext::from_cli(cli, shutdown, self.output_user)?;
        let run_dir = ctx.run_dir(QueryMode::Timeline)?;
        let result = ctx
            .harvester
            .timelines(&list.identifiers, list.kind, window, &run_dir)
            .await;
        ctx.progress.finish_and_clear();

        let report = result?;
        output_timeline(ctx.output_format, &report);
        if !report.targets.is_empty() && report.completed().is_empty() {
            return Err(CliError::AllTargetsFailed(report.targets.len()));
        }
        Ok(())
    }
}

impl SearchArgs {
    /// Execute full-archive search
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let window = parse_window(self.start_time.as_deref(), self.end_time.as_deref())?;
        let ctx = HarvestContext::from_cli(cli, shutdown, false)?;
        let run_dir = ctx.run_dir(QueryMode::Search)?;

        let result = ctx
            .harvester
            .search(&self.query, window, self.max_results, &run_dir)
            .await;
        ctx.progress.finish_and_clear();

        output_run(ctx.output_format, &result?);
        Ok(())
    }
}

impl LookupArgs {
    /// Execute tweet lookup
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let ids = match &self.id_csv {
            Some(path) => read_column(path, &self.id_column)?,
            None => self.ids.clone(),
        };
        if ids.is_empty() {
            return Err(CliError::InvalidArgument(
                "no tweet ids given: use --ids or --id-csv".to_string(),
            ));
        }

        let ctx = HarvestContext::from_cli(cli, shutdown, false)?;
        let run_dir = ctx.run_dir(QueryMode::TweetLookup)?;
        let result = ctx.harvester.lookup_tweets(&ids, &run_dir).await;
        ctx.progress.finish_and_clear();

        output_run(ctx.output_format, &result?);
        Ok(())
    }
}

impl UsersArgs {
    /// Execute user lookup
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let list = self.targets.load()?;
        if list.identifiers.is_empty() {
            return Err(CliError::InvalidArgument("target list is empty".to_string()));
        }

        let ctx = HarvestContext::from_cli(cli, shutdown, false)?;
        let run_dir = ctx.run_dir(QueryMode::UserLookup)?;
        let result = ctx
            .harvester
            .lookup_users(&list.identifiers, list.kind, &run_dir)
            .await;
        ctx.progress.finish_and_clear();

        output_run(ctx.output_format, &result?);
        Ok(())
    }
}

fn run_json(report: &RunReport) -> serde_json::Value {
    serde_json::to_value(report).unwrap_or_else(|e| json!({ "error": e.to_string() }))
}

fn output_run(format: OutputFormat, report: &RunReport) {
    match format {
        OutputFormat::Json => println!("{}", run_json(report)),
        OutputFormat::Human => {
            println!("\n{} harvest completed", report.mode);
            println!("Output: {}", report.output_dir.display());
            for (category, rows) in &report.rows {
                println!("  {category}: {rows} rows");
            }
            println!(
                "Requests: {} (empty {}, failed {})",
                report.pagination.requests,
                report.pagination.empty_pages,
                report.pagination.failed_pages
            );
            if !report.skipped.is_empty() {
                println!("Skipped identifiers: {}", report.skipped.join(", "));
            }
            if report.pagination.cancelled {
                println!("Stopped early by shutdown request");
            }
        }
    }
}

fn output_timeline(format: OutputFormat, report: &TimelineReport) {
    match format {
        OutputFormat::Json => {
            let targets: Vec<_> = report
                .targets
                .iter()
                .map(|t| match &t.result {
                    Ok(run) => json!({
                        "identifier": t.identifier,
                        "success": true,
                        "report": run_json(run),
                    }),
                    Err(e) => json!({
                        "identifier": t.identifier,
                        "success": false,
                        "error": e.to_string(),
                    }),
                })
                .collect();
            println!(
                "{}",
                json!({ "targets": targets, "cancelled": report.cancelled })
            );
        }
        OutputFormat::Human => {
            println!(
                "\nTimeline harvest: {} completed, {} failed",
                report.completed().len(),
                report.failed().len()
            );
            for target in &report.targets {
                match &target.result {
                    Ok(run) => println!("  {}: {} rows", target.identifier, run.total_rows()),
                    Err(e) => {
                        eprintln!("  {}: failed: {e}", target.identifier);
                        warn!(target = %target.identifier, error = %e, "Target failed");
                    }
                }
            }
            if report.cancelled {
                println!("Stopped early by shutdown request");
            }
        }
    }
}

/// Spinner showing the current target and its merged row count
fn create_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    match ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}: {pos} records") {
        Ok(style) => pb.set_style(style),
        Err(e) => warn!(error = %e, "Invalid spinner template, using default"),
    }
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}
