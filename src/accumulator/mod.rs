//! Response accumulation
//!
//! A [`ResponseAccumulator`] owns the category tables of one harvest run (or
//! one timeline target) and merges pages into them:
//!
//! - **Buffered**: rows are kept in memory, deduplicated by each table's key
//!   columns (first occurrence wins) and written once by
//!   [`ResponseAccumulator::flush`]
//! - **Streaming**: each page's rows are appended to the sink immediately and
//!   nothing is retained between pages
//!
//! A page is normalized completely before any table is touched, so a
//! malformed entity rejects the whole page and leaves earlier pages intact.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use crate::fetcher::Page;
use crate::metrics;
use crate::normalizer::{NormalizeError, RecordNormalizer};
use crate::output::{OutputError, TableSink};
use crate::query::{Expansion, FieldGroups, QueryMode, TweetField};
use crate::{Category, EntityKind, Record};

pub mod links;
pub mod targets;

pub use links::derive_links;
pub use targets::TargetAccumulators;

/// Accumulation errors
#[derive(Debug, thiserror::Error)]
pub enum AccumulateError {
    /// Page contained a malformed entity
    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    /// Sink write failed
    #[error("output error: {0}")]
    Output(#[from] OutputError),

    /// Merge attempted after the final flush
    #[error("accumulator already flushed")]
    AlreadyFlushed,
}

/// Result type for accumulation
pub type AccumulateResult<T> = Result<T, AccumulateError>;

/// How pages are merged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccumulationMode {
    /// Deduplicate in memory, write once at the end
    #[default]
    Buffered,
    /// Append every page as it arrives
    Streaming,
}

impl fmt::Display for AccumulationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccumulationMode::Buffered => f.write_str("buffered"),
            AccumulationMode::Streaming => f.write_str("streaming"),
        }
    }
}

impl FromStr for AccumulationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buffered" => Ok(AccumulationMode::Buffered),
            "streaming" | "append" => Ok(AccumulationMode::Streaming),
            _ => Err(format!(
                "Invalid accumulation mode: {s}. Valid options: buffered, streaming"
            )),
        }
    }
}

/// Which side tables a run produces, derived from the requested field groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TableSelection {
    /// `includes.tweets` as referenced tweets (tweet modes)
    pub refs: bool,
    /// `includes.users` as related profiles (tweet modes)
    pub users: bool,
    /// `includes.media`
    pub media: bool,
    /// Parent to referenced-tweet links
    pub links: bool,
    /// `includes.tweets` as pinned tweets (user mode)
    pub pinned_tweets: bool,
}

impl TableSelection {
    /// Selection implied by `fields` for queries of `mode`
    pub fn for_query(mode: QueryMode, fields: &FieldGroups) -> Self {
        if mode.primary_entity() == EntityKind::User {
            return Self {
                pinned_tweets: fields.has_expansion(Expansion::PinnedTweetId),
                ..Self::default()
            };
        }
        Self {
            refs: fields.has_expansion(Expansion::ReferencedTweetsId)
                || fields.has_expansion(Expansion::ReferencedTweetsIdAuthorId),
            users: [
                Expansion::AuthorId,
                Expansion::InReplyToUserId,
                Expansion::EntitiesMentionsUsername,
                Expansion::ReferencedTweetsIdAuthorId,
            ]
            .into_iter()
            .any(|e| fields.has_expansion(e)),
            media: fields.has_expansion(Expansion::AttachmentsMediaKeys),
            links: fields.has_tweet_field(TweetField::ReferencedTweets),
            pinned_tweets: false,
        }
    }

    /// Every side table enabled (tweet modes)
    pub fn all() -> Self {
        Self {
            refs: true,
            users: true,
            media: true,
            links: true,
            pinned_tweets: false,
        }
    }
}

/// Rows added by one merge, per table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Rows per category (after deduplication in buffered mode)
    pub rows: BTreeMap<Category, usize>,
    /// Primary entities on the page
    pub primary: usize,
}

impl MergeStats {
    /// Rows added across all tables
    pub fn total(&self) -> usize {
        self.rows.values().sum()
    }
}

#[derive(Debug, Default)]
struct Table {
    rows: Vec<Record>,
    keys: HashSet<String>,
}

impl Table {
    /// Insert rows whose key is new; returns how many were kept
    fn insert_unique(&mut self, category: Category, rows: Vec<Record>) -> usize {
        let before = self.rows.len();
        for row in rows {
            if self.keys.insert(row_key(category, &row)) {
                self.rows.push(row);
            }
        }
        self.rows.len() - before
    }
}

fn row_key(category: Category, row: &Record) -> String {
    category
        .key_columns()
        .iter()
        .map(|column| crate::output::cell_text(row.get(*column)))
        .collect::<Vec<_>>()
        .join("\u{1f}")
}

/// Merges pages into category tables and persists them
pub struct ResponseAccumulator {
    mode: AccumulationMode,
    primary: EntityKind,
    selection: TableSelection,
    normalizer: Box<dyn RecordNormalizer>,
    sink: Box<dyn TableSink>,
    tag: Option<(String, String)>,
    tables: BTreeMap<Category, Table>,
    totals: BTreeMap<Category, usize>,
    flushed: bool,
}

impl ResponseAccumulator {
    /// Create an accumulator for pages whose primary entities are `primary`
    pub fn new(
        mode: AccumulationMode,
        primary: EntityKind,
        selection: TableSelection,
        normalizer: Box<dyn RecordNormalizer>,
        sink: Box<dyn TableSink>,
    ) -> Self {
        Self {
            mode,
            primary,
            selection,
            normalizer,
            sink,
            tag: None,
            tables: BTreeMap::new(),
            totals: BTreeMap::new(),
            flushed: false,
        }
    }

    /// Add `column = value` to every primary row
    pub fn with_tag(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.tag = Some((column.into(), value.into()));
        self
    }

    /// Accumulation mode
    pub fn mode(&self) -> AccumulationMode {
        self.mode
    }

    /// Table of the primary entities
    pub fn primary_category(&self) -> Category {
        match self.primary {
            EntityKind::User => Category::Users,
            _ => Category::Tweets,
        }
    }

    /// Buffered rows of `category` (always empty in streaming mode and after
    /// the final flush)
    pub fn table(&self, category: Category) -> &[Record] {
        self.tables
            .get(&category)
            .map(|t| t.rows.as_slice())
            .unwrap_or(&[])
    }

    /// Rows merged into `category` so far (written rows in streaming mode)
    pub fn row_count(&self, category: Category) -> usize {
        self.totals.get(&category).copied().unwrap_or(0)
    }

    fn normalize_all(
        &self,
        kind: EntityKind,
        entities: &[serde_json::Value],
    ) -> AccumulateResult<Vec<Record>> {
        entities
            .iter()
            .map(|entity| self.normalizer.normalize(kind, entity).map_err(Into::into))
            .collect()
    }

    /// Normalize every table of `page` without touching state
    fn page_tables(&self, page: &Page) -> AccumulateResult<Vec<(Category, Vec<Record>)>> {
        let mut tables = Vec::new();

        let mut primary = self.normalize_all(self.primary, &page.data)?;
        if let Some((column, value)) = &self.tag {
            for row in &mut primary {
                row.insert(column.clone(), serde_json::Value::String(value.clone()));
            }
        }
        tables.push((self.primary_category(), primary));

        let includes = &page.includes;
        if self.primary == EntityKind::User {
            if self.selection.pinned_tweets && !includes.tweets.is_empty() {
                tables.push((
                    Category::Tweets,
                    self.normalize_all(EntityKind::Tweet, &includes.tweets)?,
                ));
            }
            return Ok(tables);
        }

        if self.selection.refs && !includes.tweets.is_empty() {
            tables.push((
                Category::Refs,
                self.normalize_all(EntityKind::Tweet, &includes.tweets)?,
            ));
        }
        if self.selection.users && !includes.users.is_empty() {
            tables.push((
                Category::Users,
                self.normalize_all(EntityKind::User, &includes.users)?,
            ));
        }
        if self.selection.media && !includes.media.is_empty() {
            tables.push((
                Category::Media,
                self.normalize_all(EntityKind::Media, &includes.media)?,
            ));
        }
        if self.selection.links {
            let links = derive_links(&page.data)?;
            if !links.is_empty() {
                tables.push((Category::RefLinks, links));
            }
        }
        Ok(tables)
    }

    /// Merge one page.
    ///
    /// # Errors
    /// A malformed entity rejects the page with no table changed. In streaming
    /// mode a sink failure is returned after earlier tables of the page were
    /// written.
    pub fn merge(&mut self, page: &Page) -> AccumulateResult<MergeStats> {
        if self.flushed {
            return Err(AccumulateError::AlreadyFlushed);
        }
        let tables = self.page_tables(page)?;
        let mut stats = MergeStats {
            primary: page.data.len(),
            ..MergeStats::default()
        };

        for (category, rows) in tables {
            if rows.is_empty() {
                continue;
            }
            let added = match self.mode {
                AccumulationMode::Buffered => self
                    .tables
                    .entry(category)
                    .or_default()
                    .insert_unique(category, rows),
                AccumulationMode::Streaming => {
                    self.sink.write_table(category, &rows, true)?;
                    rows.len()
                }
            };
            *self.totals.entry(category).or_default() += added;
            metrics::record_records(category.file_stem(), added);
            stats.rows.insert(category, added);
        }

        debug!(mode = %self.mode, rows = ?stats.rows, "Merged page");
        Ok(stats)
    }

    /// Write buffered tables and release them; idempotent, and a no-op in
    /// streaming mode.
    ///
    /// Row counts survive the flush. The tables are dropped even when a write
    /// fails, and the accumulator accepts no further pages.
    pub fn flush(&mut self) -> AccumulateResult<()> {
        if self.flushed {
            debug!("Accumulator already flushed");
            return Ok(());
        }
        self.flushed = true;
        let tables = std::mem::take(&mut self.tables);
        if self.mode == AccumulationMode::Buffered {
            for (category, table) in &tables {
                if table.rows.is_empty() {
                    continue;
                }
                self.sink.write_table(*category, &table.rows, false)?;
                info!(table = %category, rows = table.rows.len(), "Table written");
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ResponseAccumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseAccumulator")
            .field("mode", &self.mode)
            .field("primary", &self.primary)
            .field("selection", &self.selection)
            .field("totals", &self.totals)
            .field("flushed", &self.flushed)
            .finish()
    }
}
