//! # Tweet Harvester Library
//!
//! Harvests posts, user profiles, reference graphs and media from the
//! paginated, rate-limited Twitter v2 API and persists them as tabular files.
//!
//! ## Features
//!
//! - **Three query shapes**: single-user timelines (continuation tokens),
//!   full-archive keyword search (planned batches) and batched id lookup
//!   (tweets or users)
//! - **Rate limiting**: per-endpoint minimum request spacing plus a bounded
//!   retry policy for transient server failures
//! - **Accumulation**: buffered (deduplicated, written once) or streaming
//!   (append-only, written per page) table sets
//! - **Output**: `data_<table>.csv` (all fields quoted) or table-oriented JSON
//!
//! ## Quick Start
//!
//! ```no_run
//! use tweet_harvester::config::{Credentials, HarvestOptions};
//! use tweet_harvester::fetcher::http::HttpTransport;
//! use tweet_harvester::harvester::Harvester;
//! use tweet_harvester::query::{FieldGroups, TimeWindow};
//! use tweet_harvester::resolver::IdentifierKind;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let credentials = Credentials::new("bearer-token");
//! let transport = HttpTransport::new("https://api.twitter.com", credentials)?;
//! let harvester = Harvester::new(
//!     Arc::new(transport),
//!     FieldGroups::default(),
//!     HarvestOptions::default(),
//! );
//!
//! let report = harvester
//!     .timelines(
//!         &["jack".to_string()],
//!         IdentifierKind::Handle,
//!         TimeWindow::default(),
//!         "./data/timeline".as_ref(),
//!     )
//!     .await?;
//! println!("{} targets completed", report.completed().len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`query`] - field groups, query modes and validated [`query::QueryDescriptor`]s
//! - [`resolver`] - handle to numeric id resolution
//! - [`fetcher`] - transport seam, rate-limited request executor, pagination driver
//! - [`harvester`] - batch planning and harvest-run orchestration
//! - [`normalizer`] - flattening raw API entities into table rows
//! - [`accumulator`] - merging pages into per-table record sets
//! - [`output`] - CSV and JSON table writers

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use std::fmt;

/// Response accumulation into table sets
pub mod accumulator;

/// CLI command implementations
pub mod cli;

/// YAML configuration and credentials
pub mod config;

/// Upstream API access
pub mod fetcher;

/// Harvest orchestration
pub mod harvester;

/// Observability metrics
pub mod metrics;

/// Record normalization
pub mod normalizer;

/// Table output writers
pub mod output;

/// Query descriptors and field groups
pub mod query;

/// Identifier resolution
pub mod resolver;

/// Cooperative cancellation
pub mod shutdown;

/// Target list loading
pub mod targets;

pub use accumulator::{AccumulationMode, ResponseAccumulator};
pub use harvester::Harvester;
pub use query::{QueryDescriptor, QueryMode};

/// One normalized table row: column name to scalar value
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Kind of raw API entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// Tweet object
    Tweet,
    /// User object
    User,
    /// Media object
    Media,
}

impl EntityKind {
    /// Field that uniquely identifies an entity of this kind
    pub fn key_field(&self) -> &'static str {
        match self {
            EntityKind::Tweet | EntityKind::User => "id",
            EntityKind::Media => "media_key",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityKind::Tweet => "tweet",
            EntityKind::User => "user",
            EntityKind::Media => "media",
        };
        f.write_str(s)
    }
}

/// Output table category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Primary tweets (or pinned tweets for user lookups)
    Tweets,
    /// User profiles
    Users,
    /// Referenced tweets from `includes`
    Refs,
    /// Media from `includes`
    Media,
    /// Parent to referenced tweet links
    RefLinks,
}

impl Category {
    /// Every category, in write order
    pub const ALL: [Category; 5] = [
        Category::Tweets,
        Category::Users,
        Category::Refs,
        Category::Media,
        Category::RefLinks,
    ];

    /// File stem: the output file is `data_<stem>.<format>`
    pub fn file_stem(&self) -> &'static str {
        match self {
            Category::Tweets => "tweets",
            Category::Users => "users",
            Category::Refs => "refs",
            Category::Media => "media",
            Category::RefLinks => "ref_links",
        }
    }

    /// Natural key columns used for deduplication
    pub fn key_columns(&self) -> &'static [&'static str] {
        match self {
            Category::Tweets | Category::Users | Category::Refs => &["id"],
            Category::Media => &["media_key"],
            Category::RefLinks => &["parent_id", "referenced_id", "relation_type"],
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_stem())
    }
}
