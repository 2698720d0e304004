//! Query descriptors and API field groups
//!
//! A [`QueryDescriptor`] pairs one [`QueryTarget`] (what to harvest) with the
//! [`FieldGroups`] requested from the API. Field groups are validated against
//! the endpoint family of the target mode when the descriptor is built, using
//! a configurable [`FieldPolicy`].
//!
//! Field and expansion names follow the v2 API reference:
//! <https://developer.twitter.com/en/docs/twitter-api/fields>

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::harvester::config::{
    MAX_LOOKUP_BATCH, MAX_SEARCH_PAGE, MAX_TIMELINE_PAGE, MIN_BATCH_SIZE, MIN_TIMELINE_PAGE,
};
use crate::resolver::IdentifierKind;
use crate::EntityKind;

/// Query construction errors
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// A field group value the API does not know
    #[error("unknown {group} value: {value}")]
    UnknownField {
        /// Field group name
        group: &'static str,
        /// Offending value
        value: String,
    },

    /// A field group the target mode's endpoint does not support
    #[error("{group} '{value}' is not supported by {mode} queries")]
    UnsupportedFieldGroup {
        /// Field group name
        group: &'static str,
        /// Offending value
        value: String,
        /// Query mode being validated
        mode: QueryMode,
    },

    /// Mode-specific parameter out of range or missing
    #[error("invalid query parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for query construction
pub type QueryResult<T> = Result<T, QueryError>;

macro_rules! field_enum {
    ($(#[$meta:meta])* $name:ident, $group:literal { $($variant:ident => $value:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[doc = concat!("`", $value, "`")]
                #[serde(rename = $value)]
                $variant,
            )+
        }

        impl $name {
            /// Every value of this group, in API reference order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Name of the value on the wire
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $value,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = QueryError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($value => Ok($name::$variant),)+
                    _ => Err(QueryError::UnknownField {
                        group: $group,
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

field_enum! {
    /// Expansions that pull related objects into the `includes` side tables
    Expansion, "expansion" {
        AttachmentsPollIds => "attachments.poll_ids",
        AttachmentsMediaKeys => "attachments.media_keys",
        AuthorId => "author_id",
        EntitiesMentionsUsername => "entities.mentions.username",
        GeoPlaceId => "geo.place_id",
        InReplyToUserId => "in_reply_to_user_id",
        ReferencedTweetsId => "referenced_tweets.id",
        ReferencedTweetsIdAuthorId => "referenced_tweets.id.author_id",
        PinnedTweetId => "pinned_tweet_id",
    }
}

field_enum! {
    /// Tweet object fields
    TweetField, "tweet field" {
        Attachments => "attachments",
        AuthorId => "author_id",
        ContextAnnotations => "context_annotations",
        ConversationId => "conversation_id",
        CreatedAt => "created_at",
        Entities => "entities",
        Geo => "geo",
        Id => "id",
        InReplyToUserId => "in_reply_to_user_id",
        Lang => "lang",
        NonPublicMetrics => "non_public_metrics",
        PublicMetrics => "public_metrics",
        OrganicMetrics => "organic_metrics",
        PromotedMetrics => "promoted_metrics",
        PossiblySensitive => "possibly_sensitive",
        ReferencedTweets => "referenced_tweets",
        ReplySettings => "reply_settings",
        Source => "source",
        Text => "text",
        Withheld => "withheld",
    }
}

field_enum! {
    /// User object fields
    UserField, "user field" {
        CreatedAt => "created_at",
        Description => "description",
        Entities => "entities",
        Id => "id",
        Location => "location",
        Name => "name",
        PinnedTweetId => "pinned_tweet_id",
        ProfileImageUrl => "profile_image_url",
        Protected => "protected",
        PublicMetrics => "public_metrics",
        Url => "url",
        Username => "username",
        Verified => "verified",
        Withheld => "withheld",
    }
}

field_enum! {
    /// Media object fields
    MediaField, "media field" {
        DurationMs => "duration_ms",
        Height => "height",
        MediaKey => "media_key",
        PreviewImageUrl => "preview_image_url",
        Type => "type",
        Url => "url",
        Width => "width",
        PublicMetrics => "public_metrics",
        NonPublicMetrics => "non_public_metrics",
        OrganicMetrics => "organic_metrics",
        PromotedMetrics => "promoted_metrics",
    }
}

field_enum! {
    /// Place object fields
    PlaceField, "place field" {
        ContainedWithin => "contained_within",
        Country => "country",
        CountryCode => "country_code",
        FullName => "full_name",
        Geo => "geo",
        Id => "id",
        Name => "name",
        PlaceType => "place_type",
    }
}

field_enum! {
    /// Poll object fields
    PollField, "poll field" {
        DurationMinutes => "duration_minutes",
        EndDatetime => "end_datetime",
        Id => "id",
        Options => "options",
        VotingStatus => "voting_status",
    }
}

/// Tweet fields requested when the configuration names none
pub const DEFAULT_TWEET_FIELDS: &[TweetField] = &[
    TweetField::AuthorId,
    TweetField::ConversationId,
    TweetField::CreatedAt,
    TweetField::InReplyToUserId,
    TweetField::Lang,
    TweetField::PublicMetrics,
    TweetField::PossiblySensitive,
    TweetField::ReferencedTweets,
    TweetField::ReplySettings,
    TweetField::Source,
    TweetField::Text,
    TweetField::Withheld,
];

/// User fields requested when the configuration names none
pub const DEFAULT_USER_FIELDS: &[UserField] = &[
    UserField::CreatedAt,
    UserField::Description,
    UserField::Id,
    UserField::Name,
    UserField::PublicMetrics,
    UserField::Username,
    UserField::PinnedTweetId,
];

fn default_tweet_fields() -> Vec<TweetField> {
    DEFAULT_TWEET_FIELDS.to_vec()
}

fn default_user_fields() -> Vec<UserField> {
    DEFAULT_USER_FIELDS.to_vec()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

/// Accept either a single value or a list, as the YAML config allows both
fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}

/// Field groups requested from the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldGroups {
    /// Expansions populating the `includes` side tables
    #[serde(default, deserialize_with = "one_or_many")]
    pub expansions: Vec<Expansion>,
    /// Tweet fields
    #[serde(default = "default_tweet_fields", deserialize_with = "one_or_many")]
    pub tweet_fields: Vec<TweetField>,
    /// User fields
    #[serde(default = "default_user_fields", deserialize_with = "one_or_many")]
    pub user_fields: Vec<UserField>,
    /// Media fields
    #[serde(default, deserialize_with = "one_or_many")]
    pub media_fields: Vec<MediaField>,
    /// Place fields
    #[serde(default, deserialize_with = "one_or_many")]
    pub place_fields: Vec<PlaceField>,
    /// Poll fields
    #[serde(default, deserialize_with = "one_or_many")]
    pub poll_fields: Vec<PollField>,
}

impl Default for FieldGroups {
    fn default() -> Self {
        Self {
            expansions: Vec::new(),
            tweet_fields: default_tweet_fields(),
            user_fields: default_user_fields(),
            media_fields: Vec::new(),
            place_fields: Vec::new(),
            poll_fields: Vec::new(),
        }
    }
}

fn join<T: fmt::Display>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

impl FieldGroups {
    /// Whether the given expansion was requested
    pub fn has_expansion(&self, expansion: Expansion) -> bool {
        self.expansions.contains(&expansion)
    }

    /// Whether the given tweet field was requested
    pub fn has_tweet_field(&self, field: TweetField) -> bool {
        self.tweet_fields.contains(&field)
    }

    /// Query parameters for every non-empty group
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        let mut push = |key: &str, value: String| {
            if !value.is_empty() {
                params.push((key.to_string(), value));
            }
        };
        push("expansions", join(&self.expansions));
        push("tweet.fields", join(&self.tweet_fields));
        push("user.fields", join(&self.user_fields));
        push("media.fields", join(&self.media_fields));
        push("place.fields", join(&self.place_fields));
        push("poll.fields", join(&self.poll_fields));
        params
    }

    /// Restrict the groups to what `mode`'s endpoint supports.
    ///
    /// With [`FieldPolicy::Drop`] unsupported values are removed with a
    /// warning; with [`FieldPolicy::Reject`] the first one is an error.
    pub fn for_mode(&self, mode: QueryMode, policy: FieldPolicy) -> QueryResult<FieldGroups> {
        let mut groups = self.clone();

        let mut unsupported = Vec::new();
        groups.expansions.retain(|expansion| {
            let ok = mode.supports_expansion(*expansion);
            if !ok {
                unsupported.push(("expansion", expansion.to_string()));
            }
            ok
        });

        if mode.primary_entity() == EntityKind::User {
            unsupported.extend(
                groups
                    .media_fields
                    .drain(..)
                    .map(|f| ("media field", f.to_string())),
            );
            unsupported.extend(
                groups
                    .place_fields
                    .drain(..)
                    .map(|f| ("place field", f.to_string())),
            );
            unsupported.extend(
                groups
                    .poll_fields
                    .drain(..)
                    .map(|f| ("poll field", f.to_string())),
            );
        }

        match (policy, unsupported.into_iter().next()) {
            (FieldPolicy::Reject, Some((group, value))) => {
                Err(QueryError::UnsupportedFieldGroup { group, value, mode })
            }
            (FieldPolicy::Drop, Some(_)) => {
                warn!(
                    %mode,
                    "Dropping field groups not supported by this query mode"
                );
                Ok(groups)
            }
            (_, None) => Ok(groups),
        }
    }
}

/// What to do with field groups the target endpoint does not support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldPolicy {
    /// Remove unsupported values and log a warning
    #[default]
    Drop,
    /// Fail query construction
    Reject,
}

impl FromStr for FieldPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "drop" => Ok(FieldPolicy::Drop),
            "reject" => Ok(FieldPolicy::Reject),
            _ => Err(format!("Invalid field policy: {s}. Valid options: drop, reject")),
        }
    }
}

/// Query shapes supported by the harvester
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// Token-paginated timeline of one user
    Timeline,
    /// Keyword search over the full archive
    Search,
    /// Batched tweet lookup by id
    TweetLookup,
    /// Batched user lookup by handle or id
    UserLookup,
}

impl QueryMode {
    /// Entity type of the primary `data` list
    pub fn primary_entity(&self) -> EntityKind {
        match self {
            QueryMode::UserLookup => EntityKind::User,
            _ => EntityKind::Tweet,
        }
    }

    /// Whether the endpoint family of this mode accepts `expansion`
    pub fn supports_expansion(&self, expansion: Expansion) -> bool {
        match self.primary_entity() {
            EntityKind::User => expansion == Expansion::PinnedTweetId,
            _ => expansion != Expansion::PinnedTweetId,
        }
    }

    /// Short name used for run directories
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryMode::Timeline => "timeline",
            QueryMode::Search => "search",
            QueryMode::TweetLookup => "lookup",
            QueryMode::UserLookup => "users",
        }
    }
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional `[start, end]` time window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Inclusive lower bound
    pub start: Option<DateTime<Utc>>,
    /// Upper bound
    pub end: Option<DateTime<Utc>>,
}

impl TimeWindow {
    /// Create a window, rejecting `start >= end`
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> QueryResult<Self> {
        if let (Some(s), Some(e)) = (start, end) {
            if s >= e {
                return Err(QueryError::InvalidParameter(format!(
                    "start time ({s}) must be before end time ({e})"
                )));
            }
        }
        Ok(Self { start, end })
    }

    /// `start_time` / `end_time` request parameters
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(start) = self.start {
            params.push((
                "start_time".to_string(),
                start.to_rfc3339_opts(SecondsFormat::Secs, true),
            ));
        }
        if let Some(end) = self.end {
            params.push((
                "end_time".to_string(),
                end.to_rfc3339_opts(SecondsFormat::Secs, true),
            ));
        }
        params
    }
}

/// Mode-specific parameters of a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum QueryTarget {
    /// One user's timeline
    Timeline {
        /// Handle or numeric author id
        identifier: String,
        /// How `identifier` is interpreted
        kind: IdentifierKind,
        /// Time window
        window: TimeWindow,
        /// Tweets per page (5..=100)
        page_size: u32,
    },
    /// Full-archive keyword search
    Search {
        /// Search query string
        keyword: String,
        /// Time window
        window: TimeWindow,
        /// Total tweets to collect
        max_results: usize,
        /// Per-request ceiling (10..=500)
        batch_size: usize,
    },
    /// Tweets by id
    TweetLookup {
        /// Tweet ids
        ids: Vec<String>,
        /// Ids per request (10..=100)
        batch_size: usize,
    },
    /// Users by handle or id
    UserLookup {
        /// Handles or ids
        identifiers: Vec<String>,
        /// How `identifiers` are interpreted
        kind: IdentifierKind,
        /// Identifiers per request (10..=100)
        batch_size: usize,
    },
}

impl QueryTarget {
    /// Mode of this target
    pub fn mode(&self) -> QueryMode {
        match self {
            QueryTarget::Timeline { .. } => QueryMode::Timeline,
            QueryTarget::Search { .. } => QueryMode::Search,
            QueryTarget::TweetLookup { .. } => QueryMode::TweetLookup,
            QueryTarget::UserLookup { .. } => QueryMode::UserLookup,
        }
    }

    fn validate(&self) -> QueryResult<()> {
        let invalid = |msg: String| Err(QueryError::InvalidParameter(msg));
        match self {
            QueryTarget::Timeline {
                identifier,
                page_size,
                ..
            } => {
                if identifier.trim().is_empty() {
                    return invalid("timeline identifier cannot be empty".to_string());
                }
                if !(MIN_TIMELINE_PAGE..=MAX_TIMELINE_PAGE).contains(page_size) {
                    return invalid(format!(
                        "timeline page size {page_size} outside {MIN_TIMELINE_PAGE}..={MAX_TIMELINE_PAGE}"
                    ));
                }
            }
            QueryTarget::Search {
                keyword,
                max_results,
                batch_size,
                ..
            } => {
                if keyword.trim().is_empty() {
                    return invalid("search query cannot be empty".to_string());
                }
                if *max_results == 0 {
                    return invalid("max_results must be at least 1".to_string());
                }
                if !(MIN_BATCH_SIZE..=MAX_SEARCH_PAGE).contains(batch_size) {
                    return invalid(format!(
                        "search batch size {batch_size} outside {MIN_BATCH_SIZE}..={MAX_SEARCH_PAGE}"
                    ));
                }
            }
            QueryTarget::TweetLookup { batch_size, .. }
            | QueryTarget::UserLookup { batch_size, .. } => {
                if !(MIN_BATCH_SIZE..=MAX_LOOKUP_BATCH).contains(batch_size) {
                    return invalid(format!(
                        "lookup batch size {batch_size} outside {MIN_BATCH_SIZE}..={MAX_LOOKUP_BATCH}"
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Immutable, validated query: target plus the field groups its mode supports
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryDescriptor {
    target: QueryTarget,
    fields: FieldGroups,
}

impl QueryDescriptor {
    /// Validate `target` and restrict `fields` to its mode under `policy`
    pub fn new(target: QueryTarget, fields: &FieldGroups, policy: FieldPolicy) -> QueryResult<Self> {
        target.validate()?;
        let fields = fields.for_mode(target.mode(), policy)?;
        Ok(Self { target, fields })
    }

    /// Query mode
    pub fn mode(&self) -> QueryMode {
        self.target.mode()
    }

    /// Mode-specific parameters
    pub fn target(&self) -> &QueryTarget {
        &self.target
    }

    /// Validated field groups
    pub fn fields(&self) -> &FieldGroups {
        &self.fields
    }
}
