use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// A tracked feed. Owned by administrative tooling; the ingestion core only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub name: String,
    pub feed_url: String,
    pub active: bool,
    pub last_scraped_at: Option<DateTime<Utc>>,
}

impl Source {
    pub fn new(id: impl Into<String>, name: impl Into<String>, feed_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            feed_url: feed_url.into(),
            active: true,
            last_scraped_at: None,
        }
    }

    pub fn has_feed(&self) -> bool {
        !self.feed_url.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Rss,
    Web,
    Manual,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Rss => "rss",
            SourceType::Web => "web",
            SourceType::Manual => "manual",
        }
    }
}

/// One ingested content item.
///
/// `processed`, `classification` and `top_entities` belong to the downstream
/// classifier; ingestion only ever writes their initial values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub source_id: String,
    pub source_name: String,
    pub url: String,
    pub title: String,
    pub content: String,
    pub published_at: Option<DateTime<Utc>>,
    pub scraped_at: DateTime<Utc>,
    pub source_type: SourceType,
    pub content_hash: String,
    pub word_count: i32,
    pub language: String,
    pub processed: bool,
    pub classification: Option<serde_json::Value>,
    pub top_entities: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunType {
    Scheduled,
    Manual,
    Retry,
}

impl RunType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunType::Scheduled => "scheduled",
            RunType::Manual => "manual",
            RunType::Retry => "retry",
        }
    }
}

impl fmt::Display for RunType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "scheduled" => Ok(RunType::Scheduled),
            "manual" => Ok(RunType::Manual),
            "retry" => Ok(RunType::Retry),
            other => Err(format!("unknown run type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status: {}", other)),
        }
    }
}

/// Bookkeeping for one ingestion cycle against one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub source_id: String,
    pub source_name: String,
    pub run_type: RunType,
    pub status: RunStatus,
    pub found_count: i32,
    pub new_count: i32,
    pub duplicate_count: i32,
    pub skipped_count: i32,
    pub processed_count: i32,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: f64,
}

impl Run {
    pub fn start(source: &Source, run_type: RunType) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_id: source.id.clone(),
            source_name: source.name.clone(),
            run_type,
            status: RunStatus::Running,
            found_count: 0,
            new_count: 0,
            duplicate_count: 0,
            skipped_count: 0,
            processed_count: 0,
            error_message: None,
            started_at: Utc::now(),
            completed_at: None,
            duration_seconds: 0.0,
        }
    }
}

/// Terminal state written onto a running Run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunFinalization {
    pub status: RunStatus,
    pub found_count: i32,
    pub new_count: i32,
    pub duplicate_count: i32,
    pub skipped_count: i32,
    pub error_message: Option<String>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
}

/// A feed entry as it comes off the wire, before fingerprinting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawItem {
    pub link: String,
    pub title: String,
    pub content: String,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_feed_size_mb: usize,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "feed-ingest/0.1".to_string(),
            timeout_seconds: 30,
            max_feed_size_mb: 10,
            max_redirects: 5,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Source-level retrieval failures. Each one fails only its own source's Run.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("feed unreachable: {0}")]
    Unreachable(String),

    #[error("feed request timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed feed: {0}")]
    MalformedFeed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("run {id} is already {status}")]
    InvalidTransition { id: Uuid, status: RunStatus },

    #[error("run not found: {0}")]
    RunNotFound(Uuid),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(db.message().to_string()),
            _ => StoreError::Unavailable(e.to_string()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("no feed URL configured for source {0}")]
    NoFeedConfigured(String),

    #[error("duplicate check unavailable: {0}")]
    DuplicateCheckUnavailable(StoreError),

    #[error("article {0} conflicts with an existing record")]
    PersistConflict(String),

    #[error("could not persist article: {0}")]
    PersistUnavailable(StoreError),

    #[error("could not connect to store: {0}")]
    Connect(StoreError),

    #[error("failed to enumerate active sources: {0}")]
    SourcesUnavailable(StoreError),

    #[error("run bookkeeping failed: {0}")]
    RunTracking(StoreError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

pub type Result<T> = std::result::Result<T, IngestError>;
