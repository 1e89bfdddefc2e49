pub mod types;
pub mod config;
pub mod parser;
pub mod fetcher;
pub mod hasher;
pub mod store;
pub mod runs;
pub mod pacing;
pub mod orchestrator;

pub use types::*;
pub use config::IngestConfig;
pub use fetcher::{FeedFetcher, HttpFetcher};
pub use parser::FeedParser;
pub use hasher::{article_id, fingerprint, Deduplicator};
pub use store::{ArticleStore, InMemoryStore, PgArticleStore};
pub use runs::{ActiveRun, RunCounts, RunTracker};
pub use pacing::{Pacer, RateLimiter, Unpaced};
pub use orchestrator::{CancelSignal, Orchestrator, SweepOptions, SweepReport};
