//! Persistence contract for sources, articles and runs.
//!
//! The store is the only shared mutable state in the system and the sole
//! arbiter of the one-article-per-fingerprint rule: `create_article` must hold
//! under concurrent callers, independent of any earlier `exists` answer.

pub mod memory;
pub mod postgres;

use crate::types::{Article, Run, RunFinalization, Source, StoreError};
use async_trait::async_trait;
use uuid::Uuid;

pub use memory::InMemoryStore;
pub use postgres::PgArticleStore;

#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Sources with the active flag set. Order is unspecified.
    async fn list_active_sources(&self) -> Result<Vec<Source>, StoreError>;

    /// `Ok(false)` means the hash is definitely absent. A failed lookup is
    /// always `Err`, never a guess.
    async fn exists(&self, content_hash: &str) -> Result<bool, StoreError>;

    /// Inserts a new article; `Conflict` if its fingerprint or id is taken.
    async fn create_article(&self, article: &Article) -> Result<(), StoreError>;

    async fn create_run(&self, run: &Run) -> Result<(), StoreError>;

    /// Moves a running Run to its terminal state. Terminal runs are never
    /// touched again: a second finalization is `InvalidTransition`.
    async fn finalize_run(&self, id: Uuid, finalization: &RunFinalization) -> Result<Run, StoreError>;
}
