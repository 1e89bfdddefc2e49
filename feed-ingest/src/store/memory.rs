use super::ArticleStore;
use crate::types::{Article, Run, RunFinalization, Source, StoreError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct Articles {
    by_hash: HashMap<String, Article>,
    ids: HashSet<String>,
}

#[derive(Default)]
struct Faults {
    sources_unavailable: bool,
    exists_unavailable: HashSet<String>,
    create_unavailable: HashSet<String>,
    runs_unavailable: bool,
    finalize_unavailable: bool,
}

/// Process-local store. Uniqueness is enforced under a single lock, so
/// concurrent `create_article` calls for one fingerprint leave one record.
///
/// Failures can be injected per fingerprint to exercise the skip paths.
#[derive(Default)]
pub struct InMemoryStore {
    sources: RwLock<Vec<Source>>,
    articles: Mutex<Articles>,
    runs: Mutex<HashMap<Uuid, Run>>,
    faults: RwLock<Faults>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sources(sources: Vec<Source>) -> Self {
        Self {
            sources: RwLock::new(sources),
            ..Self::default()
        }
    }

    pub async fn add_source(&self, source: Source) {
        self.sources.write().await.push(source);
    }

    pub async fn articles(&self) -> Vec<Article> {
        let articles = self.articles.lock().await;
        let mut list: Vec<Article> = articles.by_hash.values().cloned().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    pub async fn article_count(&self) -> usize {
        self.articles.lock().await.by_hash.len()
    }

    pub async fn runs(&self) -> Vec<Run> {
        let runs = self.runs.lock().await;
        let mut list: Vec<Run> = runs.values().cloned().collect();
        list.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        list
    }

    pub async fn runs_for_source(&self, source_id: &str) -> Vec<Run> {
        self.runs()
            .await
            .into_iter()
            .filter(|r| r.source_id == source_id)
            .collect()
    }

    pub async fn set_sources_unavailable(&self, unavailable: bool) {
        self.faults.write().await.sources_unavailable = unavailable;
    }

    pub async fn fail_exists_for(&self, content_hash: impl Into<String>) {
        self.faults.write().await.exists_unavailable.insert(content_hash.into());
    }

    pub async fn fail_create_for(&self, content_hash: impl Into<String>) {
        self.faults.write().await.create_unavailable.insert(content_hash.into());
    }

    pub async fn set_runs_unavailable(&self, unavailable: bool) {
        self.faults.write().await.runs_unavailable = unavailable;
    }

    pub async fn set_finalize_unavailable(&self, unavailable: bool) {
        self.faults.write().await.finalize_unavailable = unavailable;
    }
}

#[async_trait]
impl ArticleStore for InMemoryStore {
    async fn list_active_sources(&self) -> Result<Vec<Source>, StoreError> {
        if self.faults.read().await.sources_unavailable {
            return Err(StoreError::Unavailable("sources collection offline".to_string()));
        }
        let sources = self.sources.read().await;
        Ok(sources.iter().filter(|s| s.active).cloned().collect())
    }

    async fn exists(&self, content_hash: &str) -> Result<bool, StoreError> {
        if self.faults.read().await.exists_unavailable.contains(content_hash) {
            return Err(StoreError::Unavailable(format!("lookup failed for {}", content_hash)));
        }
        Ok(self.articles.lock().await.by_hash.contains_key(content_hash))
    }

    async fn create_article(&self, article: &Article) -> Result<(), StoreError> {
        if self.faults.read().await.create_unavailable.contains(&article.content_hash) {
            return Err(StoreError::Unavailable(format!("write failed for {}", article.id)));
        }

        let mut articles = self.articles.lock().await;
        if articles.by_hash.contains_key(&article.content_hash) {
            return Err(StoreError::Conflict(format!("content_hash {}", article.content_hash)));
        }
        if articles.ids.contains(&article.id) {
            return Err(StoreError::Conflict(format!("id {}", article.id)));
        }

        articles.ids.insert(article.id.clone());
        articles.by_hash.insert(article.content_hash.clone(), article.clone());
        debug!(article_id = %article.id, "Stored article in memory");
        Ok(())
    }

    async fn create_run(&self, run: &Run) -> Result<(), StoreError> {
        if self.faults.read().await.runs_unavailable {
            return Err(StoreError::Unavailable("runs collection offline".to_string()));
        }
        let mut runs = self.runs.lock().await;
        if runs.contains_key(&run.id) {
            return Err(StoreError::Conflict(format!("run {}", run.id)));
        }
        runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn finalize_run(&self, id: Uuid, finalization: &RunFinalization) -> Result<Run, StoreError> {
        if self.faults.read().await.finalize_unavailable {
            return Err(StoreError::Unavailable("runs collection offline".to_string()));
        }
        let mut runs = self.runs.lock().await;
        let run = runs.get_mut(&id).ok_or(StoreError::RunNotFound(id))?;

        if run.status.is_terminal() {
            return Err(StoreError::InvalidTransition { id, status: run.status });
        }

        run.status = finalization.status;
        run.found_count = finalization.found_count;
        run.new_count = finalization.new_count;
        run.duplicate_count = finalization.duplicate_count;
        run.skipped_count = finalization.skipped_count;
        run.error_message = finalization.error_message.clone();
        run.completed_at = Some(finalization.completed_at);
        run.duration_seconds = finalization.duration_seconds;

        Ok(run.clone())
    }
}
