use crate::fetcher::FeedFetcher;
use crate::hasher::{build_article, fingerprint, short_hash, Deduplicator};
use crate::pacing::Pacer;
use crate::runs::{ActiveRun, RunCounts, RunTracker};
use crate::store::ArticleStore;
use crate::types::{Article, IngestError, RawItem, Result, RunStatus, RunType, Source, StoreError};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SweepOptions {
    pub run_type: RunType,
    /// Sources processed at once. 1 keeps the sequential baseline.
    pub concurrency: usize,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            run_type: RunType::Scheduled,
            concurrency: 1,
        }
    }
}

/// Cooperative stop flag, checked before each source is started.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceOutcome {
    pub source_id: String,
    pub source_name: String,
    pub run_id: Option<Uuid>,
    pub status: RunStatus,
    pub counts: RunCounts,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub sources_total: usize,
    pub sources_processed: usize,
    pub sources_failed: usize,
    pub total_found: u64,
    pub total_new: u64,
    pub total_duplicates: u64,
    pub total_skipped: u64,
    pub cancelled: bool,
    pub outcomes: Vec<SourceOutcome>,
}

impl SweepReport {
    fn record(&mut self, outcome: SourceOutcome) {
        self.sources_processed += 1;
        if outcome.status == RunStatus::Failed {
            self.sources_failed += 1;
        }
        self.total_found += u64::from(outcome.counts.found);
        self.total_new += u64::from(outcome.counts.new);
        self.total_duplicates += u64::from(outcome.counts.duplicates);
        self.total_skipped += u64::from(outcome.counts.skipped);
        self.outcomes.push(outcome);
    }

    pub fn outcome_for(&self, source_id: &str) -> Option<&SourceOutcome> {
        self.outcomes.iter().find(|o| o.source_id == source_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    New(String),
    Duplicate,
    Skipped,
}

/// Drives a sweep: every active source gets one Run, failures stay inside
/// their own source, and totals are aggregated at the end.
pub struct Orchestrator {
    store: Arc<dyn ArticleStore>,
    fetcher: Arc<dyn FeedFetcher>,
    pacer: Arc<dyn Pacer>,
    dedup: Deduplicator,
    runs: RunTracker,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn ArticleStore>, fetcher: Arc<dyn FeedFetcher>, pacer: Arc<dyn Pacer>) -> Self {
        Self {
            dedup: Deduplicator::new(store.clone()),
            runs: RunTracker::new(store.clone()),
            store,
            fetcher,
            pacer,
        }
    }

    pub async fn run_sweep(&self, options: &SweepOptions) -> Result<SweepReport> {
        self.run_sweep_until(options, &CancelSignal::new()).await
    }

    /// Only a failure to list sources is an `Err`; everything past that point
    /// is reported in the [`SweepReport`].
    pub async fn run_sweep_until(&self, options: &SweepOptions, cancel: &CancelSignal) -> Result<SweepReport> {
        let sources = self
            .store
            .list_active_sources()
            .await
            .map_err(IngestError::SourcesUnavailable)?;

        info!(
            count = sources.len(),
            run_type = %options.run_type,
            concurrency = options.concurrency,
            "Starting sweep over active sources"
        );

        let mut report = SweepReport {
            sources_total: sources.len(),
            ..SweepReport::default()
        };

        let run_type = options.run_type;
        let outcomes: Vec<Option<SourceOutcome>> = stream::iter(sources)
            .map(move |source| async move {
                if cancel.is_cancelled() {
                    debug!(source = %source.name, "Sweep cancelled, not starting source");
                    return None;
                }
                Some(self.process_source(&source, run_type).await)
            })
            .buffer_unordered(options.concurrency.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                Some(outcome) => report.record(outcome),
                None => report.cancelled = true,
            }
        }

        info!(
            sources_processed = report.sources_processed,
            total_new_articles = report.total_new,
            duplicates = report.total_duplicates,
            errors = report.sources_failed,
            cancelled = report.cancelled,
            "Sweep completed"
        );

        Ok(report)
    }

    /// One full cycle for one source. Never returns an error: the result is
    /// recorded on the source's Run and in the outcome.
    pub async fn process_source(&self, source: &Source, run_type: RunType) -> SourceOutcome {
        if !source.has_feed() {
            let err = IngestError::NoFeedConfigured(source.name.clone());
            warn!(source = %source.name, "Source has no feed URL, skipping");
            return match self.runs.start(source, run_type).await {
                Ok(run) => self.fail_run(source, run, err).await,
                Err(e) => Self::untracked_failure(source, e),
            };
        }

        self.pacer.wait().await;

        let mut run = match self.runs.start(source, run_type).await {
            Ok(run) => run,
            Err(e) => {
                error!(source = %source.name, error = %e, "Could not open run, skipping source");
                return Self::untracked_failure(source, e);
            }
        };

        info!(source = %source.name, url = %source.feed_url, "Scraping feed");

        let items = match self.fetcher.fetch(&source.feed_url).await {
            Ok(items) => items,
            Err(e) => {
                let err = IngestError::from(e);
                error!(source = %source.name, error = %err, "Failed to scrape source");
                return self.fail_run(source, run, err).await;
            }
        };

        for item in &items {
            self.process_item(source, item, &mut run).await;
        }

        let counts = run.counts();
        info!(
            source = %source.name,
            total_items = counts.found,
            new_articles = counts.new,
            duplicates = counts.duplicates,
            skipped = counts.skipped,
            "Feed scraping completed"
        );

        let run_id = run.run().id;
        match run.complete().await {
            Ok(finished) => SourceOutcome {
                source_id: source.id.clone(),
                source_name: source.name.clone(),
                run_id: Some(finished.id),
                status: finished.status,
                counts,
                error: None,
            },
            Err(e) => SourceOutcome {
                source_id: source.id.clone(),
                source_name: source.name.clone(),
                run_id: Some(run_id),
                status: RunStatus::Failed,
                counts,
                error: Some(e.to_string()),
            },
        }
    }

    async fn process_item(&self, source: &Source, item: &RawItem, run: &mut ActiveRun) -> ItemOutcome {
        run.record_found();
        let hash = fingerprint(item);

        match self.dedup.is_novel(&hash).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(
                    source = %source.name,
                    title = %item.title,
                    hash = short_hash(&hash),
                    "Article already exists, skipping"
                );
                run.record_duplicate();
                return ItemOutcome::Duplicate;
            }
            Err(e) => {
                warn!(
                    source = %source.name,
                    title = %item.title,
                    error = %e,
                    "Failed to check article existence, skipping"
                );
                run.record_skipped();
                return ItemOutcome::Skipped;
            }
        }

        let article = build_article(source, item, hash, Utc::now());

        match self.persist(&article).await {
            Ok(()) => {
                debug!(
                    source = %source.name,
                    article_id = %article.id,
                    title = %article.title,
                    hash = short_hash(&article.content_hash),
                    "New article saved"
                );
                run.record_new();
                ItemOutcome::New(article.id)
            }
            Err(IngestError::PersistConflict(id)) => {
                // Another writer got there between the check and the insert.
                debug!(source = %source.name, article_id = %id, "Article stored concurrently, counting as duplicate");
                run.record_duplicate();
                ItemOutcome::Duplicate
            }
            Err(e) => {
                error!(source = %source.name, title = %item.title, error = %e, "Failed to save article");
                run.record_skipped();
                ItemOutcome::Skipped
            }
        }
    }

    async fn persist(&self, article: &Article) -> Result<()> {
        self.store.create_article(article).await.map_err(|e| match e {
            StoreError::Conflict(_) => IngestError::PersistConflict(article.id.clone()),
            other => IngestError::PersistUnavailable(other),
        })
    }

    async fn fail_run(&self, source: &Source, run: ActiveRun, err: IngestError) -> SourceOutcome {
        let run_id = run.run().id;
        let counts = run.counts();
        let error = err.to_string();

        if let Err(e) = run.fail(&err).await {
            error!(source = %source.name, error = %e, "Could not record failed run");
        }

        SourceOutcome {
            source_id: source.id.clone(),
            source_name: source.name.clone(),
            run_id: Some(run_id),
            status: RunStatus::Failed,
            counts,
            error: Some(error),
        }
    }

    fn untracked_failure(source: &Source, err: IngestError) -> SourceOutcome {
        SourceOutcome {
            source_id: source.id.clone(),
            source_name: source.name.clone(),
            run_id: None,
            status: RunStatus::Failed,
            counts: RunCounts::default(),
            error: Some(err.to_string()),
        }
    }
}
