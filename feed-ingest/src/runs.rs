use crate::store::ArticleStore;
use crate::types::{IngestError, Run, RunFinalization, RunStatus, RunType, Source};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Per-cycle item tallies.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    pub found: u32,
    pub new: u32,
    pub duplicates: u32,
    pub skipped: u32,
}

fn clamp(n: u32) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

/// Opens Runs in the store. Finalization happens through the returned
/// [`ActiveRun`], which is consumed by it, so a Run cannot be finalized twice.
#[derive(Clone)]
pub struct RunTracker {
    store: Arc<dyn ArticleStore>,
}

impl RunTracker {
    pub fn new(store: Arc<dyn ArticleStore>) -> Self {
        Self { store }
    }

    pub async fn start(&self, source: &Source, run_type: RunType) -> Result<ActiveRun, IngestError> {
        let run = Run::start(source, run_type);
        self.store.create_run(&run).await.map_err(IngestError::RunTracking)?;
        debug!(run_id = %run.id, source = %source.name, run_type = %run_type, "Run started");

        Ok(ActiveRun {
            store: self.store.clone(),
            run,
            started: Instant::now(),
            counts: RunCounts::default(),
        })
    }
}

#[must_use = "a started run must be completed or failed"]
pub struct ActiveRun {
    store: Arc<dyn ArticleStore>,
    run: Run,
    started: Instant,
    counts: RunCounts,
}

impl ActiveRun {
    pub fn run(&self) -> &Run {
        &self.run
    }

    pub fn counts(&self) -> RunCounts {
        self.counts
    }

    pub fn record_found(&mut self) {
        self.counts.found += 1;
    }

    pub fn record_new(&mut self) {
        self.counts.new += 1;
    }

    pub fn record_duplicate(&mut self) {
        self.counts.duplicates += 1;
    }

    pub fn record_skipped(&mut self) {
        self.counts.skipped += 1;
    }

    pub async fn complete(self) -> Result<Run, IngestError> {
        self.finalize(RunStatus::Completed, None).await
    }

    /// Marks the cycle failed. Items already stored stay stored and counted.
    pub async fn fail(self, error: &IngestError) -> Result<Run, IngestError> {
        self.finalize(RunStatus::Failed, Some(error.to_string())).await
    }

    async fn finalize(self, status: RunStatus, error_message: Option<String>) -> Result<Run, IngestError> {
        let finalization = RunFinalization {
            status,
            found_count: clamp(self.counts.found),
            new_count: clamp(self.counts.new),
            duplicate_count: clamp(self.counts.duplicates),
            skipped_count: clamp(self.counts.skipped),
            error_message,
            completed_at: Utc::now(),
            duration_seconds: self.started.elapsed().as_secs_f64(),
        };

        match self.store.finalize_run(self.run.id, &finalization).await {
            Ok(run) => Ok(run),
            Err(e) => {
                warn!(run_id = %self.run.id, source = %self.run.source_name, error = %e, "Failed to finalize run");
                Err(IngestError::RunTracking(e))
            }
        }
    }
}
