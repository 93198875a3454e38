use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::sync::{RunSummary, SourceCatalog, SyncOrchestrator, TargetCatalog};

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(RunSummary),
    Failed(String),
}

/// One finished sync run as reported by the API and the CLI.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: RunOutcome,
}

impl RunRecord {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RunOutcome::Completed(_))
    }
}

/// Owns both collaborators and makes sure at most one run is in flight.
pub struct SyncRunner {
    source: Arc<dyn SourceCatalog>,
    target: Arc<dyn TargetCatalog>,
    finished_threshold: f64,
    running: Mutex<()>,
    last_run: RwLock<Option<RunRecord>>,
}

impl SyncRunner {
    pub fn new(
        source: Arc<dyn SourceCatalog>,
        target: Arc<dyn TargetCatalog>,
        finished_threshold: f64,
    ) -> Self {
        Self {
            source,
            target,
            finished_threshold,
            running: Mutex::new(()),
            last_run: RwLock::new(None),
        }
    }

    pub fn last_run(&self) -> Option<RunRecord> {
        self.last_run.read().ok().and_then(|guard| guard.clone())
    }

    /// Wait for any in-flight run, then run.
    pub async fn run(&self) -> RunRecord {
        let _guard = self.running.lock().await;
        self.run_locked().await
    }

    /// Run unless another run is in flight, in which case `None`.
    pub async fn try_run(&self) -> Option<RunRecord> {
        let Ok(_guard) = self.running.try_lock() else {
            tracing::info!("sync already in progress");
            return None;
        };
        Some(self.run_locked().await)
    }

    async fn run_locked(&self) -> RunRecord {
        let started_at = Utc::now();
        tracing::info!(%started_at, "starting sync run");
        let orchestrator = SyncOrchestrator::new(
            self.source.as_ref(),
            self.target.as_ref(),
            self.finished_threshold,
        );
        let outcome = match orchestrator.run().await {
            Ok(summary) => RunOutcome::Completed(summary),
            Err(e) => {
                tracing::error!(error = %e, "sync run failed");
                RunOutcome::Failed(e.to_string())
            }
        };
        let record = RunRecord {
            started_at,
            finished_at: Utc::now(),
            outcome,
        };
        if let Ok(mut guard) = self.last_run.write() {
            *guard = Some(record.clone());
        }
        record
    }
}
