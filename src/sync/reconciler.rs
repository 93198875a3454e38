use super::TargetCatalog;
use crate::domain::models::{ProgressSnapshot, ProgressWrite, ReadingStatus, TargetEdition};

pub const DEFAULT_FINISHED_THRESHOLD: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Updated,
    Skipped,
    NotFound,
    Error,
}

/// Whether a written position counts as finishing the edition.
pub fn crosses_finished_threshold(
    progress_seconds: i64,
    audio_duration_seconds: i64,
    threshold: f64,
) -> bool {
    if audio_duration_seconds <= 0 {
        return false;
    }
    progress_seconds as f64 / audio_duration_seconds as f64 >= threshold
}

/// Pushes one book's position to its matched Hardcover edition.
///
/// Always reads the current read-record first and never writes when the
/// rounded position is unchanged, so repeating a run is harmless.
pub struct ProgressReconciler<'a> {
    target: &'a dyn TargetCatalog,
    finished_threshold: f64,
}

impl<'a> ProgressReconciler<'a> {
    pub fn new(target: &'a dyn TargetCatalog, finished_threshold: f64) -> Self {
        Self {
            target,
            finished_threshold,
        }
    }

    async fn resolve_user_id(&self, user_id: Option<i64>) -> Option<i64> {
        if let Some(id) = user_id.or_else(|| self.target.user_id()) {
            return Some(id);
        }
        tracing::debug!("no Hardcover user id cached, validating connection");
        if self.target.validate_connection().await {
            self.target.user_id()
        } else {
            None
        }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(edition_id = matched.edition_id))]
    pub async fn reconcile(
        &self,
        matched: &TargetEdition,
        progress: &ProgressSnapshot,
        user_id: Option<i64>,
    ) -> ReconcileOutcome {
        let Some(user_id) = self.resolve_user_id(user_id).await else {
            tracing::error!("no Hardcover user id available, cannot update progress");
            return ReconcileOutcome::Error;
        };

        let record = match self
            .target
            .fetch_read_record(matched.edition_id, user_id)
            .await
        {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::warn!(
                    edition_id = matched.edition_id,
                    "no read record on Hardcover; mark the book as currently reading first"
                );
                return ReconcileOutcome::NotFound;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to fetch read record");
                return ReconcileOutcome::Error;
            }
        };

        let rounded = progress.current_time_seconds.round() as i64;
        let current = record.progress_seconds.unwrap_or(0);
        if current == rounded {
            tracing::info!(
                edition_id = matched.edition_id,
                progress_seconds = rounded,
                "progress unchanged, skipping"
            );
            return ReconcileOutcome::Skipped;
        }

        let write = ProgressWrite {
            read_record_id: record.read_record_id,
            edition_id: matched.edition_id,
            progress_seconds: rounded,
            started_at: progress.started_at.or(record.started_at),
            finished_at: progress.finished_at.or(record.finished_at),
        };
        match self.target.write_progress(&write).await {
            Ok(true) => {
                tracing::info!(
                    edition_id = matched.edition_id,
                    from = current,
                    to = rounded,
                    "updated Hardcover progress"
                );
            }
            Ok(false) => {
                tracing::error!(edition_id = matched.edition_id, "Hardcover rejected progress update");
                return ReconcileOutcome::Error;
            }
            Err(e) => {
                tracing::error!(edition_id = matched.edition_id, error = %e, "progress update failed");
                return ReconcileOutcome::Error;
            }
        }

        if progress.is_finished
            || crosses_finished_threshold(
                rounded,
                matched.audio_duration_seconds,
                self.finished_threshold,
            )
        {
            self.mark_finished(matched).await;
        }

        ReconcileOutcome::Updated
    }

    /// Best effort: a failure here leaves the update itself standing.
    async fn mark_finished(&self, matched: &TargetEdition) {
        match self
            .target
            .set_book_status(matched.user_book_id, matched.edition_id, ReadingStatus::Read)
            .await
        {
            Ok(true) => tracing::info!(
                edition_id = matched.edition_id,
                user_book_id = matched.user_book_id,
                "marked book as finished"
            ),
            Ok(false) => tracing::warn!(
                edition_id = matched.edition_id,
                "Hardcover rejected finished status"
            ),
            Err(e) => tracing::warn!(
                edition_id = matched.edition_id,
                error = %e,
                "failed to mark book as finished"
            ),
        }
    }
}
