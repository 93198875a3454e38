use std::collections::HashSet;

use super::cache::RunCache;
use super::matcher::IdentityMatcher;
use super::reconciler::{ProgressReconciler, ReconcileOutcome};
use super::{SourceCatalog, TargetCatalog};
use crate::domain::mapping::normalize_book;
use crate::domain::models::{NormalizedBook, SourceProgressRecord};
use crate::error::{MappingError, SyncError};

/// Outcome counts of one run. `not_found + updated + skipped + errors`
/// always equals the number of distinct books processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub not_found: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
    /// Books whose detail came from the fallback stand-in
    pub degraded: usize,
    pub duplicates: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Updated => self.updated += 1,
            ReconcileOutcome::Skipped => self.skipped += 1,
            ReconcileOutcome::NotFound => self.not_found += 1,
            ReconcileOutcome::Error => self.errors += 1,
        }
    }

    pub fn processed(&self) -> usize {
        self.not_found + self.updated + self.skipped + self.errors
    }
}

/// Drives every in-progress Audiobookshelf book through matching and
/// reconciliation, one book at a time.
pub struct SyncOrchestrator<'a> {
    source: &'a dyn SourceCatalog,
    target: &'a dyn TargetCatalog,
    finished_threshold: f64,
}

impl<'a> SyncOrchestrator<'a> {
    pub fn new(
        source: &'a dyn SourceCatalog,
        target: &'a dyn TargetCatalog,
        finished_threshold: f64,
    ) -> Self {
        Self {
            source,
            target,
            finished_threshold,
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn run(&self) -> Result<RunSummary, SyncError> {
        tracing::info!("starting sync between Audiobookshelf and Hardcover");

        let records = self
            .source
            .list_in_progress()
            .await
            .map_err(SyncError::SourceUnavailable)?;
        if records.is_empty() {
            tracing::warn!("no books in progress on Audiobookshelf, nothing to sync");
            return Ok(RunSummary::default());
        }
        tracing::info!(books = records.len(), "found books in progress");

        let mut cache = RunCache::new();
        if !self.target.validate_connection().await {
            return Err(SyncError::TargetConnection);
        }
        cache.target_user_id = self.target.user_id();
        self.prefetch_currently_reading(&mut cache).await;

        let mut summary = RunSummary::default();
        let mut seen = HashSet::new();
        for record in &records {
            if !seen.insert(record.book_id) {
                tracing::debug!(book_id = %record.book_id, "skipping duplicate book");
                summary.duplicates += 1;
                continue;
            }
            tracing::debug!(
                book_id = %record.book_id,
                last_update_ms = record.last_update_epoch_ms,
                "processing book"
            );

            let book = match self.normalized_book(record, &mut cache).await {
                Ok(book) => book,
                Err(e) => {
                    tracing::error!(book_id = %record.book_id, error = %e, "failed to read book details");
                    summary.errors += 1;
                    continue;
                }
            };
            if book.degraded {
                summary.degraded += 1;
            }

            match self.match_and_reconcile(&book, &cache).await {
                Ok(outcome) => summary.record(outcome),
                Err(e) => {
                    tracing::error!(book_id = %book.book_id, title = %book.title, error = %e, "error syncing book");
                    summary.errors += 1;
                }
            }
        }

        tracing::info!(
            updated = summary.updated,
            skipped = summary.skipped,
            not_found = summary.not_found,
            errors = summary.errors,
            degraded = summary.degraded,
            duplicates = summary.duplicates,
            "sync completed"
        );
        Ok(summary)
    }

    /// Best effort; on failure the cache keeps `None` and matching falls
    /// back to search.
    async fn prefetch_currently_reading(&self, cache: &mut RunCache) {
        if cache.currently_reading_fetched() {
            return;
        }
        match self
            .target
            .list_currently_reading(cache.target_user_id)
            .await
        {
            Ok(editions) => {
                tracing::info!(editions = editions.len(), "cached currently-reading editions");
                cache.set_currently_reading(Some(editions));
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to pre-fetch currently-reading editions");
                cache.set_currently_reading(None);
            }
        }
    }

    /// Derive the book once per run; later calls read the cached value.
    pub async fn normalized_book(
        &self,
        record: &SourceProgressRecord,
        cache: &mut RunCache,
    ) -> Result<NormalizedBook, MappingError> {
        if let Some(book) = cache.book(&record.book_id) {
            tracing::debug!(book_id = %record.book_id, "using cached book details");
            return Ok(book.clone());
        }

        let detail = self.source.fetch_book_detail(&record.book_id).await;
        if detail.degraded {
            tracing::warn!(book_id = %record.book_id, "book details unavailable, matching on partial data");
        }
        let book = normalize_book(&detail, record)?;
        Ok(cache.insert_book(book).clone())
    }

    async fn match_and_reconcile(
        &self,
        book: &NormalizedBook,
        cache: &RunCache,
    ) -> anyhow::Result<ReconcileOutcome> {
        tracing::info!(title = %book.title, "syncing book with Hardcover");

        let Some(found) = IdentityMatcher::new(self.target)
            .find(book, cache.currently_reading())
            .await?
        else {
            return Ok(ReconcileOutcome::NotFound);
        };
        tracing::info!(
            title = %book.title,
            edition_id = found.edition.edition_id,
            strategy = ?found.strategy,
            percent = book.progress.percent,
            "matched Hardcover edition"
        );
        if !found.edition.other_user_edition_ids.is_empty() {
            tracing::debug!(
                other_editions = ?found.edition.other_user_edition_ids,
                "book is also tracked under other editions"
            );
        }

        Ok(ProgressReconciler::new(self.target, self.finished_threshold)
            .reconcile(&found.edition, &book.progress, cache.target_user_id)
            .await)
    }
}
