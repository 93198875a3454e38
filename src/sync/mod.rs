// Reconciliation core: collaborator traits, run cache, matcher, reconciler, orchestrator

pub mod cache;
pub mod matcher;
pub mod orchestrator;
pub mod reconciler;
#[cfg(test)]
pub mod testing;

use uuid::Uuid;

use crate::domain::models::{
    BookDetail, ProgressWrite, ReadRecord, ReadingStatus, SourceProgressRecord, TargetEdition,
};

pub use orchestrator::{RunSummary, SyncOrchestrator};

/// Hardcover `query_type` for book searches
pub const BOOK_QUERY_TYPE: &str = "Book";

/// Where listening progress comes from (Audiobookshelf).
#[async_trait::async_trait]
pub trait SourceCatalog: Send + Sync {
    /// Books currently in progress. Implementations fail open on transport
    /// problems; an `Err` means the list could not be produced at all.
    async fn list_in_progress(&self) -> anyhow::Result<Vec<SourceProgressRecord>>;

    /// Never fails: on error a `BookDetail::fallback` stand-in is returned.
    async fn fetch_book_detail(&self, book_id: &Uuid) -> BookDetail;
}

/// Where progress is pushed to (Hardcover).
#[async_trait::async_trait]
pub trait TargetCatalog: Send + Sync {
    /// Check credentials and cache the acting user's id as a side effect.
    async fn validate_connection(&self) -> bool;

    /// User id cached by the last successful `validate_connection`.
    fn user_id(&self) -> Option<i64>;

    async fn search(
        &self,
        query: &str,
        kind: &str,
        per_page: u32,
        page: u32,
    ) -> anyhow::Result<Vec<TargetEdition>>;

    async fn fetch_read_record(
        &self,
        edition_id: i64,
        user_id: i64,
    ) -> anyhow::Result<Option<ReadRecord>>;

    async fn write_progress(&self, write: &ProgressWrite) -> anyhow::Result<bool>;

    async fn set_book_status(
        &self,
        user_book_id: i64,
        edition_id: i64,
        status: ReadingStatus,
    ) -> anyhow::Result<bool>;

    async fn list_currently_reading(
        &self,
        user_id: Option<i64>,
    ) -> anyhow::Result<Vec<TargetEdition>>;
}
