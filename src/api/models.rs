use chrono::{DateTime, Utc};
use poem_openapi::{ApiResponse, Object, payload::Json};

use crate::runner::{RunOutcome, RunRecord};
use crate::sync::RunSummary;

#[derive(Debug, Clone, Object)]
pub struct RunSummaryDto {
    pub not_found: u64,
    pub updated: u64,
    pub skipped: u64,
    pub errors: u64,
    /// Books synced from a fallback detail because the item lookup failed
    pub degraded: u64,
    /// Repeated entries in the in-progress list that were ignored
    pub duplicates: u64,
    pub processed: u64,
}

impl From<RunSummary> for RunSummaryDto {
    fn from(s: RunSummary) -> Self {
        Self {
            not_found: s.not_found as u64,
            updated: s.updated as u64,
            skipped: s.skipped as u64,
            errors: s.errors as u64,
            degraded: s.degraded as u64,
            duplicates: s.duplicates as u64,
            processed: s.processed() as u64,
        }
    }
}

#[derive(Debug, Clone, Object)]
pub struct RunRecordDto {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// "completed" or "failed"
    pub status: String,
    pub summary: Option<RunSummaryDto>,
    pub error: Option<String>,
}

impl From<RunRecord> for RunRecordDto {
    fn from(r: RunRecord) -> Self {
        let (status, summary, error) = match r.outcome {
            RunOutcome::Completed(summary) => ("completed", Some(summary.into()), None),
            RunOutcome::Failed(message) => ("failed", None, Some(message)),
        };
        Self {
            started_at: r.started_at,
            finished_at: r.finished_at,
            status: status.to_string(),
            summary,
            error,
        }
    }
}

#[derive(Debug, Clone, Object)]
pub struct ErrorDto {
    /// Human-readable error message
    pub message: String,
}

#[derive(ApiResponse)]
pub enum LastRunResponse {
    /// Most recent run
    #[oai(status = 200)]
    Ok(Json<RunRecordDto>),

    /// No run has finished yet
    #[oai(status = 404)]
    NotFound(Json<ErrorDto>),
}

#[derive(ApiResponse)]
pub enum TriggerResponse {
    /// Run finished; per-book failures are in the summary
    #[oai(status = 200)]
    Ok(Json<RunRecordDto>),

    /// Another run is in progress
    #[oai(status = 409)]
    Conflict(Json<ErrorDto>),

    /// Audiobookshelf or Hardcover could not be reached
    #[oai(status = 502)]
    BadGateway(Json<RunRecordDto>),
}
