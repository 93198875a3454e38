// Domain models shared by the source/target clients and the sync core

use chrono::NaiveDate;
use uuid::Uuid;

/// One book's playback state as reported by Audiobookshelf.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceProgressRecord {
    pub book_id: Uuid,
    pub current_time_seconds: f64,
    pub duration_seconds: f64,
    /// 0.0 - 1.0 fraction, 0 when the server did not supply one
    pub progress_fraction: f64,
    pub is_finished: bool,
    pub last_update_epoch_ms: i64,
    pub started_at_epoch_ms: Option<i64>,
    pub finished_at_epoch_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BookMetadataDetail {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub author_name: Option<String>,
    pub isbn: Option<String>,
    pub asin: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PodcastMetadataDetail {
    pub title: Option<String>,
    pub author: Option<String>,
}

/// Media payload of a library item, discriminated by the server's `mediaType`.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaDetail {
    Book {
        metadata: BookMetadataDetail,
        duration_seconds: f64,
    },
    Podcast {
        metadata: PodcastMetadataDetail,
    },
    Unrecognized(String),
}

/// Library item detail as handed to the core.
///
/// `degraded` is set when the detail fetch failed and this is a stand-in;
/// matching still runs on whatever partial data it holds.
#[derive(Debug, Clone, PartialEq)]
pub struct BookDetail {
    pub book_id: Uuid,
    pub media: MediaDetail,
    pub degraded: bool,
}

impl BookDetail {
    pub fn fallback(book_id: Uuid) -> Self {
        BookDetail {
            book_id,
            media: MediaDetail::Book {
                metadata: BookMetadataDetail::default(),
                duration_seconds: 0.0,
            },
            degraded: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// 0.0 - 1.0 fraction
    pub percent: f64,
    pub current_time_seconds: f64,
    pub duration_seconds: f64,
    pub is_finished: bool,
    pub started_at: Option<NaiveDate>,
    pub finished_at: Option<NaiveDate>,
}

/// Canonical identity + progress of one source book, derived once per run.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBook {
    pub book_id: Uuid,
    pub title: String,
    /// Hyphens and whitespace already stripped
    pub isbn: Option<String>,
    pub asin: Option<String>,
    pub authors: Vec<String>,
    pub progress: ProgressSnapshot,
    pub degraded: bool,
}

impl NormalizedBook {
    pub fn primary_author(&self) -> Option<&str> {
        self.authors
            .first()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
    }
}

/// One of the user's tracked editions on Hardcover.
///
/// `edition_id` and `user_book_id` live in different identity spaces; progress
/// writes need the former, status changes need both.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetEdition {
    pub edition_id: i64,
    pub user_book_id: i64,
    pub book_id: i64,
    pub title: String,
    pub isbn_10: Option<String>,
    pub isbn_13: Option<String>,
    pub asin: Option<String>,
    pub audio_duration_seconds: i64,
    pub other_user_edition_ids: Vec<i64>,
}

/// The mutable per-user, per-edition progress record on Hardcover.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadRecord {
    pub read_record_id: i64,
    pub progress_seconds: Option<i64>,
    pub started_at: Option<NaiveDate>,
    pub finished_at: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressWrite {
    pub read_record_id: i64,
    pub edition_id: i64,
    pub progress_seconds: i64,
    pub started_at: Option<NaiveDate>,
    pub finished_at: Option<NaiveDate>,
}

/// Hardcover `status_id` values for a user-book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingStatus {
    CurrentlyReading,
    Read,
}

impl ReadingStatus {
    pub fn status_id(self) -> i64 {
        match self {
            ReadingStatus::CurrentlyReading => 2,
            ReadingStatus::Read => 3,
        }
    }
}
