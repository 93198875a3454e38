// Mapping from ABS library item details to the normalized view the sync core works on

use chrono::{DateTime, NaiveDate};

use super::models::{
    BookDetail, MediaDetail, NormalizedBook, ProgressSnapshot, SourceProgressRecord,
};
use crate::error::MappingError;

pub const UNKNOWN_TITLE: &str = "Unknown Title";

/// Strip hyphens and whitespace, e.g. "978-0441013593" -> "9780441013593".
pub fn normalize_isbn(isbn: &str) -> String {
    isbn.chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .collect()
}

pub fn epoch_ms_to_date(ms: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(ms).map(|dt| dt.date_naive())
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn progress_fraction(record: &SourceProgressRecord) -> f64 {
    if record.progress_fraction > 0.0 {
        return record.progress_fraction;
    }
    if record.duration_seconds > 0.0 && record.current_time_seconds > 0.0 {
        return (record.current_time_seconds / record.duration_seconds).min(1.0);
    }
    0.0
}

/// Combine a library item detail with its playback record.
///
/// Fails only when the media discriminant is one we do not know how to read;
/// missing fields fall back to defaults.
pub fn normalize_book(
    detail: &BookDetail,
    record: &SourceProgressRecord,
) -> Result<NormalizedBook, MappingError> {
    let (title, authors, isbn, asin, media_duration) = match &detail.media {
        MediaDetail::Book {
            metadata,
            duration_seconds,
        } => {
            let authors: Vec<String> = if metadata.authors.is_empty() {
                non_empty(metadata.author_name.as_deref())
                    .into_iter()
                    .collect()
            } else {
                metadata
                    .authors
                    .iter()
                    .filter_map(|a| non_empty(Some(a)))
                    .collect()
            };
            (
                non_empty(metadata.title.as_deref()),
                authors,
                non_empty(metadata.isbn.as_deref())
                    .map(|i| normalize_isbn(&i))
                    .filter(|i| !i.is_empty()),
                non_empty(metadata.asin.as_deref()),
                *duration_seconds,
            )
        }
        MediaDetail::Podcast { metadata } => (
            non_empty(metadata.title.as_deref()),
            non_empty(metadata.author.as_deref()).into_iter().collect(),
            None,
            None,
            0.0,
        ),
        MediaDetail::Unrecognized(media_type) => {
            return Err(MappingError::UnrecognizedMediaType {
                book_id: detail.book_id,
                media_type: media_type.clone(),
            });
        }
    };

    let duration_seconds = if record.duration_seconds > 0.0 {
        record.duration_seconds
    } else {
        media_duration.max(0.0)
    };

    Ok(NormalizedBook {
        book_id: record.book_id,
        title: title.unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
        isbn,
        asin,
        authors,
        progress: ProgressSnapshot {
            percent: progress_fraction(record),
            current_time_seconds: record.current_time_seconds.max(0.0),
            duration_seconds,
            is_finished: record.is_finished,
            started_at: record.started_at_epoch_ms.and_then(epoch_ms_to_date),
            finished_at: record.finished_at_epoch_ms.and_then(epoch_ms_to_date),
        },
        degraded: detail.degraded,
    })
}
