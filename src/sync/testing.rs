// In-memory collaborators for exercising the sync core in tests

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use anyhow::anyhow;
use uuid::Uuid;

use super::{SourceCatalog, TargetCatalog};
use crate::domain::models::{
    BookDetail, BookMetadataDetail, MediaDetail, NormalizedBook, ProgressSnapshot, ProgressWrite,
    ReadRecord, ReadingStatus, SourceProgressRecord, TargetEdition,
};

pub fn normalized(title: &str, isbn: Option<&str>) -> NormalizedBook {
    NormalizedBook {
        book_id: Uuid::new_v4(),
        title: title.to_string(),
        isbn: isbn.map(str::to_string),
        asin: None,
        authors: vec![],
        progress: ProgressSnapshot {
            percent: 0.0,
            current_time_seconds: 0.0,
            duration_seconds: 0.0,
            is_finished: false,
            started_at: None,
            finished_at: None,
        },
        degraded: false,
    }
}

pub fn edition(edition_id: i64, title: &str) -> TargetEdition {
    TargetEdition {
        edition_id,
        user_book_id: edition_id * 100,
        book_id: edition_id * 10,
        title: title.to_string(),
        isbn_10: None,
        isbn_13: None,
        asin: None,
        audio_duration_seconds: 0,
        other_user_edition_ids: vec![],
    }
}

pub fn source_record(book_id: Uuid, current_time_seconds: f64) -> SourceProgressRecord {
    SourceProgressRecord {
        book_id,
        current_time_seconds,
        duration_seconds: 0.0,
        progress_fraction: 0.0,
        is_finished: false,
        last_update_epoch_ms: 1_700_000_000_000,
        started_at_epoch_ms: None,
        finished_at_epoch_ms: None,
    }
}

pub fn book_detail(book_id: Uuid, title: &str) -> BookDetail {
    BookDetail {
        book_id,
        media: MediaDetail::Book {
            metadata: BookMetadataDetail {
                title: Some(title.to_string()),
                ..Default::default()
            },
            duration_seconds: 0.0,
        },
        degraded: false,
    }
}

#[derive(Default)]
pub struct FakeSource {
    pub records: Vec<SourceProgressRecord>,
    pub details: HashMap<Uuid, BookDetail>,
    pub list_fails: bool,
    pub detail_calls: Mutex<Vec<Uuid>>,
}

impl FakeSource {
    pub fn with_book(mut self, record: SourceProgressRecord, detail: BookDetail) -> Self {
        self.details.insert(record.book_id, detail);
        self.records.push(record);
        self
    }

    pub fn detail_calls_for(&self, book_id: &Uuid) -> usize {
        self.detail_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|id| *id == book_id)
            .count()
    }
}

#[async_trait::async_trait]
impl SourceCatalog for FakeSource {
    async fn list_in_progress(&self) -> anyhow::Result<Vec<SourceProgressRecord>> {
        if self.list_fails {
            return Err(anyhow!("source unreachable"));
        }
        Ok(self.records.clone())
    }

    async fn fetch_book_detail(&self, book_id: &Uuid) -> BookDetail {
        self.detail_calls.lock().unwrap().push(*book_id);
        self.details
            .get(book_id)
            .cloned()
            .unwrap_or_else(|| BookDetail::fallback(*book_id))
    }
}

pub struct FakeTarget {
    pub validated_user_id: Option<i64>,
    pub cached_user_id: Mutex<Option<i64>>,
    pub validate_calls: Mutex<usize>,
    pub currently_reading: Option<Vec<TargetEdition>>,
    pub currently_reading_calls: Mutex<usize>,
    pub search_results: HashMap<String, Vec<TargetEdition>>,
    pub failing_queries: HashSet<String>,
    pub search_calls: Mutex<Vec<String>>,
    pub read_records: Mutex<HashMap<i64, ReadRecord>>,
    pub read_fails: bool,
    pub write_succeeds: bool,
    pub writes: Mutex<Vec<ProgressWrite>>,
    pub status_succeeds: bool,
    pub status_calls: Mutex<Vec<(i64, i64, ReadingStatus)>>,
}

impl Default for FakeTarget {
    fn default() -> Self {
        FakeTarget {
            validated_user_id: Some(42),
            cached_user_id: Mutex::new(None),
            validate_calls: Mutex::new(0),
            currently_reading: Some(vec![]),
            currently_reading_calls: Mutex::new(0),
            search_results: HashMap::new(),
            failing_queries: HashSet::new(),
            search_calls: Mutex::new(vec![]),
            read_records: Mutex::new(HashMap::new()),
            read_fails: false,
            write_succeeds: true,
            writes: Mutex::new(vec![]),
            status_succeeds: true,
            status_calls: Mutex::new(vec![]),
        }
    }
}

impl FakeTarget {
    pub fn with_search(mut self, query: &str, hits: Vec<TargetEdition>) -> Self {
        self.search_results.insert(query.to_string(), hits);
        self
    }

    pub fn with_failing_search(mut self, query: &str) -> Self {
        self.failing_queries.insert(query.to_string());
        self
    }

    pub fn with_read_record(self, edition_id: i64, progress_seconds: Option<i64>) -> Self {
        self.read_records.lock().unwrap().insert(
            edition_id,
            ReadRecord {
                read_record_id: edition_id * 1000,
                progress_seconds,
                started_at: None,
                finished_at: None,
            },
        );
        self
    }

    pub fn searches(&self) -> Vec<String> {
        self.search_calls.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<ProgressWrite> {
        self.writes.lock().unwrap().clone()
    }

    pub fn status_calls(&self) -> Vec<(i64, i64, ReadingStatus)> {
        self.status_calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl TargetCatalog for FakeTarget {
    async fn validate_connection(&self) -> bool {
        *self.validate_calls.lock().unwrap() += 1;
        match self.validated_user_id {
            Some(id) => {
                *self.cached_user_id.lock().unwrap() = Some(id);
                true
            }
            None => false,
        }
    }

    fn user_id(&self) -> Option<i64> {
        *self.cached_user_id.lock().unwrap()
    }

    async fn search(
        &self,
        query: &str,
        _kind: &str,
        _per_page: u32,
        _page: u32,
    ) -> anyhow::Result<Vec<TargetEdition>> {
        self.search_calls.lock().unwrap().push(query.to_string());
        if self.failing_queries.contains(query) {
            return Err(anyhow!("search timed out"));
        }
        Ok(self.search_results.get(query).cloned().unwrap_or_default())
    }

    async fn fetch_read_record(
        &self,
        edition_id: i64,
        _user_id: i64,
    ) -> anyhow::Result<Option<ReadRecord>> {
        if self.read_fails {
            return Err(anyhow!("read failed"));
        }
        Ok(self.read_records.lock().unwrap().get(&edition_id).cloned())
    }

    async fn write_progress(&self, write: &ProgressWrite) -> anyhow::Result<bool> {
        self.writes.lock().unwrap().push(write.clone());
        if !self.write_succeeds {
            return Ok(false);
        }
        if let Some(record) = self.read_records.lock().unwrap().get_mut(&write.edition_id) {
            record.progress_seconds = Some(write.progress_seconds);
            record.started_at = write.started_at;
            record.finished_at = write.finished_at;
        }
        Ok(true)
    }

    async fn set_book_status(
        &self,
        user_book_id: i64,
        edition_id: i64,
        status: ReadingStatus,
    ) -> anyhow::Result<bool> {
        self.status_calls
            .lock()
            .unwrap()
            .push((user_book_id, edition_id, status));
        if self.status_succeeds {
            Ok(true)
        } else {
            Err(anyhow!("status mutation rejected"))
        }
    }

    async fn list_currently_reading(
        &self,
        _user_id: Option<i64>,
    ) -> anyhow::Result<Vec<TargetEdition>> {
        *self.currently_reading_calls.lock().unwrap() += 1;
        self.currently_reading
            .clone()
            .ok_or_else(|| anyhow!("currently reading unavailable"))
    }
}
