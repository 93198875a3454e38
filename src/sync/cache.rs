use std::collections::HashMap;

use uuid::Uuid;

use crate::domain::models::{NormalizedBook, TargetEdition};

/// Memoization scoped to a single sync run. Dropped when the run ends.
#[derive(Debug, Default)]
pub struct RunCache {
    books: HashMap<Uuid, NormalizedBook>,
    currently_reading: Option<Vec<TargetEdition>>,
    currently_reading_fetched: bool,
    pub target_user_id: Option<i64>,
}

impl RunCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn book(&self, book_id: &Uuid) -> Option<&NormalizedBook> {
        self.books.get(book_id)
    }

    /// First writer wins; later inserts for the same id are ignored.
    pub fn insert_book(&mut self, book: NormalizedBook) -> &NormalizedBook {
        self.books.entry(book.book_id).or_insert(book)
    }

    pub fn currently_reading(&self) -> Option<&[TargetEdition]> {
        self.currently_reading.as_deref()
    }

    pub fn currently_reading_fetched(&self) -> bool {
        self.currently_reading_fetched
    }

    /// Record the outcome of the once-per-run pre-fetch. `None` means the
    /// fetch failed; either way no second fetch happens this run.
    pub fn set_currently_reading(&mut self, editions: Option<Vec<TargetEdition>>) {
        self.currently_reading = editions;
        self.currently_reading_fetched = true;
    }
}
