use thiserror::Error;

use super::{BOOK_QUERY_TYPE, TargetCatalog};
use crate::domain::mapping::{UNKNOWN_TITLE, normalize_isbn};
use crate::domain::models::{NormalizedBook, TargetEdition};

const SEARCH_PAGE_SIZE: u32 = 20;
/// Normalized ISBNs this short are not trusted for a re-query.
const MIN_ISBN_QUERY_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    CachedIsbn,
    CachedAsin,
    CachedTitle,
    UniqueTitle,
    Isbn,
    FirstTitleHit,
    TitleAuthor,
    Asin,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookMatch {
    pub edition: TargetEdition,
    pub strategy: MatchStrategy,
}

#[derive(Error, Debug)]
pub enum MatchError {
    /// Every search that was attempted failed, so "not found" cannot be concluded.
    #[error("all {attempts} Hardcover searches for {title:?} failed: {last}")]
    TargetUnavailable {
        title: String,
        attempts: usize,
        #[source]
        last: anyhow::Error,
    },
}

/// A degraded stand-in carries a placeholder title that must not be matched on.
fn has_real_title(book: &NormalizedBook) -> bool {
    let title = book.title.trim();
    !title.is_empty() && !(book.degraded && title == UNKNOWN_TITLE)
}

/// Local match predicate: ISBN (10 or 13), then ASIN, then exact title
/// (case-insensitive, trimmed). No partial matching.
pub fn match_candidates<'c>(
    book: &NormalizedBook,
    candidates: &'c [TargetEdition],
) -> Option<(&'c TargetEdition, MatchStrategy)> {
    if let Some(isbn) = book.isbn.as_deref().map(normalize_isbn).filter(|i| !i.is_empty()) {
        let hit = candidates.iter().find(|c| {
            [&c.isbn_10, &c.isbn_13]
                .into_iter()
                .flatten()
                .any(|candidate| normalize_isbn(candidate) == isbn)
        });
        if let Some(hit) = hit {
            return Some((hit, MatchStrategy::CachedIsbn));
        }
    }

    if let Some(asin) = book.asin.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
        let hit = candidates.iter().find(|c| {
            c.asin
                .as_deref()
                .is_some_and(|candidate| candidate.trim() == asin)
        });
        if let Some(hit) = hit {
            return Some((hit, MatchStrategy::CachedAsin));
        }
    }

    if !has_real_title(book) {
        return None;
    }
    let title = book.title.trim().to_lowercase();
    candidates
        .iter()
        .find(|c| c.title.trim().to_lowercase() == title)
        .map(|hit| (hit, MatchStrategy::CachedTitle))
}

#[derive(Default)]
struct SearchAttempts {
    attempted: usize,
    failed: usize,
    last_error: Option<anyhow::Error>,
}

/// Finds the Hardcover edition a source book corresponds to.
pub struct IdentityMatcher<'a> {
    target: &'a dyn TargetCatalog,
}

impl<'a> IdentityMatcher<'a> {
    pub fn new(target: &'a dyn TargetCatalog) -> Self {
        Self { target }
    }

    /// Strategies run in fixed priority order and the first hit wins.
    /// A failed search only counts as a miss for that strategy.
    #[tracing::instrument(level = "debug", skip_all, fields(title = %book.title))]
    pub async fn find(
        &self,
        book: &NormalizedBook,
        cached: Option<&[TargetEdition]>,
    ) -> Result<Option<BookMatch>, MatchError> {
        let title = book.title.trim();
        if title.is_empty() {
            tracing::warn!(book_id = %book.book_id, "book has no title, cannot match");
            return Ok(None);
        }

        if let Some(candidates) = cached.filter(|c| !c.is_empty()) {
            if let Some((edition, strategy)) = match_candidates(book, candidates) {
                return Ok(Some(found(edition.clone(), strategy)));
            }
            tracing::debug!("not among currently-reading editions, falling back to search");
        }

        let mut attempts = SearchAttempts::default();

        if has_real_title(book) {
            if let Some(hits) = self.search(title, "title", &mut attempts).await {
                if hits.len() == 1 {
                    return Ok(hits.into_iter().next().map(|e| found(e, MatchStrategy::UniqueTitle)));
                }
                if hits.len() > 1 {
                    let isbn = book.isbn.as_deref().map(normalize_isbn);
                    if let Some(isbn) = isbn.filter(|i| i.len() > MIN_ISBN_QUERY_LEN) {
                        if let Some(hit) = self.first_hit(&isbn, "isbn", &mut attempts).await {
                            return Ok(Some(found(hit, MatchStrategy::Isbn)));
                        }
                    }
                    tracing::debug!(hits = hits.len(), "taking first of several title hits");
                    return Ok(hits
                        .into_iter()
                        .next()
                        .map(|e| found(e, MatchStrategy::FirstTitleHit)));
                }
            }

            if let Some(author) = book.primary_author() {
                let query = format!("{} {}", title, author);
                if let Some(hit) = self.first_hit(&query, "title_author", &mut attempts).await {
                    return Ok(Some(found(hit, MatchStrategy::TitleAuthor)));
                }
            }
        } else {
            tracing::debug!(book_id = %book.book_id, "placeholder title, searching by ASIN only");
        }

        if let Some(asin) = book.asin.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
            if let Some(hit) = self.first_hit(asin, "asin", &mut attempts).await {
                return Ok(Some(found(hit, MatchStrategy::Asin)));
            }
        }

        if attempts.attempted > 0 && attempts.failed == attempts.attempted {
            if let Some(last) = attempts.last_error {
                return Err(MatchError::TargetUnavailable {
                    title: title.to_string(),
                    attempts: attempts.attempted,
                    last,
                });
            }
        }

        tracing::warn!(author = book.primary_author().unwrap_or(""), "book not found on Hardcover");
        Ok(None)
    }

    async fn search(
        &self,
        query: &str,
        strategy: &'static str,
        attempts: &mut SearchAttempts,
    ) -> Option<Vec<TargetEdition>> {
        tracing::debug!(strategy, %query, "searching Hardcover");
        attempts.attempted += 1;
        match self
            .target
            .search(query, BOOK_QUERY_TYPE, SEARCH_PAGE_SIZE, 1)
            .await
        {
            Ok(hits) => {
                tracing::debug!(strategy, hits = hits.len(), "search finished");
                Some(hits)
            }
            Err(e) => {
                tracing::warn!(strategy, error = %e, "search failed, trying next strategy");
                attempts.failed += 1;
                attempts.last_error = Some(e);
                None
            }
        }
    }

    async fn first_hit(
        &self,
        query: &str,
        strategy: &'static str,
        attempts: &mut SearchAttempts,
    ) -> Option<TargetEdition> {
        self.search(query, strategy, attempts)
            .await
            .and_then(|hits| hits.into_iter().next())
    }
}

fn found(edition: TargetEdition, strategy: MatchStrategy) -> BookMatch {
    tracing::info!(
        edition_id = edition.edition_id,
        hardcover_title = %edition.title,
        ?strategy,
        "matched book on Hardcover"
    );
    BookMatch { edition, strategy }
}
