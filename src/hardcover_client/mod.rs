// Hardcover GraphQL client and the target side of the sync

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;

use crate::domain::models::{ProgressWrite, ReadRecord, ReadingStatus, TargetEdition};
use crate::sync::TargetCatalog;

pub const DEFAULT_API_URL: &str = "https://api.hardcover.app/v1/graphql";
const USER_AGENT: &str = concat!(
    env!("CARGO_PKG_NAME"),
    "/",
    env!("CARGO_PKG_VERSION"),
    " - Audiobookshelf progress sync"
);

const ME_QUERY: &str = "query { me { id username } }";

const SEARCH_QUERY: &str = r#"
query Search($query: String!, $queryType: String!, $perPage: Int!, $page: Int!) {
  search(query: $query, query_type: $queryType, per_page: $perPage, page: $page) {
    results
  }
}"#;

const USER_BOOKS_FOR_BOOKS_QUERY: &str = r#"
query UserEditionsForBooks($userId: Int!, $bookIds: [Int!]!) {
  user_books(where: {user_id: {_eq: $userId}, book_id: {_in: $bookIds}}) {
    id
    book_id
    edition_id
    edition { id title isbn_10 isbn_13 asin audio_seconds }
    book { title user_books(where: {user_id: {_eq: $userId}}) { id edition_id } }
  }
}"#;

const CURRENTLY_READING_QUERY: &str = r#"
query CurrentlyReading($userId: Int!, $statusId: Int!) {
  user_books(where: {user_id: {_eq: $userId}, status_id: {_eq: $statusId}}) {
    id
    book_id
    edition_id
    edition { id title isbn_10 isbn_13 asin audio_seconds }
    book { title user_books(where: {user_id: {_eq: $userId}}) { id edition_id } }
  }
}"#;

const READ_RECORD_QUERY: &str = r#"
query GetBookReadInfo($editionId: Int!, $userId: Int!) {
  user_book_reads(
    where: {edition_id: {_eq: $editionId}, user_book: {user_id: {_eq: $userId}}}
    order_by: {id: desc}
    limit: 1
  ) {
    id
    started_at
    finished_at
    progress_seconds
  }
}"#;

const UPDATE_READ_MUTATION: &str = r#"
mutation UpdateUserBookRead($id: Int!, $object: DatesReadInput!) {
  update_user_book_read(id: $id, object: $object) {
    error
    user_book_read { id progress_seconds }
  }
}"#;

const UPDATE_USER_BOOK_MUTATION: &str = r#"
mutation UpdateUserBook($id: Int!, $object: UserBookUpdateInput!) {
  update_user_book(id: $id, object: $object) {
    error
    user_book { id status_id }
  }
}"#;

/// Client for the Hardcover GraphQL API. Caches the authenticated user id once
/// `validate_connection` succeeds.
#[derive(Debug)]
pub struct HardcoverClient {
    api_url: String,
    api_key: String,
    client: reqwest::Client,
    user_id: RwLock<Option<i64>>,
}

impl HardcoverClient {
    pub fn new(
        api_url: impl Into<String>,
        api_key: &str,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        let api_url = api_url.into();
        tracing::debug!(%api_url, "creating HardcoverClient");
        Ok(HardcoverClient {
            api_url,
            api_key: bearer(api_key),
            client,
            user_id: RwLock::new(None),
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn remember(&self, user_id: i64) {
        if let Ok(mut guard) = self.user_id.write() {
            *guard = Some(user_id);
        }
    }

    /// POST a GraphQL document; GraphQL-level `errors` become an `Err`.
    async fn execute<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> anyhow::Result<T> {
        let body = json!({ "query": query, "variables": variables });
        let resp = self
            .client
            .post(&self.api_url)
            .header(reqwest::header::AUTHORIZATION, &self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = resp.error_for_status()?;
        let text = status.text().await?;
        let parsed: GraphQlResponse<T> = serde_json::from_str(&text).map_err(|e| {
            let snippet = text.get(..text.len().min(2000)).unwrap_or("");
            tracing::error!(error = %e, body_snippet = %snippet, "failed to parse Hardcover response");
            anyhow!(e).context("unexpected Hardcover response")
        })?;
        parsed.into_result()
    }

    async fn ensure_user_id(&self) -> anyhow::Result<i64> {
        if let Some(id) = self.user_id() {
            return Ok(id);
        }
        if self.validate_connection().await {
            if let Some(id) = self.user_id() {
                return Ok(id);
            }
        }
        bail!("no Hardcover user id available")
    }

    /// Resolve search hits (books) into the user's tracked editions, keeping hit order.
    async fn tracked_editions(&self, book_ids: &[i64]) -> anyhow::Result<Vec<TargetEdition>> {
        if book_ids.is_empty() {
            return Ok(vec![]);
        }
        let user_id = self.ensure_user_id().await?;
        let data: UserBooksData = self
            .execute(
                USER_BOOKS_FOR_BOOKS_QUERY,
                json!({ "userId": user_id, "bookIds": book_ids }),
            )
            .await?;
        Ok(editions_in_hit_order(book_ids, data.user_books))
    }
}

fn bearer(api_key: &str) -> String {
    let key = api_key.trim();
    if key.starts_with("Bearer ") {
        key.to_string()
    } else {
        format!("Bearer {}", key)
    }
}

#[async_trait::async_trait]
impl TargetCatalog for HardcoverClient {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn validate_connection(&self) -> bool {
        let data: anyhow::Result<MeData> = self.execute(ME_QUERY, json!({})).await;
        match data.map(|d| d.me.into_first()) {
            Ok(Some(user)) => {
                tracing::info!(
                    user_id = user.id,
                    username = user.username.as_deref().unwrap_or(""),
                    "connected to Hardcover"
                );
                self.remember(user.id);
                true
            }
            Ok(None) => {
                tracing::warn!("Hardcover returned no user for the API key");
                false
            }
            Err(e) => {
                tracing::error!(api_url = %self.api_url, error = %e, "failed to connect to Hardcover");
                false
            }
        }
    }

    fn user_id(&self) -> Option<i64> {
        self.user_id.read().ok().and_then(|guard| *guard)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn search(
        &self,
        query: &str,
        kind: &str,
        per_page: u32,
        page: u32,
    ) -> anyhow::Result<Vec<TargetEdition>> {
        let data: SearchData = self
            .execute(
                SEARCH_QUERY,
                json!({ "query": query, "queryType": kind, "perPage": per_page, "page": page }),
            )
            .await?;
        let book_ids = data.book_ids();
        let editions = self.tracked_editions(&book_ids).await?;
        tracing::debug!(
            hits = book_ids.len(),
            tracked = editions.len(),
            "resolved search hits to tracked editions"
        );
        Ok(editions)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn fetch_read_record(
        &self,
        edition_id: i64,
        user_id: i64,
    ) -> anyhow::Result<Option<ReadRecord>> {
        let data: ReadRecordData = self
            .execute(
                READ_RECORD_QUERY,
                json!({ "editionId": edition_id, "userId": user_id }),
            )
            .await?;
        Ok(data.user_book_reads.into_iter().next().map(|r| ReadRecord {
            read_record_id: r.id,
            progress_seconds: r.progress_seconds,
            started_at: r.started_at,
            finished_at: r.finished_at,
        }))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn write_progress(&self, write: &ProgressWrite) -> anyhow::Result<bool> {
        let object = DatesReadInput {
            edition_id: write.edition_id,
            progress_seconds: write.progress_seconds,
            started_at: write.started_at,
            finished_at: write.finished_at,
        };
        let data: UpdateReadData = self
            .execute(
                UPDATE_READ_MUTATION,
                json!({ "id": write.read_record_id, "object": object }),
            )
            .await?;
        Ok(data.update_user_book_read.succeeded("update_user_book_read"))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn set_book_status(
        &self,
        user_book_id: i64,
        edition_id: i64,
        status: ReadingStatus,
    ) -> anyhow::Result<bool> {
        let data: UpdateUserBookData = self
            .execute(
                UPDATE_USER_BOOK_MUTATION,
                json!({
                    "id": user_book_id,
                    "object": { "edition_id": edition_id, "status_id": status.status_id() }
                }),
            )
            .await?;
        Ok(data.update_user_book.succeeded("update_user_book"))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_currently_reading(
        &self,
        user_id: Option<i64>,
    ) -> anyhow::Result<Vec<TargetEdition>> {
        let user_id = match user_id {
            Some(id) => id,
            None => self.ensure_user_id().await?,
        };
        let data: UserBooksData = self
            .execute(
                CURRENTLY_READING_QUERY,
                json!({
                    "userId": user_id,
                    "statusId": ReadingStatus::CurrentlyReading.status_id()
                }),
            )
            .await?;
        let total = data.user_books.len();
        let editions: Vec<TargetEdition> = data
            .user_books
            .into_iter()
            .filter_map(UserBookRow::into_edition)
            .collect();
        tracing::info!(
            total,
            audiobooks = editions.len(),
            "fetched currently-reading books from Hardcover"
        );
        Ok(editions)
    }
}

/// Keep the first tracked audio edition of each hit, in hit order.
fn editions_in_hit_order(book_ids: &[i64], rows: Vec<UserBookRow>) -> Vec<TargetEdition> {
    let mut by_book: HashMap<i64, TargetEdition> = HashMap::new();
    for edition in rows.into_iter().filter_map(UserBookRow::into_edition) {
        by_book.entry(edition.book_id).or_insert(edition);
    }
    let mut seen = HashSet::new();
    book_ids
        .iter()
        .filter(|id| seen.insert(**id))
        .filter_map(|id| by_book.remove(id))
        .collect()
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

impl<T> GraphQlResponse<T> {
    fn into_result(self) -> anyhow::Result<T> {
        if !self.errors.is_empty() {
            let messages: Vec<&str> = self.errors.iter().map(|e| e.message.as_str()).collect();
            bail!("GraphQL errors: {}", messages.join("; "));
        }
        self.data.context("GraphQL response carried no data")
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_first(self) -> Option<T> {
        match self {
            OneOrMany::Many(items) => items.into_iter().next(),
            OneOrMany::One(item) => Some(item),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MeData {
    me: OneOrMany<MeUser>,
}

#[derive(Debug, Deserialize)]
struct MeUser {
    id: i64,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchData {
    search: Option<SearchOutput>,
}

#[derive(Debug, Deserialize)]
struct SearchOutput {
    results: Option<SearchResults>,
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    document: SearchDocument,
}

#[derive(Debug, Deserialize)]
struct SearchDocument {
    #[serde(deserialize_with = "crate::hardcover_client::de::i64_from_str_or_num")]
    id: i64,
}

impl SearchData {
    fn book_ids(self) -> Vec<i64> {
        self.search
            .and_then(|s| s.results)
            .map(|r| r.hits.into_iter().map(|h| h.document.id).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct UserBooksData {
    user_books: Vec<UserBookRow>,
}

#[derive(Debug, Deserialize)]
struct UserBookRow {
    id: i64,
    book_id: i64,
    edition_id: Option<i64>,
    edition: Option<EditionRow>,
    book: Option<BookRow>,
}

#[derive(Debug, Deserialize)]
struct EditionRow {
    id: i64,
    title: Option<String>,
    isbn_10: Option<String>,
    isbn_13: Option<String>,
    asin: Option<String>,
    audio_seconds: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct BookRow {
    title: Option<String>,
    #[serde(default)]
    user_books: Vec<UserBookRef>,
}

#[derive(Debug, Deserialize)]
struct UserBookRef {
    edition_id: Option<i64>,
}

impl UserBookRow {
    /// `None` for rows without an audio edition: progress seconds mean
    /// nothing there.
    fn into_edition(self) -> Option<TargetEdition> {
        let edition = self.edition?;
        if self.edition_id.is_some_and(|id| id != edition.id) {
            return None;
        }
        let audio_seconds = edition.audio_seconds.filter(|s| *s >= 0)?;
        let (book_title, others) = match self.book {
            Some(book) => (
                book.title,
                book.user_books
                    .into_iter()
                    .filter_map(|ub| ub.edition_id)
                    .filter(|id| *id != edition.id)
                    .collect(),
            ),
            None => (None, vec![]),
        };
        Some(TargetEdition {
            edition_id: edition.id,
            user_book_id: self.id,
            book_id: self.book_id,
            title: edition.title.or(book_title).unwrap_or_default(),
            isbn_10: edition.isbn_10,
            isbn_13: edition.isbn_13,
            asin: edition.asin,
            audio_duration_seconds: audio_seconds,
            other_user_edition_ids: others,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ReadRecordData {
    user_book_reads: Vec<ReadRecordRow>,
}

#[derive(Debug, Deserialize)]
struct ReadRecordRow {
    id: i64,
    progress_seconds: Option<i64>,
    started_at: Option<NaiveDate>,
    finished_at: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
struct DatesReadInput {
    edition_id: i64,
    progress_seconds: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    started_at: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    finished_at: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
struct MutationResult {
    error: Option<String>,
}

impl MutationResult {
    fn succeeded(&self, mutation: &str) -> bool {
        match &self.error {
            Some(error) => {
                tracing::error!(mutation, %error, "Hardcover mutation returned an error");
                false
            }
            None => true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UpdateReadData {
    update_user_book_read: MutationResult,
}

#[derive(Debug, Deserialize)]
struct UpdateUserBookData {
    update_user_book: MutationResult,
}

/// Internal serde helpers
pub mod de {
    use serde::{Deserialize, Deserializer, de::Error};

    /// Accept an i64 from either a number or a string like "312460".
    pub fn i64_from_str_or_num<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum NumOrStr {
            Num(i64),
            Str(String),
        }

        match NumOrStr::deserialize(deserializer)? {
            NumOrStr::Num(n) => Ok(n),
            NumOrStr::Str(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|e| D::Error::custom(format!("invalid id {:?}: {}", s, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_prefix_added_once() {
        assert_eq!(bearer("abc"), "Bearer abc");
        assert_eq!(bearer("Bearer abc"), "Bearer abc");
    }

    #[test]
    fn graphql_errors_become_err() {
        let resp: GraphQlResponse<MeData> = serde_json::from_str(
            r#"{ "data": null, "errors": [{ "message": "invalid token" }, { "message": "expired" }] }"#,
        )
        .unwrap();
        let err = resp.into_result().unwrap_err();
        assert_eq!(err.to_string(), "GraphQL errors: invalid token; expired");
    }

    #[test]
    fn me_accepts_list_or_object() {
        let list: GraphQlResponse<MeData> =
            serde_json::from_str(r#"{ "data": { "me": [{ "id": 42, "username": "reader" }] } }"#)
                .unwrap();
        let user = list.into_result().unwrap().me.into_first().unwrap();
        assert_eq!((user.id, user.username.as_deref()), (42, Some("reader")));

        let object: GraphQlResponse<MeData> =
            serde_json::from_str(r#"{ "data": { "me": { "id": 7, "username": null } } }"#).unwrap();
        assert_eq!(object.into_result().unwrap().me.into_first().unwrap().id, 7);
    }

    #[test]
    fn search_results_yield_book_ids_in_order() {
        let json = r#"{
            "search": {
                "results": {
                    "found": 2,
                    "hits": [
                        { "document": { "id": "312460", "title": "Dune", "isbns": ["9780441013593"] } },
                        { "document": { "id": 1001, "title": "Dune Messiah" } }
                    ]
                }
            }
        }"#;
        let data: SearchData = serde_json::from_str(json).unwrap();
        assert_eq!(data.book_ids(), vec![312460, 1001]);

        let empty: SearchData = serde_json::from_str(r#"{ "search": { "results": null } }"#).unwrap();
        assert!(empty.book_ids().is_empty());
    }

    fn user_books_fixture() -> Vec<UserBookRow> {
        let json = r#"{
            "user_books": [
                {
                    "id": 501, "book_id": 10, "edition_id": 7,
                    "edition": { "id": 7, "title": "Dune", "isbn_10": null, "isbn_13": "9780441013593", "asin": "B00B7NPRY8", "audio_seconds": 76000 },
                    "book": { "title": "Dune", "user_books": [{ "id": 501, "edition_id": 7 }, { "id": 502, "edition_id": 8 }] }
                },
                {
                    "id": 601, "book_id": 20, "edition_id": 9,
                    "edition": { "id": 9, "title": "Hyperion", "isbn_10": "0553283685", "isbn_13": null, "asin": null, "audio_seconds": null },
                    "book": { "title": "Hyperion", "user_books": [] }
                },
                {
                    "id": 701, "book_id": 30, "edition_id": 11,
                    "edition": { "id": 11, "title": null, "isbn_10": null, "isbn_13": null, "asin": null, "audio_seconds": 40000 },
                    "book": { "title": "Anathem", "user_books": [] }
                }
            ]
        }"#;
        serde_json::from_str::<UserBooksData>(json).unwrap().user_books
    }

    #[test]
    fn user_book_rows_map_to_audio_editions() {
        let editions: Vec<TargetEdition> = user_books_fixture()
            .into_iter()
            .filter_map(UserBookRow::into_edition)
            .collect();

        assert_eq!(editions.len(), 2);
        let dune = &editions[0];
        assert_eq!((dune.edition_id, dune.user_book_id, dune.book_id), (7, 501, 10));
        assert_eq!(dune.audio_duration_seconds, 76000);
        assert_eq!(dune.other_user_edition_ids, vec![8]);
        assert_eq!(editions[1].title, "Anathem");
    }

    #[test]
    fn tracked_editions_follow_hit_order() {
        let editions = editions_in_hit_order(&[30, 99, 10, 30], user_books_fixture());
        let ids: Vec<i64> = editions.iter().map(|e| e.edition_id).collect();
        assert_eq!(ids, vec![11, 7]);
    }

    #[test]
    fn read_record_dates_deserialize() {
        let data: ReadRecordData = serde_json::from_str(
            r#"{ "user_book_reads": [{ "id": 9001, "started_at": "2024-03-01", "finished_at": null, "progress_seconds": null }] }"#,
        )
        .unwrap();
        let row = &data.user_book_reads[0];
        assert_eq!(row.id, 9001);
        assert_eq!(row.started_at, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(row.progress_seconds, None);
    }

    #[test]
    fn dates_read_input_omits_missing_dates() {
        let input = DatesReadInput {
            edition_id: 7,
            progress_seconds: 3600,
            started_at: NaiveDate::from_ymd_opt(2024, 3, 1),
            finished_at: None,
        };
        assert_eq!(
            serde_json::to_value(&input).unwrap(),
            json!({ "edition_id": 7, "progress_seconds": 3600, "started_at": "2024-03-01" })
        );
    }

    #[test]
    fn mutation_error_is_failure() {
        let data: UpdateReadData = serde_json::from_str(
            r#"{ "update_user_book_read": { "error": "not allowed", "user_book_read": null } }"#,
        )
        .unwrap();
        assert!(!data.update_user_book_read.succeeded("update_user_book_read"));
        let ok: UpdateUserBookData = serde_json::from_str(
            r#"{ "update_user_book": { "error": null, "user_book": { "id": 501, "status_id": 3 } } }"#,
        )
        .unwrap();
        assert!(ok.update_user_book.succeeded("update_user_book"));
    }

    #[test]
    fn identity_starts_empty() {
        let client = HardcoverClient::new(DEFAULT_API_URL, "token", Duration::from_secs(1)).unwrap();
        assert_eq!(client.user_id(), None);
        client.remember(42);
        assert_eq!(client.user_id(), Some(42));
        assert_eq!(client.api_url(), DEFAULT_API_URL);
    }
}
