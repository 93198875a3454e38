// Audiobookshelf REST client and the source side of the sync

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::domain::models::{
    BookDetail, BookMetadataDetail, MediaDetail, PodcastMetadataDetail, SourceProgressRecord,
};
use crate::sync::SourceCatalog;

#[derive(Clone, Debug)]
pub struct AbsClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl AbsClient {
    /// Create a new client with the given base URL (e.g. "http://localhost:8080/audiobookshelf").
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url_str = base_url.into();
        tracing::debug!(base_url = %base_url_str, "creating AbsClient");
        Ok(AbsClient {
            base_url: base_url_str.trim_end_matches('/').to_string(),
            api_key: None,
            client,
        })
    }

    /// Return a client with the provided API key set (Bearer)
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn auth_header(&self) -> Option<(String, String)> {
        self.api_key
            .as_ref()
            .map(|k| ("Authorization".to_string(), format!("Bearer {}", k)))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> anyhow::Result<T> {
        let url = self.url(path);
        let mut req = self.client.get(&url);
        if let Some((k, v)) = self.auth_header() {
            req = req.header(&k, &v);
        }
        if !query.is_empty() {
            req = req.query(query);
        }
        let resp = req.send().await?;
        let status = resp.error_for_status()?;
        let body = status.text().await?;
        match serde_json::from_str::<T>(&body) {
            Ok(parsed) => Ok(parsed),
            Err(e) => {
                let snippet_len = body.len().min(2000);
                let snippet = body.get(..snippet_len).unwrap_or("");
                tracing::error!(%url, error = %e, body_snippet = %snippet, "failed to parse ABS response");
                Err(e).with_context(|| format!("unexpected response from {}", path))
            }
        }
    }

    /// GET /ping (no auth required)
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn ping(&self) -> anyhow::Result<PingResponse> {
        self.get_json("/ping", &[]).await
    }

    /// GET /api/me/items-in-progress
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get_items_in_progress(&self) -> anyhow::Result<ItemsInProgressResponse> {
        self.get_json("/api/me/items-in-progress", &[]).await
    }

    /// GET /api/me/progress/:id
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get_media_progress(&self, item_id: &Uuid) -> anyhow::Result<MediaProgress> {
        self.get_json(&format!("/api/me/progress/{}", item_id), &[])
            .await
    }

    /// GET /api/items/:id
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get_item(&self, item_id: &Uuid, expanded: bool) -> anyhow::Result<ItemResponse> {
        tracing::debug!(%item_id, expanded, "GET item");
        self.get_json(&format!("/api/items/{}", item_id), item_query(expanded))
            .await
    }
}

fn item_query(expanded: bool) -> &'static [(&'static str, &'static str)] {
    if expanded { &[("expanded", "1")] } else { &[] }
}

#[async_trait::async_trait]
impl SourceCatalog for AbsClient {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_in_progress(&self) -> anyhow::Result<Vec<SourceProgressRecord>> {
        match self.ping().await {
            Ok(ping) if ping.success => {}
            Ok(_) => {
                tracing::error!(abs_base = %self.base_url, "Audiobookshelf ping unsuccessful, skipping");
                return Ok(vec![]);
            }
            Err(e) => {
                tracing::error!(abs_base = %self.base_url, error = %e, "Audiobookshelf unreachable, skipping");
                return Ok(vec![]);
            }
        }

        let in_progress = match self.get_items_in_progress().await {
            Ok(resp) => resp,
            Err(e) if e.is::<reqwest::Error>() => {
                tracing::error!(error = %e, "failed to fetch items in progress");
                return Ok(vec![]);
            }
            Err(e) => return Err(e),
        };

        let total = in_progress.library_items.len();
        let books: Vec<InProgressItem> = in_progress
            .library_items
            .into_iter()
            .filter(|item| item.media_type == "book")
            .collect();
        tracing::info!(total, books = books.len(), "fetched items in progress");

        let mut records = Vec::with_capacity(books.len());
        for item in books {
            tracing::debug!(item_id = %item.id, last_update = ?item.progress_last_update, "fetching progress");
            match self.get_media_progress(&item.id).await {
                Ok(progress) => records.push(progress.into_record(item.id)),
                Err(e) => {
                    tracing::warn!(item_id = %item.id, error = %e, "no progress for item, leaving it out");
                }
            }
        }
        Ok(records)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn fetch_book_detail(&self, book_id: &Uuid) -> BookDetail {
        match self.get_item(book_id, true).await {
            Ok(item) => item.into_detail(),
            Err(e) => {
                tracing::error!(%book_id, error = %e, "failed to fetch item details");
                BookDetail::fallback(*book_id)
            }
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct PingResponse {
    pub success: bool,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemsInProgressResponse {
    pub library_items: Vec<InProgressItem>,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InProgressItem {
    pub id: Uuid,
    pub media_type: String,
    pub progress_last_update: Option<i64>,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaProgress {
    pub library_item_id: Option<Uuid>,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub current_time: f64,
    #[serde(default)]
    pub is_finished: bool,
    #[serde(default)]
    pub last_update: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
}

impl MediaProgress {
    pub fn into_record(self, item_id: Uuid) -> SourceProgressRecord {
        SourceProgressRecord {
            book_id: self.library_item_id.unwrap_or(item_id),
            current_time_seconds: self.current_time.max(0.0),
            duration_seconds: self.duration.max(0.0),
            progress_fraction: self.progress.clamp(0.0, 1.0),
            is_finished: self.is_finished,
            last_update_epoch_ms: self.last_update,
            started_at_epoch_ms: self.started_at.filter(|ms| *ms > 0),
            finished_at_epoch_ms: self.finished_at.filter(|ms| *ms > 0),
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemResponse {
    pub id: Uuid,
    pub media_type: String,
    pub media: Option<serde_json::Value>,
}

impl ItemResponse {
    /// Decode `media` according to `mediaType`. Malformed media yields a
    /// degraded stand-in; an unknown `mediaType` is passed on as such.
    pub fn into_detail(self) -> BookDetail {
        let Some(media) = self.media else {
            tracing::warn!(item_id = %self.id, "item has no media, using fallback details");
            return BookDetail::fallback(self.id);
        };
        let decoded = match self.media_type.as_str() {
            "book" => serde_json::from_value::<BookMedia>(media).map(|m| MediaDetail::Book {
                metadata: m.metadata.into(),
                duration_seconds: m.duration,
            }),
            "podcast" => serde_json::from_value::<PodcastMedia>(media).map(|m| {
                MediaDetail::Podcast {
                    metadata: PodcastMetadataDetail {
                        title: m.metadata.title,
                        author: m.metadata.author,
                    },
                }
            }),
            other => Ok(MediaDetail::Unrecognized(other.to_string())),
        };
        match decoded {
            Ok(media) => BookDetail {
                book_id: self.id,
                media,
                degraded: false,
            },
            Err(e) => {
                tracing::warn!(item_id = %self.id, error = %e, "malformed item media, using fallback details");
                BookDetail::fallback(self.id)
            }
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookMedia {
    pub metadata: BookMetadata,
    #[serde(default)]
    pub duration: f64,
}

#[derive(Debug, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct BookMetadata {
    #[serde(deserialize_with = "crate::abs_client::de::opt_non_empty_string")]
    pub title: Option<String>,
    pub authors: Vec<AuthorRef>,
    #[serde(deserialize_with = "crate::abs_client::de::opt_non_empty_string")]
    pub author_name: Option<String>,
    #[serde(deserialize_with = "crate::abs_client::de::opt_non_empty_string")]
    pub isbn: Option<String>,
    #[serde(deserialize_with = "crate::abs_client::de::opt_non_empty_string")]
    pub asin: Option<String>,
}

impl From<BookMetadata> for BookMetadataDetail {
    fn from(m: BookMetadata) -> Self {
        BookMetadataDetail {
            title: m.title,
            authors: m.authors.into_iter().map(|a| a.name).collect(),
            author_name: m.author_name,
            isbn: m.isbn,
            asin: m.asin,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct AuthorRef {
    pub name: String,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct PodcastMedia {
    pub metadata: PodcastMetadata,
}

#[derive(Debug, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct PodcastMetadata {
    #[serde(deserialize_with = "crate::abs_client::de::opt_non_empty_string")]
    pub title: Option<String>,
    #[serde(deserialize_with = "crate::abs_client::de::opt_non_empty_string")]
    pub author: Option<String>,
}

/// Internal serde helpers
pub mod de {
    use serde::{Deserialize, Deserializer};

    /// Accept Option<String>, trimming it; null/""/whitespace -> None.
    pub fn opt_non_empty_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let val: Option<String> = Option::deserialize(deserializer)?;
        Ok(val
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()))
    }
}
