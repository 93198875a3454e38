use thiserror::Error;
use uuid::Uuid;

/// Failures that abandon a whole sync run.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("could not fetch in-progress books from Audiobookshelf: {0}")]
    SourceUnavailable(#[source] anyhow::Error),

    #[error("could not validate the Hardcover connection")]
    TargetConnection,
}

/// Projection of a library item into a `NormalizedBook` failed.
#[derive(Error, Debug, PartialEq)]
pub enum MappingError {
    #[error("library item {book_id} has unrecognized media type {media_type:?}")]
    UnrecognizedMediaType { book_id: Uuid, media_type: String },
}

/// Configuration that makes it impossible to address either service.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("missing required configuration: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}
