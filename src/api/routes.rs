use std::sync::Arc;

use poem_openapi::{OpenApi, payload::Json, payload::PlainText};

use super::models::{ErrorDto, LastRunResponse, TriggerResponse};
use crate::runner::SyncRunner;

pub struct SyncApi {
    pub runner: Arc<SyncRunner>,
}

#[OpenApi]
impl SyncApi {
    #[oai(path = "/health", method = "get")]
    async fn health(&self) -> PlainText<String> {
        PlainText("ok".to_string())
    }

    /// Result of the most recent sync run
    #[oai(path = "/sync/last", method = "get")]
    #[tracing::instrument(level = "debug", skip(self))]
    async fn last_run(&self) -> LastRunResponse {
        match self.runner.last_run() {
            Some(record) => LastRunResponse::Ok(Json(record.into())),
            None => LastRunResponse::NotFound(Json(ErrorDto {
                message: "no sync run has finished yet".into(),
            })),
        }
    }

    /// Run a sync now and wait for it to finish
    #[oai(path = "/sync", method = "post")]
    #[tracing::instrument(level = "debug", skip(self))]
    async fn trigger(&self) -> TriggerResponse {
        tracing::debug!("handling POST /sync");
        match self.runner.try_run().await {
            Some(record) if record.is_success() => TriggerResponse::Ok(Json(record.into())),
            Some(record) => TriggerResponse::BadGateway(Json(record.into())),
            None => TriggerResponse::Conflict(Json(ErrorDto {
                message: "a sync run is already in progress".into(),
            })),
        }
    }
}
