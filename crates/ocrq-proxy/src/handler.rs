//! HTTP surface of the proxy.
//!
//! Every OCR endpoint answers `200 OK` with the answer envelope, including
//! for requests whose body could not be parsed.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use ocrq_core::{Answer, LayoutPage, OcrAnswer, OcrMode, TablePage};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::TRACING_TARGET_HANDLER;
use crate::proxy::OcrProxy;

/// Body of `POST /transcribe`, `/layout` and `/tables`.
///
/// `regions` may be a JSON list or a string holding one; a missing or
/// `null` value selects the whole image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrRequest {
    pub image_url: String,
    #[serde(default)]
    pub regions: Option<Value>,
    #[serde(default)]
    pub mode: OcrMode,
}

impl OcrRequest {
    pub fn new(image_url: impl Into<String>) -> Self {
        Self {
            image_url: image_url.into(),
            ..Default::default()
        }
    }

    /// Returns the regions as the raw JSON text the proxy validates.
    pub fn regions_raw(&self) -> String {
        match &self.regions {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(raw)) => raw.clone(),
            Some(other) => other.to_string(),
        }
    }
}

fn rejected<T>(rejection: JsonRejection) -> Json<Answer<T>> {
    tracing::debug!(
        target: TRACING_TARGET_HANDLER,
        error = %rejection,
        "Malformed request body"
    );
    Json(Answer::error(format!("invalid request: {}", rejection.body_text())))
}

async fn transcribe(
    State(proxy): State<OcrProxy>,
    request: Result<Json<OcrRequest>, JsonRejection>,
) -> Json<OcrAnswer> {
    let Json(request) = match request {
        Ok(request) => request,
        Err(rejection) => return rejected(rejection),
    };
    let answer = proxy
        .transcribe(&request.image_url, &request.regions_raw(), request.mode)
        .await;
    Json(answer)
}

async fn layout(
    State(proxy): State<OcrProxy>,
    request: Result<Json<OcrRequest>, JsonRejection>,
) -> Json<Answer<LayoutPage>> {
    let Json(request) = match request {
        Ok(request) => request,
        Err(rejection) => return rejected(rejection),
    };
    let answer = proxy
        .analyze_layout(&request.image_url, &request.regions_raw())
        .await;
    Json(answer)
}

async fn tables(
    State(proxy): State<OcrProxy>,
    request: Result<Json<OcrRequest>, JsonRejection>,
) -> Json<Answer<TablePage>> {
    let Json(request) = match request {
        Ok(request) => request,
        Err(rejection) => return rejected(rejection),
    };
    let answer = proxy
        .recognize_tables(&request.image_url, &request.regions_raw())
        .await;
    Json(answer)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Returns a [`Router`] with all proxy routes.
pub fn routes(proxy: OcrProxy) -> Router {
    Router::new()
        .route("/transcribe", post(transcribe))
        .route("/layout", post(layout))
        .route("/tables", post(tables))
        .route("/health", get(health))
        .with_state(proxy)
}
