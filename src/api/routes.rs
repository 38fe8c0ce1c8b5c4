//! Router assembly and request handlers.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::error::AnalysisError;
use crate::ledger::{HttpLedgerClient, QuotaSnapshot};
use crate::pipeline::{AnalysisRequest, Pipeline};
use crate::provider::GeminiFileClient;

use super::auth::bearer_token;
use super::types::AnalysisResponse;

/// Uploads are compressed client-side to a few MB; this is a backstop.
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

pub struct AppState {
    pub config: Config,
    pub pipeline: Pipeline,
}

type ApiError = (StatusCode, Json<Value>);

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/quota-status", get(quota_status))
        .route("/analyze-video", post(analyze_video))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build the clients, bind, and serve until shutdown.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let ledger = Arc::new(HttpLedgerClient::new(&config.ledger)?);
    let provider = Arc::new(GeminiFileClient::new(&config.provider)?);
    let pipeline = Pipeline::new(&config, ledger, provider);

    let bind_addr = config.bind_addr;
    let app = router(Arc::new(AppState { config, pipeline }));

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn root() -> Json<Value> {
    Json(json!({ "service": "formcheck", "message": "Workout form analysis API" }))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "alive",
        "providerKeySet": state.config.provider_key_set(),
    }))
}

async fn quota_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<QuotaSnapshot>, ApiError> {
    let token = bearer_token(&headers).map_err(error_response)?;
    let snapshot = state
        .pipeline
        .quota_status(token)
        .await
        .map_err(error_response)?;
    Ok(Json(snapshot))
}

async fn analyze_video(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let token = bearer_token(&headers).map_err(error_response)?;

    let mut video: Option<(Bytes, Option<String>)> = None;
    let mut exercise: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("video") => {
                let suffix = field.file_name().and_then(file_suffix);
                let bytes = field.bytes().await.map_err(bad_request)?;
                video = Some((bytes, suffix));
            }
            Some("exercise") => {
                let text = field.text().await.map_err(bad_request)?;
                if !text.trim().is_empty() {
                    exercise = Some(text);
                }
            }
            _ => {}
        }
    }

    let (bytes, suffix) = video.ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "missing video field" })),
        )
    })?;

    tracing::info!(size = bytes.len(), exercise = ?exercise, "analysis request received");

    let request = AnalysisRequest {
        token: token.to_string(),
        media: futures::stream::iter(vec![Ok::<_, Infallible>(bytes)]),
        suffix,
        exercise,
    };

    let response = state
        .pipeline
        .analyze(request)
        .await
        .map_err(error_response)?;
    Ok(Json(response))
}

/// File suffix (with the dot) of an uploaded filename, if it has one.
fn file_suffix(name: &str) -> Option<String> {
    name.rfind('.').map(|i| name[i..].to_string())
}

/// Map a pipeline failure to its HTTP outcome.
fn error_response(err: AnalysisError) -> ApiError {
    let status = err.status();
    if status.is_server_error() {
        tracing::error!("analysis request failed: {}", err);
    }
    let body = match &err {
        AnalysisError::QuotaExceeded {
            used,
            limit,
            reset_time,
        } => json!({
            "message": "Daily analysis limit reached",
            "used": used,
            "limit": limit,
            "resetTime": reset_time,
        }),
        AnalysisError::BadCredential => json!({ "message": "Unauthorized" }),
        AnalysisError::UnknownCaller => json!({ "message": "User not found" }),
        _ => json!({ "error": err.to_string() }),
    };
    (status, Json(body))
}

fn bad_request(err: axum::extract::multipart::MultipartError) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": err.to_string() })),
    )
}
