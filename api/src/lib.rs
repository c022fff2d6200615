//! HTTP surface: health check, Slack Events API webhook and the insights read API.

pub mod signature;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use insights_store::{InsightsConfig, Store};
use insights_types::{Insight, WebhookAction, WebhookPayload};
use serde::Deserialize;
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, error, info, warn};

const MAX_PAGE_SIZE: usize = 100;

#[derive(Clone)]
pub struct AppState {
    store: Store,
    signing_secret: Option<String>,
    page_size: usize,
}

impl AppState {
    pub fn new(store: Store, config: &InsightsConfig) -> Self {
        Self {
            store,
            signing_secret: config.slack_signing_secret.clone(),
            page_size: config.page_size,
        }
    }
}

/// Failure surfaced to the client as `{"error": ...}`; the cause is logged, not returned.
#[derive(Debug)]
struct ApiError {
    message: &'static str,
    source: anyhow::Error,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(err = ?self.source, "{}", self.message);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.message })),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
struct InsightsQuery {
    /// Kept raw so out-of-range or non-numeric values clamp instead of rejecting.
    limit: Option<String>,
    channel: Option<String>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/slack/events", post(slack_events))
        .route("/api/insights", get(list_insights))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let pending = state
        .store
        .pending_count()
        .map_err(|e| warn!(err = ?e, "could not count pending messages"))
        .ok();
    Json(json!({
        "status": "ok",
        "message": "Slack Insights API is running",
        "pending": pending,
    }))
}

async fn slack_events(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if let Some(secret) = &state.signing_secret {
        if let Err(reason) = authenticate(secret, &headers, &body) {
            warn!(reason, "rejected slack webhook");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    let payload = match WebhookPayload::parse(&body) {
        Ok(p) => p,
        Err(e) => {
            warn!(err = ?e, "malformed slack webhook body");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match payload.classify(Utc::now()) {
        WebhookAction::Challenge(challenge) => {
            info!("answering slack url verification");
            Json(json!({ "challenge": challenge })).into_response()
        }
        WebhookAction::Store(message) => {
            // Slack expects an ack within three seconds; storage failures are only logged.
            match state.store.insert_message(&message) {
                Ok(true) => info!(ts = ?message.ts, channel = %message.channel_id, "message stored"),
                Ok(false) => debug!(ts = ?message.ts, "duplicate delivery ignored"),
                Err(e) => error!(err = ?e, "error storing message"),
            }
            StatusCode::OK.into_response()
        }
        WebhookAction::Ignore(reason) => {
            debug!(reason = reason.as_str(), "event ignored");
            StatusCode::OK.into_response()
        }
    }
}

fn authenticate(secret: &str, headers: &HeaderMap, body: &[u8]) -> Result<(), &'static str> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let timestamp = header("x-slack-request-timestamp").ok_or("missing timestamp header")?;
    if !signature::is_fresh(timestamp, Utc::now().timestamp()) {
        return Err("stale or invalid timestamp");
    }
    let sig = header("x-slack-signature").ok_or("missing signature header")?;
    if !signature::verify(secret, timestamp, body, sig) {
        return Err("invalid signature");
    }
    Ok(())
}

async fn list_insights(
    State(state): State<AppState>,
    Query(query): Query<InsightsQuery>,
) -> ApiResult<Json<Vec<Insight>>> {
    let limit = page_limit(query.limit.as_deref(), state.page_size);
    let channel = query.channel.as_deref().filter(|c| !c.trim().is_empty());
    let insights = state
        .store
        .recent_insights(limit, channel)
        .map_err(|source| ApiError {
            message: "Failed to fetch insights",
            source,
        })?;
    Ok(Json(insights))
}

fn page_limit(raw: Option<&str>, default: usize) -> usize {
    let requested = raw
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or_else(|| i64::try_from(default).unwrap_or(i64::MAX));
    usize::try_from(requested.max(1))
        .unwrap_or(MAX_PAGE_SIZE)
        .min(MAX_PAGE_SIZE)
}
