use crate::csv_export::{write_charges, write_gifts, write_months};
use crate::domain::models::HistorySnapshot;
use crate::domain::repository::load_state;
use crate::usecases::sync_service::{SyncOutcome, SyncService};
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SyncService>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/sync", post(api_sync))
        .route("/api/sync/cancel", post(api_cancel))
        .route("/api/status", get(api_status))
        .route("/api/history", get(api_history))
        .route("/api/export", get(api_export))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

#[derive(Debug, Deserialize)]
struct SyncQuery {
    #[serde(default)]
    full: bool,
}

/// Starts a run in the background. Completion is observed through `/api/status`.
#[tracing::instrument(skip(state))]
async fn api_sync(State(state): State<AppState>, Query(q): Query<SyncQuery>) -> Json<serde_json::Value> {
    if state.service.is_running() {
        return Json(json!({"status": "already_running"}));
    }
    spawn_sync(state.service.clone(), q.full);
    Json(json!({"status": "started", "full": q.full}))
}

pub fn spawn_sync(service: Arc<SyncService>, full: bool) {
    tokio::spawn(async move {
        match service.sync(full).await {
            SyncOutcome::Complete(s) => info!(gifts = s.gift_history.len(), "Background sync complete"),
            SyncOutcome::LoginRequired => info!("Background sync needs a fresh login"),
            SyncOutcome::Failed(reason) => error!(%reason, "Background sync failed"),
            SyncOutcome::Cancelled(_) => info!("Background sync cancelled"),
            SyncOutcome::AlreadyRunning => {}
        }
    });
}

async fn api_cancel(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({"cancelled": state.service.cancel()}))
}

#[tracing::instrument(skip(state))]
async fn api_status(State(state): State<AppState>) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let cached = load_state(state.service.cache()).await.map_err(|e| {
        error!(error = %e, "Failed reading cached state");
        (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": e.to_string()})))
    })?;
    let cached = cached.unwrap_or_default();
    Ok(Json(json!({
        "phase": state.service.phase(),
        "running": state.service.is_running(),
        "progress": state.service.progress(),
        "lastSync": cached.last_sync,
        "isLoggedIn": cached.is_logged_in,
        "shouldSync": state.service.should_sync().await,
    })))
}

async fn cached_snapshot(state: &AppState) -> Result<Option<HistorySnapshot>, (StatusCode, Json<serde_json::Value>)> {
    match load_state(state.service.cache()).await {
        Ok(s) => Ok(s.and_then(|s| s.data)),
        Err(e) => {
            error!(error = %e, "Failed reading cached state");
            Err((StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": e.to_string()}))))
        }
    }
}

async fn api_history(State(state): State<AppState>) -> Result<Json<Option<HistorySnapshot>>, (StatusCode, Json<serde_json::Value>)> {
    Ok(Json(cached_snapshot(&state).await?))
}

#[derive(Debug, Deserialize)]
struct ExportQuery {
    kind: Option<String>,
}

#[tracing::instrument(skip(state))]
async fn api_export(State(state): State<AppState>, Query(q): Query<ExportQuery>) -> Response {
    let snapshot = match cached_snapshot(&state).await {
        Ok(s) => s.unwrap_or_default(),
        Err(e) => return e.into_response(),
    };
    let kind = q.kind.unwrap_or_else(|| "gifts".to_string());
    let mut buf = Vec::new();
    let written = match kind.as_str() {
        "charges" => write_charges(&mut buf, &snapshot.charge_history),
        "months" => write_months(&mut buf, &snapshot.summary),
        "gifts" => write_gifts(&mut buf, &snapshot.gift_history),
        other => {
            return (StatusCode::BAD_REQUEST, Json(json!({"error": format!("unknown export kind '{other}'")})))
                .into_response();
        }
    };
    if let Err(e) = written {
        error!(error = %e, kind = %kind, "CSV export failed");
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": e.to_string()}))).into_response();
    }
    ([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], buf).into_response()
}
