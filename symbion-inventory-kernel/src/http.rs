/**
 * API REST INVENTAIRE - Serveur HTTP du kernel
 *
 * RÔLE :
 * Expose les node sets de chaque source au format attendu par l'orchestrateur.
 *
 * FONCTIONNEMENT :
 * - Routes : /health, /system/health, /sources, /sources/{name}/nodes,
 *   /sources/{name}/resources.yaml
 * - Chaque lecture passe par NodeSource::get_nodes (cache + refresh)
 * - Premier fetch en échec → 502, source inconnue → 404
 *
 * SÉCURITÉ :
 * - Si une clé API est configurée, header x-api-key obligatoire sauf /health
 */

use crate::health::{HealthTracker, KernelHealth};
use crate::sources::SourceRegistry;
use axum::extract::{Path, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use symbion_inventory::model::NodeSet;
use symbion_inventory::refresh::{CacheState, SourceStatus};
use symbion_inventory::render::{resource_document, to_yaml, ResourceDocument};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use tracing::warn;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SourceRegistry>,
    pub health_tracker: HealthTracker,
    pub api_key: Option<String>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unknown source: {0}")]
    UnknownSource(String),
    #[error("{0}")]
    Upstream(String),
    #[error("rendering failed: {0}")]
    Render(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::UnknownSource(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Serialize)]
struct SourceView {
    name: String,
    state: CacheState,
    refresh_in_flight: bool,
    node_count: usize,
    last_refresh: Option<String>, // RFC3339
}

fn to_view(status: SourceStatus) -> SourceView {
    SourceView {
        name: status.name,
        state: status.state,
        refresh_in_flight: status.refresh_in_flight,
        node_count: status.node_count,
        last_refresh: status.last_refresh.and_then(|t| t.format(&Rfc3339).ok()),
    }
}

async fn require_api_key(State(app): State<AppState>, req: Request, next: Next) -> Result<Response, StatusCode> {
    let Some(expected) = app.api_key.as_deref().filter(|k| !k.is_empty()) else {
        return Ok(next.run(req).await);
    };
    if req.uri().path() == "/health" {
        return Ok(next.run(req).await);
    }

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);
    if !ok {
        warn!(path = %req.uri().path(), "rejected request without valid API key");
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/sources", get(list_sources))
        .route("/sources/{name}/nodes", get(get_nodes))
        .route("/sources/{name}/resources.yaml", get(get_resources_yaml))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_api_key))
        .with_state(app_state)
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health_tracker.get_health(&app.registry))
}

// GET /sources
async fn list_sources(State(app): State<AppState>) -> Json<Vec<SourceView>> {
    let mut views = Vec::with_capacity(app.registry.len());
    for source in app.registry.iter() {
        views.push(to_view(source.status()));
    }
    Json(views)
}

async fn load_nodes(app: &AppState, name: &str) -> Result<Arc<NodeSet>, ApiError> {
    let source = app
        .registry
        .get(name)
        .ok_or_else(|| ApiError::UnknownSource(name.to_string()))?;
    match source.get_nodes().await {
        Ok(nodes) => {
            app.health_tracker.clear_error(name);
            Ok(nodes)
        }
        Err(e) => {
            app.health_tracker.record_error(name, e.to_string());
            Err(ApiError::Upstream(e.to_string()))
        }
    }
}

// GET /sources/{name}/nodes
async fn get_nodes(
    State(app): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ResourceDocument>, ApiError> {
    let nodes = load_nodes(&app, &name).await?;
    Ok(Json(resource_document(&nodes)))
}

// GET /sources/{name}/resources.yaml
async fn get_resources_yaml(
    State(app): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let nodes = load_nodes(&app, &name).await?;
    let body = to_yaml(&nodes).map_err(|e| ApiError::Render(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "application/yaml")], body).into_response())
}
