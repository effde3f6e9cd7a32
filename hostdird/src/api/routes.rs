use std::sync::Arc;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use shared::protocol::{API_PREFIX, TOKEN_HEADER};
use shared::types::{HostRecord, RegisterRequest, RemovedHost};
use crate::api::error::ApiError;
use crate::directory::DirectoryService;
use crate::settings::SettingsService;

#[derive(Clone)]
pub struct AppState {
    pub directory: Arc<DirectoryService>,
    pub settings: Arc<SettingsService>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(&format!("{API_PREFIX}/hosts"), get(list_hosts).post(register_host))
        .route(
            &format!("{API_PREFIX}/hosts/code/:code"),
            get(get_host_by_code).delete(delete_host_by_code),
        )
        .route(&format!("{API_PREFIX}/hosts/:id"), get(get_host).delete(delete_host))
        .route(&format!("{API_PREFIX}/hosts/:id/refresh"), post(refresh_host))
        .route(&format!("{API_PREFIX}/config"), get(get_settings).post(update_settings))
        .with_state(state)
}

async fn register_host(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<HostRecord>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(state.directory.register(request).await?))
}

async fn list_hosts(State(state): State<AppState>) -> Result<Json<Vec<HostRecord>>, ApiError> {
    Ok(Json(state.directory.list_live().await?))
}

async fn get_host(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<HostRecord>, ApiError> {
    Ok(Json(state.directory.get_by_id(&id).await?))
}

async fn delete_host(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RemovedHost>, ApiError> {
    let host = state.directory.delete_by_id(&id).await?;
    Ok(Json(RemovedHost::new(host)))
}

async fn refresh_host(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<HostRecord>, ApiError> {
    Ok(Json(state.directory.refresh(&id).await?))
}

async fn get_host_by_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<HostRecord>, ApiError> {
    Ok(Json(state.directory.get_by_code(&code).await?))
}

async fn delete_host_by_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<RemovedHost>, ApiError> {
    let host = state.directory.delete_by_code(&code).await?;
    Ok(Json(RemovedHost::new(host)))
}

async fn get_settings(
    State(state): State<AppState>,
) -> Result<Json<Option<serde_json::Value>>, ApiError> {
    Ok(Json(state.settings.get().await?))
}

async fn update_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let token = headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok());

    // Token first, so an unauthenticated caller learns nothing about the body
    state.settings.authorize(token)?;
    let Json(body) = payload?;
    state.settings.update(token, body).await?;

    Ok(Json(json!({ "success": true })))
}
