use anyhow::{Context, Result};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::catalog::{EntityKind, FsCatalog, WriteOutcome, is_safe_id, slugify_name};
use crate::config::Config;
use crate::search::{IndexCache, IndexStatus, SearchFilters, SearchResult};

/// Application state shared across handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub cache: IndexCache,
    pub catalog: Arc<FsCatalog>,
    pub config: Arc<Config>,
}

/// Error returned by handlers; internal causes are logged, never sent
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal {
        message: &'static str,
        source: anyhow::Error,
    },
}

impl ApiError {
    fn internal(message: &'static str, source: anyhow::Error) -> Self {
        ApiError::Internal { message, source }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(source: anyhow::Error) -> Self {
        ApiError::internal("Internal server error", source)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Internal { message, source } => {
                error!("{}: {:#}", message, source);
                (StatusCode::INTERNAL_SERVER_ERROR, message.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/search", get(search))
        .route("/api/search/status", get(search_status))
        .route("/api/brands", get(list_brands).post(create_brand))
        .route(
            "/api/brands/{id}",
            get(get_brand).put(update_brand).delete(delete_brand),
        )
        .route(
            "/api/brands/{brand}/materials",
            get(list_materials).post(create_material),
        )
        .route(
            "/api/brands/{brand}/materials/{id}",
            get(get_material).put(update_material).delete(delete_material),
        )
        .route(
            "/api/brands/{brand}/packages",
            get(list_packages).post(create_package),
        )
        .route(
            "/api/brands/{brand}/packages/{id}",
            get(get_package).put(update_package).delete(delete_package),
        )
        .route("/api/containers", get(list_containers).post(create_container))
        .route(
            "/api/containers/{id}",
            get(get_container).put(update_container).delete(delete_container),
        )
        .with_state(state)
}

/// Bind and serve until the process is stopped
pub async fn serve(state: AppState, addr: &str) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    info!("Catalog search HTTP server listening on {}", addr);

    axum::serve(listener, router(state))
        .await
        .context("HTTP server error")
}

async fn health() -> impl IntoResponse {
    StatusCode::OK
}

/// Raw query string of `GET /api/search`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub q: Option<String>,
    pub types: Option<String>,
    pub brand: Option<String>,
    pub material_type: Option<String>,
    pub limit: Option<String>,
}

impl SearchParams {
    pub fn filters(&self) -> SearchFilters {
        SearchFilters::from_raw(
            self.types.as_deref(),
            self.brand.as_deref(),
            self.material_type.as_deref(),
        )
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub query: String,
    pub filters: SearchFilters,
    pub total_count: usize,
    /// Wall-clock milliseconds for the whole request
    pub timing: u64,
}

pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<SearchResponse>> {
    let started = Instant::now();
    let query = params.q.clone().unwrap_or_default();
    let filters = params.filters();
    let limit = state.config.resolve_limit(params.limit.as_deref());

    let results = state
        .cache
        .search(&query, &filters, limit)
        .await
        .map_err(|e| ApiError::internal("Search failed", e))?;

    let timing = started.elapsed().as_millis() as u64;
    debug!(
        "Search '{}' with {:?} returned {} results in {}ms",
        query,
        filters,
        results.len(),
        timing
    );

    Ok(Json(SearchResponse {
        total_count: results.len(),
        results,
        query,
        filters,
        timing,
    }))
}

pub async fn search_status(State(state): State<AppState>) -> Json<IndexStatus> {
    Json(state.cache.status())
}

fn parse_body(body: &Bytes) -> ApiResult<Value> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {e}")))?;
    if !value.is_object() {
        return Err(ApiError::BadRequest("JSON body must be an object".to_string()));
    }
    Ok(value)
}

/// Identifier for a new record: explicit slug, else the slugified name
fn derive_id(payload: &Value) -> Option<String> {
    let slug = payload
        .get("slug")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    slug.or_else(|| {
        payload
            .get("name")
            .and_then(Value::as_str)
            .and_then(slugify_name)
    })
}

/// Ids from the URL that could never name a record file
fn ensure_addressable(kind: EntityKind, id: &str) -> ApiResult<()> {
    if is_safe_id(id) {
        Ok(())
    } else {
        Err(ApiError::NotFound(format!("{kind} '{id}' not found")))
    }
}

async fn list_entities(state: &AppState, kind: EntityKind, brand: Option<&str>) -> ApiResult<Json<Value>> {
    match state.catalog.list(kind, brand).await? {
        Some(values) => Ok(Json(Value::Array(values))),
        None => Err(ApiError::NotFound(format!("Brand '{}' not found", brand.unwrap_or_default()))),
    }
}

async fn get_entity(state: &AppState, kind: EntityKind, brand: Option<&str>, id: &str) -> ApiResult<Json<Value>> {
    ensure_addressable(kind, id)?;
    state
        .catalog
        .read(kind, brand, id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("{kind} '{id}' not found")))
}

async fn create_entity(state: &AppState, kind: EntityKind, brand: Option<&str>, body: Bytes) -> ApiResult<Json<Value>> {
    let payload = parse_body(&body)?;
    let id = derive_id(&payload).ok_or_else(|| {
        ApiError::BadRequest("Name or slug is required to generate identifier".to_string())
    })?;
    if !is_safe_id(&id) {
        return Err(ApiError::BadRequest(format!("Invalid identifier '{id}'")));
    }

    match state.catalog.write(kind, brand, &id, &payload, true).await? {
        WriteOutcome::NotFound => Err(ApiError::NotFound(format!(
            "Brand '{}' not found",
            brand.unwrap_or_default()
        ))),
        _ => {
            state.cache.invalidate();
            Ok(Json(payload))
        }
    }
}

async fn update_entity(
    state: &AppState,
    kind: EntityKind,
    brand: Option<&str>,
    id: &str,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    ensure_addressable(kind, id)?;
    let payload = parse_body(&body)?;

    let outcome = state.catalog.write(kind, brand, id, &payload, false).await?;
    if !outcome.is_written() {
        return Err(ApiError::NotFound(format!("{kind} '{id}' not found")));
    }

    state.cache.invalidate();
    Ok(Json(payload))
}

async fn delete_entity(state: &AppState, kind: EntityKind, brand: Option<&str>, id: &str) -> ApiResult<Json<Value>> {
    ensure_addressable(kind, id)?;
    if !state.catalog.delete(kind, brand, id).await? {
        return Err(ApiError::NotFound(format!("{kind} '{id}' not found")));
    }

    state.cache.invalidate();
    Ok(Json(json!({ "success": true })))
}

// Brands

async fn list_brands(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    list_entities(&state, EntityKind::Brand, None).await
}

async fn create_brand(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<Value>> {
    create_entity(&state, EntityKind::Brand, None, body).await
}

async fn get_brand(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    get_entity(&state, EntityKind::Brand, None, &id).await
}

async fn update_brand(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    update_entity(&state, EntityKind::Brand, None, &id, body).await
}

async fn delete_brand(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    delete_entity(&state, EntityKind::Brand, None, &id).await
}

// Materials

async fn list_materials(State(state): State<AppState>, Path(brand): Path<String>) -> ApiResult<Json<Value>> {
    list_entities(&state, EntityKind::Material, Some(&brand)).await
}

async fn create_material(
    State(state): State<AppState>,
    Path(brand): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    create_entity(&state, EntityKind::Material, Some(&brand), body).await
}

async fn get_material(
    State(state): State<AppState>,
    Path((brand, id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    get_entity(&state, EntityKind::Material, Some(&brand), &id).await
}

async fn update_material(
    State(state): State<AppState>,
    Path((brand, id)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    update_entity(&state, EntityKind::Material, Some(&brand), &id, body).await
}

async fn delete_material(
    State(state): State<AppState>,
    Path((brand, id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    delete_entity(&state, EntityKind::Material, Some(&brand), &id).await
}

// Packages

async fn list_packages(State(state): State<AppState>, Path(brand): Path<String>) -> ApiResult<Json<Value>> {
    list_entities(&state, EntityKind::Package, Some(&brand)).await
}

async fn create_package(
    State(state): State<AppState>,
    Path(brand): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    create_entity(&state, EntityKind::Package, Some(&brand), body).await
}

async fn get_package(
    State(state): State<AppState>,
    Path((brand, id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    get_entity(&state, EntityKind::Package, Some(&brand), &id).await
}

async fn update_package(
    State(state): State<AppState>,
    Path((brand, id)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    update_entity(&state, EntityKind::Package, Some(&brand), &id, body).await
}

async fn delete_package(
    State(state): State<AppState>,
    Path((brand, id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    delete_entity(&state, EntityKind::Package, Some(&brand), &id).await
}

// Containers

async fn list_containers(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    list_entities(&state, EntityKind::Container, None).await
}

async fn create_container(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<Value>> {
    create_entity(&state, EntityKind::Container, None, body).await
}

async fn get_container(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    get_entity(&state, EntityKind::Container, None, &id).await
}

async fn update_container(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    update_entity(&state, EntityKind::Container, None, &id, body).await
}

async fn delete_container(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    delete_entity(&state, EntityKind::Container, None, &id).await
}
