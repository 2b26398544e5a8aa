use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, RawQuery, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::catalog::{self, ArtworkQuery, BatchQuery};
use crate::client::CatalogClient;
use crate::error::ApiError;
use crate::gallery::{self, SortKey};
use crate::image_proxy::{ImageProxy, ImageQuery};

pub const LIST_CACHE_CONTROL: &str = "public, max-age=300, stale-while-revalidate=600";
pub const COLLECTIONS_CACHE_CONTROL: &str = "public, max-age=300";

pub struct AppState {
    pub catalog: CatalogClient,
    pub images: ImageProxy,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/artworks", get(list_artworks))
        .route("/api/artworks/batch", get(batch_artworks))
        .route("/api/artworks/{id}", get(get_artwork))
        .route("/api/collections", get(list_collections))
        .route("/api/collections/{name}/artworks", get(collection_artworks))
        .route("/api/collections/{name}/page", get(collection_page))
        .route("/api/home", get(homepage))
        .route("/api/img", get(proxy_image))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(state: Arc<AppState>, addr: SocketAddr) -> Result<()> {
    let app = build_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(%addr, "artwork proxy listening");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

fn cached_json<T: Serialize>(cache_control: &'static str, body: T) -> Response {
    (
        [(header::CACHE_CONTROL, HeaderValue::from_static(cache_control))],
        Json(body),
    )
        .into_response()
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_artworks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ArtworkQuery>,
) -> Result<Response, ApiError> {
    let artworks = catalog::list_artworks(&state.catalog, &query).await?;
    Ok(cached_json(LIST_CACHE_CONTROL, artworks))
}

async fn batch_artworks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BatchQuery>,
) -> Result<Response, ApiError> {
    let result = catalog::batch_lookup(&state.catalog, &query).await?;
    Ok(cached_json(LIST_CACHE_CONTROL, result))
}

async fn get_artwork(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let artwork = catalog::get_artwork(&state.catalog, &id).await?;
    Ok(cached_json(LIST_CACHE_CONTROL, artwork))
}

async fn list_collections(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let collections = catalog::list_collections(&state.catalog).await?;
    Ok(cached_json(COLLECTIONS_CACHE_CONTROL, collections))
}

async fn collection_artworks(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    RawQuery(raw): RawQuery,
) -> Result<Response, ApiError> {
    let artworks = catalog::collection_artworks(&state.catalog, &name, raw.as_deref()).await?;
    Ok(cached_json(LIST_CACHE_CONTROL, artworks))
}

#[derive(Debug, Default, Deserialize)]
struct PageParams {
    page: Option<String>,
    sort: Option<String>,
}

async fn collection_page(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<Response, ApiError> {
    let collections = catalog::list_collections(&state.catalog).await?;
    let collection = gallery::resolve_collection(&collections, &slug)
        .cloned()
        .ok_or_else(|| ApiError::not_found("Collection not found"))?;

    let artworks = catalog::collection_artworks(&state.catalog, collection.name(), None).await?;
    let sort = SortKey::parse(params.sort.as_deref());
    let page = gallery::assemble_page(collection, artworks, params.page.as_deref(), sort);
    Ok(cached_json(LIST_CACHE_CONTROL, page))
}

async fn homepage(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let data = catalog::homepage(&state.catalog).await?;
    Ok(cached_json(LIST_CACHE_CONTROL, data))
}

async fn proxy_image(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ImageQuery>,
) -> Response {
    state.images.fetch(&query).await
}
