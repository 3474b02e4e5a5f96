use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use linkdex_core::{Bookmark, BookmarkEdit, DocId, Error, Library, QueueHandle, SearchOptions, SortOrder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub library: Arc<Library>,
    pub queue: QueueHandle,
    pub admin_token: Option<String>,
}

impl AppState {
    /// Reads the admin token from `ADMIN_TOKEN`.
    pub fn from_env(library: Arc<Library>, queue: QueueHandle) -> Self {
        Self { library, queue, admin_token: std::env::var("ADMIN_TOKEN").ok() }
    }
}

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    /// Comma separated; every tag must be present.
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub sort: String,
    pub k: Option<usize>,
}

#[derive(Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub sort: String,
}

#[derive(Deserialize)]
pub struct AddRequest {
    pub url: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<BookmarkSummary>,
}

/// A bookmark without its page text.
#[derive(Serialize)]
pub struct BookmarkSummary {
    pub id: DocId,
    pub url: String,
    pub title: String,
    pub tags: Vec<String>,
    pub status_code: u16,
    pub size: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_scraped: OffsetDateTime,
}

impl From<&Bookmark> for BookmarkSummary {
    fn from(b: &Bookmark) -> Self {
        Self {
            id: b.id,
            url: b.url.clone(),
            title: b.display_title().to_string(),
            tags: b.tags.clone(),
            status_code: b.info.status_code,
            size: b.info.size,
            created: b.created,
            last_scraped: b.last_scraped,
        }
    }
}

/// JSON error body with a status derived from the library error.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            Error::Duplicate(_) => StatusCode::CONFLICT,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::QueueClosed => StatusCode::SERVICE_UNAVAILABLE,
            _ => {
                tracing::error!(%err, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self { status, message: err.to_string() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn build_app(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let origins: Vec<_> = std::env::var("CORS_ALLOW_ORIGIN")
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();
    let cors = if origins.is_empty() {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/bookmarks", get(list_handler).post(add_handler))
        .route("/bookmarks/bulk", post(bulk_handler))
        .route("/bookmarks/:id", get(get_handler).put(edit_handler).delete(delete_handler))
        .route("/bookmarks/:id/scrape", post(scrape_handler))
        .route("/search", get(search_handler))
        .route("/export", get(export_handler))
        .route("/stats", get(stats_handler))
        .route("/index/rebuild", post(rebuild_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> ApiResult<Json<SearchResponse>> {
    let start = std::time::Instant::now();
    let opts = SearchOptions {
        query: params.q.clone(),
        tags: params.tags.split(',').map(str::trim).filter(|t| !t.is_empty()).map(String::from).collect(),
        sort: SortOrder::parse(&params.sort),
        limit: params.k.map(|k| k.clamp(1, 100)),
    };
    let found = state.library.search(&opts)?;
    let results: Vec<BookmarkSummary> = found.iter().map(BookmarkSummary::from).collect();
    Ok(Json(SearchResponse { query: params.q, took_s: start.elapsed().as_secs_f64(), total_hits: results.len(), results }))
}

async fn list_handler(State(state): State<AppState>, Query(params): Query<ListParams>) -> ApiResult<Json<Vec<BookmarkSummary>>> {
    let all = state.library.list_bookmarks(SortOrder::parse(&params.sort))?;
    Ok(Json(all.iter().map(BookmarkSummary::from).collect()))
}

/// Stores the bookmark and queues its first scrape right away.
async fn add_handler(State(state): State<AppState>, Json(req): Json<AddRequest>) -> ApiResult<(StatusCode, Json<BookmarkSummary>)> {
    let added = state.library.add_bookmark(&req.url, &req.tags)?;
    let queued = state.queue.enqueue(added.id)?;
    Ok((StatusCode::CREATED, Json(BookmarkSummary::from(&queued))))
}

/// One URL per line. New bookmarks are left for the staleness scanner, which treats never
/// scraped bookmarks as stale.
async fn bulk_handler(State(state): State<AppState>, body: String) -> Json<serde_json::Value> {
    let report = state.library.add_bookmarks(body.lines());
    Json(serde_json::json!({ "added": report.added, "errors": report.errors }))
}

async fn get_handler(State(state): State<AppState>, Path(id): Path<DocId>) -> ApiResult<Json<Bookmark>> {
    Ok(Json(state.library.bookmark(id)?))
}

async fn edit_handler(State(state): State<AppState>, Path(id): Path<DocId>, Json(edit): Json<BookmarkEdit>) -> ApiResult<Json<BookmarkSummary>> {
    let edited = state.library.edit_bookmark(id, &edit)?;
    Ok(Json(BookmarkSummary::from(&edited)))
}

async fn delete_handler(State(state): State<AppState>, Path(id): Path<DocId>) -> ApiResult<Json<BookmarkSummary>> {
    let removed = state.library.delete_bookmark(id)?;
    Ok(Json(BookmarkSummary::from(&removed)))
}

async fn scrape_handler(State(state): State<AppState>, Path(id): Path<DocId>) -> ApiResult<(StatusCode, Json<BookmarkSummary>)> {
    let queued = state.queue.enqueue(id)?;
    Ok((StatusCode::ACCEPTED, Json(BookmarkSummary::from(&queued))))
}

async fn export_handler(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let mut out = Vec::new();
    state.library.export_bookmarks(&mut out)?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], out))
}

async fn stats_handler(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let stats = state.library.stats()?;
    let recent = stats.most_recent();
    Ok(Json(serde_json::json!({
        "searches": stats.searches,
        "file_size": stats.file_size,
        "bookmarks": recent.bookmarks,
        "indexed_words": recent.indexed_words,
        "history": stats.history,
    })))
}

async fn rebuild_handler(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    authorize(&state, &headers)?;
    let library = state.library.clone();
    let rebuilt = tokio::task::spawn_blocking(move || library.reindex_all())
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(serde_json::json!({ "reindexed": rebuilt })))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), (StatusCode, String)> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
