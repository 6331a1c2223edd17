//! The search server: similarity search over the indexed problem corpus.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/query` | Top-K matches for free text (embeds the query) |
//! | `POST` | `/queryById` | Top-K matches for an already-indexed problem id |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! Both query endpoints return `{"results":[{"id","score","metadata"}]}`.
//! Failures respond with `{"error":"..."}`: 400 for a missing field, 404
//! for an id with no stored vector, 500 otherwise. A by-id query ranks the
//! stored vector against the whole corpus, so the queried problem itself
//! comes back as its own best match; callers display it like any other.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::models::{default_top_k, SearchMatch};
use crate::vectors;

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    pool: SqlitePool,
}

/// Start the search server on `[search].bind`. Runs until the process is
/// terminated.
pub async fn run_search_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.search.bind.clone();
    let pool = db::connect(&config.db.path).await?;

    let state = AppState {
        config: Arc::new(config.clone()),
        pool,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/query", post(handle_query))
        .route("/queryById", post(handle_query_by_id))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    println!("search server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

struct AppError {
    status: StatusCode,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        message: message.into(),
    }
}

fn query_failed(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /query ============

/// Optional-field request bodies so a missing field produces the documented
/// 400 body instead of a deserialization rejection.
#[derive(Deserialize)]
struct QueryBody {
    query: Option<String>,
    #[serde(rename = "topK", default = "default_top_k")]
    top_k: usize,
}

#[derive(Serialize)]
struct QueryResults {
    query: String,
    results: Vec<SearchMatch>,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(body): Json<QueryBody>,
) -> Result<Json<QueryResults>, AppError> {
    let query = body
        .query
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| bad_request("Query is required in the request body."))?;

    let provider = embedding::create_provider(&state.config.embedding).map_err(|err| {
        error!("embedding provider unavailable: {:#}", err);
        query_failed("Failed to process the query.")
    })?;
    let query_vec =
        embedding::embed_query(provider.as_ref(), &state.config.embedding, &query)
            .await
            .map_err(|err| {
                error!("query embedding failed: {:#}", err);
                query_failed("Failed to process the query.")
            })?;

    let results = vectors::top_k_similar(&state.pool, &query_vec, body.top_k)
        .await
        .map_err(|err| {
            error!("vector scan failed: {:#}", err);
            query_failed("Failed to process the query.")
        })?;

    Ok(Json(QueryResults { query, results }))
}

// ============ POST /queryById ============

#[derive(Deserialize)]
struct QueryByIdBody {
    id: Option<String>,
    #[serde(rename = "topK", default = "default_top_k")]
    top_k: usize,
}

#[derive(Serialize)]
struct QueryByIdResults {
    id: String,
    results: Vec<SearchMatch>,
}

async fn handle_query_by_id(
    State(state): State<AppState>,
    Json(body): Json<QueryByIdBody>,
) -> Result<Json<QueryByIdResults>, AppError> {
    let id = body
        .id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| bad_request("ID is required in the request body."))?;

    let stored_vec = vectors::fetch_vector(&state.pool, &id)
        .await
        .map_err(|err| {
            error!("vector fetch failed: {:#}", err);
            query_failed("Failed to process the query by ID.")
        })?
        .ok_or_else(|| not_found(format!("No vector found for the specified ID: {}", id)))?;

    let results = vectors::top_k_similar(&state.pool, &stored_vec, body.top_k)
        .await
        .map_err(|err| {
            error!("vector scan failed: {:#}", err);
            query_failed("Failed to process the query by ID.")
        })?;

    Ok(Json(QueryByIdResults { id, results }))
}
