//! The assist server: question proxy + conversation persistence.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/query` | Relay a question to the generative API, persist the exchange |
//! | `GET`  | `/history` | Stored conversation for `?user_name=&problem_title=` |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Failures respond with `{"status":"error","error":"..."}`. Remote
//! generative-API failures surface as one generic `Internal Server Error`
//! body; details land in the log, not the client.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted: the caller is a page
//! overlay running on someone else's site.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::conversation;
use crate::db;
use crate::llm;
use crate::models::{AskRequest, AskResponse, HistoryResponse};

/// Shared state for all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    pool: SqlitePool,
}

/// Start the assist server on `[assist].bind`. Runs until the process is
/// terminated.
pub async fn run_assist_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.assist.bind.clone();
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
        .route("/history", get(handle_history))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    println!("assist server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// Error type that renders as the `{"status":"error","error":...}` body.
struct AppError {
    status: StatusCode,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    status: String,
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            status: "error".to_string(),
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

fn internal_error() -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: "Internal Server Error".to_string(),
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

/// One query round-trip: look up (or lazily create) the user and the
/// conversation for the problem title, send the stored history plus the new
/// prompt to the generative API, and append exactly one user/model pair.
///
/// No deduplication: resubmitting an identical query appends a fresh pair.
async fn handle_query(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    if request.query.trim().is_empty() {
        return Err(bad_request("Query is required in the request body."));
    }

    info!(
        user = %request.db_data.user_name,
        problem = %request.db_data.problem_title,
        "query received"
    );

    let pool = &state.pool;
    let owner_id = conversation::get_or_create_user(pool, &request.db_data.user_name)
        .await
        .map_err(|err| {
            error!("user lookup failed: {:#}", err);
            internal_error()
        })?;
    let conversation_id =
        conversation::get_or_create_conversation(pool, &owner_id, &request.db_data.problem_title)
            .await
            .map_err(|err| {
                error!("conversation lookup failed: {:#}", err);
                internal_error()
            })?;

    let history = conversation::history(
        pool,
        &request.db_data.user_name,
        &request.db_data.problem_title,
    )
    .await
    .map_err(|err| {
        error!("history load failed: {:#}", err);
        internal_error()
    })?;

    let prompt = llm::build_prompt(&request.query, &request.context);
    let reply = llm::generate_reply(&state.config.llm, &history, &prompt)
        .await
        .map_err(|err| {
            error!("generative API call failed: {:#}", err);
            internal_error()
        })?;

    conversation::append_exchange(pool, &conversation_id, &request.query, &reply)
        .await
        .map_err(|err| {
            error!("exchange append failed: {:#}", err);
            internal_error()
        })?;

    Ok(Json(AskResponse {
        status: "success".to_string(),
        response: Some(reply),
        error: None,
        conversation_id: Some(conversation_id),
    }))
}

// ============ GET /history ============

#[derive(Deserialize)]
struct HistoryParams {
    user_name: Option<String>,
    problem_title: Option<String>,
}

/// Stored messages for a (user, problem-title) pair, oldest first. A
/// never-seen pair is an empty conversation, not an error.
async fn handle_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, AppError> {
    let user_name = params
        .user_name
        .filter(|s| !s.is_empty())
        .ok_or_else(|| bad_request("user_name is required."))?;
    let problem_title = params
        .problem_title
        .filter(|s| !s.is_empty())
        .ok_or_else(|| bad_request("problem_title is required."))?;

    let messages = conversation::history(&state.pool, &user_name, &problem_title)
        .await
        .map_err(|err| {
            error!("history load failed: {:#}", err);
            internal_error()
        })?;

    Ok(Json(HistoryResponse {
        status: "success".to_string(),
        conversation: messages,
    }))
}
