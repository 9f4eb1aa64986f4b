//! HTTP API server.
//!
//! Exposes the retrieval pipeline over a JSON HTTP API — the defined
//! collaborator interface for chat front-ends and other presentation
//! layers, which stay outside this crate.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/v1/diagnose` | Diagnose an issue against the knowledge base |
//! | `POST` | `/api/v1/kb/upload` | Ingest tickets and/or team members |
//! | `GET`  | `/api/v1/kb/search` | Similarity-search past tickets |
//! | `GET`  | `/api/v1/kb/search/team` | Similarity-search team profiles |
//! | `POST` | `/api/v1/feedback` | Record feedback on a suggestion |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_ready` (503), `store_unavailable`
//! (503), `upstream_error` (502), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::completion::{CompletionApi, OpenAiCompletion};
use crate::config::Config;
use crate::embedding::{Embedder, OpenAiEmbedder};
use crate::error::TriageError;
use crate::ingest;
use crate::models::{Diagnosis, Feedback, TeamMemberHit, TicketHit};
use crate::rag::RagEngine;
use crate::store::VectorStore;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    store: Arc<VectorStore>,
    embedder: Arc<dyn Embedder>,
    engine: Arc<RagEngine>,
}

/// Starts the HTTP API server.
///
/// Opens the store, loads both collections into a query-ready state, and
/// binds to the address configured in `[server].bind`. Runs until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let config = Arc::new(config.clone());

    let store = Arc::new(VectorStore::open(&config).await?);
    store.load_all().await?;

    let embedder: Arc<dyn Embedder> = Arc::new(OpenAiEmbedder::new(&config.embedding)?);
    let completion: Arc<dyn CompletionApi> = Arc::new(OpenAiCompletion::new(&config.completion)?);
    let engine = Arc::new(RagEngine::new(
        store.clone(),
        embedder.clone(),
        completion,
        config.retrieval.top_k,
    ));

    let state = AppState {
        config: config.clone(),
        store,
        embedder,
        engine,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/v1/diagnose", post(handle_diagnose))
        .route("/api/v1/kb/upload", post(handle_kb_upload))
        .route("/api/v1/kb/search", get(handle_kb_search))
        .route("/api/v1/kb/search/team", get(handle_team_search))
        .route("/api/v1/feedback", post(handle_feedback))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    tracing::info!(addr = %bind_addr, "API server listening");
    println!("API server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

impl From<TriageError> for AppError {
    fn from(err: TriageError) -> Self {
        let (status, code) = match &err {
            TriageError::Schema(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            TriageError::CollectionNotReady(_) => (StatusCode::SERVICE_UNAVAILABLE, "not_ready"),
            TriageError::Connection(_) => (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable"),
            TriageError::EmbeddingService(_)
            | TriageError::CompletionParse(_)
            | TriageError::Http(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        AppError {
            status,
            code: code.to_string(),
            message: err.to_string(),
        }
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

// ============ POST /api/v1/diagnose ============

#[derive(Deserialize)]
struct DiagnoseRequest {
    ticket_text: String,
}

async fn handle_diagnose(
    State(state): State<AppState>,
    Json(req): Json<DiagnoseRequest>,
) -> Result<Json<Diagnosis>, AppError> {
    if req.ticket_text.trim().is_empty() {
        return Err(bad_request("ticket_text must not be empty"));
    }
    let diagnosis = state.engine.diagnose(&req.ticket_text).await?;
    Ok(Json(diagnosis))
}

// ============ POST /api/v1/kb/upload ============

#[derive(Serialize)]
struct KbUploadResponse {
    message: String,
    tickets_ingested: u64,
    team_members_ingested: u64,
}

/// Ingests tickets and/or team members from the request body. Accepts the
/// same document shape as the ingestion files: `{"tickets": [...]}`,
/// `{"team_members": [...]}`, or both.
async fn handle_kb_upload(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<KbUploadResponse>, AppError> {
    let tickets = if body.get("tickets").is_some() {
        ingest::parse_tickets_json(&body)?
    } else {
        Vec::new()
    };
    let members = if body.get("team_members").is_some() {
        ingest::parse_team_json(&body)?
    } else {
        Vec::new()
    };

    if tickets.is_empty() && members.is_empty() {
        return Err(bad_request("body must contain tickets and/or team_members"));
    }

    let batch_size = state.config.embedding.batch_size;
    let tickets_ingested = ingest::ingest_tickets(
        &state.store,
        state.embedder.as_ref(),
        &tickets,
        batch_size,
        state.config.ingest.embed_resolution,
    )
    .await?;
    let team_members_ingested =
        ingest::ingest_team(&state.store, state.embedder.as_ref(), &members, batch_size).await?;

    Ok(Json(KbUploadResponse {
        message: "Knowledge base updated successfully".to_string(),
        tickets_ingested,
        team_members_ingested,
    }))
}

// ============ GET /api/v1/kb/search ============

#[derive(Deserialize)]
struct SearchParams {
    query: String,
    #[serde(default)]
    k: Option<usize>,
}

#[derive(Serialize)]
struct TicketSearchResponse {
    results: Vec<TicketHit>,
}

async fn handle_kb_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<TicketSearchResponse>, AppError> {
    if params.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let embedding = state.embedder.embed(&params.query).await?;
    let results = state
        .store
        .search_tickets(&embedding, params.k.unwrap_or(state.config.retrieval.top_k))
        .await?;
    Ok(Json(TicketSearchResponse { results }))
}

// ============ GET /api/v1/kb/search/team ============

#[derive(Serialize)]
struct TeamSearchResponse {
    results: Vec<TeamMemberHit>,
}

async fn handle_team_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<TeamSearchResponse>, AppError> {
    if params.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let embedding = state.embedder.embed(&params.query).await?;
    let results = state
        .store
        .search_team_members(&embedding, params.k.unwrap_or(state.config.retrieval.top_k))
        .await?;
    Ok(Json(TeamSearchResponse { results }))
}

// ============ POST /api/v1/feedback ============

#[derive(Serialize)]
struct FeedbackResponse {
    message: String,
    ticket_id: String,
    feedback_score: i64,
}

async fn handle_feedback(
    State(state): State<AppState>,
    Json(feedback): Json<Feedback>,
) -> Result<Json<FeedbackResponse>, AppError> {
    if feedback.ticket_id.trim().is_empty() {
        return Err(bad_request("ticket_id must not be empty"));
    }
    state.store.insert_feedback(&feedback).await?;
    Ok(Json(FeedbackResponse {
        message: "Feedback received successfully".to_string(),
        ticket_id: feedback.ticket_id,
        feedback_score: feedback.feedback_score,
    }))
}
