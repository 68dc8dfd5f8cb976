//! HTTP API server.
//!
//! Exposes the question-answering pipeline and document management over a
//! JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/ask_problem_text` | Answer a text question |
//! | `POST` | `/api/ask_problem_image` | Answer a photographed problem (multipart) |
//! | `GET`  | `/api/documents` | List ingested documents |
//! | `DELETE` | `/api/documents/{id}` | Delete a document and its chunks |
//! | `GET`  | `/health` | Service health (database / llm / ocr) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `answer_failed`
//! (500), `internal` (500). Upstream causes are logged, never echoed —
//! responses carry no connection strings or model internals.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::config::Config;
use crate::conversations;
use crate::documents::{self, DocumentFilters};
use crate::embedding::Encoder;
use crate::error::AnswerError;
use crate::llm::OllamaClient;
use crate::models::{DocumentStatus, ReferencedDocument};
use crate::ocr::{OcrClient, TextExtractor};
use crate::rag::RagService;
use crate::search::SqliteIndex;
use crate::{db, migrate};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    pool: SqlitePool,
    rag: Arc<RagService>,
    ocr: Arc<OcrClient>,
    llm: Arc<OllamaClient>,
}

/// Start the HTTP server on the configured bind address.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;

    let encoder = Arc::new(Encoder::new(&config.embedding)?);
    let index = Arc::new(SqliteIndex::new(pool.clone()));
    let llm = Arc::new(OllamaClient::new(&config.llm)?);
    let ocr = Arc::new(OcrClient::new(&config.ocr)?);

    let rag = Arc::new(RagService::new(
        encoder,
        index,
        llm.clone(),
        config.retrieval.top_k,
        config.llm.temperature,
    ));

    let state = AppState {
        pool,
        rag,
        ocr,
        llm,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/ask_problem_text", post(handle_ask_text))
        .route("/api/ask_problem_image", post(handle_ask_image))
        .route("/api/documents", get(handle_list_documents))
        .route("/api/documents/{id}", delete(handle_delete_document))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    let bind_addr = &config.server.bind;
    tracing::info!(%bind_addr, "server listening");

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
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

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Map an answer pipeline failure to a 500 with a generic message; the
/// specific cause is logged upstream, not returned to the caller.
fn answer_failed(err: AnswerError) -> AppError {
    tracing::error!(error = %err, "answer pipeline failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "answer_failed".to_string(),
        message: "answer generation failed".to_string(),
    }
}

fn storage_error(err: crate::error::SearchFailed) -> AppError {
    tracing::error!(error = %err, "storage operation failed");
    internal("internal storage error")
}

// ============ POST /api/ask_problem_text ============

#[derive(Deserialize)]
struct AskTextRequest {
    question: String,
    #[serde(default = "default_true")]
    use_rag: bool,
    #[serde(default)]
    use_web_search: bool,
    #[serde(default)]
    subject_filter: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Serialize)]
struct AnswerResponse {
    answer: String,
    referenced_documents: Vec<ReferencedDocument>,
    session_id: String,
    processing_time_ms: u64,
}

async fn handle_ask_text(
    State(state): State<AppState>,
    Json(req): Json<AskTextRequest>,
) -> Result<Json<AnswerResponse>, AppError> {
    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    answer_and_log(
        &state,
        &req.question,
        req.use_rag,
        req.use_web_search,
        req.subject_filter.as_deref(),
        req.session_id,
    )
    .await
}

// ============ POST /api/ask_problem_image ============

async fn handle_ask_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AnswerResponse>, AppError> {
    let mut image_bytes: Option<Vec<u8>> = None;
    let mut use_rag = true;
    let mut use_web_search = false;
    let mut subject_filter: Option<String> = None;
    let mut session_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.to_string()))?
    {
        match field.name().unwrap_or_default() {
            "image" => {
                let bytes = field.bytes().await.map_err(|e| bad_request(e.to_string()))?;
                image_bytes = Some(bytes.to_vec());
            }
            "use_rag" => {
                let text = field.text().await.map_err(|e| bad_request(e.to_string()))?;
                use_rag = text.parse().unwrap_or(true);
            }
            "use_web_search" => {
                let text = field.text().await.map_err(|e| bad_request(e.to_string()))?;
                use_web_search = text.parse().unwrap_or(false);
            }
            "subject_filter" => {
                subject_filter =
                    Some(field.text().await.map_err(|e| bad_request(e.to_string()))?);
            }
            "session_id" => {
                session_id = Some(field.text().await.map_err(|e| bad_request(e.to_string()))?);
            }
            _ => {}
        }
    }

    let image_bytes = image_bytes.ok_or_else(|| bad_request("missing 'image' field"))?;
    if image_bytes.is_empty() {
        return Err(bad_request("image must not be empty"));
    }

    tracing::info!(size = image_bytes.len(), "extracting question from image");

    let question = state.ocr.extract_text(image_bytes).await.map_err(|e| {
        tracing::error!(error = %e, "OCR extraction failed");
        internal("text extraction failed")
    })?;

    answer_and_log(
        &state,
        &question,
        use_rag,
        use_web_search,
        subject_filter.as_deref(),
        session_id,
    )
    .await
}

/// Shared tail of both ask routes: run the pipeline, then append the
/// conversation audit record (the orchestrator itself never persists).
async fn answer_and_log(
    state: &AppState,
    question: &str,
    use_rag: bool,
    use_web_search: bool,
    subject_filter: Option<&str>,
    session_id: Option<String>,
) -> Result<Json<AnswerResponse>, AppError> {
    let start = Instant::now();
    let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());

    let (answer, referenced_docs) = state
        .rag
        .answer(question, use_rag, subject_filter)
        .await
        .map_err(answer_failed)?;

    let referenced_ids: Vec<String> = referenced_docs
        .iter()
        .map(|d| d.document_id.clone())
        .collect();

    conversations::append(
        &state.pool,
        &session_id,
        question,
        &answer,
        use_rag,
        use_web_search,
        &referenced_ids,
    )
    .await
    .map_err(storage_error)?;

    let processing_time_ms = start.elapsed().as_millis() as u64;
    tracing::info!(processing_time_ms, references = referenced_docs.len(), "answer generated");

    Ok(Json(AnswerResponse {
        answer,
        referenced_documents: referenced_docs,
        session_id,
        processing_time_ms,
    }))
}

// ============ GET /api/documents ============

#[derive(Deserialize)]
struct ListDocumentsQuery {
    status: Option<String>,
    subject: Option<String>,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Serialize)]
struct DocumentInfo {
    id: String,
    filename: String,
    subject: Option<String>,
    status: DocumentStatus,
    error_message: Option<String>,
    created_at: i64,
    chunk_count: i64,
}

#[derive(Serialize)]
struct DocumentListResponse {
    documents: Vec<DocumentInfo>,
    total: i64,
}

async fn handle_list_documents(
    State(state): State<AppState>,
    Query(query): Query<ListDocumentsQuery>,
) -> Result<Json<DocumentListResponse>, AppError> {
    if !(1..=100).contains(&query.limit) || query.offset < 0 {
        return Err(bad_request("limit must be in 1..=100 and offset >= 0"));
    }

    let status = match query.status.as_deref() {
        Some(s) => Some(
            DocumentStatus::parse(s)
                .ok_or_else(|| bad_request(format!("invalid status: {}", s)))?,
        ),
        None => None,
    };

    let filters = DocumentFilters {
        status,
        subject: query.subject,
    };

    let listings = documents::list_documents(&state.pool, &filters, query.limit, query.offset)
        .await
        .map_err(storage_error)?;
    let total = documents::count_documents(&state.pool, &filters)
        .await
        .map_err(storage_error)?;

    let documents = listings
        .into_iter()
        .map(|l| DocumentInfo {
            id: l.document.id,
            filename: l.document.filename,
            subject: l.document.subject,
            status: l.document.status,
            error_message: l.document.error_message,
            created_at: l.document.created_at,
            chunk_count: l.chunk_count,
        })
        .collect();

    Ok(Json(DocumentListResponse { documents, total }))
}

// ============ DELETE /api/documents/{id} ============

#[derive(Serialize)]
struct DeleteResponse {
    success: bool,
    message: String,
}

async fn handle_delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let existing = documents::get_document(&state.pool, &id)
        .await
        .map_err(storage_error)?;
    if existing.is_none() {
        return Err(not_found(format!("document {} not found", id)));
    }

    let deleted = documents::delete_document(&state.pool, &id)
        .await
        .map_err(storage_error)?;
    if !deleted {
        return Err(internal("failed to delete document"));
    }

    tracing::info!(document_id = %id, "document deleted");

    Ok(Json(DeleteResponse {
        success: true,
        message: format!("document {} deleted", id),
    }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    database: String,
    llm: String,
    ocr: String,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&state.pool)
        .await
    {
        Ok(_) => "ok",
        Err(_) => "error",
    };

    let llm = if state.llm.health_check().await {
        "ok"
    } else {
        "error"
    };
    let ocr = if state.ocr.health_check().await {
        "ok"
    } else {
        "error"
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: database.to_string(),
        llm: llm.to_string(),
        ocr: ocr.to_string(),
    })
}
