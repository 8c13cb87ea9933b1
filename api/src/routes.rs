use crate::error::ApiError;
use crate::payloads::*;
use crate::state::AppState;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use rag_chat::chat_history::session_id_from_name;
use rag_chat::{SessionSummary, DEFAULT_SESSION_ID};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Upper bound for `k` on `/search-debug`.
const MAX_SEARCH_K: usize = 100;

pub fn router(state: Arc<AppState>) -> Router {
    let upload_limit = state.max_upload_bytes;

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/chat-simple", post(chat_simple))
        .route(
            "/chat-history",
            get(default_history).delete(clear_default_history),
        )
        .route(
            "/chat-history/:session_id",
            get(session_history).delete(clear_session_history),
        )
        .route("/create-session", post(create_session))
        .route("/list-sessions", get(list_sessions))
        .route("/delete-session/:session_id", delete(delete_session))
        .route("/session-info/:session_id", get(session_info))
        .route(
            "/upload-pdf",
            post(upload_pdf).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/search-debug", get(search_debug))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root(State(state): State<Arc<AppState>>) -> Json<Value> {
    let database_status = state.system.database_status().await;
    Json(json!({
        "message": "RAG chat server is running",
        "status": "healthy",
        "configuration": {
            "database": state.database_name,
            "collection": state.collection_name,
            "storage_backend": state.storage_backend.to_string(),
            "database_status": database_status,
        }
    }))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "rag_chat_api",
    }))
}

fn session_or_default(session_id: Option<String>) -> String {
    session_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| DEFAULT_SESSION_ID.to_string())
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<ChatResponse> {
    let session_id = session_or_default(request.session_id);
    log::info!("Chat request for session {}", session_id);

    let answer = state
        .system
        .query_service
        .answer(&request.message, &session_id)
        .await?;
    let chat_history = state.system.history.get(&session_id, None).await?;

    Ok(Json(ChatResponse {
        response: answer.text,
        status: "success".to_string(),
        session_id,
        used_web_search: answer.used_web_search,
        retrieved_docs_count: answer.retrieved_chunks.len(),
        chat_history,
    }))
}

async fn chat_simple(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<ChatResponse> {
    let session_id = session_or_default(request.session_id);

    let response = state
        .system
        .query_service
        .answer_simple(&request.message, &session_id)
        .await?;
    let chat_history = state.system.history.get(&session_id, None).await?;

    Ok(Json(ChatResponse {
        response,
        status: "success".to_string(),
        session_id,
        used_web_search: false,
        retrieved_docs_count: 0,
        chat_history,
    }))
}

async fn history_for(state: &AppState, session_id: String) -> ApiResult<ChatHistoryResponse> {
    let chat_history = state.system.history.get(&session_id, None).await?;
    Ok(Json(ChatHistoryResponse {
        session_id,
        chat_history,
    }))
}

async fn default_history(State(state): State<Arc<AppState>>) -> ApiResult<ChatHistoryResponse> {
    history_for(&state, DEFAULT_SESSION_ID.to_string()).await
}

async fn session_history(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<ChatHistoryResponse> {
    history_for(&state, session_id).await
}

async fn clear_history_for(state: &AppState, session_id: String) -> ApiResult<StatusResponse> {
    let existed = state.system.history.clear(&session_id).await?;
    let message = if existed {
        "Chat history cleared"
    } else {
        "No chat history to clear"
    };
    Ok(Json(StatusResponse {
        status: "success".to_string(),
        message: message.to_string(),
        session_id,
    }))
}

async fn clear_default_history(
    State(state): State<Arc<AppState>>,
) -> ApiResult<StatusResponse> {
    clear_history_for(&state, DEFAULT_SESSION_ID.to_string()).await
}

async fn clear_session_history(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<StatusResponse> {
    clear_history_for(&state, session_id).await
}

async fn create_session(
    State(state): State<Arc<AppState>>,
    request: Option<Json<CreateSessionRequest>>,
) -> ApiResult<CreateSessionResponse> {
    let name = request
        .and_then(|Json(r)| r.session_name)
        .unwrap_or_default();
    let (session_id, display_name) = session_id_from_name(&name);

    let session = state.system.history.create(&session_id, &display_name).await?;
    log::info!("Created session {} ({})", session.id, session.display_name);

    Ok(Json(CreateSessionResponse {
        status: "success".to_string(),
        session_id: session.id,
        display_name: session.display_name,
    }))
}

async fn list_sessions(State(state): State<Arc<AppState>>) -> ApiResult<SessionListResponse> {
    let sessions = state.system.history.list().await?;
    Ok(Json(SessionListResponse {
        total: sessions.len(),
        sessions,
    }))
}

async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<StatusResponse> {
    if !state.system.history.delete(&session_id).await? {
        return Err(ApiError::NotFound(format!("session {} not found", session_id)));
    }
    Ok(Json(StatusResponse {
        status: "success".to_string(),
        message: "Session deleted".to_string(),
        session_id,
    }))
}

async fn session_info(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<SessionSummary> {
    state
        .system
        .history
        .info(&session_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("session {} not found", session_id)))
}

async fn upload_pdf(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<UploadResponse> {
    let started = Instant::now();
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read multipart field: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload.pdf").to_string();
        if !filename.to_lowercase().ends_with(".pdf") {
            return Err(ApiError::BadRequest("only PDF files are accepted".to_string()));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {}", e)))?;
        upload = Some((filename, bytes));
        break;
    }

    let (filename, bytes) =
        upload.ok_or_else(|| ApiError::BadRequest("missing multipart field 'file'".to_string()))?;
    let report = state.system.processor.ingest(bytes.to_vec(), &filename).await?;

    Ok(Json(UploadResponse {
        status: "success".to_string(),
        message: format!("Successfully processed {}", report.filename),
        filename: report.filename,
        document_id: report.document_id,
        chunks_created: report.chunks_created,
        total_words: report.total_words,
        processing_time: format!("{:.2}s", started.elapsed().as_secs_f64()),
    }))
}

async fn search_debug(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchDebugQuery>,
) -> ApiResult<SearchDebugResponse> {
    let k = params.k.unwrap_or(state.default_search_k);
    if k == 0 || k > MAX_SEARCH_K {
        return Err(ApiError::BadRequest(format!(
            "k must be between 1 and {}",
            MAX_SEARCH_K
        )));
    }
    let results = state.system.query_service.search_debug(&params.q, k).await?;

    Ok(Json(SearchDebugResponse {
        query: params.q,
        k,
        results: results.into_iter().map(SearchDebugResult::from).collect(),
    }))
}
