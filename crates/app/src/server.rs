//! Browser front end.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Chat page for the caller's session |
//! | `POST` | `/build` | Multipart upload (`pdfs`), rebuilds the session |
//! | `POST` | `/ask` | Form field `question` |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! Sessions are keyed by the `pdf_chat_session` cookie. Every action holds the
//! session lock until it finishes, and the page is re-rendered from the
//! session afterwards.

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use pdf_chat_core::{
    render_page, AskOutcome, ChatError, Collaborators, IngestError, Notice, PageView, Session,
    SessionStore, UploadedDocument,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "pdf_chat_session";

#[derive(Clone)]
pub struct AppState {
    sessions: SessionStore,
    collaborators: Arc<Collaborators>,
}

impl AppState {
    pub fn new(sessions: SessionStore, collaborators: Collaborators) -> Self {
        Self {
            sessions,
            collaborators: Arc::new(collaborators),
        }
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(handle_page))
        .route("/build", post(handle_build))
        .route("/ask", post(handle_ask))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(bind: &str, state: AppState, max_upload_bytes: usize) -> anyhow::Result<()> {
    tokio::spawn(sweep_idle_sessions(state.sessions.clone()));
    let app = router(state, max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(address = %listener.local_addr()?, "chat page listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn sweep_idle_sessions(sessions: SessionStore) {
    let period = (sessions.idle_ttl() / 4).max(Duration::from_secs(1));
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        let evicted = sessions.evict_idle().await;
        if evicted > 0 {
            let remaining = sessions.len().await;
            tracing::info!(evicted, remaining, "idle sessions evicted");
        }
    }
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(%error, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

fn session_cookie(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value).ok())
}

fn status_for(error: &ChatError) -> StatusCode {
    match error {
        ChatError::Ingest(IngestError::Timeout(_)) | ChatError::Timeout { .. } => {
            StatusCode::GATEWAY_TIMEOUT
        }
        ChatError::Ingest(_) | ChatError::EmptyQuestion => StatusCode::BAD_REQUEST,
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn render(
    status: StatusCode,
    requested: Option<Uuid>,
    session: &Session,
    notice: Option<Notice>,
) -> Response {
    let body = render_page(&PageView {
        history: session.history(),
        last_build: session.last_build(),
        notice,
    });
    let mut response = (status, Html(body)).into_response();

    if requested != Some(session.id()) {
        let cookie = format!("{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax", session.id());
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
    }
    response
}

async fn handle_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let requested = session_cookie(&headers);
    let (_, session) = state.sessions.get_or_create(requested).await;
    let session = session.lock().await;
    render(StatusCode::OK, requested, &session, None)
}

async fn read_uploads(multipart: &mut Multipart) -> Result<Vec<UploadedDocument>, MultipartError> {
    let mut documents = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("pdfs") {
            continue;
        }
        let name = field.file_name().unwrap_or("upload.pdf").to_string();
        let bytes = field.bytes().await?;
        // Browsers send an empty part when no file was chosen.
        if bytes.is_empty() {
            continue;
        }
        documents.push(UploadedDocument::new(name, bytes.to_vec()));
    }
    Ok(documents)
}

async fn handle_build(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let requested = session_cookie(&headers);
    let (_, session) = state.sessions.get_or_create(requested).await;
    let mut session = session.lock().await;

    let documents = match read_uploads(&mut multipart).await {
        Ok(documents) => documents,
        Err(error) => {
            let notice = Notice::error(format!("Upload failed: {error}"));
            return render(error.status(), requested, &session, Some(notice));
        }
    };

    match session.build(&state.collaborators, documents).await {
        Ok(report) => {
            let notice = Notice::info(format!(
                "Reading done: {} document(s), {} chunk(s). Ask away!",
                report.document_count, report.chunk_count
            ));
            render(StatusCode::OK, requested, &session, Some(notice))
        }
        Err(error) => {
            let notice = Notice::error(format!("Reading failed: {error}"));
            render(status_for(&error), requested, &session, Some(notice))
        }
    }
}

#[derive(Debug, Deserialize)]
struct AskForm {
    #[serde(default)]
    question: String,
}

async fn handle_ask(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<AskForm>,
) -> Response {
    let requested = session_cookie(&headers);
    let (_, session) = state.sessions.get_or_create(requested).await;
    let mut session = session.lock().await;

    match session.ask(&form.question).await {
        Ok(AskOutcome::Answered(_)) => render(StatusCode::OK, requested, &session, None),
        Ok(AskOutcome::NoPipeline) => {
            let notice = Notice::info(
                "Upload your PDFs and click 'Start the Reading Process' before asking.",
            );
            render(StatusCode::OK, requested, &session, Some(notice))
        }
        Err(error) => {
            let notice = Notice::error(format!("Could not answer: {error}"));
            render(status_for(&error), requested, &session, Some(notice))
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    sessions: usize,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        sessions: state.sessions.len().await,
    })
}
