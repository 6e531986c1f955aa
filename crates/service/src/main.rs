use std::{
    env,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use axum::{
    extract::{Multipart, Path as UrlPath, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parking_lot::RwLock;
use psyche_core::Document;
use psyche_index::IndexStore;
use psyche_rag::{
    build_indices, generate_profile, prepare_reference_corpus, BuildSummary, EmbeddingClient,
    Language, LlmGenerator, ProfileOutcome, ProfileRequest, PsycheConfig, TextGenerator,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{net::TcpListener, task};
use tracing::{error, info};

const MAX_SESSION_LEN: usize = 64;

struct AppState {
    config: PsycheConfig,
    embedder: EmbeddingClient,
    reference: Vec<Document>,
    /// Writers rebuild a session's indices, readers query them.
    index_lock: RwLock<()>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = env::var("PSYCHE_CONFIG").unwrap_or_else(|_| "psyche.toml".to_string());
    let state = task::spawn_blocking(move || load_state(Path::new(&config_path)))
        .await
        .context("startup task panicked")??;
    let state = Arc::new(state);

    let app = Router::new()
        .route("/health", get(health))
        .route("/sessions/:session/corpus", post(upload_corpus))
        .route("/sessions/:session/profile", post(create_profile))
        .with_state(state);

    let addr: SocketAddr = env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8000".to_string())
        .parse()
        .context("invalid BIND_ADDR")?;
    info!(%addr, "starting psyche service");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn load_state(config_path: &Path) -> anyhow::Result<AppState> {
    let config = PsycheConfig::load(Some(config_path))?;
    let embedder = EmbeddingClient::for_model(&config.embedding.model)?;
    let reference = prepare_reference_corpus(&config.storage.reference_dir)?;
    info!(
        embedding = %config.embedding.model,
        reference_documents = reference.len(),
        storage = %config.storage.root.display(),
        "service state ready"
    );
    Ok(AppState {
        config,
        embedder,
        reference,
        index_lock: RwLock::new(()),
    })
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "embedding_model": state.config.embedding.model,
    }))
}

#[derive(Deserialize)]
struct CorpusParams {
    character: String,
}

#[derive(Serialize)]
struct CorpusResponse {
    session: String,
    documents: usize,
    #[serde(flatten)]
    summary: BuildSummary,
}

async fn upload_corpus(
    State(state): State<Arc<AppState>>,
    UrlPath(session): UrlPath<String>,
    Query(params): Query<CorpusParams>,
    multipart: Multipart,
) -> Result<Json<CorpusResponse>, AppError> {
    validate_session(&session)?;
    let character = params.character.trim().to_string();
    if character.is_empty() {
        return Err(AppError::bad_request("character must not be empty"));
    }
    let documents = extract_documents(multipart).await?;
    if documents.iter().all(Document::is_blank) {
        return Err(AppError::bad_request(
            "upload at least one non-empty `file` or `text` field",
        ));
    }

    let response = task::spawn_blocking(move || -> anyhow::Result<CorpusResponse> {
        let summary = rebuild_session(&state, &session, &character, &documents)?;
        Ok(CorpusResponse {
            session,
            documents: documents.len(),
            summary,
        })
    })
    .await
    .map_err(AppError::internal)??;
    Ok(Json(response))
}

fn rebuild_session(
    state: &AppState,
    session: &str,
    character: &str,
    documents: &[Document],
) -> anyhow::Result<BuildSummary> {
    let _guard = state.index_lock.write();
    let store = IndexStore::open(session_root(&state.config.storage.root, session))?;
    let summary = build_indices(
        &store,
        &state.embedder,
        character,
        documents,
        &state.reference,
        state.config.chunking,
    )?;
    info!(
        session,
        character,
        character_chunks = summary.character_chunks,
        "session corpus indexed"
    );
    Ok(summary)
}

#[derive(Debug, Deserialize)]
struct ProfileBody {
    character: String,
    language: Option<String>,
    k_char: Option<usize>,
    k_psych: Option<usize>,
    user_context: Option<String>,
    use_llm: Option<bool>,
    model: Option<String>,
}

#[derive(Serialize)]
struct ProfileResponse {
    session: String,
    #[serde(flatten)]
    outcome: ProfileOutcome,
}

async fn create_profile(
    State(state): State<Arc<AppState>>,
    UrlPath(session): UrlPath<String>,
    Json(body): Json<ProfileBody>,
) -> Result<Json<ProfileResponse>, AppError> {
    validate_session(&session)?;
    if body.character.trim().is_empty() {
        return Err(AppError::bad_request("character must not be empty"));
    }
    let root = session_root(&state.config.storage.root, &session);
    if !root.is_dir() {
        return Err(AppError::bad_request(format!(
            "session {session} has no corpus yet"
        )));
    }

    let response = task::spawn_blocking(move || -> anyhow::Result<ProfileResponse> {
        let outcome = profile_session(&state, &root, &body)?;
        Ok(ProfileResponse { session, outcome })
    })
    .await
    .map_err(AppError::internal)??;
    Ok(Json(response))
}

fn profile_session(
    state: &AppState,
    root: &Path,
    body: &ProfileBody,
) -> anyhow::Result<ProfileOutcome> {
    let request = profile_request(&state.config, body);
    let generator = if body.use_llm.unwrap_or(state.config.generation.use_llm) {
        let generator = LlmGenerator::from_config(&state.config.generation)?;
        Some(match body.model.clone() {
            Some(model) => generator.with_model(model),
            None => generator,
        })
    } else {
        None
    };
    let _guard = state.index_lock.read();
    let store = IndexStore::open(root)?;
    generate_profile(
        &store,
        &state.embedder,
        generator.as_ref().map(|g| g as &dyn TextGenerator),
        &request,
    )
}

fn profile_request(config: &PsycheConfig, body: &ProfileBody) -> ProfileRequest {
    let language = Language::from_tag(
        body.language
            .as_deref()
            .unwrap_or(&config.generation.language),
    );
    let mut request = ProfileRequest::new(&body.character, language);
    request.query.k_char = body.k_char.unwrap_or(config.retrieval.k_char);
    request.query.k_psych = body.k_psych.unwrap_or(config.retrieval.k_psych);
    request.user_context = body.user_context.clone();
    request
}

fn validate_session(session: &str) -> Result<(), AppError> {
    let valid = !session.is_empty()
        && session.len() <= MAX_SESSION_LEN
        && session
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(AppError::bad_request(
            "session names may only use letters, digits, '_' and '-'",
        ))
    }
}

fn session_root(storage: &Path, session: &str) -> PathBuf {
    storage.join(session)
}

/// Collects every `file` field as a document and an optional pasted `text`
/// field as one more.
async fn extract_documents(mut multipart: Multipart) -> Result<Vec<Document>, AppError> {
    let mut documents = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(err.to_string()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let source = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("upload_{}.txt", documents.len()));
                let data = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::bad_request(err.to_string()))?;
                documents.push(Document::normalized(source, &String::from_utf8_lossy(&data)));
            }
            Some("text") => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| AppError::bad_request(err.to_string()))?;
                if !text.trim().is_empty() {
                    documents.push(Document::normalized("pasted_text", &text));
                }
            }
            _ => {}
        }
    }
    Ok(documents)
}

#[derive(Debug, Error)]
enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn bad_request(msg: impl Into<String>) -> Self {
        AppError::BadRequest(msg.into())
    }

    fn internal(err: impl std::fmt::Display) -> Self {
        AppError::Internal(anyhow::anyhow!(err.to_string()))
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        let body = Json(serde_json::json!({ "error": format!("{self:#}") }));
        (status, body).into_response()
    }
}
