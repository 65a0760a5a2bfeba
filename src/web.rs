use crate::{
    ai::{run_summary_session, SummaryEvent},
    app::{App, AppError, SearchOutcome},
    articles::{Article, ArticleCreate, ArticleDigest, ArticleUpdate},
    auth,
};
use axum::{
    extract::{DefaultBodyLimit, FromRequestParts, Path, Query, State},
    http::request::Parts,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{convert::Infallible, fmt::Debug, sync::Arc};
use tokio::{signal, sync::mpsc};

#[derive(Clone)]
pub struct SharedState {
    pub app: Arc<App>,
}

async fn start_app(app: App) {
    let addr = app.config().listen_addr.clone();
    let uploads_dir = app.uploads_dir();
    let shared_state = Arc::new(SharedState { app: Arc::new(app) });

    async fn shutdown_signal() {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("failed to install Ctrl+C handler");
        };

        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        tokio::select! {
            _ = ctrl_c => {
                log::warn!("shutting down");
            },
            _ = terminate => {},
        }
    }

    let app = router(shared_state, &uploads_dir);

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    log::info!("listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();
}

pub fn router(shared_state: Arc<SharedState>, uploads_dir: &std::path::Path) -> Router {
    Router::new()
        .nest_service(
            "/api/file/",
            tower_http::services::ServeDir::new(uploads_dir),
        )
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/articles", get(list_articles))
        .route("/api/articles", post(create_article))
        .route("/api/articles/:id", get(get_article))
        .route("/api/articles/:id", axum::routing::put(update_article))
        .route("/api/articles/:id", axum::routing::delete(delete_article))
        .route("/api/search/semantic", post(semantic_search))
        .route("/api/ai/summary", post(summarize))
        .route("/api/ai/summary/stream/:id", get(summary_stream))
        .route("/api/ai/tags", post(extract_tags))
        .route("/api/ai/proofread", post(proofread))
        .route("/api/ai/embedding", post(generate_embedding))
        .route("/api/upload", post(upload))
        .layer(DefaultBodyLimit::max(100 * 1024 * 1024))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(shared_state)
}

pub fn start_daemon(app: App) {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(async { start_app(app).await });
}

// Make our own error that wraps `AppError`.
#[derive(Debug)]
struct HttpError(AppError);

// Tell axum how to convert `AppError` into a response.
impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        use crate::ai::AiError;
        use axum::http::StatusCode;

        let status = match &self.0 {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Ai(AiError::NotConfigured(_)) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Ai(AiError::Validation(_)) => StatusCode::BAD_REQUEST,
            AppError::Ai(AiError::Upstream(_)) => {
                log::error!("{self:?}");
                StatusCode::BAD_GATEWAY
            }
            AppError::IO(_) | AppError::Other(_) => {
                log::error!("{self:?}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, json!({"error": self.0.to_string()}).to_string()).into_response()
    }
}

// This enables using `?` on functions that return `Result<_, anyhow::Error>` to turn them into
// `Result<_, AppError>`. That way you don't need to do that manually.
impl<E> From<E> for HttpError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// Extractor guarding mutating routes. Resolves to the admin username when
/// the request carries a live bearer session token.
struct AdminUser(String);

#[axum::async_trait]
impl FromRequestParts<Arc<SharedState>> for AdminUser {
    type Rejection = HttpError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<SharedState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(auth::extract_bearer_token)
            .ok_or(HttpError(AppError::Unauthorized))?;

        if state.app.is_admin_token(token) {
            Ok(AdminUser(state.app.admin_username().to_string()))
        } else {
            Err(HttpError(AppError::Unauthorized))
        }
    }
}

// --- auth ---

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "LoginRequest {{ username: {:?}, password: [REDUCTED] }}",
            self.username
        )
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
}

async fn login(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<axum::Json<LoginResponse>, HttpError> {
    log::debug!("payload: {payload:?}");

    let token = state.app.login(&payload.username, &payload.password)?;
    Ok(LoginResponse { token }.into())
}

async fn logout(
    State(state): State<Arc<SharedState>>,
    _admin: AdminUser,
    headers: axum::http::HeaderMap,
) -> Result<axum::Json<()>, HttpError> {
    if let Some(token) = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(auth::extract_bearer_token)
    {
        state.app.logout(token);
    }
    Ok(().into())
}

// --- articles ---

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListArticlesRequest {
    pub keyword: Option<String>,
}

async fn list_articles(
    State(state): State<Arc<SharedState>>,
    Query(params): Query<ListArticlesRequest>,
) -> Result<axum::Json<Vec<ArticleDigest>>, HttpError> {
    state
        .app
        .list_articles(params.keyword.as_deref())
        .map(Into::into)
        .map_err(Into::into)
}

async fn get_article(
    State(state): State<Arc<SharedState>>,
    Path(id): Path<u64>,
) -> Result<axum::Json<Article>, HttpError> {
    state.app.get_article(id).map(Into::into).map_err(Into::into)
}

async fn create_article(
    State(state): State<Arc<SharedState>>,
    AdminUser(author): AdminUser,
    Json(payload): Json<ArticleCreate>,
) -> Result<axum::Json<Article>, HttpError> {
    log::debug!("payload: {payload:?}");

    state
        .app
        .create_article(payload, &author)
        .await
        .map(Into::into)
        .map_err(Into::into)
}

async fn update_article(
    State(state): State<Arc<SharedState>>,
    AdminUser(author): AdminUser,
    Path(id): Path<u64>,
    Json(payload): Json<ArticleUpdate>,
) -> Result<axum::Json<Article>, HttpError> {
    log::debug!("payload: {payload:?}");

    state
        .app
        .update_article(id, payload, &author)
        .await
        .map(Into::into)
        .map_err(Into::into)
}

async fn delete_article(
    State(state): State<Arc<SharedState>>,
    AdminUser(author): AdminUser,
    Path(id): Path<u64>,
) -> Result<axum::Json<()>, HttpError> {
    state
        .app
        .delete_article(id, &author)
        .map(Into::into)
        .map_err(Into::into)
}

// --- search ---

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SemanticSearchRequest {
    pub query: String,
    pub threshold: Option<f32>,
}

#[derive(Debug, Serialize)]
pub struct SemanticSearchResponse {
    /// "semantic", or "keyword" when the query embedding was unavailable
    pub mode: &'static str,
    pub results: serde_json::Value,
}

async fn semantic_search(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<SemanticSearchRequest>,
) -> Result<axum::Json<SemanticSearchResponse>, HttpError> {
    log::debug!("payload: {payload:?}");

    let outcome = state
        .app
        .search_articles(&payload.query, payload.threshold)
        .await?;

    let response = match outcome {
        SearchOutcome::Semantic(results) => SemanticSearchResponse {
            mode: "semantic",
            results: serde_json::to_value(results).map_err(anyhow::Error::from)?,
        },
        SearchOutcome::Keyword(results) => SemanticSearchResponse {
            mode: "keyword",
            results: serde_json::to_value(
                results.iter().map(Article::digest).collect::<Vec<_>>(),
            )
            .map_err(anyhow::Error::from)?,
        },
    };

    Ok(response.into())
}

// --- enrichment ---

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnrichRequest {
    pub content: String,
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EnrichResponse {
    pub result: String,
}

async fn summarize(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<EnrichRequest>,
) -> Result<axum::Json<EnrichResponse>, HttpError> {
    let result = state.app.summarize(&payload.content).await?;
    Ok(EnrichResponse { result }.into())
}

async fn extract_tags(
    State(state): State<Arc<SharedState>>,
    _admin: AdminUser,
    Json(payload): Json<EnrichRequest>,
) -> Result<axum::Json<EnrichResponse>, HttpError> {
    let result = state
        .app
        .extract_tags(payload.title.as_deref(), &payload.content)
        .await?;
    Ok(EnrichResponse { result }.into())
}

async fn proofread(
    State(state): State<Arc<SharedState>>,
    _admin: AdminUser,
    Json(payload): Json<EnrichRequest>,
) -> Result<axum::Json<EnrichResponse>, HttpError> {
    let result = state.app.proofread(&payload.content).await?;
    Ok(EnrichResponse { result }.into())
}

#[derive(Debug, Serialize)]
pub struct EmbeddingResponse {
    pub embedding: Vec<f32>,
    pub dimensions: usize,
}

async fn generate_embedding(
    State(state): State<Arc<SharedState>>,
    _admin: AdminUser,
    Json(payload): Json<EnrichRequest>,
) -> Result<axum::Json<EmbeddingResponse>, HttpError> {
    let embedding = state
        .app
        .generate_embedding(payload.title.as_deref(), &payload.content)
        .await?;
    Ok(EmbeddingResponse {
        dimensions: embedding.len(),
        embedding,
    }
    .into())
}

// --- streaming summary ---

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SummaryStreamParams {
    #[serde(default)]
    pub regenerate: bool,
}

/// SSE endpoint streaming a summary for an article. Each event's data is
/// one JSON object; the last one carries `done` or `error`. Closing the
/// connection cancels the in-flight generation.
async fn summary_stream(
    State(state): State<Arc<SharedState>>,
    Path(id): Path<u64>,
    Query(params): Query<SummaryStreamParams>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<SummaryEvent>(16);

    tokio::spawn(run_summary_session(
        state.app.chat(),
        state.app.store(),
        id,
        params.regenerate,
        tx,
    ));

    // the session drops `tx` after its terminal event, ending the stream
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|event| (Ok(Event::default().data(event.to_json().to_string())), rx))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

// --- uploads ---

#[derive(Deserialize)]
pub struct UploadRequest {
    pub file_name: String,
    pub data_b64: String,
}

impl Debug for UploadRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "UploadRequest {{ file_name: {:?}, data_b64: [REDUCTED] }}",
            self.file_name
        )
    }
}

async fn upload(
    State(state): State<Arc<SharedState>>,
    _admin: AdminUser,
    Json(payload): Json<UploadRequest>,
) -> Result<axum::Json<crate::uploads::UploadedFile>, HttpError> {
    log::debug!("payload: {payload:?}");

    let data = STANDARD
        .decode(&payload.data_b64)
        .map_err(|err| AppError::Validation(format!("invalid base64 payload: {err}")))?;

    state
        .app
        .store_upload(&payload.file_name, &data)
        .map(Into::into)
        .map_err(Into::into)
}
