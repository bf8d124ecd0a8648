use crate::{
    app::{AppError, Candidate, EntryView, RecognitionService},
    config::Config,
    recognition::{EmbeddingVector, GroupSummary, MatchResult, Slot},
};
use axum::{
    extract::{DefaultBodyLimit, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{fmt::Debug, sync::Arc};
use tokio::signal;

#[derive(Clone)]
struct SharedState {
    service: Arc<RecognitionService>,
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                log::error!("failed to install signal handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::warn!("shutting down");
}

pub fn router(service: Arc<RecognitionService>) -> Router {
    let images_dir = service.config().base_path().join("images");
    let shared_state = Arc::new(SharedState { service });

    Router::new()
        .nest_service("/api/file", tower_http::services::ServeDir::new(images_dir))
        .route("/api/match", post(match_embedding))
        .route("/api/identify", post(identify))
        .route("/api/embed", post(embed))
        .route("/api/groups", get(groups))
        .route("/api/groups/create", post(create_group))
        .route("/api/entries/list", post(list_entries))
        .route("/api/entries/add", post(add_entry))
        .route("/api/entries/remove", post(remove_entry))
        .route("/api/config", get(get_config))
        .layer(DefaultBodyLimit::max(50 * 1024 * 1024))
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

async fn start_app(service: Arc<RecognitionService>, listen: String) -> anyhow::Result<()> {
    let app = router(service);

    let listener = tokio::net::TcpListener::bind(&listen).await?;
    log::info!("listening on {listen}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

pub fn start_daemon(service: RecognitionService, listen: String) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async { start_app(Arc::new(service), listen).await })
}

#[derive(Debug)]
struct HttpError(AppError);

// Client errors are the caller's problem, everything else gets logged.
impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            AppError::InvalidInput(_) | AppError::Base64(_) => axum::http::StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => axum::http::StatusCode::NOT_FOUND,
            AppError::AlreadyExists(_) => axum::http::StatusCode::CONFLICT,
            AppError::Extraction(_) => axum::http::StatusCode::SERVICE_UNAVAILABLE,
            AppError::IO(_) | AppError::Other(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        };

        if self.0.is_client_error() {
            log::debug!("{self:?}");
        } else {
            log::error!("{self:?}");
        }

        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRequest {
    #[serde(default, alias = "embedding")]
    pub query_embedding: Option<EmbeddingVector>,
    #[serde(default, alias = "database")]
    pub candidate_entries: Option<Vec<Candidate>>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub top_n: Option<usize>,
    #[serde(default)]
    pub min_score: Option<f32>,
}

async fn match_embedding(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<MatchRequest>,
) -> Result<Json<Vec<MatchResult>>, HttpError> {
    let service = &state.service;
    let options = service.match_options(payload.top_n, payload.min_score);
    let query = payload.query_embedding.as_ref();

    let matches = match (payload.candidate_entries, payload.group) {
        (Some(candidates), None) => service.match_candidates(query, &candidates, options)?,
        (None, Some(group)) => service.match_group(query, &group, options)?,
        (Some(_), Some(_)) => {
            return Err(AppError::InvalidInput(
                "pass either candidateEntries or group, not both".to_string(),
            )
            .into())
        }
        (None, None) => {
            return Err(AppError::InvalidInput(
                "candidateEntries or group is required".to_string(),
            )
            .into())
        }
    };

    Ok(Json(matches))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyRequest {
    pub group: String,
    #[serde(alias = "image_b64")]
    pub image_b64: String,
    #[serde(default)]
    pub top_n: Option<usize>,
    #[serde(default)]
    pub min_score: Option<f32>,
}

impl Debug for IdentifyRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "IdentifyRequest {{ group: {:?}, image_b64: [REDUCTED], top_n: {:?}, min_score: {:?} }}",
            self.group, self.top_n, self.min_score
        )
    }
}

async fn identify(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<IdentifyRequest>,
) -> Result<Json<Vec<MatchResult>>, HttpError> {
    log::debug!("payload: {payload:?}");

    let raw = STANDARD.decode(payload.image_b64.as_bytes())?;
    let options = state.service.match_options(payload.top_n, payload.min_score);

    let matches = state
        .service
        .identify(&payload.group, raw, options)
        .await?;

    Ok(Json(matches))
}

#[derive(Deserialize)]
pub struct EmbedRequest {
    #[serde(alias = "imageB64")]
    pub image_b64: String,
}

#[derive(Serialize)]
pub struct EmbedResponse {
    pub dimensions: usize,
    pub embedding: EmbeddingVector,
}

async fn embed(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<EmbedRequest>,
) -> Result<Json<EmbedResponse>, HttpError> {
    let raw = STANDARD.decode(payload.image_b64.as_bytes())?;
    let embedding = state.service.embed(raw).await?;

    Ok(Json(EmbedResponse {
        dimensions: embedding.dimensions(),
        embedding,
    }))
}

async fn groups(State(state): State<Arc<SharedState>>) -> Json<Vec<GroupSummary>> {
    Json(state.service.groups())
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    pub owner: String,
}

async fn create_group(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<CreateGroupRequest>,
) -> Result<Json<GroupSummary>, HttpError> {
    log::debug!("payload: {payload:?}");

    let service = state.service.clone();
    tokio::task::block_in_place(move || {
        service
            .create_group(&payload.name, &payload.owner)
            .map(Json)
            .map_err(Into::into)
    })
}

#[derive(Debug, Deserialize)]
pub struct ListEntriesRequest {
    pub group: String,
}

async fn list_entries(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<ListEntriesRequest>,
) -> Result<Json<Vec<EntryView>>, HttpError> {
    let entries = state.service.entries(&payload.group)?;
    Ok(Json(entries.iter().map(|entry| EntryView::from(&**entry)).collect()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddEntryRequest {
    pub group: String,
    pub identity: String,
    #[serde(alias = "image_b64")]
    pub image_b64: String,
}

impl Debug for AddEntryRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "AddEntryRequest {{ group: {:?}, identity: {:?}, image_b64: [REDUCTED] }}",
            self.group, self.identity
        )
    }
}

async fn add_entry(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<AddEntryRequest>,
) -> Result<Json<EntryView>, HttpError> {
    log::debug!("payload: {payload:?}");

    let raw = STANDARD.decode(payload.image_b64.as_bytes())?;
    let entry = state
        .service
        .register(&payload.group, &payload.identity, raw)
        .await?;

    Ok(Json(EntryView::from(&*entry)))
}

#[derive(Debug, Deserialize)]
pub struct RemoveEntryRequest {
    pub group: String,
    pub identity: String,
    pub slot: Slot,
}

async fn remove_entry(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<RemoveEntryRequest>,
) -> Result<Json<EntryView>, HttpError> {
    log::debug!("payload: {payload:?}");

    let service = state.service.clone();
    tokio::task::block_in_place(move || {
        let removed = service.remove(&payload.group, &payload.identity, payload.slot)?;
        Ok(Json(EntryView::from(&*removed)))
    })
}

async fn get_config(State(state): State<Arc<SharedState>>) -> Json<Config> {
    Json(state.service.config().clone())
}
