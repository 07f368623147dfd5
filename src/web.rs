use crate::{
    app::{App, AppError, PreferencesView},
    config::Config,
    dedup::{CacheStats, DedupDecision, EmbeddingMode, PreferenceError, TabScope},
    lock::FileLock,
    semantic::{SearchResult, SemanticSearchError},
};
use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{collections::HashMap, sync::Arc};
use tokio::signal;

const DEFAULT_SEARCH_LIMIT: usize = 10;

#[derive(Clone)]
struct SharedState {
    app: Arc<App>,
}

pub fn router(app: Arc<App>) -> Router {
    let shared_state = Arc::new(SharedState { app });

    Router::new()
        .route("/api/dedup/check", post(check))
        .route("/api/dedup/explain", post(explain))
        .route("/api/dedup/stats", get(stats))
        .route("/api/dedup/clear", post(clear))
        .route("/api/content/store", post(store))
        .route("/api/content/search", post(search))
        .route("/api/preferences", get(get_preferences).post(update_preferences))
        .route("/api/config", get(get_config))
        .layer(DefaultBodyLimit::max(16 * 1024 * 1024))
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
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                log::error!("failed to install SIGTERM handler: {err}");
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

async fn start_app(app: Arc<App>, addr: String) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    log::info!("listening on {addr}");

    axum::serve(listener, router(app))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Serve the RPC API until Ctrl-C or SIGTERM. `_lock` is held until return.
pub fn start_daemon(app: App, addr: String, _lock: FileLock) -> anyhow::Result<()> {
    let app = Arc::new(app);

    if app.config().semantic_search.enabled {
        // load the model before the first request instead of inside it
        let warmup = app.clone();
        std::thread::spawn(move || {
            if let Err(err) = warmup.warm_up() {
                log::error!("failed to initialize similarity index: {err}");
            }
        });
    }

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(start_app(app, addr))
}

#[derive(Debug)]
struct HttpError(AppError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            AppError::InvalidInput(_)
            | AppError::Semantic(SemanticSearchError::EmptyContent)
            | AppError::Semantic(SemanticSearchError::TooLong { .. })
            | AppError::Preference(PreferenceError::Invalid(_)) => StatusCode::BAD_REQUEST,
            AppError::Semantic(SemanticSearchError::Disabled) => StatusCode::SERVICE_UNAVAILABLE,
            _ => {
                log::error!("{self:?}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

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

/// Tab identifier as sent by the extension: a number or an opaque string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TabId {
    Number(u64),
    Text(String),
}

impl From<TabId> for TabScope {
    fn from(tab_id: TabId) -> Self {
        match tab_id {
            TabId::Number(id) => TabScope::from(id),
            TabId::Text(id) => TabScope::new(id),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    pub text: String,
    pub tab_id: TabId,
    pub source_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckResponse {
    pub should_process: bool,
}

async fn check(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<CheckRequest>,
) -> Result<Json<CheckResponse>, HttpError> {
    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let scope = TabScope::from(payload.tab_id);
        let should_process = app.should_process_content(&payload.text, &scope, &payload.source_url);
        Ok(Json(CheckResponse { should_process }))
    })
}

async fn explain(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<CheckRequest>,
) -> Result<Json<DedupDecision>, HttpError> {
    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let scope = TabScope::from(payload.tab_id);
        Ok(Json(app.explain(&payload.text, &scope, &payload.source_url)))
    })
}

async fn stats(State(state): State<Arc<SharedState>>) -> Result<Json<CacheStats>, HttpError> {
    let app = state.app.clone();

    tokio::task::block_in_place(move || Ok(Json(app.cache_stats()?)))
}

async fn clear(State(state): State<Arc<SharedState>>) -> Result<Json<CacheStats>, HttpError> {
    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        app.clear_cache()?;
        Ok(Json(app.cache_stats()?))
    })
}

#[derive(Debug, Deserialize)]
pub struct StoreRequest {
    pub id: String,
    pub tab_id: TabId,
    pub text: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

async fn store(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<StoreRequest>,
) -> Result<Json<serde_json::Value>, HttpError> {
    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let scope = TabScope::from(payload.tab_id);
        app.store_content(&payload.id, &scope, &payload.text, payload.metadata)?;
        Ok(Json(json!({"id": payload.id})))
    })
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub limit: Option<usize>,
}

async fn search(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<SearchRequest>,
) -> Result<Json<Vec<SearchResult>>, HttpError> {
    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let limit = payload.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
        Ok(Json(app.search(&payload.query, limit)?))
    })
}

async fn get_preferences(
    State(state): State<Arc<SharedState>>,
) -> Result<Json<PreferencesView>, HttpError> {
    let app = state.app.clone();

    tokio::task::block_in_place(move || Ok(Json(app.preferences()?)))
}

#[derive(Debug, Deserialize)]
pub struct PreferencesUpdate {
    pub embedding_mode: String,
}

async fn update_preferences(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<PreferencesUpdate>,
) -> Result<Json<PreferencesView>, HttpError> {
    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let mode = payload
            .embedding_mode
            .parse::<EmbeddingMode>()
            .map_err(|e| AppError::InvalidInput(e.to_string()))?;
        app.set_embedding_mode(mode)?;
        Ok(Json(app.preferences()?))
    })
}

async fn get_config(State(state): State<Arc<SharedState>>) -> Json<Config> {
    Json(state.app.config().clone())
}
