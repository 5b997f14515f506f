use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::config::{EnvConfig, ProfileKind};
use crate::engine::RemoteEngine;
use crate::env::{EnvError, PokerEnv, StepOutcome};

type SharedEnv = Arc<Mutex<PokerEnv<RemoteEngine>>>;

#[derive(Clone)]
struct AppState {
    config: Arc<EnvConfig>,
    envs: Arc<RwLock<HashMap<Uuid, SharedEnv>>>,
}

impl AppState {
    fn new(config: EnvConfig) -> Self {
        Self {
            config: Arc::new(config),
            envs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn insert_env(&self, env: PokerEnv<RemoteEngine>) -> Uuid {
        let id = Uuid::new_v4();
        self.envs.write().insert(id, Arc::new(Mutex::new(env)));
        id
    }

    fn get_env(&self, id: &Uuid) -> Option<SharedEnv> {
        self.envs.read().get(id).cloned()
    }

    fn remove_env(&self, id: &Uuid) -> Option<SharedEnv> {
        self.envs.write().remove(id)
    }
}

#[derive(Debug, Deserialize)]
struct CreateEnvRequest {
    engine_addr: SocketAddr,
    profile: Option<ProfileKind>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedEnv {
    pub env_id: Uuid,
    pub observation: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct StepRequest {
    action: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LegalActions {
    pub actions: Vec<usize>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, thiserror::Error)]
enum ApiError {
    #[error("environment not found")]
    NotFound,
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Engine(String),
    #[error("{0}")]
    Internal(String),
}

impl From<EnvError> for ApiError {
    fn from(err: EnvError) -> Self {
        match err {
            EnvError::Config(_) => ApiError::BadRequest(err.to_string()),
            EnvError::NotInHand(_) => ApiError::Conflict(err.to_string()),
            EnvError::Engine(_) | EnvError::NoInitialMessage(_) => {
                ApiError::Engine(err.to_string())
            }
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Engine(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}

pub async fn serve(addr: SocketAddr, config: EnvConfig) -> Result<()> {
    let app = build_router(AppState::new(config));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "serving environment API");
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/envs", post(create_env))
        .route("/envs/:id", delete(close_env))
        .route("/envs/:id/step", post(step_env))
        .route("/envs/:id/legal", get(legal_actions));

    Router::new()
        .route("/healthz", get(health))
        .nest("/api", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

pub fn router() -> Router {
    router_with_config(EnvConfig::default())
}

pub fn router_with_config(config: EnvConfig) -> Router {
    build_router(AppState::new(config))
}

async fn health() -> &'static str {
    "ok"
}

async fn create_env(
    State(state): State<AppState>,
    Json(req): Json<CreateEnvRequest>,
) -> Result<Json<CreatedEnv>, ApiError> {
    let mut config = EnvConfig::clone(&state.config);
    if let Some(profile) = req.profile {
        config.profile = profile;
    }
    let engine = RemoteEngine::new(req.engine_addr, config.connect_timeout, config.read_timeout);

    let (env, observation) = tokio::task::spawn_blocking(move || {
        let mut env = PokerEnv::new(engine, config)?;
        let observation = env.reset()?;
        Ok::<_, EnvError>((env, observation))
    })
    .await??;

    let env_id = state.insert_env(env);
    info!(%env_id, engine = %req.engine_addr, "environment created");
    Ok(Json(CreatedEnv {
        env_id,
        observation,
    }))
}

async fn step_env(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<StepRequest>,
) -> Result<Json<StepOutcome>, ApiError> {
    let env = state.get_env(&id).ok_or(ApiError::NotFound)?;
    let outcome = tokio::task::spawn_blocking(move || env.lock().step(req.action)).await??;
    Ok(Json(outcome))
}

async fn legal_actions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<LegalActions>, ApiError> {
    let env = state.get_env(&id).ok_or(ApiError::NotFound)?;
    // A step in flight holds the lock across a socket read.
    let actions = tokio::task::spawn_blocking(move || env.lock().legal_actions()).await?;
    Ok(Json(LegalActions { actions }))
}

async fn close_env(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let env = state.remove_env(&id).ok_or(ApiError::NotFound)?;
    tokio::task::spawn_blocking(move || env.lock().close()).await?;
    Ok(StatusCode::NO_CONTENT)
}
