//! HTTP endpoint layer for the ServiceNow service.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Duration, Utc};
use serde_json::json;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use validator::Validate;

use mcpbridge_core::activity::sort_newest_first;
use mcpbridge_core::{Ack, Activity, ApiError, ConfigUpdate, EnvFile};

use crate::ServiceError;
use crate::table::{IncidentCreate, SnowClient, SnowError, SnowSettings};

const CONFIG_PREFIX: &str = "SNOW_";

/// Shared service state.
///
/// Same locking shape as the M365 service: handlers hold a read lock on the
/// Table client for their outbound call; config update and reload hold the
/// write lock across the file rewrite and client swap. In-flight requests
/// complete with the credentials they started with.
pub struct AppState {
    env: EnvFile,
    base_url_override: Option<String>,
    snow: RwLock<SnowClient>,
}

impl AppState {
    /// Build state from the given env file, seeding the Table client from
    /// the persisted `SNOW_*` keys.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Config` if the env file cannot be read.
    pub fn new(env: EnvFile) -> Result<Self, ServiceError> {
        Self::build(env, None)
    }

    /// Build state against a custom Table API base URL.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Config` if the env file cannot be read.
    pub fn with_base_url(env: EnvFile, base_url: impl Into<String>) -> Result<Self, ServiceError> {
        Self::build(env, Some(base_url.into()))
    }

    fn build(env: EnvFile, base_url_override: Option<String>) -> Result<Self, ServiceError> {
        let vars = env.load().map_err(|e| ServiceError::Config(e.to_string()))?;
        let settings = SnowSettings::from_map(&vars);
        let client = match &base_url_override {
            Some(base) => SnowClient::with_base_url(settings, base),
            None => SnowClient::new(settings),
        };
        Ok(Self {
            env,
            base_url_override,
            snow: RwLock::new(client),
        })
    }

    /// Merge `partial` into the env file and swap in a rebuilt client.
    async fn apply_update(&self, partial: &BTreeMap<String, String>) -> Result<(), ApiError> {
        // Write lock held across the rewrite so no request observes a
        // half-written file or stale credentials.
        let mut guard = self.snow.write().await;
        self.env.update(partial)?;
        *guard = self.rebuilt_client()?;
        Ok(())
    }

    /// Re-read the env file and swap in a rebuilt client.
    async fn reload(&self) -> Result<(), ApiError> {
        let mut guard = self.snow.write().await;
        *guard = self.rebuilt_client()?;
        Ok(())
    }

    fn rebuilt_client(&self) -> Result<SnowClient, ApiError> {
        let settings = SnowSettings::from_map(&self.env.load()?);
        Ok(match &self.base_url_override {
            Some(base) => SnowClient::with_base_url(settings, base),
            None => SnowClient::new(settings),
        })
    }
}

impl From<SnowError> for ApiError {
    fn from(err: SnowError) -> Self {
        match err {
            // Table API failures keep their remote status on the way out.
            SnowError::Api { status, message } => Self::Remote {
                status,
                detail: message,
            },
            SnowError::Config(message) => Self::Internal(message),
            SnowError::Network(e) => Self::Internal(e.to_string()),
            SnowError::Payload(message) => Self::Internal(message),
        }
    }
}

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/mcp/config", get(get_config).put(put_config))
        .route("/api/mcp/reload", post(reload))
        .route("/api/mcp/incident", post(create_incident))
        .route("/api/mcp/incident/{id}", get(get_incident))
        .route("/api/mcp/activities", get(activities))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the router on `addr` until the process is stopped.
///
/// # Errors
///
/// Returns error if the listener cannot be bound or the server fails.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> Result<(), ServiceError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("ServiceNow service listening on http://{addr}");
    axum::serve(listener, router(state))
        .await
        .map_err(|e| ServiceError::Server(e.to_string()))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let snow = state.snow.read().await;
    let settings = snow.settings();
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "config": {
            "instance": settings.instance,
            "username": settings.username,
            "configured": settings.configured(),
        }
    }))
}

async fn get_config(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    // Read lock held so an update cannot truncate the file mid-read.
    let _snow = state.snow.read().await;
    let config = state.env.load_prefixed(CONFIG_PREFIX)?;
    Ok(Json(json!({ "success": true, "config": config })))
}

async fn put_config(
    State(state): State<Arc<AppState>>,
    Json(update): Json<ConfigUpdate>,
) -> Result<Json<Ack>, ApiError> {
    state.apply_update(&update.config).await?;
    tracing::info!("configuration updated");
    Ok(Json(Ack::new("Configuration updated successfully")))
}

async fn reload(State(state): State<Arc<AppState>>) -> Result<Json<Ack>, ApiError> {
    state.reload().await?;
    tracing::info!("configuration reloaded from env file");
    Ok(Json(Ack::new("Server reloaded successfully")))
}

async fn create_incident(
    State(state): State<Arc<AppState>>,
    Json(incident): Json<IncidentCreate>,
) -> Result<Json<serde_json::Value>, ApiError> {
    incident
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let snow = state.snow.read().await;
    let sys_id = snow.create_incident(&incident).await?;
    tracing::info!(%sys_id, "incident created");
    Ok(Json(json!({ "success": true, "incidentId": sys_id })))
}

async fn get_incident(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let snow = state.snow.read().await;
    let record = snow.get_incident(&id).await?;
    Ok(Json(record))
}

/// Fixed sample data; a real listing would query the instance's audit
/// tables.
async fn activities() -> Json<Vec<Activity>> {
    let now = Utc::now();
    let mut items = vec![
        Activity::success(
            "snow-1",
            now,
            "incident_created",
            "servicenow",
            json!({
                "incident_id": "INC001",
                "title": "Service Degradation",
                "priority": "high"
            }),
        ),
        Activity::success(
            "snow-2",
            now - Duration::hours(2),
            "incident_updated",
            "servicenow",
            json!({
                "incident_id": "INC002",
                "status": "in_progress"
            }),
        ),
    ];
    sort_newest_first(&mut items);
    Json(items)
}
