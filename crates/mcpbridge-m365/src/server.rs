//! HTTP endpoint layer for the M365 family service.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
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
use crate::graph::{GraphClient, GraphError, GraphSettings, PasswordResetRequest};

const CONFIG_PREFIX: &str = "M365_";

/// Shared service state.
///
/// The Graph client sits behind one `RwLock`: handlers hold a read lock for
/// the duration of their outbound calls, and configuration updates hold the
/// write lock across the file rewrite and client swap. Swapping the client
/// also drops its memoized bearer token, so the next call re-derives
/// credentials. An in-flight request completes with the credentials it
/// started with.
pub struct AppState {
    env: EnvFile,
    login_base: String,
    graph_base: String,
    graph: RwLock<GraphClient>,
}

impl AppState {
    /// Build state from the given env file, seeding the Graph client from
    /// the persisted `M365_*` keys.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Config` if the env file cannot be read.
    pub fn new(env: EnvFile) -> Result<Self, ServiceError> {
        Self::with_endpoints(
            env,
            "https://login.microsoftonline.com",
            "https://graph.microsoft.com",
        )
    }

    /// Build state against custom login/Graph base URLs.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Config` if the env file cannot be read.
    pub fn with_endpoints(
        env: EnvFile,
        login_base: impl Into<String>,
        graph_base: impl Into<String>,
    ) -> Result<Self, ServiceError> {
        let login_base = login_base.into();
        let graph_base = graph_base.into();
        let vars = env.load().map_err(|e| ServiceError::Config(e.to_string()))?;
        let client =
            GraphClient::with_endpoints(GraphSettings::from_map(&vars), &login_base, &graph_base);
        Ok(Self {
            env,
            login_base,
            graph_base,
            graph: RwLock::new(client),
        })
    }

    /// Merge `partial` into the env file and swap in a rebuilt client.
    async fn apply_update(&self, partial: &BTreeMap<String, String>) -> Result<(), ApiError> {
        // Write lock held across the rewrite so no request observes a
        // half-written file or a stale memoized token.
        let mut guard = self.graph.write().await;
        self.env.update(partial)?;
        *guard = self.rebuilt_client()?;
        Ok(())
    }

    /// Re-read the env file and swap in a rebuilt client.
    async fn reload(&self) -> Result<(), ApiError> {
        let mut guard = self.graph.write().await;
        *guard = self.rebuilt_client()?;
        Ok(())
    }

    fn rebuilt_client(&self) -> Result<GraphClient, ApiError> {
        let vars = self.env.load()?;
        Ok(GraphClient::with_endpoints(
            GraphSettings::from_map(&vars),
            &self.login_base,
            &self.graph_base,
        ))
    }
}

impl From<GraphError> for ApiError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::UserNotFound { .. } => Self::NotFound(err.to_string()),
            GraphError::Config(message) => Self::Internal(message),
            GraphError::Api { status, message } => {
                Self::Internal(format!("graph API returned {status}: {message}"))
            }
            GraphError::Network(e) => Self::Internal(e.to_string()),
        }
    }
}

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/mcp/config", get(get_config).put(put_config))
        .route("/api/mcp/reload", post(reload))
        .route("/api/mcp/family/password/reset", post(reset_password))
        .route("/api/mcp/family/activities", get(activities))
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
    tracing::info!("M365 family service listening on http://{addr}");
    axum::serve(listener, router(state))
        .await
        .map_err(|e| ServiceError::Server(e.to_string()))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let graph = state.graph.read().await;
    let settings = graph.settings();
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "config": {
            "tenant_id": settings.tenant_id,
            "client_id": settings.client_id,
            "configured": settings.configured(),
        }
    }))
}

async fn get_config(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    // Read lock held so an update cannot truncate the file mid-read.
    let _graph = state.graph.read().await;
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

async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PasswordResetRequest>,
) -> Result<Json<Ack>, ApiError> {
    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let graph = state.graph.read().await;
    graph.reset_password(&request).await?;
    tracing::info!(user = %request.user_email, "password reset successful");
    Ok(Json(Ack::new("Password reset successful")))
}

/// Fixed sample data; a real listing would query Graph audit logs, which
/// needs User.Read.All and AuditLog.Read.All.
async fn activities() -> Json<Vec<Activity>> {
    let now = Utc::now();
    let mut items = vec![
        Activity::success(
            "m365-1",
            now,
            "auth",
            "m365",
            json!({
                "action": "user_signin",
                "user": "john.doe@example.com",
                "display_name": "John Doe"
            }),
        ),
        Activity::success(
            "m365-2",
            now - Duration::hours(1),
            "user",
            "m365",
            json!({
                "action": "password_reset",
                "user": "jane.smith@example.com",
                "display_name": "Jane Smith"
            }),
        ),
        Activity::success(
            "m365-3",
            now - Duration::hours(2),
            "user",
            "m365",
            json!({
                "action": "user_created",
                "user": "bob.wilson@example.com",
                "display_name": "Bob Wilson"
            }),
        ),
    ];
    sort_newest_first(&mut items);
    Json(items)
}
