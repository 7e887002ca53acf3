//! Axum-based RPC surface for the trackside core.
//!
//! Provides REST endpoints for:
//! - GET `/api/status` - Connection state, topics, latest sensor
//! - GET `/api/trains` - Known trains from the registry
//! - POST `/api/train/control` - Apply ordered command fragments to a loco
//! - POST `/api/inventory/refresh` - Re-fetch the controller inventory
//! - POST `/api/reset` - Clear all state and re-apply defaults
//!
//! The core is blocking inside, so mutating handlers hop through
//! `spawn_blocking` rather than stall the runtime behind an HTTP call to
//! the train controller.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::control::ControlOutcome;
use crate::registry::TrainRecord;
use crate::service::TracksideService;
use crate::traits::{BrokerTransport, TrainControlApi};

// ============================================================================
// API Types
// ============================================================================

/// API response wrapper for consistent JSON structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the request was successful
    pub success: bool,
    /// Response data (present when success=true)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error message (present when success=false)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Create a successful response with data
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create an error response
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Service status snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Broker connection state (`disconnected`, `connecting`, `connected`,
    /// `failed`).
    pub connection: String,
    /// Currently subscribed topics.
    pub topics: Vec<String>,
    /// Latest acted-upon sensor id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_sensor: Option<i32>,
    /// Number of trains in the registry.
    pub train_count: usize,
}

/// Body of POST `/api/train/control`.
#[derive(Debug, Clone, Deserialize)]
pub struct ControlTrainRequest {
    /// Target loco id.
    pub loco_id: String,
    /// Ordered command fragments, applied one POST each.
    #[serde(default)]
    pub commands: Vec<serde_json::Value>,
}

// ============================================================================
// Route Handlers
// ============================================================================

/// GET /api/status
async fn get_status<T, A>(
    State(service): State<Arc<TracksideService<T, A>>>,
) -> Json<ApiResponse<StatusResponse>>
where
    T: BrokerTransport + 'static,
    A: TrainControlApi + 'static,
{
    let status = StatusResponse {
        connection: format!("{:?}", service.connection_state()).to_lowercase(),
        topics: service.topics(),
        latest_sensor: service.latest_sensor(),
        train_count: service.trains().len(),
    };
    Json(ApiResponse::ok(status))
}

/// GET /api/trains
async fn get_trains<T, A>(
    State(service): State<Arc<TracksideService<T, A>>>,
) -> Json<ApiResponse<Vec<TrainRecord>>>
where
    T: BrokerTransport + 'static,
    A: TrainControlApi + 'static,
{
    Json(ApiResponse::ok(service.trains()))
}

/// POST /api/train/control
///
/// Accepts JSON: `{"loco_id": "5", "commands": [{"speed": 30}, {"bell": "on"}]}`
async fn control_train<T, A>(
    State(service): State<Arc<TracksideService<T, A>>>,
    Json(request): Json<ControlTrainRequest>,
) -> Json<ApiResponse<ControlOutcome>>
where
    T: BrokerTransport + 'static,
    A: TrainControlApi + 'static,
{
    let result = tokio::task::spawn_blocking(move || {
        let fragments: Vec<String> = request.commands.iter().map(|c| c.to_string()).collect();
        service.control_train(&request.loco_id, &fragments)
    })
    .await;

    match result {
        Ok(outcome) if outcome.accepted => Json(ApiResponse::ok(outcome)),
        Ok(_) => Json(ApiResponse::err("missing loco id")),
        Err(_) => Json(ApiResponse::err("control task failed")),
    }
}

/// POST /api/inventory/refresh
async fn refresh_inventory<T, A>(
    State(service): State<Arc<TracksideService<T, A>>>,
) -> Json<ApiResponse<usize>>
where
    T: BrokerTransport + 'static,
    A: TrainControlApi + 'static,
{
    let result = tokio::task::spawn_blocking(move || {
        service.refresh_inventory().map(|_| service.trains().len())
    })
    .await;

    match result {
        Ok(Ok(count)) => Json(ApiResponse::ok(count)),
        Ok(Err(e)) => Json(ApiResponse::err(e.to_string())),
        Err(_) => Json(ApiResponse::err("refresh task failed")),
    }
}

/// POST /api/reset
async fn reset<T, A>(
    State(service): State<Arc<TracksideService<T, A>>>,
) -> Json<ApiResponse<&'static str>>
where
    T: BrokerTransport + 'static,
    A: TrainControlApi + 'static,
{
    let result = tokio::task::spawn_blocking(move || service.clear_all_state()).await;
    match result {
        Ok(()) => Json(ApiResponse::ok("reset")),
        Err(_) => Json(ApiResponse::err("reset task failed")),
    }
}

/// Fallback handler for 404
async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::<()>::err("Not found")),
    )
}

// ============================================================================
// Server Builder
// ============================================================================

/// Configuration for the web server
#[derive(Debug, Clone)]
pub struct WebServerConfig {
    /// Address to bind to
    pub addr: SocketAddr,
    /// Whether to enable CORS for all origins
    pub cors_permissive: bool,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".parse().unwrap(),
            cors_permissive: true,
        }
    }
}

impl WebServerConfig {
    /// Create a new config with the given address
    pub fn new(addr: impl Into<SocketAddr>) -> Self {
        Self {
            addr: addr.into(),
            ..Default::default()
        }
    }

    /// Set whether CORS should be permissive
    pub fn cors(mut self, permissive: bool) -> Self {
        self.cors_permissive = permissive;
        self
    }
}

/// Build the Axum router with all routes
pub fn build_router<T, A>(
    service: Arc<TracksideService<T, A>>,
    config: &WebServerConfig,
) -> Router
where
    T: BrokerTransport + 'static,
    A: TrainControlApi + 'static,
{
    let mut router = Router::new()
        .route("/api/status", get(get_status::<T, A>))
        .route("/api/trains", get(get_trains::<T, A>))
        .route("/api/train/control", post(control_train::<T, A>))
        .route("/api/inventory/refresh", post(refresh_inventory::<T, A>))
        .route("/api/reset", post(reset::<T, A>))
        .fallback(not_found)
        .with_state(service);

    if config.cors_permissive {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router
}

/// Serve the router until the process exits.
pub async fn serve(router: Router, config: &WebServerConfig) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!(addr = %config.addr, "web server listening");
    axum::serve(listener, router).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_response_ok() {
        let response = ApiResponse::ok(42);
        assert!(response.success);
        assert_eq!(response.data, Some(42));
        assert_eq!(response.error, None);
    }

    #[test]
    fn test_api_response_err() {
        let response: ApiResponse<i32> = ApiResponse::err("boom");
        assert!(!response.success);
        assert_eq!(response.data, None);
        assert_eq!(response.error, Some("boom".to_string()));
    }

    #[test]
    fn test_api_response_skip_serializing_none() {
        let response = ApiResponse::ok(42);
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("error"));

        let response: ApiResponse<i32> = ApiResponse::err("failed");
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("data"));
    }

    #[test]
    fn test_control_request_defaults_commands() {
        let request: ControlTrainRequest =
            serde_json::from_str(r#"{"loco_id": "5"}"#).unwrap();
        assert_eq!(request.loco_id, "5");
        assert!(request.commands.is_empty());
    }

    #[test]
    fn test_web_config_builder() {
        let config = WebServerConfig::default().cors(false);
        assert!(!config.cors_permissive);
        assert_eq!(config.addr.port(), 8080);
    }
}
