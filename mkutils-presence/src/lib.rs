pub mod config;
pub mod cooldown;
pub mod directory;
mod error;
pub mod helpers;
pub mod host;
pub mod keyspace;
pub mod models;
pub mod query;
pub mod relay;
mod routes;
pub mod validation;

use axum::{
    Router,
    http::StatusCode,
    routing::{get, post},
};
use mkutils_store::StoreManager;
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub use directory::{PresenceDirectory, PresenceError};
pub use host::{Host, SidecarHost};
pub use keyspace::KeySpace;
pub use models::{HostRole, Location, PlayerName};
pub use query::PresenceQuery;
pub use relay::{Dispatcher, Relay, RelayError, RemoteAction};

/// Everything the sidecar routes need.
pub struct AppState {
    pub role: HostRole,
    /// Default server for `/join`, `/leave` and `/sync` calls that name none.
    pub server_name: String,
    /// Whether `/join`, `/leave` and `/sync` update the presence directory.
    pub owns_presence: bool,
    pub manager: Arc<StoreManager>,
    pub directory: Arc<PresenceDirectory>,
    pub relay: Relay,
    pub host: Arc<SidecarHost>,
}

/// Create the sidecar router over the given state
pub fn create_app(state: AppState, request_body_limit: usize, request_timeout: Duration) -> Router {
    let state = Arc::new(state);

    // Calls from the host runtime
    let host_routes = Router::new()
        .route("/join", post(routes::join))
        .route("/leave", post(routes::leave))
        .route("/sync", post(routes::sync))
        .route("/actions", post(routes::publish_action))
        .route("/actions/pending", get(routes::pending_actions));

    // Read-only views of the network
    let query_routes = Router::new()
        .route("/servers", get(routes::servers))
        .route("/players", get(routes::players))
        .route("/players/{name}", get(routes::player))
        .route("/count", get(routes::count));

    Router::new()
        .route("/health", get(routes::health))
        .route("/status", get(routes::status))
        .merge(host_routes)
        .merge(query_routes)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(RequestBodyLimitLayer::new(request_body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
