pub mod config;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use axum_extra::extract::cookie::CookieJar;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use hearth_api::middleware::{SESSION_COOKIE, resolve_session};
use hearth_api::router::router;
use hearth_api::state::AppState;
use hearth_gateway::connection;
use hearth_gateway::presence::PresenceTracker;

#[derive(Clone)]
struct SocketState {
    api: AppState,
    presence: PresenceTracker,
}

/// REST routes plus the `/socket` upgrade, with CORS and request tracing.
pub fn build_app(api: AppState, presence: PresenceTracker) -> Router {
    let ws_route = Router::new()
        .route("/socket", get(ws_upgrade))
        .with_state(SocketState {
            api: api.clone(),
            presence,
        });

    Router::new()
        .merge(router(api))
        .merge(ws_route)
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
}

/// The handshake credential is resolved before upgrading; a missing or bad
/// cookie gets a 401 and never reaches a room.
async fn ws_upgrade(
    State(state): State<SocketState>,
    jar: CookieJar,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(token) = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) else {
        warn!("Socket handshake without a session cookie, refusing upgrade");
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let user = match resolve_session(&state.api, &token).await {
        Ok(user) => user,
        Err(e) => {
            warn!("Socket handshake rejected: {}", e);
            return e.into_response();
        }
    };

    ws.on_upgrade(move |socket| connection::handle_connection(socket, state.presence, user))
}
