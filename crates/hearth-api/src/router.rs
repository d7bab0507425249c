use axum::{
    Router, middleware,
    routing::{get, post, put},
};

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{auth, chats, emergency, family, messages, pins, polls};

/// Prefix every REST route is mounted under.
pub const API_ROOT: &str = "/api";

/// All REST routes, mounted under `API_ROOT`. Everything except the auth
/// routes requires a session.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout));

    let protected_routes = Router::new()
        .route("/communication/chats", get(chats::get_chats))
        .route("/communication/messages", post(messages::post_message))
        .route("/communication/messages/{id}", get(messages::get_messages))
        .route("/communication/messages/{id}/read", put(messages::put_read))
        .route("/communication/messages/{id}/reactions", post(messages::post_reaction))
        .route("/communication/pins/{chat_id}", post(pins::post_pin))
        .route("/communication/polls", get(polls::get_polls).post(polls::post_poll))
        .route("/communication/polls/{poll_id}", get(polls::get_poll))
        .route("/communication/polls/vote/{poll_id}", post(polls::post_vote))
        .route("/emergency/trigger", post(emergency::post_trigger))
        .route("/emergency/resolve", post(emergency::post_resolve))
        .route("/emergency/history", get(emergency::get_history))
        .route("/family/members", get(family::get_members))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new().nest(
        API_ROOT,
        public_routes.merge(protected_routes).with_state(state),
    )
}
