use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{
    get_room, health_check, metrics_text, post_signal, register_session, update_session_status,
};
use crate::state::AppState;
use crate::websocket::room_feed_handler;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_text))
        .route("/sessions", post(register_session))
        .route("/sessions/:id/status", post(update_session_status))
        .route("/sessions/:id/room", get(get_room))
        .route("/sessions/:id/room/ws", get(room_feed_handler))
        .route("/sessions/:id/signal", post(post_signal))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
