pub mod protocol;
pub mod rest;
pub mod rotation_task;
pub mod state;
pub mod ws_handler;

use axum::{
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        Method,
    },
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use state::AppState;
pub use ws_handler::live_attendance_handler;

/// Builds the HTTP and WebSocket routes over `app_state`.
pub fn build_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(app_state.config.cors_origin.clone())
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    Router::new()
        .route("/health", get(rest::health_handler))
        .route("/sessions", post(rest::start_session_handler))
        .route("/sessions/active", get(rest::active_session_handler))
        .route("/sessions/{id}", get(rest::get_session_handler))
        .route("/sessions/{id}/end", post(rest::end_session_handler))
        .route("/sessions/{id}/rotate", post(rest::rotate_token_handler))
        .route("/sessions/{id}/attendance", get(rest::list_attendance_handler))
        .route("/sessions/{id}/live", get(live_attendance_handler))
        .route("/attendance", post(rest::submit_attendance_handler))
        .route(
            "/students/{roll_number}/attendance",
            get(rest::student_history_handler),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
