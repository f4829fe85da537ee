//! Router configuration
//!
//! - `GET /` - health check
//! - `GET|POST /twiml` - call instructions for the carrier
//! - `GET /media-stream` - WebSocket upgrade carrying the call audio

use std::sync::Arc;

use axum::{
    Router,
    routing::{any, get},
};
use tower_http::trace::TraceLayer;

use crate::handlers::{api, media_stream_handler, twiml};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(api::health_check))
        .route("/twiml", get(twiml::twiml_handler).post(twiml::twiml_handler))
        .route("/media-stream", any(media_stream_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
