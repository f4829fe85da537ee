use std::sync::Arc;

use axum::{
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::state::AppState;

/// Call instructions for the carrier: stream the call audio to this relay.
pub async fn twiml_handler(State(state): State<Arc<AppState>>) -> Response {
    let Some(app_url) = state.config.app_url.as_deref() else {
        error!("APP_URL is not configured, cannot answer TwiML request");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    (
        [(header::CONTENT_TYPE, "application/xml")],
        connect_stream_twiml(app_url),
    )
        .into_response()
}

pub fn connect_stream_twiml(app_url: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><Response><Connect><Stream url="wss://{}/media-stream" /></Connect></Response>"#,
        escape_attribute(app_url)
    )
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_stream_twiml() {
        assert_eq!(
            connect_stream_twiml("relay.example.com"),
            r#"<?xml version="1.0" encoding="UTF-8"?><Response><Connect><Stream url="wss://relay.example.com/media-stream" /></Connect></Response>"#
        );
    }

    #[test]
    fn test_twiml_escapes_host() {
        assert!(connect_stream_twiml("a\"b&c").contains("wss://a&quot;b&amp;c/media-stream"));
    }
}
