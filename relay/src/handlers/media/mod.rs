//! Carrier media-stream WebSocket (`/media-stream`).

mod handler;
pub mod messages;

pub use handler::media_stream_handler;
