//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check endpoint
//! - `media` - Carrier media-stream WebSocket carrying call audio
//! - `twiml` - Call instructions served to the carrier

pub mod api;
pub mod media;
pub mod twiml;

pub use media::media_stream_handler;
