//! Twilio media-stream message types
//!
//! The carrier sends JSON text frames tagged by `event`. Audio travels as
//! base64 mu-law at 8 kHz in `media.payload`, both directions.

use base64::Engine;
use serde::{Deserialize, Serialize};

// =============================================================================
// Incoming Messages (Carrier -> Relay)
// =============================================================================

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum MediaStreamEvent {
    Connected {
        #[serde(default)]
        protocol: Option<String>,
    },
    Start {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        start: StreamStart,
    },
    Media {
        media: MediaPayload,
    },
    Stop {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
    },
    Mark {
        #[serde(default)]
        mark: Option<MarkLabel>,
    },
    /// Anything else the carrier may add; ignored.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreamStart {
    pub call_sid: String,
    pub stream_sid: String,
    #[serde(default)]
    pub account_sid: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MediaPayload {
    /// Base64 mu-law audio
    pub payload: String,
    #[serde(default)]
    pub track: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MarkLabel {
    pub name: String,
}

// =============================================================================
// Outgoing Messages (Relay -> Carrier)
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum OutgoingMediaEvent {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutgoingPayload,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct OutgoingPayload {
    pub payload: String,
}

impl OutgoingMediaEvent {
    /// Wrap one mu-law frame for the call identified by `stream_sid`.
    pub fn audio(stream_sid: &str, mulaw: &[u8]) -> Self {
        Self::Media {
            stream_sid: stream_sid.to_string(),
            media: OutgoingPayload {
                payload: base64::engine::general_purpose::STANDARD.encode(mulaw),
            },
        }
    }
}

/// Routes for the socket writer task
#[derive(Debug)]
pub enum MediaMessageRoute {
    Outgoing(OutgoingMediaEvent),
    Close,
}
