//! ElevenLabs input-streaming WebSocket messages.

use serde::{Deserialize, Serialize};

use super::config::VoiceSettings;

/// First message on a fresh socket. The single space is required.
#[derive(Debug, Serialize)]
pub struct InitializeConnection<'a> {
    pub text: &'static str,
    pub voice_settings: VoiceSettings,
    pub xi_api_key: &'a str,
}

impl<'a> InitializeConnection<'a> {
    pub fn new(api_key: &'a str, voice_settings: VoiceSettings) -> Self {
        Self {
            text: " ",
            voice_settings,
            xi_api_key: api_key,
        }
    }
}

/// Text sent after initialization.
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct SendText<'a> {
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub try_trigger_generation: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flush: Option<bool>,
}

impl<'a> SendText<'a> {
    pub fn chunk(text: &'a str) -> Self {
        Self {
            text,
            try_trigger_generation: Some(true),
            flush: None,
        }
    }

    /// Forces generation of everything buffered server side.
    pub fn flush() -> Self {
        Self {
            text: " ",
            try_trigger_generation: None,
            flush: Some(true),
        }
    }

    /// Empty text closes the input stream.
    pub fn end_of_stream() -> Self {
        Self {
            text: "",
            try_trigger_generation: None,
            flush: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioOutput {
    #[serde(default)]
    pub audio: Option<String>,
    #[serde(default)]
    pub is_final: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl AudioOutput {
    pub fn is_final(&self) -> bool {
        self.is_final.unwrap_or(false)
    }
}
