//! ElevenLabs text-to-speech, in request/response and input-streaming form.

mod config;
mod messages;
mod provider;
mod streaming;

pub use config::{
    DEFAULT_MODEL_ID, DEFAULT_OUTPUT_FORMAT, DEFAULT_VOICE_ID, ELEVENLABS_BASE_URL,
    ElevenLabsConfig, VoiceSettings,
};
pub use messages::{AudioOutput, InitializeConnection, SendText};
pub use provider::{ElevenLabsRequestBuilder, ElevenLabsTTS};
pub use streaming::ElevenLabsStreamingBackend;
