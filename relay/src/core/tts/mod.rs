mod base;
pub mod elevenlabs;
pub mod provider;
pub mod stream;

use std::sync::Arc;

pub use base::{
    BoxedSynthesisBackend, SpeechSynthesizer, SynthesisBackend, SynthesisEvent, SynthesisMode,
    SynthesizedAudio, TTSError, TTSResult,
};
pub use elevenlabs::{ElevenLabsConfig, ElevenLabsStreamingBackend, ElevenLabsTTS};
pub use provider::{RequestResponseBackend, TTSProvider, TTSRequestBuilder};
pub use stream::SynthesisStream;

/// Build the synthesis strategy for one call.
///
/// Request mode makes one REST call per word chunk; streaming mode keeps one
/// ElevenLabs socket open for the call.
pub fn create_synthesis_backend(
    mode: SynthesisMode,
    config: &ElevenLabsConfig,
    client: &reqwest::Client,
) -> TTSResult<BoxedSynthesisBackend> {
    match mode {
        SynthesisMode::Request => {
            let tts = ElevenLabsTTS::from_config(config.clone(), client.clone())?;
            Ok(Box::new(RequestResponseBackend::new(Arc::new(tts))))
        }
        SynthesisMode::Streaming => Ok(Box::new(ElevenLabsStreamingBackend::new(config.clone())?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ElevenLabsConfig {
        ElevenLabsConfig {
            api_key: "xi-test".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_synthesis_backend() {
        let client = reqwest::Client::new();

        let request = create_synthesis_backend(SynthesisMode::Request, &config(), &client).unwrap();
        assert_eq!(request.mode(), "request");

        let streaming =
            create_synthesis_backend(SynthesisMode::Streaming, &config(), &client).unwrap();
        assert_eq!(streaming.mode(), "streaming");
    }

    #[test]
    fn test_create_synthesis_backend_requires_key() {
        let client = reqwest::Client::new();
        let result =
            create_synthesis_backend(SynthesisMode::Request, &ElevenLabsConfig::default(), &client);
        assert!(matches!(result, Err(TTSError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_synthesis_mode_from_str() {
        assert_eq!(SynthesisMode::from_str_or_default("streaming"), SynthesisMode::Streaming);
        assert_eq!(SynthesisMode::from_str_or_default("WebSocket"), SynthesisMode::Streaming);
        assert_eq!(SynthesisMode::from_str_or_default("request"), SynthesisMode::Request);
        assert_eq!(SynthesisMode::from_str_or_default("bogus"), SynthesisMode::Request);
        assert_eq!(SynthesisMode::Streaming.as_str(), "streaming");
    }
}
