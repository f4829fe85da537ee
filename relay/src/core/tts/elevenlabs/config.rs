use serde::{Deserialize, Serialize};

use crate::core::tts::base::{TTSError, TTSResult};

pub const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io";
pub const DEFAULT_VOICE_ID: &str = "XrExE9yKIg1WjnnlVkGX";
pub const DEFAULT_MODEL_ID: &str = "eleven_monolingual_v1";
pub const DEFAULT_OUTPUT_FORMAT: &str = "pcm_16000";

/// Latency optimization level passed to the REST endpoint.
const STREAMING_LATENCY: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub similarity_boost: f32,
    pub stability: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            similarity_boost: 0.5,
            stability: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElevenLabsConfig {
    pub api_key: String,
    pub voice_id: String,
    pub model_id: String,
    /// `pcm_<rate>`; only raw PCM output can be converted for telephony.
    pub output_format: String,
    pub base_url: String,
    pub voice_settings: VoiceSettings,
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            voice_id: DEFAULT_VOICE_ID.to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
            base_url: ELEVENLABS_BASE_URL.to_string(),
            voice_settings: VoiceSettings::default(),
        }
    }
}

impl ElevenLabsConfig {
    pub fn validate(&self) -> TTSResult<()> {
        if self.api_key.is_empty() {
            return Err(TTSError::InvalidConfiguration(
                "ElevenLabs API key is required".to_string(),
            ));
        }
        if self.voice_id.is_empty() {
            return Err(TTSError::InvalidConfiguration(
                "ElevenLabs voice id is required".to_string(),
            ));
        }
        self.sample_rate().map(|_| ())
    }

    /// Sample rate encoded in `output_format`.
    pub fn sample_rate(&self) -> TTSResult<u32> {
        self.output_format
            .strip_prefix("pcm_")
            .and_then(|rate| rate.parse().ok())
            .ok_or_else(|| {
                TTSError::InvalidConfiguration(format!(
                    "output format {} is not raw PCM",
                    self.output_format
                ))
            })
    }

    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// REST endpoint for one-shot synthesis.
    pub fn http_url(&self) -> String {
        format!(
            "{}/v1/text-to-speech/{}?optimize_streaming_latency={}&output_format={}",
            self.base(),
            self.voice_id,
            STREAMING_LATENCY,
            self.output_format
        )
    }

    /// WebSocket endpoint for input streaming.
    pub fn ws_url(&self) -> String {
        let base = self.base();
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };

        format!(
            "{}/v1/text-to-speech/{}/stream-input?model_id={}&output_format={}",
            base, self.voice_id, self.model_id, self.output_format
        )
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
    fn test_urls() {
        let config = config();
        assert_eq!(
            config.http_url(),
            "https://api.elevenlabs.io/v1/text-to-speech/XrExE9yKIg1WjnnlVkGX?optimize_streaming_latency=4&output_format=pcm_16000"
        );
        assert_eq!(
            config.ws_url(),
            "wss://api.elevenlabs.io/v1/text-to-speech/XrExE9yKIg1WjnnlVkGX/stream-input?model_id=eleven_monolingual_v1&output_format=pcm_16000"
        );
    }

    #[test]
    fn test_ws_url_for_plain_http_base() {
        let config = ElevenLabsConfig {
            base_url: "http://127.0.0.1:9000/".to_string(),
            voice_id: "v1".to_string(),
            ..config()
        };
        assert!(config.ws_url().starts_with("ws://127.0.0.1:9000/v1/text-to-speech/v1/stream-input?"));
    }

    #[test]
    fn test_sample_rate_from_format() {
        assert_eq!(config().sample_rate().unwrap(), 16000);

        let mp3 = ElevenLabsConfig {
            output_format: "mp3_44100_128".to_string(),
            ..config()
        };
        assert!(mp3.sample_rate().is_err());
        assert!(mp3.validate().is_err());
    }

    #[test]
    fn test_missing_key() {
        assert!(matches!(
            ElevenLabsConfig::default().validate(),
            Err(TTSError::InvalidConfiguration(_))
        ));
    }
}
