use serde_json::json;
use tracing::debug;

use super::config::ElevenLabsConfig;
use crate::core::tts::base::TTSResult;
use crate::core::tts::provider::{TTSProvider, TTSRequestBuilder};

/// Builds `POST /v1/text-to-speech/{voice}` requests.
#[derive(Debug, Clone)]
pub struct ElevenLabsRequestBuilder {
    config: ElevenLabsConfig,
    sample_rate: u32,
}

impl ElevenLabsRequestBuilder {
    pub fn new(config: ElevenLabsConfig) -> TTSResult<Self> {
        config.validate()?;
        let sample_rate = config.sample_rate()?;
        Ok(Self {
            config,
            sample_rate,
        })
    }

    fn build_request_body(&self, text: &str) -> serde_json::Value {
        json!({
            "text": text,
            "model_id": self.config.model_id,
            "voice_settings": self.config.voice_settings,
        })
    }
}

impl TTSRequestBuilder for ElevenLabsRequestBuilder {
    fn build_http_request(&self, client: &reqwest::Client, text: &str) -> reqwest::RequestBuilder {
        debug!(
            voice = %self.config.voice_id,
            model = %self.config.model_id,
            chars = text.len(),
            "Building ElevenLabs TTS request"
        );

        client
            .post(self.config.http_url())
            .header("xi-api-key", &self.config.api_key)
            .header("Content-Type", "application/json")
            .header("Accept", "audio/pcm")
            .json(&self.build_request_body(text))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

pub type ElevenLabsTTS = TTSProvider<ElevenLabsRequestBuilder>;

impl ElevenLabsTTS {
    pub fn from_config(config: ElevenLabsConfig, client: reqwest::Client) -> TTSResult<Self> {
        Ok(TTSProvider::new(client, ElevenLabsRequestBuilder::new(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tts::base::{SpeechSynthesizer, TTSError};
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str) -> ElevenLabsConfig {
        ElevenLabsConfig {
            api_key: "xi-test".to_string(),
            voice_id: "voice-1".to_string(),
            base_url: base_url.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_build_http_request() {
        let builder = ElevenLabsRequestBuilder::new(config("https://api.elevenlabs.io")).unwrap();
        let client = reqwest::Client::new();
        let request = builder.build_http_request(&client, "Hello ").build().unwrap();

        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(
            request.url().as_str(),
            "https://api.elevenlabs.io/v1/text-to-speech/voice-1?optimize_streaming_latency=4&output_format=pcm_16000"
        );
        assert_eq!(request.headers().get("xi-api-key").unwrap(), "xi-test");

        let body: serde_json::Value =
            serde_json::from_slice(request.body().unwrap().as_bytes().unwrap()).unwrap();
        assert_eq!(
            body,
            json!({
                "text": "Hello ",
                "model_id": "eleven_monolingual_v1",
                "voice_settings": { "similarity_boost": 0.5, "stability": 0.0 }
            })
        );
    }

    #[tokio::test]
    async fn test_synthesize_returns_pcm_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/voice-1"))
            .and(query_param("output_format", "pcm_16000"))
            .and(header("xi-api-key", "xi-test"))
            .and(body_json(json!({
                "text": "Hi there ",
                "model_id": "eleven_monolingual_v1",
                "voice_settings": { "similarity_boost": 0.5, "stability": 0.0 }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 0, 2, 0]))
            .expect(1)
            .mount(&server)
            .await;

        let tts = ElevenLabsTTS::from_config(config(&server.uri()), reqwest::Client::new()).unwrap();
        let pcm = tts.synthesize("Hi there ").await.unwrap();

        assert_eq!(pcm.as_ref(), &[1, 0, 2, 0]);
        assert_eq!(tts.sample_rate(), 16000);
    }

    #[tokio::test]
    async fn test_synthesize_surfaces_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let tts = ElevenLabsTTS::from_config(config(&server.uri()), reqwest::Client::new()).unwrap();
        let err = tts.synthesize("Hello ").await.unwrap_err();

        assert!(matches!(err, TTSError::ProviderError(ref msg) if msg.contains("invalid api key")));
    }
}
