//! Configuration for the relay.
//!
//! Loaded from environment variables and, optionally, a YAML file.
//! Priority: YAML > ENV vars > .env values > defaults. The `.env` file is
//! loaded into the environment by `main` before any of this runs.
//!
//! # Example
//! ```rust,no_run
//! use voice_relay::config::RelayConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = RelayConfig::from_env()?;
//!
//! // Load from YAML file with environment variables underneath
//! let config = RelayConfig::from_file(&PathBuf::from("config.yaml"))?;
//!
//! println!("Relay listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::core::llm::openai::{
    DEFAULT_BASE_URL as OPENAI_BASE_URL, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE,
};
use crate::core::llm::{DEFAULT_PERSONA, OpenAIChatConfig};
use crate::core::pipeline::PipelineConfig;
use crate::core::stt::AwsTranscribeConfig;
use crate::core::tts::SynthesisMode;
use crate::core::tts::elevenlabs::{
    DEFAULT_MODEL_ID, DEFAULT_OUTPUT_FORMAT, DEFAULT_VOICE_ID, ELEVENLABS_BASE_URL,
    ElevenLabsConfig, VoiceSettings,
};
use crate::dialer::{TWILIO_API_BASE_URL, TwilioConfig};

mod yaml;

pub use yaml::YamlConfig;

const MIN_SAMPLE_RATE: u32 = 8000;
const MAX_SAMPLE_RATE: u32 = 48000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {message}")]
    Read { path: String, message: String },
    #[error("Failed to parse YAML config: {0}")]
    Parse(String),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("Missing required setting {0}")]
    Missing(&'static str),
}

/// Relay configuration
///
/// Immutable after loading. Components take the slice they need through
/// the `*_config` accessors.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    // Server settings
    pub host: String,
    pub port: u16,
    /// Public host name used in TwiML, without scheme.
    pub app_url: Option<String>,

    // Amazon Transcribe
    pub aws_region: String,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub transcribe_language: String,
    pub recognizer_sample_rate: u32,

    // Chat model
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub llm_model: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    pub assistant_name: String,

    // ElevenLabs
    pub elevenlabs_api_key: Option<String>,
    pub elevenlabs_voice_id: String,
    pub elevenlabs_model_id: String,
    pub elevenlabs_base_url: String,
    pub elevenlabs_output_format: String,
    pub synthesis_mode: SynthesisMode,

    // Call metadata store
    pub supabase_url: Option<String>,
    pub supabase_service_role: Option<String>,

    // Twilio
    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub twilio_phone_number: Option<String>,

    // Pipeline buffering
    pub audio_queue_capacity: usize,
    pub chunk_queue_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            app_url: None,
            aws_region: "us-east-1".to_string(),
            aws_access_key_id: None,
            aws_secret_access_key: None,
            transcribe_language: "en-US".to_string(),
            recognizer_sample_rate: 8000,
            openai_api_key: None,
            openai_base_url: OPENAI_BASE_URL.to_string(),
            llm_model: DEFAULT_MODEL.to_string(),
            llm_temperature: DEFAULT_TEMPERATURE,
            llm_max_tokens: DEFAULT_MAX_TOKENS,
            assistant_name: DEFAULT_PERSONA.to_string(),
            elevenlabs_api_key: None,
            elevenlabs_voice_id: DEFAULT_VOICE_ID.to_string(),
            elevenlabs_model_id: DEFAULT_MODEL_ID.to_string(),
            elevenlabs_base_url: ELEVENLABS_BASE_URL.to_string(),
            elevenlabs_output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
            synthesis_mode: SynthesisMode::Request,
            supabase_url: None,
            supabase_service_role: None,
            twilio_account_sid: None,
            twilio_auth_token: None,
            twilio_phone_number: None,
            audio_queue_capacity: 64,
            chunk_queue_capacity: 32,
        }
    }
}

impl RelayConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from a YAML file on top of the environment.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, an environment
    /// variable has an invalid format, or validation fails.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let yaml = YamlConfig::from_file(path)?;
        let mut config = Self::load(|key| std::env::var(key).ok())?;
        config.apply_yaml(yaml);
        config.validate()?;
        Ok(config)
    }

    /// Build and validate a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self::load(lookup)?;
        config.validate()?;
        Ok(config)
    }

    fn load<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(host) = get("HOST") {
            config.host = host;
        }
        if let Some(port) = get("PORT") {
            config.port = parse("PORT", &port)?;
        }
        config.app_url = get("APP_URL").map(|url| strip_scheme(&url));

        if let Some(region) = get("AWS_DEFAULT_REGION").or_else(|| get("AWS_REGION")) {
            config.aws_region = region;
        }
        config.aws_access_key_id = get("AWS_ACCESS_KEY").or_else(|| get("AWS_ACCESS_KEY_ID"));
        config.aws_secret_access_key = get("AWS_SECRET_ACCESS_KEY");
        if let Some(language) = get("TRANSCRIBE_LANGUAGE") {
            config.transcribe_language = language;
        }
        if let Some(rate) = get("RECOGNIZER_SAMPLE_RATE") {
            config.recognizer_sample_rate = parse("RECOGNIZER_SAMPLE_RATE", &rate)?;
        }

        config.openai_api_key = get("OPENAI_API_KEY");
        if let Some(url) = get("OPENAI_BASE_URL") {
            config.openai_base_url = url;
        }
        if let Some(model) = get("LLM_MODEL") {
            config.llm_model = model;
        }
        if let Some(temperature) = get("LLM_TEMPERATURE") {
            config.llm_temperature = parse("LLM_TEMPERATURE", &temperature)?;
        }
        if let Some(max_tokens) = get("LLM_MAX_TOKENS") {
            config.llm_max_tokens = parse("LLM_MAX_TOKENS", &max_tokens)?;
        }
        if let Some(name) = get("ASSISTANT_NAME") {
            config.assistant_name = name;
        }

        config.elevenlabs_api_key = get("ELEVEN_LABS_KEY");
        if let Some(voice) = get("ELEVEN_LABS_VOICE_ID") {
            config.elevenlabs_voice_id = voice;
        }
        if let Some(model) = get("ELEVEN_LABS_MODEL_ID") {
            config.elevenlabs_model_id = model;
        }
        if let Some(url) = get("ELEVEN_LABS_BASE_URL") {
            config.elevenlabs_base_url = url;
        }
        if let Some(mode) = get("SYNTHESIS_MODE") {
            config.synthesis_mode = SynthesisMode::from_str_or_default(&mode);
        }

        config.supabase_url = get("SUPABASE_URL");
        config.supabase_service_role = get("SUPABASE_SERVICE_ROLE");

        config.twilio_account_sid = get("TWILIO_ACCOUNT_SID");
        config.twilio_auth_token = get("TWILIO_AUTH_TOKEN");
        config.twilio_phone_number = get("TWILIO_PHONE_NUMBER");

        if let Some(capacity) = get("AUDIO_QUEUE_CAPACITY") {
            config.audio_queue_capacity = parse("AUDIO_QUEUE_CAPACITY", &capacity)?;
        }
        if let Some(capacity) = get("CHUNK_QUEUE_CAPACITY") {
            config.chunk_queue_capacity = parse("CHUNK_QUEUE_CAPACITY", &capacity)?;
        }

        Ok(config)
    }

    fn apply_yaml(&mut self, yaml: YamlConfig) {
        if let Some(server) = yaml.server {
            override_with(&mut self.host, server.host);
            override_with(&mut self.port, server.port);
            if let Some(url) = server.app_url {
                self.app_url = Some(strip_scheme(&url));
            }
        }
        if let Some(aws) = yaml.aws {
            override_with(&mut self.aws_region, aws.region);
            override_option(&mut self.aws_access_key_id, aws.access_key_id);
            override_option(&mut self.aws_secret_access_key, aws.secret_access_key);
        }
        if let Some(transcribe) = yaml.transcribe {
            override_with(&mut self.transcribe_language, transcribe.language);
            override_with(&mut self.recognizer_sample_rate, transcribe.sample_rate);
        }
        if let Some(llm) = yaml.llm {
            override_option(&mut self.openai_api_key, llm.api_key);
            override_with(&mut self.openai_base_url, llm.base_url);
            override_with(&mut self.llm_model, llm.model);
            override_with(&mut self.llm_temperature, llm.temperature);
            override_with(&mut self.llm_max_tokens, llm.max_tokens);
            override_with(&mut self.assistant_name, llm.persona);
        }
        if let Some(elevenlabs) = yaml.elevenlabs {
            override_option(&mut self.elevenlabs_api_key, elevenlabs.api_key);
            override_with(&mut self.elevenlabs_voice_id, elevenlabs.voice_id);
            override_with(&mut self.elevenlabs_model_id, elevenlabs.model_id);
            override_with(&mut self.elevenlabs_base_url, elevenlabs.base_url);
            override_with(&mut self.elevenlabs_output_format, elevenlabs.output_format);
            if let Some(mode) = elevenlabs.mode {
                self.synthesis_mode = SynthesisMode::from_str_or_default(&mode);
            }
        }
        if let Some(supabase) = yaml.supabase {
            override_option(&mut self.supabase_url, supabase.url);
            override_option(&mut self.supabase_service_role, supabase.service_role);
        }
        if let Some(twilio) = yaml.twilio {
            override_option(&mut self.twilio_account_sid, twilio.account_sid);
            override_option(&mut self.twilio_auth_token, twilio.auth_token);
            override_option(&mut self.twilio_phone_number, twilio.phone_number);
        }
        if let Some(pipeline) = yaml.pipeline {
            override_with(&mut self.audio_queue_capacity, pipeline.audio_queue_capacity);
            override_with(&mut self.chunk_queue_capacity, pipeline.chunk_queue_capacity);
        }
    }

    /// Check value ranges and endpoint URLs. Credentials are checked where
    /// they are used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.recognizer_sample_rate) {
            return Err(ConfigError::InvalidValue {
                key: "RECOGNIZER_SAMPLE_RATE",
                value: self.recognizer_sample_rate.to_string(),
            });
        }
        if self.audio_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "AUDIO_QUEUE_CAPACITY",
                value: "0".to_string(),
            });
        }
        if self.chunk_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "CHUNK_QUEUE_CAPACITY",
                value: "0".to_string(),
            });
        }
        for (key, value) in [
            ("OPENAI_BASE_URL", &self.openai_base_url),
            ("ELEVEN_LABS_BASE_URL", &self.elevenlabs_base_url),
        ] {
            if url::Url::parse(value).is_err() {
                return Err(ConfigError::InvalidValue {
                    key,
                    value: value.clone(),
                });
            }
        }
        if let Some(url) = &self.supabase_url
            && url::Url::parse(url).is_err()
        {
            return Err(ConfigError::InvalidValue {
                key: "SUPABASE_URL",
                value: url.clone(),
            });
        }
        if !(0.0..=2.0).contains(&self.llm_temperature) {
            return Err(ConfigError::InvalidValue {
                key: "LLM_TEMPERATURE",
                value: self.llm_temperature.to_string(),
            });
        }
        Ok(())
    }

    /// Get the server address as "host:port".
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            recognizer_sample_rate: self.recognizer_sample_rate,
            audio_queue_capacity: self.audio_queue_capacity,
            chunk_queue_capacity: self.chunk_queue_capacity,
            persona: self.assistant_name.clone(),
        }
    }

    pub fn transcribe_config(&self) -> AwsTranscribeConfig {
        AwsTranscribeConfig {
            region: self.aws_region.clone(),
            language_code: self.transcribe_language.clone(),
            sample_rate: self.recognizer_sample_rate,
            access_key_id: self.aws_access_key_id.clone(),
            secret_access_key: self.aws_secret_access_key.clone(),
        }
    }

    pub fn chat_config(&self) -> Result<OpenAIChatConfig, ConfigError> {
        Ok(OpenAIChatConfig {
            api_key: require(&self.openai_api_key, "OPENAI_API_KEY")?,
            base_url: self.openai_base_url.clone(),
            model: self.llm_model.clone(),
            temperature: self.llm_temperature,
            max_tokens: self.llm_max_tokens,
        })
    }

    pub fn elevenlabs_config(&self) -> Result<ElevenLabsConfig, ConfigError> {
        Ok(ElevenLabsConfig {
            api_key: require(&self.elevenlabs_api_key, "ELEVEN_LABS_KEY")?,
            voice_id: self.elevenlabs_voice_id.clone(),
            model_id: self.elevenlabs_model_id.clone(),
            output_format: self.elevenlabs_output_format.clone(),
            base_url: self.elevenlabs_base_url.clone(),
            voice_settings: VoiceSettings::default(),
        })
    }

    pub fn twilio_config(&self) -> Result<TwilioConfig, ConfigError> {
        Ok(TwilioConfig {
            account_sid: require(&self.twilio_account_sid, "TWILIO_ACCOUNT_SID")?,
            auth_token: require(&self.twilio_auth_token, "TWILIO_AUTH_TOKEN")?,
            from_number: require(&self.twilio_phone_number, "TWILIO_PHONE_NUMBER")?,
            base_url: TWILIO_API_BASE_URL.to_string(),
        })
    }

    /// URL the carrier fetches call instructions from.
    pub fn twiml_url(&self) -> Result<String, ConfigError> {
        Ok(format!("https://{}/twiml", require(&self.app_url, "APP_URL")?))
    }
}

fn require(value: &Option<String>, key: &'static str) -> Result<String, ConfigError> {
    value.clone().ok_or(ConfigError::Missing(key))
}

fn parse<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

fn strip_scheme(url: &str) -> String {
    url.trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_string()
}

fn override_with<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn override_option<T>(target: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *target = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RelayConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.address(), "0.0.0.0:3000");
        assert_eq!(config.transcribe_language, "en-US");
        assert_eq!(config.recognizer_sample_rate, 8000);
        assert_eq!(config.llm_model, "gpt-4");
        assert_eq!(config.llm_temperature, 0.9);
        assert_eq!(config.llm_max_tokens, 6000);
        assert_eq!(config.assistant_name, "Emily");
        assert_eq!(config.elevenlabs_voice_id, "XrExE9yKIg1WjnnlVkGX");
        assert_eq!(config.elevenlabs_model_id, "eleven_monolingual_v1");
        assert_eq!(config.elevenlabs_output_format, "pcm_16000");
        assert_eq!(config.synthesis_mode, SynthesisMode::Request);
    }

    #[test]
    fn test_env_values() {
        let config = RelayConfig::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("APP_URL", "https://relay.example.com/"),
            ("AWS_ACCESS_KEY", "AKIA"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
            ("RECOGNIZER_SAMPLE_RATE", "16000"),
            ("OPENAI_API_KEY", "sk-test"),
            ("LLM_TEMPERATURE", "0.2"),
            ("ELEVEN_LABS_KEY", "xi-test"),
            ("SYNTHESIS_MODE", "streaming"),
            ("CHUNK_QUEUE_CAPACITY", "4"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.app_url.as_deref(), Some("relay.example.com"));
        assert_eq!(config.aws_access_key_id.as_deref(), Some("AKIA"));
        assert_eq!(config.recognizer_sample_rate, 16000);
        assert_eq!(config.synthesis_mode, SynthesisMode::Streaming);
        assert_eq!(config.chunk_queue_capacity, 4);
        assert_eq!(config.twiml_url().unwrap(), "https://relay.example.com/twiml");

        let chat = config.chat_config().unwrap();
        assert_eq!(chat.api_key, "sk-test");
        assert_eq!(chat.temperature, 0.2);

        let pipeline = config.pipeline_config();
        assert_eq!(pipeline.recognizer_sample_rate, 16000);
        assert_eq!(pipeline.chunk_queue_capacity, 4);
    }

    #[test]
    fn test_aws_access_key_id_fallback() {
        let config =
            RelayConfig::from_lookup(lookup(&[("AWS_ACCESS_KEY_ID", "AKIA2")])).unwrap();
        assert_eq!(config.transcribe_config().access_key_id.as_deref(), Some("AKIA2"));
    }

    #[test]
    fn test_invalid_values() {
        let err = RelayConfig::from_lookup(lookup(&[("PORT", "not-a-port")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: "PORT",
                value: "not-a-port".to_string()
            }
        );

        assert!(RelayConfig::from_lookup(lookup(&[("RECOGNIZER_SAMPLE_RATE", "4000")])).is_err());
        assert!(RelayConfig::from_lookup(lookup(&[("AUDIO_QUEUE_CAPACITY", "0")])).is_err());
        assert!(RelayConfig::from_lookup(lookup(&[("LLM_TEMPERATURE", "3.5")])).is_err());
        assert!(RelayConfig::from_lookup(lookup(&[("OPENAI_BASE_URL", "not a url")])).is_err());
        assert!(RelayConfig::from_lookup(lookup(&[("SUPABASE_URL", "db.example.com")])).is_err());
    }

    #[test]
    fn test_missing_credentials_reported_on_use() {
        let config = RelayConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(
            config.chat_config().unwrap_err(),
            ConfigError::Missing("OPENAI_API_KEY")
        );
        assert_eq!(
            config.elevenlabs_config().unwrap_err(),
            ConfigError::Missing("ELEVEN_LABS_KEY")
        );
        assert_eq!(config.twiml_url().unwrap_err(), ConfigError::Missing("APP_URL"));
    }

    #[test]
    fn test_yaml_overrides_env() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(
            &path,
            r#"
server:
  port: 9000
llm:
  model: "gpt-4o"
  persona: "Ava"
elevenlabs:
  mode: "streaming"
"#,
        )
        .unwrap();

        let yaml = YamlConfig::from_file(&path).unwrap();
        let mut config = RelayConfig::load(lookup(&[
            ("PORT", "8080"),
            ("LLM_MODEL", "gpt-3.5-turbo"),
            ("OPENAI_API_KEY", "sk-env"),
        ]))
        .unwrap();
        config.apply_yaml(yaml);
        config.validate().unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.llm_model, "gpt-4o");
        assert_eq!(config.assistant_name, "Ava");
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.synthesis_mode, SynthesisMode::Streaming);
    }
}
