use serde::Deserialize;
use std::path::Path;

use super::ConfigError;

/// Complete YAML configuration structure
///
/// Every field is optional; whatever is left out falls back to environment
/// variables and then to defaults.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3000
///   app_url: "relay.example.com"
///
/// aws:
///   region: "us-east-1"
///
/// transcribe:
///   language: "en-US"
///   sample_rate: 8000
///
/// llm:
///   model: "gpt-4"
///   temperature: 0.9
///   max_tokens: 6000
///   persona: "Emily"
///
/// elevenlabs:
///   voice_id: "XrExE9yKIg1WjnnlVkGX"
///   mode: "streaming"
///
/// supabase:
///   url: "https://project.supabase.co"
///
/// twilio:
///   phone_number: "+15550100"
///
/// pipeline:
///   audio_queue_capacity: 64
///   chunk_queue_capacity: 32
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub aws: Option<AwsYaml>,
    pub transcribe: Option<TranscribeYaml>,
    pub llm: Option<LlmYaml>,
    pub elevenlabs: Option<ElevenLabsYaml>,
    pub supabase: Option<SupabaseYaml>,
    pub twilio: Option<TwilioYaml>,
    pub pipeline: Option<PipelineYaml>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Public host name the carrier reaches this relay on, without scheme.
    pub app_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AwsYaml {
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TranscribeYaml {
    pub language: Option<String>,
    pub sample_rate: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LlmYaml {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub persona: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ElevenLabsYaml {
    pub api_key: Option<String>,
    pub voice_id: Option<String>,
    pub model_id: Option<String>,
    pub base_url: Option<String>,
    pub output_format: Option<String>,
    /// `request` or `streaming`
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SupabaseYaml {
    pub url: Option<String>,
    pub service_role: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TwilioYaml {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PipelineYaml {
    pub audio_queue_capacity: Option<usize>,
    pub chunk_queue_capacity: Option<usize>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is malformed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 8080
  app_url: "relay.example.com"

aws:
  region: "eu-west-1"
  access_key_id: "AKIA"
  secret_access_key: "secret"

transcribe:
  language: "en-GB"
  sample_rate: 16000

llm:
  api_key: "sk-test"
  model: "gpt-4o"
  temperature: 0.5
  max_tokens: 256
  persona: "Ava"

elevenlabs:
  api_key: "xi-test"
  voice_id: "voice-1"
  mode: "streaming"

supabase:
  url: "https://db.example.com"
  service_role: "role-key"

twilio:
  account_sid: "AC123"
  auth_token: "token"
  phone_number: "+15550100"

pipeline:
  audio_queue_capacity: 16
  chunk_queue_capacity: 8
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let server = config.server.as_ref().unwrap();
        assert_eq!(server.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(server.port, Some(8080));
        assert_eq!(server.app_url.as_deref(), Some("relay.example.com"));

        let transcribe = config.transcribe.as_ref().unwrap();
        assert_eq!(transcribe.sample_rate, Some(16000));

        let llm = config.llm.as_ref().unwrap();
        assert_eq!(llm.temperature, Some(0.5));
        assert_eq!(llm.persona.as_deref(), Some("Ava"));

        let elevenlabs = config.elevenlabs.as_ref().unwrap();
        assert_eq!(elevenlabs.mode.as_deref(), Some("streaming"));

        let pipeline = config.pipeline.as_ref().unwrap();
        assert_eq!(pipeline.audio_queue_capacity, Some(16));
        assert_eq!(pipeline.chunk_queue_capacity, Some(8));
    }

    #[test]
    fn test_yaml_config_partial() {
        let yaml = r#"
server:
  port: 9000
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let server = config.server.as_ref().unwrap();
        assert_eq!(server.host, None);
        assert_eq!(server.port, Some(9000));
        assert!(config.llm.is_none());
        assert!(config.elevenlabs.is_none());
    }

    #[test]
    fn test_yaml_config_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "llm:\n  model: \"gpt-4o-mini\"\n").unwrap();

        let config = YamlConfig::from_file(&config_path).unwrap();
        assert_eq!(
            config.llm.unwrap().model.as_deref(),
            Some("gpt-4o-mini")
        );
    }

    #[test]
    fn test_yaml_config_missing_file() {
        let err = YamlConfig::from_file(Path::new("/nonexistent/config.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_yaml_config_invalid() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("bad.yaml");
        fs::write(&config_path, "server: [not, a, map]\n").unwrap();

        let err = YamlConfig::from_file(&config_path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
