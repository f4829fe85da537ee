use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::{ConfigError, RelayConfig};
use crate::core::llm::{ChatModel, LlmError, OpenAIChat};
use crate::core::pipeline::PipelineConfig;
use crate::core::stt::{AwsTranscribe, RecognitionService, STTError};
use crate::core::tts::{
    BoxedSynthesisBackend, ElevenLabsConfig, SynthesisMode, TTSError, TTSResult,
    create_synthesis_backend,
};
use crate::store::{CallStore, InMemoryCallStore, StoreError, SupabaseCallStore};

/// Builds a fresh synthesis backend for each call.
pub type SynthesisFactory = Arc<dyn Fn() -> TTSResult<BoxedSynthesisBackend> + Send + Sync>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Recognition(#[from] STTError),
    #[error(transparent)]
    Chat(#[from] LlmError),
    #[error(transparent)]
    Synthesis(#[from] TTSError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Shared services for every call handled by this process.
pub struct AppState {
    pub config: RelayConfig,
    pub call_store: Arc<dyn CallStore>,
    pub recognizer: Arc<dyn RecognitionService>,
    pub chat: Arc<dyn ChatModel>,
    synthesis: SynthesisFactory,
}

impl AppState {
    /// Create the production services from configuration.
    pub fn new(config: RelayConfig) -> Result<Arc<Self>, StateError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(16)
            .build()
            .map_err(|e| LlmError::ConfigurationError(e.to_string()))?;

        let recognizer: Arc<dyn RecognitionService> =
            Arc::new(AwsTranscribe::new(config.transcribe_config())?);
        let chat: Arc<dyn ChatModel> =
            Arc::new(OpenAIChat::new(config.chat_config()?, client.clone())?);

        let call_store: Arc<dyn CallStore> =
            match (&config.supabase_url, &config.supabase_service_role) {
                (Some(url), Some(service_role)) => {
                    Arc::new(SupabaseCallStore::new(url, service_role, client.clone())?)
                }
                _ => {
                    warn!("Supabase not configured, call descriptions are kept in memory");
                    Arc::new(InMemoryCallStore::new())
                }
            };

        let elevenlabs = config.elevenlabs_config()?;
        elevenlabs.validate()?;
        let synthesis = elevenlabs_factory(config.synthesis_mode, elevenlabs, client);

        info!(
            synthesis = config.synthesis_mode.as_str(),
            model = chat.model_name(),
            recognizer = recognizer.provider_name(),
            "Relay services ready"
        );

        Ok(Arc::new(Self::with_services(
            config, call_store, recognizer, chat, synthesis,
        )))
    }

    /// Assemble state from already-built services.
    pub fn with_services(
        config: RelayConfig,
        call_store: Arc<dyn CallStore>,
        recognizer: Arc<dyn RecognitionService>,
        chat: Arc<dyn ChatModel>,
        synthesis: SynthesisFactory,
    ) -> Self {
        Self {
            config,
            call_store,
            recognizer,
            chat,
            synthesis,
        }
    }

    pub fn synthesis_backend(&self) -> TTSResult<BoxedSynthesisBackend> {
        (self.synthesis)()
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        self.config.pipeline_config()
    }
}

fn elevenlabs_factory(
    mode: SynthesisMode,
    config: ElevenLabsConfig,
    client: reqwest::Client,
) -> SynthesisFactory {
    Arc::new(move || create_synthesis_backend(mode, &config, &client))
}
