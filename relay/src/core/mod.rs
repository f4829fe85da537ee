pub mod codec;
pub mod llm;
pub mod pipeline;
pub mod queue;
pub mod stt;
pub mod tts;

pub use codec::CodecError;
pub use llm::{ChatModel, Conversation, LlmError, OpenAIChat, TokenReassembler, WordChunk};
pub use pipeline::{CallPipeline, PipelineConfig, PipelineState};
pub use queue::{QueueClosed, QueueReader, QueueWriter};
pub use stt::{AwsTranscribe, RecognitionService, STTError, TranscriptEvent};
pub use tts::{SynthesisMode, TTSError, create_synthesis_backend};
