mod base;
pub mod conversation;
pub mod openai;
pub mod reassembly;

pub use base::{ChatMessage, ChatModel, GenerationEvent, LlmError, LlmResult, Role};
pub use conversation::{Conversation, ConversationTurn, DEFAULT_PERSONA, Speaker};
pub use openai::{OpenAIChat, OpenAIChatConfig};
pub use reassembly::{TokenReassembler, WordChunk};
