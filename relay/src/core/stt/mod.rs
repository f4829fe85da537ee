pub mod aws_transcribe;
mod base;
pub mod stream;

pub use aws_transcribe::{AwsTranscribe, AwsTranscribeConfig};
pub use base::{Finality, RecognitionService, STTError, TranscriptEvent};
pub use stream::{TranscriptUpdates, TranscriptionState, TranscriptionStream, TranscriptionUpdate};
