//! ElevenLabs input-streaming synthesis.
//!
//! One WebSocket carries the text of many chunks and returns audio
//! asynchronously. The socket is opened when the first chunk arrives; chunks
//! that arrive while the handshake is in flight are held in order and sent
//! right after the initialization message. When the server drops an idle
//! socket, the next chunk opens a new one.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::config::ElevenLabsConfig;
use super::messages::{AudioOutput, InitializeConnection, SendText};
use crate::core::codec::PCM_SAMPLE_WIDTH;
use crate::core::llm::WordChunk;
use crate::core::queue::QueueReader;
use crate::core::tts::base::{
    SynthesisBackend, SynthesisEvent, SynthesizedAudio, TTSError, TTSResult,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// How a socket session ended.
enum SessionEnd {
    /// Input finished and the server delivered its last audio, or the
    /// consumer went away.
    Done,
    /// The socket went away while input may still follow.
    Dropped,
}

/// Where the backend reads its chunks from, plus what is still unsent.
struct ChunkSource {
    chunks: QueueReader<WordChunk>,
    pending: VecDeque<WordChunk>,
    open: bool,
}

impl ChunkSource {
    async fn next(&mut self) -> Option<WordChunk> {
        if !self.open {
            return None;
        }
        let chunk = self.chunks.pull().await;
        if chunk.is_none() {
            self.open = false;
        }
        chunk
    }
}

/// Keeps PCM sample-aligned across audio messages.
///
/// The server splits its output at arbitrary byte offsets; a trailing odd
/// byte is held back and prepended to the next message.
#[derive(Debug, Default)]
struct SampleAligner {
    carry: Option<u8>,
}

impl SampleAligner {
    fn align(&mut self, bytes: Vec<u8>) -> Vec<u8> {
        let mut pcm = Vec::with_capacity(bytes.len() + 1);
        pcm.extend(self.carry.take());
        pcm.extend_from_slice(&bytes);
        if pcm.len() % PCM_SAMPLE_WIDTH != 0 {
            self.carry = pcm.pop();
        }
        pcm
    }

    /// End of the server's output: a held byte can no longer form a sample.
    fn finish(&mut self) {
        if self.carry.take().is_some() {
            debug!("Discarding trailing half sample from ElevenLabs output");
        }
    }
}

pub struct ElevenLabsStreamingBackend {
    config: ElevenLabsConfig,
    sample_rate: u32,
}

impl ElevenLabsStreamingBackend {
    pub fn new(config: ElevenLabsConfig) -> TTSResult<Self> {
        config.validate()?;
        let sample_rate = config.sample_rate()?;
        Ok(Self {
            config,
            sample_rate,
        })
    }

    async fn connect(&self) -> TTSResult<WsStream> {
        let url = self.config.ws_url();
        debug!(url = %url, "Connecting to ElevenLabs input stream");

        let (socket, _response) =
            tokio::time::timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(url.as_str()))
                .await
                .map_err(|_| TTSError::ConnectionFailed("connect timed out".to_string()))?
                .map_err(|e| TTSError::ConnectionFailed(e.to_string()))?;

        info!(voice = %self.config.voice_id, "ElevenLabs input stream connected");
        Ok(socket)
    }

    /// Connect while continuing to accept chunks into `pending`.
    async fn connect_buffering(&self, source: &mut ChunkSource) -> TTSResult<WsStream> {
        let connect = self.connect();
        tokio::pin!(connect);

        loop {
            tokio::select! {
                biased;
                result = &mut connect => return result,
                chunk = source.chunks.pull(), if source.open => match chunk {
                    Some(chunk) => source.pending.push_back(chunk),
                    None => source.open = false,
                },
            }
        }
    }

    async fn stream_session(
        &self,
        socket: WsStream,
        source: &mut ChunkSource,
        events: &mpsc::Sender<SynthesisEvent>,
    ) -> SessionEnd {
        let (mut sink, mut stream) = socket.split();
        let mut aligner = SampleAligner::default();

        let init = InitializeConnection::new(&self.config.api_key, self.config.voice_settings);
        if let Err(error) = send_json(&mut sink, &init).await {
            warn!(error = %error, "Failed to initialize ElevenLabs stream");
            return fail_pending(source, events, error).await;
        }

        while let Some(chunk) = source.pending.pop_front() {
            if let Err(error) = send_chunk(&mut sink, &chunk).await {
                source.pending.push_front(chunk);
                return fail_pending(source, events, error).await;
            }
        }
        if !source.open {
            end_input(&mut sink).await;
        }

        loop {
            tokio::select! {
                chunk = source.next(), if source.open => match chunk {
                    Some(chunk) => {
                        if let Err(error) = send_chunk(&mut sink, &chunk).await {
                            source.pending.push_back(chunk);
                            return fail_pending(source, events, error).await;
                        }
                    }
                    None => {
                        debug!("Chunk queue closed, ending ElevenLabs input");
                        end_input(&mut sink).await;
                    }
                },
                message = stream.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        match self.handle_output(&text, &mut aligner, events).await {
                            Ok(true) if !source.open => return SessionEnd::Done,
                            Ok(_) => {}
                            Err(()) => return SessionEnd::Done,
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sink.send(Message::Pong(data)).await {
                            debug!(error = %e, "Failed to answer ElevenLabs ping");
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("ElevenLabs stream closed by server");
                        return session_end(source);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "ElevenLabs stream error");
                        return session_end(source);
                    }
                },
            }
        }
    }

    /// Forward decoded audio. `Ok(true)` when the server marked the output
    /// final, `Err(())` when the consumer is gone.
    async fn handle_output(
        &self,
        text: &str,
        aligner: &mut SampleAligner,
        events: &mpsc::Sender<SynthesisEvent>,
    ) -> Result<bool, ()> {
        let output: AudioOutput = match serde_json::from_str(text) {
            Ok(output) => output,
            Err(e) => {
                warn!("Failed to parse ElevenLabs message: {} - {}", e, text);
                return Ok(false);
            }
        };

        if let Some(error) = output.error.as_deref().or(output.message.as_deref()) {
            warn!(error, "ElevenLabs reported an error");
        }

        if let Some(audio) = output.audio.as_deref().filter(|a| !a.is_empty()) {
            match BASE64.decode(audio).map(|bytes| aligner.align(bytes)) {
                Ok(pcm) if pcm.is_empty() => {}
                Ok(pcm) => {
                    let event = SynthesisEvent::Audio(SynthesizedAudio {
                        pcm: Bytes::from(pcm),
                        sample_rate: self.sample_rate,
                    });
                    if events.send(event).await.is_err() {
                        return Err(());
                    }
                }
                Err(e) => warn!(error = %e, "Dropping undecodable ElevenLabs audio"),
            }
        }

        let is_final = output.is_final();
        if is_final {
            aligner.finish();
        }
        Ok(is_final)
    }
}

#[async_trait]
impl SynthesisBackend for ElevenLabsStreamingBackend {
    async fn run(
        self: Box<Self>,
        chunks: QueueReader<WordChunk>,
        events: mpsc::Sender<SynthesisEvent>,
    ) {
        let mut source = ChunkSource {
            chunks,
            pending: VecDeque::new(),
            open: true,
        };

        loop {
            if source.pending.is_empty() {
                match source.next().await {
                    // Nothing to flush, no need for a socket.
                    Some(chunk) if chunk.is_end_of_turn() => continue,
                    Some(chunk) => source.pending.push_back(chunk),
                    None => return,
                }
            }

            let socket = match self.connect_buffering(&mut source).await {
                Ok(socket) => socket,
                Err(error) => {
                    warn!(error = %error, "ElevenLabs connection failed");
                    if let SessionEnd::Done = fail_pending(&mut source, &events, error).await {
                        return;
                    }
                    continue;
                }
            };

            match self.stream_session(socket, &mut source, &events).await {
                SessionEnd::Done => return,
                SessionEnd::Dropped => {
                    if !source.open && source.pending.is_empty() {
                        return;
                    }
                }
            }
        }
    }

    fn mode(&self) -> &'static str {
        "streaming"
    }
}

fn session_end(source: &ChunkSource) -> SessionEnd {
    if source.open {
        SessionEnd::Dropped
    } else {
        SessionEnd::Done
    }
}

async fn send_json<T: serde::Serialize>(sink: &mut WsSink, message: &T) -> TTSResult<()> {
    let json = serde_json::to_string(message)
        .map_err(|e| TTSError::ProviderError(format!("failed to encode message: {e}")))?;
    sink.send(Message::Text(json.into()))
        .await
        .map_err(|e| TTSError::NetworkError(e.to_string()))
}

async fn end_input(sink: &mut WsSink) {
    if let Err(e) = send_json(sink, &SendText::end_of_stream()).await {
        debug!(error = %e, "Failed to send ElevenLabs end of input");
    }
}

async fn send_chunk(sink: &mut WsSink, chunk: &WordChunk) -> TTSResult<()> {
    if chunk.is_end_of_turn() {
        send_json(sink, &SendText::flush()).await
    } else {
        send_json(sink, &SendText::chunk(chunk.text())).await
    }
}

/// Report every unsent text chunk as failed and clear the backlog.
async fn fail_pending(
    source: &mut ChunkSource,
    events: &mpsc::Sender<SynthesisEvent>,
    error: TTSError,
) -> SessionEnd {
    for chunk in source.pending.drain(..) {
        if chunk.is_end_of_turn() {
            continue;
        }
        let event = SynthesisEvent::ChunkFailed {
            text: chunk.into_text(),
            error: error.clone(),
        };
        if events.send(event).await.is_err() {
            return SessionEnd::Done;
        }
    }

    if source.open {
        SessionEnd::Dropped
    } else {
        SessionEnd::Done
    }
}
