//! OpenAI-compatible chat completions with server-sent-event streaming.

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::base::{ChatMessage, ChatModel, GenerationEvent, LlmError, LlmResult};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4";
pub const DEFAULT_TEMPERATURE: f32 = 0.9;
pub const DEFAULT_MAX_TOKENS: u32 = 6000;

const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct OpenAIChatConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for OpenAIChatConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

pub struct OpenAIChat {
    client: reqwest::Client,
    config: OpenAIChatConfig,
}

impl OpenAIChat {
    pub fn new(config: OpenAIChatConfig, client: reqwest::Client) -> LlmResult<Self> {
        if config.api_key.is_empty() {
            return Err(LlmError::ConfigurationError(
                "OpenAI API key is required".to_string(),
            ));
        }
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChatModel for OpenAIChat {
    async fn stream_reply(
        &self,
        messages: &[ChatMessage],
    ) -> LlmResult<mpsc::Receiver<GenerationEvent>> {
        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: true,
        };

        debug!(
            model = %self.config.model,
            messages = messages.len(),
            "Requesting streamed chat completion"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(parse_sse_stream(response.bytes_stream(), tx));
        Ok(rx)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Read `data:` lines off an SSE body and forward content deltas.
///
/// Lines are split on raw bytes and decoded only once complete, so a
/// multi-byte character split across network chunks stays intact. Stops early when the receiver is dropped, which also drops the response
/// body and with it the HTTP request.
async fn parse_sse_stream<S>(byte_stream: S, tx: mpsc::Sender<GenerationEvent>)
where
    S: Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
{
    let mut line_buffer: Vec<u8> = Vec::new();
    let mut stream = Box::pin(byte_stream);
    let mut tokens = 0usize;

    while let Some(result) = stream.next().await {
        let bytes = match result {
            Ok(b) => b,
            Err(e) => {
                warn!("SSE stream error: {}", e);
                let _ = tx
                    .send(GenerationEvent::Failed(LlmError::StreamError(e.to_string())))
                    .await;
                return;
            }
        };

        line_buffer.extend_from_slice(&bytes);

        while let Some(newline_pos) = line_buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = line_buffer.drain(..=newline_pos).collect();
            let line = String::from_utf8_lossy(&raw[..newline_pos]);
            let line = line.trim_end_matches('\r');

            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim_start();

            if data == "[DONE]" {
                info!(tokens, "Chat completion finished");
                let _ = tx.send(GenerationEvent::Finished).await;
                return;
            }

            let chunk: ChatCompletionChunk = match serde_json::from_str(data) {
                Ok(chunk) => chunk,
                Err(e) => {
                    debug!("Skipping unparseable SSE payload: {}", e);
                    continue;
                }
            };

            for choice in chunk.choices {
                let Some(content) = choice.delta.content else {
                    continue;
                };
                if content.is_empty() {
                    continue;
                }
                tokens += 1;
                if tx.send(GenerationEvent::Token(content)).await.is_err() {
                    debug!("Reply consumer gone, abandoning generation");
                    return;
                }
            }
        }
    }

    debug!(tokens, "SSE body ended without [DONE]");
    let _ = tx.send(GenerationEvent::Finished).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sse_body(fragments: &[&str]) -> String {
        let mut body = String::new();
        for fragment in fragments {
            let chunk = serde_json::json!({
                "choices": [{ "index": 0, "delta": { "content": fragment } }]
            });
            body.push_str(&format!("data: {chunk}\n\n"));
        }
        body.push_str("data: [DONE]\n\n");
        body
    }

    fn chat_for(server: &MockServer) -> OpenAIChat {
        let config = OpenAIChatConfig {
            api_key: "test-key".to_string(),
            base_url: server.uri(),
            ..Default::default()
        };
        OpenAIChat::new(config, reqwest::Client::new()).unwrap()
    }

    async fn collect(mut rx: mpsc::Receiver<GenerationEvent>) -> Vec<GenerationEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_streams_tokens_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4",
                "stream": true,
                "max_tokens": 6000
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(sse_body(&["Hel", "lo", " there"]), "text/event-stream"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let chat = chat_for(&server);
        let rx = chat
            .stream_reply(&[ChatMessage::system("be brief"), ChatMessage::user("hi")])
            .await
            .unwrap();

        assert_eq!(
            collect(rx).await,
            vec![
                GenerationEvent::Token("Hel".to_string()),
                GenerationEvent::Token("lo".to_string()),
                GenerationEvent::Token(" there".to_string()),
                GenerationEvent::Finished,
            ]
        );
    }

    #[tokio::test]
    async fn test_skips_role_only_and_keepalive_lines() {
        let server = MockServer::start().await;
        let body = concat!(
            ": keep-alive\n\n",
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Okay\"}}]}\r\n\r\n",
            "data: not json\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let rx = chat_for(&server)
            .stream_reply(&[ChatMessage::user("hi")])
            .await
            .unwrap();

        assert_eq!(
            collect(rx).await,
            vec![
                GenerationEvent::Token("Okay".to_string()),
                GenerationEvent::Finished
            ]
        );
    }

    #[tokio::test]
    async fn test_api_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let err = chat_for(&server)
            .stream_reply(&[ChatMessage::user("hi")])
            .await
            .unwrap_err();

        assert_eq!(
            err,
            LlmError::ApiError {
                status: 429,
                message: "rate limited".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_body_without_done_still_finishes() {
        let server = MockServer::start().await;
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"Bye\"}}]}\n\n";
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let rx = chat_for(&server)
            .stream_reply(&[ChatMessage::user("hi")])
            .await
            .unwrap();

        assert_eq!(
            collect(rx).await,
            vec![
                GenerationEvent::Token("Bye".to_string()),
                GenerationEvent::Finished
            ]
        );
    }

    #[tokio::test]
    async fn test_multibyte_character_split_across_chunks() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"It’s\"}}]}\n\n".as_bytes();
        let split = line.iter().position(|&b| b == 0xE2).unwrap() + 1;
        let chunks = vec![
            bytes::Bytes::copy_from_slice(&line[..split]),
            bytes::Bytes::copy_from_slice(&line[split..]),
            bytes::Bytes::from_static(b"data: [DONE]\n\n"),
        ];

        let (tx, rx) = mpsc::channel(8);
        parse_sse_stream(
            futures_util::stream::iter(chunks.into_iter().map(Ok::<_, reqwest::Error>)),
            tx,
        )
        .await;

        assert_eq!(
            collect(rx).await,
            vec![
                GenerationEvent::Token("It’s".to_string()),
                GenerationEvent::Finished
            ]
        );
    }

    #[test]
    fn test_missing_api_key() {
        let result = OpenAIChat::new(OpenAIChatConfig::default(), reqwest::Client::new());
        assert!(matches!(result, Err(LlmError::ConfigurationError(_))));
    }
}
