//! Media-stream WebSocket handler
//!
//! One socket carries one phone call. The carrier announces the call with a
//! `start` event; from then on inbound `media` frames feed the call's
//! [`CallPipeline`] and the pipeline's telephony frames are written back as
//! outbound `media` events.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use base64::Engine;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::core::pipeline::CallPipeline;
use crate::state::AppState;

use super::messages::{MediaMessageRoute, MediaStreamEvent, OutgoingMediaEvent, StreamStart};

const CHANNEL_BUFFER_SIZE: usize = 256;

/// Outbound telephony frames between the pipeline and the socket writer.
const OUTBOUND_AUDIO_BUFFER: usize = 64;

/// Maximum WebSocket message size (1 MB); carrier frames are a few hundred bytes.
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    info!("Media stream WebSocket upgrade requested");

    let connection_id = Uuid::new_v4();
    ws.max_message_size(MAX_WS_MESSAGE_SIZE).on_upgrade(move |socket| {
        handle_media_socket(socket, state)
            .instrument(info_span!("media_stream", connection_id = %connection_id))
    })
}

/// Per-socket call state
struct CallSession {
    call_sid: String,
    pipeline: CallPipeline,
    audio_relay: JoinHandle<()>,
}

impl CallSession {
    /// Stop outbound audio first so nothing reaches the socket after call end,
    /// then tear down the pipeline.
    async fn end(mut self) {
        self.audio_relay.abort();
        let _ = self.audio_relay.await;
        self.pipeline.close().await;
        info!(call_sid = %self.call_sid, "Call ended");
    }
}

enum Flow {
    Continue,
    Stop,
}

async fn handle_media_socket(socket: WebSocket, app_state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (message_tx, mut message_rx) = mpsc::channel::<MediaMessageRoute>(CHANNEL_BUFFER_SIZE);

    let sender_task = tokio::spawn(async move {
        while let Some(route) = message_rx.recv().await {
            let result = match route {
                MediaMessageRoute::Outgoing(event) => match serde_json::to_string(&event) {
                    Ok(json) => sender.send(Message::Text(json.into())).await,
                    Err(e) => {
                        error!(error = %e, "Failed to serialize outgoing media event");
                        continue;
                    }
                },
                MediaMessageRoute::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            };

            if let Err(e) = result {
                debug!(error = %e, "Media stream socket write failed");
                break;
            }
        }
    });

    let mut session: Option<CallSession> = None;

    while let Some(message) = receiver.next().await {
        let flow = match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<MediaStreamEvent>(&text) {
                Ok(event) => handle_event(event, &mut session, &message_tx, &app_state).await,
                Err(e) => {
                    warn!(error = %e, "Ignoring malformed media stream message");
                    Flow::Continue
                }
            },
            Ok(Message::Close(_)) => {
                info!("Media stream closed by carrier");
                Flow::Stop
            }
            Ok(_) => Flow::Continue,
            Err(e) => {
                warn!(error = %e, "Media stream socket error");
                Flow::Stop
            }
        };

        if matches!(flow, Flow::Stop) {
            break;
        }
    }

    if let Some(session) = session.take() {
        session.end().await;
    }

    let _ = message_tx.send(MediaMessageRoute::Close).await;
    drop(message_tx);
    let _ = sender_task.await;
}

async fn handle_event(
    event: MediaStreamEvent,
    session: &mut Option<CallSession>,
    message_tx: &mpsc::Sender<MediaMessageRoute>,
    app_state: &Arc<AppState>,
) -> Flow {
    match event {
        MediaStreamEvent::Connected { protocol } => {
            debug!(protocol = ?protocol, "Media stream connected");
            Flow::Continue
        }
        MediaStreamEvent::Start { start, .. } => {
            if let Some(active) = session.as_ref() {
                warn!(call_sid = %active.call_sid, "Ignoring repeated start event");
                return Flow::Continue;
            }
            match start_call(start, message_tx, app_state).await {
                Some(started) => {
                    *session = Some(started);
                    Flow::Continue
                }
                None => Flow::Stop,
            }
        }
        MediaStreamEvent::Media { media } => {
            let Some(active) = session.as_mut() else {
                debug!("Dropping media received before start");
                return Flow::Continue;
            };
            match base64::engine::general_purpose::STANDARD.decode(media.payload.as_bytes()) {
                Ok(frame) => active.pipeline.push_audio(&frame).await,
                Err(e) => warn!(call_sid = %active.call_sid, error = %e, "Dropping undecodable media payload"),
            }
            Flow::Continue
        }
        MediaStreamEvent::Stop { stream_sid } => {
            info!(stream_sid = ?stream_sid, "Media stream stopped");
            Flow::Stop
        }
        MediaStreamEvent::Mark { mark } => {
            debug!(mark = ?mark.map(|m| m.name), "Playback mark");
            Flow::Continue
        }
        MediaStreamEvent::Unknown => Flow::Continue,
    }
}

/// Look the call up and start its pipeline. `None` means the socket should close.
async fn start_call(
    start: StreamStart,
    message_tx: &mpsc::Sender<MediaMessageRoute>,
    app_state: &Arc<AppState>,
) -> Option<CallSession> {
    let StreamStart {
        call_sid,
        stream_sid,
        ..
    } = start;

    let description = match app_state.call_store.description(&call_sid).await {
        Ok(Some(description)) => description,
        Ok(None) => {
            warn!(call_sid = %call_sid, "Unknown call, closing media stream");
            return None;
        }
        Err(e) => {
            error!(call_sid = %call_sid, error = %e, "Call description lookup failed");
            return None;
        }
    };

    let backend = match app_state.synthesis_backend() {
        Ok(backend) => backend,
        Err(e) => {
            error!(call_sid = %call_sid, error = %e, "Failed to create synthesis backend");
            return None;
        }
    };

    let (outbound_tx, outbound_rx) = mpsc::channel::<Bytes>(OUTBOUND_AUDIO_BUFFER);
    let mut pipeline = CallPipeline::new(
        app_state.pipeline_config(),
        app_state.recognizer.clone(),
        app_state.chat.clone(),
        backend,
        outbound_tx,
    );
    pipeline.start(&description);

    let audio_relay = tokio::spawn(relay_call_audio(
        outbound_rx,
        stream_sid.clone(),
        message_tx.clone(),
    ));

    info!(call_sid = %call_sid, stream_sid = %stream_sid, "Call started");
    Some(CallSession {
        call_sid,
        pipeline,
        audio_relay,
    })
}

async fn relay_call_audio(
    mut frames: mpsc::Receiver<Bytes>,
    stream_sid: String,
    message_tx: mpsc::Sender<MediaMessageRoute>,
) {
    while let Some(frame) = frames.recv().await {
        let event = OutgoingMediaEvent::audio(&stream_sid, &frame);
        if message_tx
            .send(MediaMessageRoute::Outgoing(event))
            .await
            .is_err()
        {
            break;
        }
    }
}
