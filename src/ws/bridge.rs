//! The bidirectional relay between a telephony media stream and a realtime
//! speech session.
//!
//! One call runs two pumps concurrently: the inbound pump reads telephony
//! frames and forwards caller audio to the speech service; the outbound pump
//! reads speech service events, forwards assistant audio to the caller, and
//! invokes the interruption coordinator when the caller barges in. The pumps
//! share one [`CallSession`] behind a mutex.

use super::{
    openai::{self, SpeechSink, SpeechStream},
    session::CallSession,
    twilio::{OutboundFrame, RESPONSE_MARK, TelephonyFrame},
};
use crate::{
    audio_utils,
    events::{CallEventSink, EventKind},
    state::AppState,
};
use anyhow::Result;
use async_openai::types::realtime::{
    ClientEvent, ConversationItemTruncateEvent, InputAudioBufferAppendEvent,
    ResponseAudioDeltaEvent, ServerEvent,
};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tracing::{debug, error, info, instrument, warn};

type TelephonySink = SplitSink<WebSocket, Message>;

/// Axum handler to upgrade `/media-stream` to a WebSocket.
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(|socket| handle_media_stream(socket, state))
}

/// Runs one call from telephony connect to teardown.
#[instrument(name = "media_stream", skip_all, fields(connection_id))]
async fn handle_media_stream(socket: WebSocket, state: Arc<AppState>) {
    let connection_id: u32 = rand::random();
    tracing::Span::current().record("connection_id", &connection_id.to_string());

    let events = CallEventSink::new(state.event_log.clone());
    events.emit(EventKind::CallConnected, json!({}));
    info!("Telephony WebSocket connected");

    let speech_socket = match openai::connect(&state.config).await {
        Ok(socket) => socket,
        Err(e) => {
            error!(error = ?e, "Failed to reach the speech service; dropping call");
            return;
        }
    };
    let (speech_tx, speech_rx) = speech_socket.split();
    let speech_tx = Arc::new(Mutex::new(speech_tx));

    if let Err(e) = openai::initialize_session(&mut *speech_tx.lock().await, &state).await {
        error!(error = ?e, "Failed to initialize the speech session; dropping call");
        return;
    }

    let (telephony_tx, telephony_rx) = socket.split();
    let telephony_tx = Arc::new(Mutex::new(telephony_tx));
    let session = Arc::new(Mutex::new(CallSession::new()));

    tokio::join!(
        inbound_pump(telephony_rx, speech_tx.clone(), session.clone(), &events),
        outbound_pump(speech_rx, telephony_tx, speech_tx, session, &events),
    );

    info!("Call session finished");
}

/// Consumes telephony frames for the lifetime of the call, forwarding
/// caller audio to the speech service.
///
/// This pump is the authority for teardown: when the telephony leg closes,
/// it closes the speech leg too.
async fn inbound_pump(
    mut telephony_rx: SplitStream<WebSocket>,
    speech_tx: Arc<Mutex<SpeechSink>>,
    session: Arc<Mutex<CallSession>>,
    events: &CallEventSink,
) {
    while let Some(message) = telephony_rx.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                warn!(error = ?e, "Telephony socket error");
                break;
            }
        };
        match message {
            Message::Text(text) => {
                let frame = match serde_json::from_str::<TelephonyFrame>(&text) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(error = %e, "Skipping malformed telephony frame");
                        continue;
                    }
                };
                handle_telephony_frame(frame, &speech_tx, &session, events).await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    events.emit(EventKind::ClientDisconnected, json!({}));
    info!("Telephony client disconnected");

    // The telephony leg is the call of record; its closure tears down the
    // speech leg as well.
    if let Err(e) = speech_tx.lock().await.close().await {
        debug!(error = %e, "Speech service connection already closed");
    }
}

async fn handle_telephony_frame(
    frame: TelephonyFrame,
    speech_tx: &Arc<Mutex<SpeechSink>>,
    session: &Arc<Mutex<CallSession>>,
    events: &CallEventSink,
) {
    match frame {
        TelephonyFrame::Media { media } => {
            session.lock().await.record_media(media.timestamp);
            let append = ClientEvent::InputAudioBufferAppend(InputAudioBufferAppendEvent {
                audio: media.payload,
                event_id: None,
            });
            // Caller audio racing ahead of the speech leg is dropped, not
            // buffered.
            if let Err(e) = openai::send_event(&mut *speech_tx.lock().await, &append).await {
                debug!(error = %e, "Speech service unavailable; dropping media frame");
            }
        }
        TelephonyFrame::Start { start } => {
            session.lock().await.begin_stream(start.stream_sid.clone());
            events.set_stream(&start.stream_sid);
            events.emit(EventKind::StreamStarted, json!({}));
            info!(stream_sid = %start.stream_sid, "Media stream started");
        }
        TelephonyFrame::Mark { mark } => {
            let acked = session.lock().await.ack_mark();
            debug!(acked = ?acked, echoed = ?mark.and_then(|m| m.name), "Playback marker acknowledged");
        }
        TelephonyFrame::Stop => debug!("Media stream stopped"),
        TelephonyFrame::Connected => debug!("Telephony handshake frame received"),
        TelephonyFrame::Unknown => debug!("Ignoring unrecognized telephony frame"),
    }
}

/// Consumes speech service events for the lifetime of that connection,
/// forwarding assistant audio to the caller and watching for barge-in.
///
/// Closure of this leg does not tear down the telephony leg; only the
/// inbound pump's disconnect path does that.
async fn outbound_pump(
    mut speech_rx: SpeechStream,
    telephony_tx: Arc<Mutex<TelephonySink>>,
    speech_tx: Arc<Mutex<SpeechSink>>,
    session: Arc<Mutex<CallSession>>,
    events: &CallEventSink,
) {
    while let Some(message) = speech_rx.next().await {
        let text = match message {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!(error = ?e, "Speech service socket error");
                break;
            }
        };
        let event = match serde_json::from_str::<ServerEvent>(&text) {
            Ok(event) => event,
            Err(_) => {
                debug!("Skipping unrecognized speech service event");
                continue;
            }
        };

        if let Some(label) = logged_event_label(&event) {
            info!(event = label, "Speech service event");
        }

        match event {
            ServerEvent::ResponseAudioDelta(delta) => {
                if let Err(e) = relay_audio_delta(delta, &telephony_tx, &session).await {
                    warn!(error = %e, "Failed to relay assistant audio; ending outbound pump");
                    break;
                }
            }
            ServerEvent::InputAudioBufferSpeechStarted(_) => {
                events.emit(EventKind::SpeechDetected, json!({}));
                if let Err(e) = handle_speech_started(&telephony_tx, &speech_tx, &session).await {
                    warn!(error = %e, "Failed to interrupt assistant playback");
                }
            }
            _ => {}
        }
    }

    info!("Speech service connection closed");
}

/// Forwards one assistant audio delta, preserving media-then-mark ordering
/// on the telephony leg.
async fn relay_audio_delta(
    delta: ResponseAudioDeltaEvent,
    telephony_tx: &Arc<Mutex<TelephonySink>>,
    session: &Arc<Mutex<CallSession>>,
) -> Result<()> {
    let payload = match audio_utils::reencode_base64(&delta.delta) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Discarding malformed audio delta");
            return Ok(());
        }
    };

    // The session lock is held across both sends so a delta and its marker
    // can never interleave with another delta's.
    let mut session = session.lock().await;
    let Some(stream_sid) = session.stream_sid().map(str::to_string) else {
        warn!("Assistant audio arrived before stream start; discarding");
        return Ok(());
    };

    send_frame(
        &mut *telephony_tx.lock().await,
        &OutboundFrame::media(stream_sid.clone(), payload),
    )
    .await?;

    let item_id = (!delta.item_id.is_empty()).then_some(delta.item_id.as_str());
    session.note_audio_delta(item_id);

    send_frame(
        &mut *telephony_tx.lock().await,
        &OutboundFrame::mark(stream_sid, RESPONSE_MARK.to_string()),
    )
    .await?;
    session.push_mark(RESPONSE_MARK.to_string());

    Ok(())
}

/// Runs the interruption coordinator on caller speech onset and relays its
/// outputs: a truncate to the speech service, a clear to the telephony peer.
async fn handle_speech_started(
    telephony_tx: &Arc<Mutex<TelephonySink>>,
    speech_tx: &Arc<Mutex<SpeechSink>>,
    session: &Arc<Mutex<CallSession>>,
) -> Result<()> {
    let mut session = session.lock().await;
    if !session.response_in_flight() {
        return Ok(());
    }
    let Some(interruption) = session.interrupt() else {
        return Ok(());
    };

    if let Some(truncate) = interruption.truncate {
        info!(
            item_id = %truncate.item_id,
            audio_end_ms = truncate.audio_end_ms,
            "Caller barge-in; truncating assistant response"
        );
        let event = ClientEvent::ConversationItemTruncate(ConversationItemTruncateEvent {
            event_id: None,
            item_id: truncate.item_id,
            content_index: 0,
            audio_end_ms: u32::try_from(truncate.audio_end_ms).unwrap_or(u32::MAX),
        });
        openai::send_event(&mut *speech_tx.lock().await, &event).await?;
    }

    send_frame(
        &mut *telephony_tx.lock().await,
        &OutboundFrame::clear(interruption.stream_sid),
    )
    .await?;

    Ok(())
}

/// Serializes and sends one frame on the telephony leg.
async fn send_frame(sink: &mut TelephonySink, frame: &OutboundFrame) -> Result<()> {
    let serialized = serde_json::to_string(frame)?;
    sink.send(Message::Text(serialized.into())).await?;
    Ok(())
}

/// Labels for the speech service events worth a structured log line; all
/// other tags have no effect on the relay.
fn logged_event_label(event: &ServerEvent) -> Option<&'static str> {
    match event {
        ServerEvent::Error(_) => Some("error"),
        ServerEvent::SessionCreated(_) => Some("session.created"),
        ServerEvent::ResponseDone(_) => Some("response.done"),
        ServerEvent::ResponseContentPartDone(_) => Some("response.content_part.done"),
        ServerEvent::RateLimitsUpdated(_) => Some("rate_limits.updated"),
        ServerEvent::InputAudioBufferCommited(_) => Some("input_audio_buffer.committed"),
        ServerEvent::InputAudioBufferSpeechStarted(_) => Some("input_audio_buffer.speech_started"),
        ServerEvent::InputAudioBufferSpeechStopped(_) => Some("input_audio_buffer.speech_stopped"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_delta_event_parses_from_wire_json() {
        let text = r#"{
            "type": "response.audio.delta",
            "event_id": "evt_1",
            "response_id": "resp_1",
            "item_id": "X",
            "output_index": 0,
            "content_index": 0,
            "delta": "BBB="
        }"#;
        match serde_json::from_str::<ServerEvent>(text).unwrap() {
            ServerEvent::ResponseAudioDelta(delta) => {
                assert_eq!(delta.delta, "BBB=");
                assert_eq!(delta.item_id, "X");
            }
            other => panic!("Expected an audio delta, got {:?}", other),
        }
    }

    #[test]
    fn test_speech_started_event_is_in_logged_set() {
        let text = r#"{
            "type": "input_audio_buffer.speech_started",
            "event_id": "evt_2",
            "audio_start_ms": 120,
            "item_id": "item_9"
        }"#;
        let event = serde_json::from_str::<ServerEvent>(text).unwrap();
        assert_eq!(
            logged_event_label(&event),
            Some("input_audio_buffer.speech_started")
        );
        assert!(matches!(
            event,
            ServerEvent::InputAudioBufferSpeechStarted(_)
        ));
    }

    #[test]
    fn test_audio_delta_is_not_in_logged_set() {
        let text = r#"{
            "type": "response.audio.delta",
            "event_id": "evt_1",
            "response_id": "resp_1",
            "item_id": "X",
            "output_index": 0,
            "content_index": 0,
            "delta": "BBB="
        }"#;
        let event = serde_json::from_str::<ServerEvent>(text).unwrap();
        assert_eq!(logged_event_label(&event), None);
    }

    #[test]
    fn test_truncate_event_wire_shape() {
        let event = ClientEvent::ConversationItemTruncate(ConversationItemTruncateEvent {
            event_id: None,
            item_id: "item_1".to_string(),
            content_index: 0,
            audio_end_ms: 3000,
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "conversation.item.truncate");
        assert_eq!(value["item_id"], "item_1");
        assert_eq!(value["content_index"], 0);
        assert_eq!(value["audio_end_ms"], 3000);
    }
}
