//! Connection setup and session bootstrap for the speech leg (the OpenAI
//! Realtime API).

use crate::{config::Config, state::AppState};
use anyhow::{Context, Result};
use async_openai::types::realtime::{
    AudioFormat, ClientEvent, ConversationItemCreateEvent, Item, ItemContent, ItemContentType,
    ItemRole, ItemType, RealtimeVoice, ResponseCreateEvent, SessionResource, SessionUpdateEvent,
    TurnDetection,
};
use futures_util::{
    SinkExt,
    stream::{SplitSink, SplitStream},
};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{client::IntoClientRequest, protocol::Message as WsMessage},
};
use tracing::info;

pub type SpeechSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub type SpeechSink = SplitSink<SpeechSocket, WsMessage>;
pub type SpeechStream = SplitStream<SpeechSocket>;

/// Sampling temperature for the realtime session.
pub const REALTIME_TEMPERATURE: f32 = 0.8;

/// Scripted first turn, phrased as caller input so the assistant opens the
/// conversation.
pub const GREETING_PROMPT: &str = "Hello there! How can I help you today?";

/// Opens the WebSocket connection to the realtime speech service.
pub async fn connect(config: &Config) -> Result<SpeechSocket> {
    let url = format!(
        "wss://api.openai.com/v1/realtime?model={}",
        config.realtime_model
    );

    let mut request = url.into_client_request()?;
    request
        .headers_mut()
        .insert("Authorization", format!("Bearer {}", config.openai_api_key).parse()?);
    request
        .headers_mut()
        .insert("OpenAI-Beta", "realtime=v1".parse()?);

    let (stream, _) = connect_async(request)
        .await
        .context("Failed to connect to the OpenAI Realtime API")?;
    info!("Connected to the OpenAI Realtime API");
    Ok(stream)
}

/// Serializes and sends one client event on the speech leg.
pub async fn send_event(sink: &mut SpeechSink, event: &ClientEvent) -> Result<()> {
    let serialized = serde_json::to_string(event)?;
    sink.send(WsMessage::Text(serialized.into())).await?;
    Ok(())
}

/// Builds the `session.update` that configures the call: telephony audio
/// encoding on both directions, server-side voice activity detection, and
/// the rendered system instructions.
pub fn session_update(voice: RealtimeVoice, instructions: &str) -> ClientEvent {
    let session = SessionResource {
        modalities: Some(vec!["text".to_string(), "audio".to_string()]),
        instructions: Some(instructions.to_string()),
        voice: Some(voice),
        input_audio_format: Some(AudioFormat::G711ULAW),
        output_audio_format: Some(AudioFormat::G711ULAW),
        turn_detection: Some(TurnDetection::ServerVAD {
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 500,
            interrupt_response: None,
            create_response: None,
        }),
        temperature: Some(REALTIME_TEMPERATURE),
        ..Default::default()
    };
    ClientEvent::SessionUpdate(SessionUpdateEvent {
        session,
        event_id: None,
    })
}

/// Builds the scripted-greeting pair: a conversation item followed by the
/// response request that makes the assistant speak first.
pub fn greeting_events() -> Vec<ClientEvent> {
    let item = Item {
        r#type: Some(ItemType::Message),
        role: Some(ItemRole::User),
        content: Some(vec![ItemContent {
            r#type: ItemContentType::InputText,
            text: Some(GREETING_PROMPT.to_string()),
            audio: None,
            transcript: None,
        }]),
        id: None,
        status: None,
        call_id: None,
        name: None,
        arguments: None,
        output: None,
    };

    vec![
        ClientEvent::ConversationItemCreate(ConversationItemCreateEvent {
            item,
            event_id: None,
            previous_item_id: None,
        }),
        ClientEvent::ResponseCreate(ResponseCreateEvent {
            response: None,
            event_id: None,
        }),
    ]
}

/// Configures the freshly opened speech session, before any audio flows.
pub async fn initialize_session(sink: &mut SpeechSink, state: &AppState) -> Result<()> {
    let update = session_update(state.config.voice.clone(), &state.instructions);
    send_event(sink, &update)
        .await
        .context("Failed to send session configuration")?;

    if state.config.greeting_enabled {
        for event in greeting_events() {
            send_event(sink, &event)
                .await
                .context("Failed to send scripted greeting")?;
        }
    }
    Ok(())
}
