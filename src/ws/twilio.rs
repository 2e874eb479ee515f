//! Defines the JSON frame protocol spoken on the telephony leg (Twilio
//! Media Streams).
//!
//! Inbound frames are tagged by `event`; kinds this service does not act on
//! deserialize to [`TelephonyFrame::Unknown`] so the pump can skip them
//! instead of treating them as errors.

use serde::{Deserialize, Deserializer, Serialize};

/// Marker name attached to every outbound audio chunk. The telephony peer
/// echoes it back once the chunk is queued for playback.
pub const RESPONSE_MARK: &str = "responsePart";

/// Frames received from the telephony peer.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelephonyFrame {
    /// Protocol handshake, sent once before `start`.
    Connected,
    /// Stream metadata; assigns the stream identifier for the call.
    Start { start: StreamStart },
    /// One chunk of caller audio with its playback timestamp.
    Media { media: MediaChunk },
    /// Acknowledgment of a marker we sent earlier.
    Mark {
        #[serde(default)]
        mark: Option<MarkAck>,
    },
    /// End of the media stream.
    Stop,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub struct StreamStart {
    #[serde(rename = "streamSid")]
    pub stream_sid: String,
}

#[derive(Debug, Deserialize)]
pub struct MediaChunk {
    /// Milliseconds since stream start. The wire carries this as a string,
    /// but a bare number is accepted too.
    #[serde(deserialize_with = "timestamp_ms")]
    pub timestamp: u64,
    /// Base64 G.711 µ-law audio.
    pub payload: String,
}

#[derive(Debug, Deserialize)]
pub struct MarkAck {
    #[serde(default)]
    pub name: Option<String>,
}

fn timestamp_ms<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum TimestampRepr {
        Number(u64),
        Text(String),
    }

    match TimestampRepr::deserialize(deserializer)? {
        TimestampRepr::Number(n) => Ok(n),
        TimestampRepr::Text(s) => s.parse::<u64>().map_err(serde::de::Error::custom),
    }
}

/// Frames sent to the telephony peer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// One chunk of assistant audio.
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },
    /// Playback marker following an audio chunk.
    Mark {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        mark: OutboundMark,
    },
    /// Discard any buffered-but-unplayed audio on the telephony side.
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboundMedia {
    pub payload: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboundMark {
    pub name: String,
}

impl OutboundFrame {
    pub fn media(stream_sid: String, payload: String) -> Self {
        OutboundFrame::Media {
            stream_sid,
            media: OutboundMedia { payload },
        }
    }

    pub fn mark(stream_sid: String, name: String) -> Self {
        OutboundFrame::Mark {
            stream_sid,
            mark: OutboundMark { name },
        }
    }

    pub fn clear(stream_sid: String) -> Self {
        OutboundFrame::Clear { stream_sid }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_start_frame() {
        let text = r#"{"event":"start","sequenceNumber":"1","start":{"streamSid":"SS1","accountSid":"AC1","tracks":["inbound"]}}"#;
        match serde_json::from_str::<TelephonyFrame>(text).unwrap() {
            TelephonyFrame::Start { start } => assert_eq!(start.stream_sid, "SS1"),
            other => panic!("Expected start frame, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_media_frame_with_string_timestamp() {
        let text = r#"{"event":"media","streamSid":"SS1","media":{"track":"inbound","chunk":"2","timestamp":"296","payload":"AAA="}}"#;
        match serde_json::from_str::<TelephonyFrame>(text).unwrap() {
            TelephonyFrame::Media { media } => {
                assert_eq!(media.timestamp, 296);
                assert_eq!(media.payload, "AAA=");
            }
            other => panic!("Expected media frame, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_media_frame_with_numeric_timestamp() {
        let text = r#"{"event":"media","media":{"timestamp":100,"payload":"AAA="}}"#;
        match serde_json::from_str::<TelephonyFrame>(text).unwrap() {
            TelephonyFrame::Media { media } => assert_eq!(media.timestamp, 100),
            other => panic!("Expected media frame, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_mark_frame() {
        let text = r#"{"event":"mark","streamSid":"SS1","mark":{"name":"responsePart"}}"#;
        match serde_json::from_str::<TelephonyFrame>(text).unwrap() {
            TelephonyFrame::Mark { mark } => {
                assert_eq!(mark.unwrap().name.as_deref(), Some("responsePart"));
            }
            other => panic!("Expected mark frame, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_stop_and_connected_frames() {
        let stop = r#"{"event":"stop","streamSid":"SS1","stop":{"callSid":"CA1"}}"#;
        assert!(matches!(
            serde_json::from_str::<TelephonyFrame>(stop).unwrap(),
            TelephonyFrame::Stop
        ));

        let connected = r#"{"event":"connected","protocol":"Call","version":"1.0.0"}"#;
        assert!(matches!(
            serde_json::from_str::<TelephonyFrame>(connected).unwrap(),
            TelephonyFrame::Connected
        ));
    }

    #[test]
    fn test_unrecognized_event_kind_is_not_an_error() {
        let text = r#"{"event":"dtmf","dtmf":{"digit":"5"}}"#;
        assert!(matches!(
            serde_json::from_str::<TelephonyFrame>(text).unwrap(),
            TelephonyFrame::Unknown
        ));
    }

    #[test]
    fn test_malformed_frame_is_an_error() {
        assert!(serde_json::from_str::<TelephonyFrame>("not json").is_err());
        assert!(serde_json::from_str::<TelephonyFrame>(r#"{"no_event":true}"#).is_err());
    }

    #[test]
    fn test_serialize_media_frame() {
        let frame = OutboundFrame::media("SS1".to_string(), "BBB=".to_string());
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            value,
            json!({"event": "media", "streamSid": "SS1", "media": {"payload": "BBB="}})
        );
    }

    #[test]
    fn test_serialize_mark_frame() {
        let frame = OutboundFrame::mark("SS1".to_string(), RESPONSE_MARK.to_string());
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            value,
            json!({"event": "mark", "streamSid": "SS1", "mark": {"name": "responsePart"}})
        );
    }

    #[test]
    fn test_serialize_clear_frame() {
        let frame = OutboundFrame::clear("SS1".to_string());
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value, json!({"event": "clear", "streamSid": "SS1"}));
    }
}
