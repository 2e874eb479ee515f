//! Per-call state, the mark-acknowledgment tracker, and the interruption
//! coordinator.

use std::collections::VecDeque;

/// Directive produced on barge-in: limit the named assistant item to the
/// audio the caller has already heard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruncateDirective {
    pub item_id: String,
    pub audio_end_ms: u64,
}

/// The outputs of a barge-in: an optional truncate for the speech service
/// and the stream whose buffered audio must be cleared on the telephony
/// side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interruption {
    pub truncate: Option<TruncateDirective>,
    pub stream_sid: String,
}

/// Mutable state for one call: one telephony stream paired with one speech
/// service connection.
///
/// A session owns exactly one of these behind a mutex, shared by its two
/// pumps. All barge-in mutation is funneled through
/// [`CallSession::interrupt`], so the reset sequence can never interleave
/// with itself.
#[derive(Debug, Default)]
pub struct CallSession {
    stream_sid: Option<String>,
    latest_media_timestamp_ms: u64,
    last_assistant_item: Option<String>,
    response_start_timestamp_ms: Option<u64>,
    mark_queue: VecDeque<String>,
}

impl CallSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stream identifier assigned by the telephony peer, once known.
    pub fn stream_sid(&self) -> Option<&str> {
        self.stream_sid.as_deref()
    }

    /// Timestamp of the most recently processed inbound media frame.
    pub fn latest_media_timestamp_ms(&self) -> u64 {
        self.latest_media_timestamp_ms
    }

    /// Timestamp at which the current assistant response began playing, if
    /// one is in flight.
    pub fn response_start_timestamp_ms(&self) -> Option<u64> {
        self.response_start_timestamp_ms
    }

    /// Whether an assistant response is currently being played to the
    /// caller.
    pub fn response_in_flight(&self) -> bool {
        self.last_assistant_item.is_some()
    }

    /// Number of outbound audio chunks not yet acknowledged by the
    /// telephony peer.
    pub fn pending_marks(&self) -> usize {
        self.mark_queue.len()
    }

    /// Handles stream start: adopts the stream id and resets all
    /// playback-tracking state.
    ///
    /// The mark queue is emptied too: markers sent on a previous stream can
    /// never be acknowledged on this one.
    pub fn begin_stream(&mut self, stream_sid: String) {
        self.stream_sid = Some(stream_sid);
        self.latest_media_timestamp_ms = 0;
        self.last_assistant_item = None;
        self.response_start_timestamp_ms = None;
        self.mark_queue.clear();
    }

    /// Records the playback timestamp carried by an inbound media frame.
    pub fn record_media(&mut self, timestamp_ms: u64) {
        self.latest_media_timestamp_ms = timestamp_ms;
    }

    /// Acknowledges the oldest in-flight marker, returning its token. Extra
    /// acknowledgments on an empty queue are a no-op.
    pub fn ack_mark(&mut self) -> Option<String> {
        self.mark_queue.pop_front()
    }

    /// Enqueues a marker token for an outbound audio chunk.
    pub fn push_mark(&mut self, name: String) {
        self.mark_queue.push_back(name);
    }

    /// Notes that one assistant audio delta was forwarded to the caller.
    ///
    /// The first delta of a response anchors the start timestamp to the
    /// current media timestamp; the coordinator later subtracts that anchor
    /// to learn how much of the response was actually heard.
    pub fn note_audio_delta(&mut self, item_id: Option<&str>) {
        if self.response_start_timestamp_ms.is_none() {
            self.response_start_timestamp_ms = Some(self.latest_media_timestamp_ms);
        }
        if let Some(item_id) = item_id {
            self.last_assistant_item = Some(item_id.to_string());
        }
    }

    /// The interruption coordinator.
    ///
    /// On caller speech onset, computes how far into the in-flight response
    /// playback has reached, then clears the mark queue, the active item,
    /// and the start anchor together. Returns `None`, with state untouched,
    /// when nothing is in flight: no pending markers, no anchored start
    /// timestamp, or no stream id yet.
    ///
    /// Elapsed time saturates at zero; a regressed media timestamp must not
    /// produce a negative truncation point.
    pub fn interrupt(&mut self) -> Option<Interruption> {
        if self.mark_queue.is_empty() {
            return None;
        }
        let started_ms = self.response_start_timestamp_ms?;
        let stream_sid = self.stream_sid.clone()?;

        let audio_end_ms = self.latest_media_timestamp_ms.saturating_sub(started_ms);
        let truncate = self
            .last_assistant_item
            .take()
            .map(|item_id| TruncateDirective { item_id, audio_end_ms });

        self.mark_queue.clear();
        self.response_start_timestamp_ms = None;

        Some(Interruption { truncate, stream_sid })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started_session() -> CallSession {
        let mut session = CallSession::new();
        session.begin_stream("SS1".to_string());
        session
    }

    #[test]
    fn test_media_updates_latest_timestamp() {
        let mut session = started_session();
        session.record_media(100);
        assert_eq!(session.latest_media_timestamp_ms(), 100);
        session.record_media(250);
        assert_eq!(session.latest_media_timestamp_ms(), 250);
    }

    #[test]
    fn test_stream_start_resets_playback_state() {
        let mut session = started_session();
        session.record_media(4000);
        session.note_audio_delta(Some("item_1"));
        session.push_mark("chunk".to_string());

        session.begin_stream("SS2".to_string());

        assert_eq!(session.stream_sid(), Some("SS2"));
        assert_eq!(session.latest_media_timestamp_ms(), 0);
        assert!(!session.response_in_flight());
        assert_eq!(session.response_start_timestamp_ms(), None);
        assert_eq!(session.pending_marks(), 0);
    }

    #[test]
    fn test_extra_mark_acks_are_noops() {
        let mut session = started_session();
        assert_eq!(session.ack_mark(), None);

        session.push_mark("chunk".to_string());
        assert_eq!(session.ack_mark(), Some("chunk".to_string()));
        assert_eq!(session.ack_mark(), None);
        assert_eq!(session.pending_marks(), 0);
    }

    #[test]
    fn test_marks_acknowledge_in_fifo_order() {
        let mut session = started_session();
        session.push_mark("first".to_string());
        session.push_mark("second".to_string());
        assert_eq!(session.ack_mark(), Some("first".to_string()));
        assert_eq!(session.ack_mark(), Some("second".to_string()));
    }

    #[test]
    fn test_first_delta_anchors_response_start() {
        let mut session = started_session();
        session.record_media(1234);
        session.note_audio_delta(Some("item_1"));
        assert_eq!(session.response_start_timestamp_ms(), Some(1234));

        // Later deltas of the same response must not move the anchor.
        session.record_media(2000);
        session.note_audio_delta(Some("item_2"));
        assert_eq!(session.response_start_timestamp_ms(), Some(1234));
        assert!(session.response_in_flight());
    }

    #[test]
    fn test_delta_without_item_id_still_anchors() {
        let mut session = started_session();
        session.record_media(500);
        session.note_audio_delta(None);
        assert_eq!(session.response_start_timestamp_ms(), Some(500));
        assert!(!session.response_in_flight());
    }

    #[test]
    fn test_interruption_truncates_at_elapsed_playback() {
        let mut session = started_session();
        session.record_media(2000);
        session.note_audio_delta(Some("item_1"));
        session.push_mark("chunk".to_string());
        session.record_media(5000);

        let interruption = session.interrupt().expect("a response was in flight");

        assert_eq!(interruption.stream_sid, "SS1");
        assert_eq!(
            interruption.truncate,
            Some(TruncateDirective {
                item_id: "item_1".to_string(),
                audio_end_ms: 3000,
            })
        );
        assert_eq!(session.pending_marks(), 0);
        assert!(!session.response_in_flight());
        assert_eq!(session.response_start_timestamp_ms(), None);
    }

    #[test]
    fn test_interruption_without_pending_marks_is_noop() {
        let mut session = started_session();
        session.record_media(2000);
        session.note_audio_delta(Some("item_1"));

        assert_eq!(session.interrupt(), None);

        // State must be untouched by the no-op.
        assert!(session.response_in_flight());
        assert_eq!(session.response_start_timestamp_ms(), Some(2000));
    }

    #[test]
    fn test_interruption_without_anchor_is_noop() {
        let mut session = started_session();
        session.push_mark("chunk".to_string());

        assert_eq!(session.interrupt(), None);
        assert_eq!(session.pending_marks(), 1);
    }

    #[test]
    fn test_interruption_without_item_still_clears_playback() {
        let mut session = started_session();
        session.record_media(1000);
        session.note_audio_delta(None);
        session.push_mark("chunk".to_string());

        let interruption = session.interrupt().expect("playback was in flight");
        assert_eq!(interruption.truncate, None);
        assert_eq!(interruption.stream_sid, "SS1");
        assert_eq!(session.pending_marks(), 0);
        assert_eq!(session.response_start_timestamp_ms(), None);
    }

    #[test]
    fn test_elapsed_saturates_when_timestamps_regress() {
        let mut session = started_session();
        session.record_media(5000);
        session.note_audio_delta(Some("item_1"));
        session.push_mark("chunk".to_string());
        session.record_media(1000);

        let interruption = session.interrupt().expect("a response was in flight");
        assert_eq!(
            interruption.truncate.map(|t| t.audio_end_ms),
            Some(0)
        );
    }
}
