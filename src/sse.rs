//! Server-Sent Events (SSE) reassembly.
//!
//! Chunks handed over by the transport do not line up with events: one event
//! may be split across chunks and one chunk may carry several events. The
//! [`EventReassembler`] turns the chunk sequence back into decoded events.
//!
//! SSE format:
//! ```text
//! data: {"key": "value"}
//!
//! data: {"another": "event"}
//!
//! data: [DONE]
//! ```

use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::client::ClientError;
use crate::decode::{decode, Decoded, DecodedEvent, FragmentPosition};

/// Prefix of the first event in a body.
pub const DATA_PREFIX: &str = "data:";

/// Boundary between two events.
pub const FRAME_SEPARATOR: &str = "\ndata:";

/// Payload that ends the logical stream.
pub const DONE_MARKER: &str = "[DONE]";

/// Extension trait turning a `reqwest::Response` into a chunk source.
pub trait SSEResponseExt {
    /// Raw body chunks, with transport errors mapped to [`ClientError`].
    fn chunks(self) -> impl Stream<Item = Result<Bytes, ClientError>> + Send;
}

impl SSEResponseExt for reqwest::Response {
    fn chunks(self) -> impl Stream<Item = Result<Bytes, ClientError>> + Send {
        self.bytes_stream().map(|chunk| chunk.map_err(ClientError::from))
    }
}

/// Check if an SSE payload indicates the stream is done.
///
/// Extra wrapping brackets are tolerated.
///
/// # Example
/// ```
/// use openai_stream::sse::is_done_marker;
///
/// assert!(is_done_marker("[DONE]"));
/// assert!(is_done_marker(" [[DONE]] "));
/// assert!(!is_done_marker(""));
/// assert!(!is_done_marker("{\"data\": \"value\"}"));
/// ```
pub fn is_done_marker(payload: &str) -> bool {
    let payload = payload.trim();
    payload.starts_with('[')
        && payload.ends_with(']')
        && payload.trim_start_matches('[').trim_end_matches(']') == "DONE"
}

/// Split text on event boundaries.
///
/// Fragments are returned untrimmed, so that a fragment carried over to the
/// next chunk keeps its exact text. Fragments that are pure whitespace are
/// dropped.
pub fn split_frames(text: &str) -> Vec<&str> {
    let text = text.trim_start();
    let body = text.strip_prefix(DATA_PREFIX).unwrap_or(text);

    body.split(FRAME_SEPARATOR)
        .filter(|fragment| !fragment.trim().is_empty())
        .collect()
}

/// Events produced by a single chunk.
#[derive(Debug)]
pub struct Batch<T> {
    pub events: Vec<DecodedEvent<T>>,
    /// The termination marker was seen.
    pub done: bool,
}

impl<T> Default for Batch<T> {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            done: false,
        }
    }
}

/// Reassembles chunks into decoded events.
///
/// Holds at most one pending fragment: the tail of the previous chunk that
/// did not decode and may be the head of a split event. It also holds the
/// bytes of a UTF-8 sequence cut in half by the chunk boundary.
#[derive(Debug, Default)]
pub struct EventReassembler {
    pending: Option<String>,
    partial_utf8: Vec<u8>,
}

impl EventReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// The fragment currently waiting for its continuation.
    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// Drop whatever is still buffered, returning the pending fragment.
    pub fn finish(&mut self) -> Option<String> {
        self.partial_utf8.clear();
        self.pending.take()
    }

    /// Feed the next chunk, in arrival order.
    pub fn feed<T: DeserializeOwned>(&mut self, chunk: &[u8]) -> Batch<T> {
        let text = match self.decode_text(chunk) {
            Ok(text) => text,
            Err(error) => {
                return Batch {
                    events: vec![DecodedEvent::Failure(error)],
                    done: false,
                }
            }
        };
        if text.is_empty() {
            return Batch::default();
        }

        let combined = match self.pending.take() {
            Some(mut pending) => {
                pending.push_str(&text);
                pending
            }
            None => text,
        };

        let fragments = split_frames(&combined);
        trace!(fragments = fragments.len(), "split chunk");

        let mut batch = Batch::default();
        match fragments.first() {
            None => return batch,
            Some(first) if is_done_marker(first) => {
                batch.done = true;
                return batch;
            }
            Some(_) => {}
        }

        let last = fragments.len() - 1;
        for (index, fragment) in fragments.iter().enumerate() {
            if is_done_marker(fragment) {
                batch.done = true;
                break;
            }

            let position = if index == last {
                FragmentPosition::Last
            } else {
                FragmentPosition::Inner
            };

            match decode::<T>(fragment.trim(), position) {
                Decoded::Complete(event) => batch.events.push(event),
                Decoded::Truncated => {
                    trace!(bytes = fragment.len(), "buffering incomplete fragment");
                    self.pending = Some((*fragment).to_string());
                }
            }
        }

        batch
    }

    /// Decode `chunk` as UTF-8, keeping an incomplete trailing sequence for
    /// the next chunk.
    fn decode_text(&mut self, chunk: &[u8]) -> Result<String, ClientError> {
        let mut bytes = std::mem::take(&mut self.partial_utf8);
        bytes.extend_from_slice(chunk);

        match String::from_utf8(bytes) {
            Ok(text) => Ok(text),
            Err(error) => {
                let utf8_error = error.utf8_error();
                if utf8_error.error_len().is_some() {
                    return Err(ClientError::UnknownContent);
                }

                let valid_up_to = utf8_error.valid_up_to();
                let mut bytes = error.into_bytes();
                self.partial_utf8 = bytes.split_off(valid_up_to);
                String::from_utf8(bytes).map_err(|_| ClientError::UnknownContent)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Deserialize, PartialEq)]
    struct Event {
        id: u32,
        #[serde(default)]
        text: String,
    }

    fn items(batch: Batch<Event>) -> Vec<u32> {
        batch
            .events
            .into_iter()
            .map(|event| match event {
                DecodedEvent::Item(item) => item.id,
                other => panic!("unexpected event: {:?}", other),
            })
            .collect()
    }

    /// Feed chunks until the marker, collecting items.
    fn reassemble(chunks: &[&[u8]]) -> (Vec<Event>, bool) {
        let mut reassembler = EventReassembler::new();
        let mut events = Vec::new();
        for chunk in chunks {
            let batch = reassembler.feed::<Event>(chunk);
            for event in batch.events {
                match event {
                    DecodedEvent::Item(item) => events.push(item),
                    other => panic!("unexpected event: {:?}", other),
                }
            }
            if batch.done {
                return (events, true);
            }
        }
        (events, false)
    }

    /// Feed chunks until the marker or the first non-item, describing what
    /// a session would deliver.
    fn outcomes(chunks: &[&[u8]]) -> Vec<String> {
        let mut reassembler = EventReassembler::new();
        let mut delivered = Vec::new();
        for chunk in chunks {
            let batch = reassembler.feed::<Event>(chunk);
            for event in batch.events {
                match event {
                    DecodedEvent::Item(item) => delivered.push(format!("item {}", item.id)),
                    DecodedEvent::ApiError(error) => {
                        delivered.push(format!("api {}", error.message));
                        return delivered;
                    }
                    DecodedEvent::Failure(ClientError::Parse(_)) => {
                        delivered.push("parse".to_string());
                        return delivered;
                    }
                    DecodedEvent::Failure(other) => panic!("unexpected failure: {:?}", other),
                }
            }
            if batch.done {
                delivered.push("done".to_string());
                return delivered;
            }
        }
        delivered
    }

    fn assert_split_invariant(body: &str, expected: &[&str]) {
        let bytes = body.as_bytes();
        assert_eq!(outcomes(&[bytes]), expected);

        for first in 0..=bytes.len() {
            for second in first..=bytes.len() {
                let delivered =
                    outcomes(&[&bytes[..first], &bytes[first..second], &bytes[second..]]);
                assert_eq!(delivered, expected, "split at {first}/{second}");
            }
        }
    }

    #[test]
    fn test_is_done_marker() {
        assert!(is_done_marker("[DONE]"));
        assert!(is_done_marker("[[DONE]]"));
        assert!(!is_done_marker("DONE"));
        assert!(!is_done_marker("[DONE"));
        assert!(!is_done_marker("data"));
    }

    #[test]
    fn test_split_frames() {
        assert_eq!(
            split_frames("data: {\"id\":1}\n\ndata: {\"id\":2}\n\n"),
            vec![" {\"id\":1}\n", " {\"id\":2}\n\n"]
        );
        assert_eq!(split_frames("data:{\"id\":1}\ndata:[DONE]"), vec!["{\"id\":1}", "[DONE]"]);
        assert!(split_frames("\n\n").is_empty());
        assert!(split_frames("data: ").is_empty());
    }

    #[test]
    fn test_two_events_in_one_chunk() {
        let mut reassembler = EventReassembler::new();
        let batch =
            reassembler.feed::<Event>(b"data: {\"id\":1}\n\ndata: {\"id\":2}\n\ndata: [DONE]\n\n");
        assert!(batch.done);
        assert_eq!(items(batch), vec![1, 2]);
        assert_eq!(reassembler.pending(), None);
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut reassembler = EventReassembler::new();

        let first = reassembler.feed::<Event>(b"data: {\"id\"");
        assert!(first.events.is_empty());
        assert!(!first.done);
        assert_eq!(reassembler.pending(), Some(" {\"id\""));

        let second = reassembler.feed::<Event>(b":1}\n\ndata: [DONE]\n\n");
        assert!(second.done);
        assert_eq!(items(second), vec![1]);
        assert_eq!(reassembler.pending(), None);
    }

    #[test]
    fn test_split_inside_boundary_token() {
        let (events, done) = reassemble(&[
            b"data: {\"id\":1}\n\nda",
            b"ta: {\"id\":2}\n\ndata: [DO",
            b"NE]\n\n",
        ]);
        assert!(done);
        assert_eq!(events.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_pending_keeps_trailing_whitespace() {
        let (events, _) = reassemble(&[b"data: {\"id\":1,\"text\":\"a ", b"b\"}\n\n"]);
        assert_eq!(events[0].text, "a b");
    }

    #[test]
    fn test_api_error_payload() {
        let mut reassembler = EventReassembler::new();
        let batch = reassembler.feed::<Event>(
            b"data: {\"error\":{\"message\":\"bad request\",\"type\":\"invalid_request_error\",\"param\":null,\"code\":\"400\"}}\n\n",
        );
        match batch.events.as_slice() {
            [DecodedEvent::ApiError(error)] => {
                assert_eq!(error.message, "bad request");
                assert_eq!(error.code.as_deref(), Some("400"));
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[test]
    fn test_inner_garbage_is_reported() {
        let mut reassembler = EventReassembler::new();
        let batch = reassembler.feed::<Event>(b"data: {\"id\":1}\n\ndata: oops\n\ndata: {\"id\":3}\n\n");
        assert_eq!(batch.events.len(), 3);
        assert!(matches!(batch.events[0], DecodedEvent::Item(Event { id: 1, .. })));
        assert!(matches!(batch.events[1], DecodedEvent::Failure(ClientError::Parse(_))));
    }

    #[test]
    fn test_marker_in_the_middle_ends_the_batch() {
        let mut reassembler = EventReassembler::new();
        let batch = reassembler.feed::<Event>(b"data: {\"id\":1}\n\ndata: [DONE]\n\ndata: {\"id\":2}\n\n");
        assert!(batch.done);
        assert_eq!(items(batch), vec![1]);
    }

    #[test]
    fn test_doubled_marker_is_not_buffered() {
        let mut reassembler = EventReassembler::new();
        let batch = reassembler.feed::<Event>(b"data: {\"id\":1}\n\ndata: [[DONE]]");
        assert!(batch.done);
        assert_eq!(items(batch), vec![1]);
        assert_eq!(reassembler.pending(), None);
    }

    #[test]
    fn test_leading_marker_yields_nothing() {
        let mut reassembler = EventReassembler::new();
        let batch = reassembler.feed::<Event>(b"data: [DONE]\n\ndata: {\"id\":1}\n\n");
        assert!(batch.done);
        assert!(batch.events.is_empty());
    }

    #[test]
    fn test_empty_and_blank_chunks() {
        let mut reassembler = EventReassembler::new();
        let batch = reassembler.feed::<Event>(b"");
        assert!(batch.events.is_empty() && !batch.done);
        let batch = reassembler.feed::<Event>(b"\n\n");
        assert!(batch.events.is_empty() && !batch.done);
        assert_eq!(reassembler.pending(), None);
    }

    #[test]
    fn test_invalid_utf8_leaves_pending_untouched() {
        let mut reassembler = EventReassembler::new();
        reassembler.feed::<Event>(b"data: {\"id\"");
        let batch = reassembler.feed::<Event>(&[0xff, 0xfe]);
        assert!(matches!(
            batch.events.as_slice(),
            [DecodedEvent::Failure(ClientError::UnknownContent)]
        ));
        assert_eq!(reassembler.pending(), Some(" {\"id\""));
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let body = "data: {\"id\":1,\"text\":\"é\"}\n\n".as_bytes();
        let cut = body.iter().position(|&b| b == 0xc3).unwrap() + 1;
        let (events, _) = reassemble(&[&body[..cut], &body[cut..]]);
        assert_eq!(events[0].text, "é");
    }

    #[test]
    fn test_finish_discards_pending() {
        let mut reassembler = EventReassembler::new();
        reassembler.feed::<Event>(b"data: {\"id\":");
        assert_eq!(reassembler.finish().as_deref(), Some(" {\"id\":"));
        assert_eq!(reassembler.pending(), None);
    }

    #[test]
    fn test_chunk_boundary_invariance() {
        let body = "data: {\"id\":1,\"text\":\"héllo \"}\n\ndata: {\"id\":2,\"text\":\"b\\nc\"}\r\n\r\ndata:{\"id\":3}\n\ndata: [DONE]\n\n";
        let bytes = body.as_bytes();
        let (expected, done) = reassemble(&[bytes]);
        assert!(done);
        assert_eq!(expected.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 2, 3]);

        for first in 0..=bytes.len() {
            for second in first..=bytes.len() {
                let (events, done) =
                    reassemble(&[&bytes[..first], &bytes[first..second], &bytes[second..]]);
                assert!(done, "no marker for split at {first}/{second}");
                assert_eq!(events, expected, "split at {first}/{second}");
            }
        }

        let single_bytes: Vec<&[u8]> = bytes.chunks(1).collect();
        assert_eq!(reassemble(&single_bytes), (expected, true));
    }

    #[test]
    fn test_chunk_boundary_invariance_with_api_error() {
        assert_split_invariant(
            "data: {\"id\":1}\n\ndata: {\"error\":{\"message\":[\"a\",\"b\"],\"code\":429}}\n\ndata: {\"id\":2}\n\ndata: [DONE]\n\n",
            &["item 1", "api a\nb"],
        );
    }

    #[test]
    fn test_chunk_boundary_invariance_with_garbage() {
        assert_split_invariant(
            "data: {\"id\":1}\n\ndata: nope\n\ndata: {\"id\":2}\n\ndata: [DONE]\n\n",
            &["item 1", "parse"],
        );
    }
}
