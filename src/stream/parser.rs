//! Event frame parsing for the chat response stream
//!
//! The Kintsugi backend streams assistant output as SSE-style records:
//! `data: <json>\n\n`, where `<json>` is a chunk object carrying either a
//! `delta` (more assistant text) or `done: true` (end of exchange). The
//! literal payload `[DONE]` is an alternate end-of-stream sentinel and is
//! recognized before any JSON parsing is attempted.
//!
//! [`FrameParser`] accepts decoded text in whatever increments the
//! transport delivers and yields complete frames as soon as a blank-line
//! boundary is observed, buffering any trailing partial record across calls.

use serde::Deserialize;

/// One parsed record from the response stream
///
/// Produced by [`FrameParser`]; consumed exhaustively by the exchange
/// driver. Malformed payloads are a variant, not an error: a single bad
/// frame is skipped and must never abort the rest of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFrame {
    /// An incremental fragment of assistant text
    Delta(String),
    /// End of the exchange (`{"done":true}` or the `[DONE]` sentinel)
    Done,
    /// A payload that was not valid JSON; `raw` is the offending text
    Malformed {
        /// The unparseable payload, kept for logging
        raw: String,
    },
}

/// Wire shape of one stream chunk payload
///
/// Matches the backend's chunk object. Unknown fields (`message_id`,
/// `total_tokens`, ...) are ignored.
#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    delta: Option<String>,
    #[serde(default)]
    done: bool,
}

/// Alternate end-of-stream sentinel, checked before JSON parsing
const DONE_SENTINEL: &str = "[DONE]";

/// Incremental parser for `data: ...\n\n` framed streams
///
/// # Examples
///
/// ```
/// use kintsugi::stream::{EventFrame, FrameParser};
///
/// let mut parser = FrameParser::new();
/// let frames = parser.push("data: {\"delta\":\"Hel\"}\n\ndata: {\"del");
/// assert_eq!(frames, vec![EventFrame::Delta("Hel".to_string())]);
///
/// // The partial record is buffered until its boundary arrives.
/// let frames = parser.push("ta\":\"lo\"}\n\n");
/// assert_eq!(frames, vec![EventFrame::Delta("lo".to_string())]);
/// ```
#[derive(Debug, Default)]
pub struct FrameParser {
    /// Decoded text accumulated between record boundaries.
    buffer: String,
}

impl FrameParser {
    /// Creates a new parser with an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds the next text increment, returning all newly completed frames
    ///
    /// Frames are returned in stream order. Event blocks that contain no
    /// `data:` payload (comments, keepalives) produce nothing.
    pub fn push(&mut self, text: &str) -> Vec<EventFrame> {
        self.buffer.push_str(text);

        let mut frames = Vec::new();
        // Records are separated by blank lines (`\n\n`).
        while let Some(pos) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..pos + 2).collect();
            if let Some(frame) = parse_event_block(block.trim_end_matches('\n')) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flushes the buffer after end-of-stream, parsing any final record
    ///
    /// Some producers emit the `[DONE]` sentinel as the last line without a
    /// trailing blank line; this makes sure it is still honored.
    pub fn finish(&mut self) -> Option<EventFrame> {
        let remainder = std::mem::take(&mut self.buffer);
        if remainder.trim().is_empty() {
            return None;
        }
        parse_event_block(&remainder)
    }

    /// Returns true if a partial record is buffered
    pub fn has_partial(&self) -> bool {
        !self.buffer.is_empty()
    }
}

/// Parses a single event block (the text between two blank lines)
///
/// Collects `data:` field lines; other SSE fields (`id:`, `event:`,
/// comments) are ignored -- the backend emits none.
fn parse_event_block(block: &str) -> Option<EventFrame> {
    let mut data_lines: Vec<&str> = Vec::new();
    for line in block.lines() {
        if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.trim());
        }
    }

    let data = data_lines.join("\n");
    if data.is_empty() {
        return None;
    }

    // The sentinel is not JSON; it must short-circuit the parse.
    if data == DONE_SENTINEL {
        return Some(EventFrame::Done);
    }

    match serde_json::from_str::<ChunkPayload>(&data) {
        Ok(payload) => {
            if payload.done {
                Some(EventFrame::Done)
            } else if let Some(delta) = payload.delta {
                Some(EventFrame::Delta(delta))
            } else {
                // Well-formed but empty chunk (keepalive); nothing to apply.
                tracing::trace!("skipping empty stream chunk: {}", data);
                None
            }
        }
        Err(e) => {
            tracing::debug!("unparseable stream payload ({}): {}", e, data);
            Some(EventFrame::Malformed { raw: data })
        }
    }
}
