//! The streaming exchange pipeline
//!
//! This module implements the one path every chat exchange takes, from raw
//! transport bytes to a committed assistant message:
//!
//! 1. [`Utf8StreamDecoder`] turns byte chunks into text, holding multi-byte
//!    sequences that were split across chunk boundaries.
//! 2. [`FrameParser`] splits the text into `data: ...\n\n` records and
//!    yields [`EventFrame`]s.
//! 3. [`StreamAccumulator`] concatenates delta frames into the in-progress
//!    assistant message.
//! 4. A [`RenderSink`] receives each snapshot for live display and, on the
//!    terminal frame, commits the final text exactly once.
//!
//! [`run_exchange`] drives the four stages with a per-chunk timeout and
//! cooperative cancellation. Frames are applied strictly in arrival order;
//! there is no concurrent frame processing to reorder them.
//!
//! Exchange lifecycle: **Idle → Streaming → (Committed | Errored |
//! Cancelled) → Idle**. [`StreamState`] tracks the Idle/Streaming flag and
//! owns the accumulator; starting an exchange while one is already
//! streaming is rejected up front rather than interleaving two streams.

pub mod accumulator;
pub mod decoder;
pub mod parser;
pub mod sink;

pub use accumulator::StreamAccumulator;
pub use decoder::Utf8StreamDecoder;
pub use parser::{EventFrame, FrameParser};
pub use sink::{CommitTarget, RenderSink, StoreCommitSink};

use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use metrics::increment_counter;
use tokio_util::sync::CancellationToken;

use crate::error::{KintsugiError, Result};

/// Counter: frames applied, labeled by kind
const FRAMES_TOTAL: &str = "kintsugi_stream_frames_total";
/// Counter: malformed frames skipped
const MALFORMED_TOTAL: &str = "kintsugi_stream_malformed_frames_total";
/// Counter: exchange outcomes, labeled committed/errored/cancelled
const EXCHANGES_TOTAL: &str = "kintsugi_stream_exchanges_total";

/// Default bound on the wait for the next transport chunk
pub const DEFAULT_CHUNK_TIMEOUT: Duration = Duration::from_secs(30);

/// Transient state of one in-flight exchange
///
/// Owns the accumulated text and the streaming flag. Exclusively owned by
/// the single in-flight request: `run_exchange` takes it by `&mut`, so two
/// concurrent exchanges over one state are a compile error, and the
/// [`begin`](StreamState::begin) guard rejects logical re-entry (e.g. a
/// state left streaming by an aborted task).
///
/// # Examples
///
/// ```
/// use kintsugi::stream::StreamState;
///
/// let mut state = StreamState::new();
/// assert!(!state.is_streaming());
/// state.begin().unwrap();
/// assert!(state.begin().is_err());
/// ```
#[derive(Debug, Default)]
pub struct StreamState {
    accumulator: StreamAccumulator,
    streaming: bool,
}

impl StreamState {
    /// Creates an idle state with an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// True while an exchange is streaming through this state
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Current accumulated snapshot (empty when idle)
    pub fn snapshot(&self) -> &str {
        self.accumulator.snapshot()
    }

    /// Enters the Streaming phase
    ///
    /// # Errors
    ///
    /// Returns [`KintsugiError::Reentrancy`] if an exchange is already
    /// streaming. Disabling the send control while streaming is the UI's
    /// job; this guard makes the invariant hold regardless.
    pub fn begin(&mut self) -> Result<()> {
        if self.streaming {
            return Err(KintsugiError::Reentrancy(
                "a response is still streaming for this conversation".to_string(),
            )
            .into());
        }
        self.streaming = true;
        self.accumulator.reset();
        Ok(())
    }

    /// Returns to Idle, discarding any leftover buffer
    pub fn finish(&mut self) {
        self.streaming = false;
        self.accumulator.reset();
    }
}

/// How a completed call to [`run_exchange`] ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// A terminal frame arrived and the final text was committed
    Committed {
        /// The committed assistant text
        final_text: String,
    },
    /// The exchange was cancelled; partial output was discarded uncommitted
    Cancelled,
}

/// Tuning knobs for [`run_exchange`]
#[derive(Debug, Clone)]
pub struct ExchangeOptions {
    /// Maximum wait for the next transport chunk before the exchange is
    /// failed as a transport error
    pub chunk_timeout: Duration,
}

impl Default for ExchangeOptions {
    fn default() -> Self {
        Self {
            chunk_timeout: DEFAULT_CHUNK_TIMEOUT,
        }
    }
}

/// Drives one exchange from byte stream to committed message
///
/// Reads `byte_stream` chunk by chunk, decodes, parses, and applies frames
/// in order:
///
/// - delta frames grow the accumulator and are pushed to
///   [`RenderSink::on_delta`] as full snapshots;
/// - the first terminal frame (`{"done":true}` or `[DONE]`) triggers
///   [`RenderSink::on_complete`] with the final text -- exactly once, even
///   if both terminal forms appear;
/// - malformed frames are counted, logged, and skipped.
///
/// End-of-stream without a terminal frame, a transport error, or chunk
/// silence beyond `options.chunk_timeout` fails the exchange: the sink's
/// `on_error` fires, the state is cleared, and nothing is committed.
/// Cancelling `cancel` stops reading and discards partial state without
/// calling `on_error` -- cancellation is a user action, not a failure.
///
/// # Arguments
///
/// * `byte_stream` - The chunked response body
/// * `state` - The exchange's stream state (must be idle)
/// * `sink` - Render/commit surface
/// * `cancel` - Cooperative cancellation handle
/// * `options` - Timeout configuration
///
/// # Errors
///
/// Returns [`KintsugiError::Reentrancy`] if `state` is already streaming,
/// [`KintsugiError::Transport`] for transport failures, or the commit
/// error if the sink's `on_complete` fails.
pub async fn run_exchange<B, E, S>(
    byte_stream: B,
    state: &mut StreamState,
    sink: &mut S,
    cancel: &CancellationToken,
    options: &ExchangeOptions,
) -> Result<ExchangeOutcome>
where
    B: Stream<Item = std::result::Result<Bytes, E>>,
    E: std::fmt::Display,
    S: RenderSink,
{
    state.begin()?;

    let mut decoder = Utf8StreamDecoder::new();
    let mut parser = FrameParser::new();
    let mut committed: Option<String> = None;

    tokio::pin!(byte_stream);

    loop {
        let step = tokio::select! {
            // Cancellation wins over ready data; a cancelled exchange must
            // not commit.
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("exchange cancelled; discarding partial output");
                state.finish();
                increment_counter!(EXCHANGES_TOTAL, "outcome" => "cancelled");
                return Ok(ExchangeOutcome::Cancelled);
            }
            step = tokio::time::timeout(options.chunk_timeout, byte_stream.next()) => step,
        };

        let chunk = match step {
            Err(_) => {
                return Err(fail(
                    state,
                    sink,
                    KintsugiError::Transport(format!(
                        "no data received for {}s",
                        options.chunk_timeout.as_secs()
                    )),
                ));
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                return Err(fail(
                    state,
                    sink,
                    KintsugiError::Transport(format!("stream read failed: {}", e)),
                ));
            }
            Ok(Some(Ok(chunk))) => chunk,
        };

        let text = decoder.decode(&chunk);
        for frame in parser.push(&text) {
            apply_frame(frame, state, sink, &mut committed)
                .map_err(|e| commit_failed(state, e))?;
        }

        // Nothing meaningful can follow the terminal frame.
        if committed.is_some() {
            break;
        }
    }

    // End of stream: flush the decoder and parse any trailing record (a
    // final `[DONE]` may arrive without its blank-line terminator).
    if committed.is_none() {
        let tail = decoder.finish();
        let mut frames = parser.push(&tail);
        frames.extend(parser.finish());
        for frame in frames {
            apply_frame(frame, state, sink, &mut committed)
                .map_err(|e| commit_failed(state, e))?;
        }
    }

    match committed {
        Some(final_text) => {
            state.finish();
            increment_counter!(EXCHANGES_TOTAL, "outcome" => "committed");
            Ok(ExchangeOutcome::Committed { final_text })
        }
        None => Err(fail(
            state,
            sink,
            KintsugiError::Transport("stream ended before a terminal frame".to_string()),
        )),
    }
}

/// Applies one parsed frame to the accumulator and sink
///
/// Frames after the terminal frame are ignored, which is what makes
/// `on_complete` at-most-once when a `{"done":true}` is followed by a
/// `[DONE]` sentinel.
fn apply_frame<S: RenderSink>(
    frame: EventFrame,
    state: &mut StreamState,
    sink: &mut S,
    committed: &mut Option<String>,
) -> Result<()> {
    match frame {
        EventFrame::Delta(delta) => {
            if committed.is_none() {
                increment_counter!(FRAMES_TOTAL, "kind" => "delta");
                let snapshot = state.accumulator.append(&delta);
                sink.on_delta(snapshot);
            }
        }
        EventFrame::Done => {
            increment_counter!(FRAMES_TOTAL, "kind" => "done");
            if committed.is_none() {
                let final_text = state.accumulator.take();
                sink.on_complete(&final_text)?;
                *committed = Some(final_text);
            }
        }
        EventFrame::Malformed { raw } => {
            increment_counter!(MALFORMED_TOTAL);
            tracing::warn!("skipping malformed stream frame: {}", raw);
        }
    }
    Ok(())
}

/// Fails the exchange: notifies the sink, clears state, records the outcome
fn fail<S: RenderSink>(
    state: &mut StreamState,
    sink: &mut S,
    error: KintsugiError,
) -> anyhow::Error {
    sink.on_error(&error);
    state.finish();
    increment_counter!(EXCHANGES_TOTAL, "outcome" => "errored");
    error.into()
}

/// Clears state after a failed commit (the sink already knows -- the error
/// came out of it)
fn commit_failed(state: &mut StreamState, error: anyhow::Error) -> anyhow::Error {
    state.finish();
    increment_counter!(EXCHANGES_TOTAL, "outcome" => "errored");
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use tokio_stream as stream;

    /// Sink that records every callback for assertions
    #[derive(Debug, Default)]
    struct RecordingSink {
        deltas: Vec<String>,
        completions: Vec<String>,
        errors: Vec<String>,
    }

    impl RenderSink for RecordingSink {
        fn on_delta(&mut self, snapshot: &str) {
            self.deltas.push(snapshot.to_string());
        }

        fn on_complete(&mut self, final_text: &str) -> Result<()> {
            self.completions.push(final_text.to_string());
            Ok(())
        }

        fn on_error(&mut self, error: &KintsugiError) {
            self.errors.push(error.to_string());
        }
    }

    /// Sink whose commit always fails
    struct FailingCommitSink;

    impl RenderSink for FailingCommitSink {
        fn on_delta(&mut self, _snapshot: &str) {}

        fn on_complete(&mut self, _final_text: &str) -> Result<()> {
            Err(KintsugiError::Store("gone".to_string()).into())
        }

        fn on_error(&mut self, _error: &KintsugiError) {}
    }

    fn chunks(parts: &[&str]) -> Vec<std::result::Result<Bytes, io::Error>> {
        parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p.as_bytes())))
            .collect()
    }

    fn options() -> ExchangeOptions {
        ExchangeOptions {
            chunk_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_basic_exchange_commits_concatenated_deltas() {
        let body = chunks(&[
            "data: {\"delta\":\"Hel\"}\n\n",
            "data: {\"delta\":\"lo\"}\n\n",
            "data: {\"done\":true}\n\n",
        ]);
        let mut state = StreamState::new();
        let mut sink = RecordingSink::default();
        let cancel = CancellationToken::new();

        let outcome = run_exchange(
            stream::iter(body),
            &mut state,
            &mut sink,
            &cancel,
            &options(),
        )
        .await
        .unwrap();

        assert_eq!(
            outcome,
            ExchangeOutcome::Committed {
                final_text: "Hello".to_string()
            }
        );
        assert_eq!(sink.deltas, vec!["Hel", "Hello"]);
        assert_eq!(sink.completions, vec!["Hello"]);
        assert!(sink.errors.is_empty());
        assert!(!state.is_streaming());
        assert_eq!(state.snapshot(), "");
    }

    #[tokio::test]
    async fn test_chunking_invariance_through_full_pipeline() {
        let body = "data: {\"delta\":\"The quick\"}\n\ndata: {\"delta\":\" brown fox\"}\n\ndata: {\"done\":true}\n\n";
        let bytes = body.as_bytes();

        for split in [1usize, 7, 13, 26, bytes.len() - 1] {
            let parts = vec![
                Ok::<_, io::Error>(Bytes::copy_from_slice(&bytes[..split])),
                Ok(Bytes::copy_from_slice(&bytes[split..])),
            ];
            let mut state = StreamState::new();
            let mut sink = RecordingSink::default();
            let cancel = CancellationToken::new();

            let outcome = run_exchange(
                stream::iter(parts),
                &mut state,
                &mut sink,
                &cancel,
                &options(),
            )
            .await
            .unwrap();

            assert_eq!(
                outcome,
                ExchangeOutcome::Committed {
                    final_text: "The quick brown fox".to_string()
                },
                "split at byte {}",
                split
            );
        }
    }

    #[tokio::test]
    async fn test_multibyte_char_split_across_chunks() {
        // "né" with the é split between two transport chunks.
        let frame = "data: {\"delta\":\"né\"}\n\ndata: {\"done\":true}\n\n".as_bytes();
        // Find the é (0xC3 0xA9) and split between its bytes.
        let split = frame.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let parts = vec![
            Ok::<_, io::Error>(Bytes::copy_from_slice(&frame[..split])),
            Ok(Bytes::copy_from_slice(&frame[split..])),
        ];

        let mut state = StreamState::new();
        let mut sink = RecordingSink::default();
        let cancel = CancellationToken::new();

        let outcome = run_exchange(
            stream::iter(parts),
            &mut state,
            &mut sink,
            &cancel,
            &options(),
        )
        .await
        .unwrap();

        assert_eq!(
            outcome,
            ExchangeOutcome::Committed {
                final_text: "né".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_malformed_frame_skipped_and_absent_from_commit() {
        let body = chunks(&[
            "data: not-json\n\n",
            "data: {\"delta\":\"ok\"}\n\n",
            "data: [DONE]\n\n",
        ]);
        let mut state = StreamState::new();
        let mut sink = RecordingSink::default();
        let cancel = CancellationToken::new();

        let outcome = run_exchange(
            stream::iter(body),
            &mut state,
            &mut sink,
            &cancel,
            &options(),
        )
        .await
        .unwrap();

        assert_eq!(
            outcome,
            ExchangeOutcome::Committed {
                final_text: "ok".to_string()
            }
        );
        assert_eq!(sink.completions, vec!["ok"]);
    }

    #[tokio::test]
    async fn test_complete_fires_once_with_both_terminal_forms() {
        let body = chunks(&[
            "data: {\"delta\":\"x\"}\n\n",
            "data: {\"done\":true}\n\ndata: [DONE]\n\n",
        ]);
        let mut state = StreamState::new();
        let mut sink = RecordingSink::default();
        let cancel = CancellationToken::new();

        run_exchange(
            stream::iter(body),
            &mut state,
            &mut sink,
            &cancel,
            &options(),
        )
        .await
        .unwrap();

        assert_eq!(sink.completions.len(), 1);
    }

    #[tokio::test]
    async fn test_deltas_after_terminal_frame_ignored() {
        let body = chunks(&["data: {\"done\":true}\n\ndata: {\"delta\":\"late\"}\n\n"]);
        let mut state = StreamState::new();
        let mut sink = RecordingSink::default();
        let cancel = CancellationToken::new();

        let outcome = run_exchange(
            stream::iter(body),
            &mut state,
            &mut sink,
            &cancel,
            &options(),
        )
        .await
        .unwrap();

        assert_eq!(
            outcome,
            ExchangeOutcome::Committed {
                final_text: String::new()
            }
        );
        assert!(sink.deltas.is_empty());
    }

    #[tokio::test]
    async fn test_trailing_sentinel_without_blank_line() {
        let body = chunks(&["data: {\"delta\":\"hi\"}\n\n", "data: [DONE]"]);
        let mut state = StreamState::new();
        let mut sink = RecordingSink::default();
        let cancel = CancellationToken::new();

        let outcome = run_exchange(
            stream::iter(body),
            &mut state,
            &mut sink,
            &cancel,
            &options(),
        )
        .await
        .unwrap();

        assert_eq!(
            outcome,
            ExchangeOutcome::Committed {
                final_text: "hi".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_eof_without_terminal_frame_is_transport_error() {
        let body = chunks(&["data: {\"delta\":\"par\"}\n\n"]);
        let mut state = StreamState::new();
        let mut sink = RecordingSink::default();
        let cancel = CancellationToken::new();

        let result = run_exchange(
            stream::iter(body),
            &mut state,
            &mut sink,
            &cancel,
            &options(),
        )
        .await;

        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<KintsugiError>(),
            Some(KintsugiError::Transport(_))
        ));
        // Partial output was rendered, but nothing was committed and the
        // state is back to idle.
        assert_eq!(sink.deltas, vec!["par"]);
        assert!(sink.completions.is_empty());
        assert_eq!(sink.errors.len(), 1);
        assert!(!state.is_streaming());
        assert_eq!(state.snapshot(), "");
    }

    #[tokio::test]
    async fn test_transport_error_mid_stream() {
        let body: Vec<std::result::Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"data: {\"delta\":\"a\"}\n\n")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ];
        let mut state = StreamState::new();
        let mut sink = RecordingSink::default();
        let cancel = CancellationToken::new();

        let result = run_exchange(
            stream::iter(body),
            &mut state,
            &mut sink,
            &cancel,
            &options(),
        )
        .await;

        assert!(result.is_err());
        assert!(sink.completions.is_empty());
        assert_eq!(sink.errors.len(), 1);
        assert!(sink.errors[0].contains("reset"));
    }

    #[tokio::test]
    async fn test_chunk_timeout_fails_exchange() {
        let body = stream::pending::<std::result::Result<Bytes, io::Error>>();
        let mut state = StreamState::new();
        let mut sink = RecordingSink::default();
        let cancel = CancellationToken::new();
        let opts = ExchangeOptions {
            chunk_timeout: Duration::from_millis(50),
        };

        let result = run_exchange(body, &mut state, &mut sink, &cancel, &opts).await;

        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<KintsugiError>(),
            Some(KintsugiError::Transport(_))
        ));
        assert!(!state.is_streaming());
    }

    #[tokio::test]
    async fn test_cancellation_discards_partial_output() {
        let head = chunks(&["data: {\"delta\":\"par\"}\n\n"]);
        let body = stream::iter(head).chain(stream::pending());
        let mut state = StreamState::new();
        let mut sink = RecordingSink::default();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let outcome = run_exchange(body, &mut state, &mut sink, &cancel, &options())
            .await
            .unwrap();

        assert_eq!(outcome, ExchangeOutcome::Cancelled);
        assert!(sink.completions.is_empty());
        assert!(sink.errors.is_empty());
        assert!(!state.is_streaming());
        assert_eq!(state.snapshot(), "");
    }

    #[tokio::test]
    async fn test_reentrancy_rejected() {
        let mut state = StreamState::new();
        state.begin().unwrap();

        let body = chunks(&["data: [DONE]\n\n"]);
        let mut sink = RecordingSink::default();
        let cancel = CancellationToken::new();

        let result = run_exchange(
            stream::iter(body),
            &mut state,
            &mut sink,
            &cancel,
            &options(),
        )
        .await;

        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<KintsugiError>(),
            Some(KintsugiError::Reentrancy(_))
        ));
        // The original exchange's state is untouched by the rejected one.
        assert!(state.is_streaming());
    }

    #[tokio::test]
    async fn test_failed_commit_propagates_and_resets_state() {
        let body = chunks(&["data: {\"delta\":\"x\"}\n\ndata: {\"done\":true}\n\n"]);
        let mut state = StreamState::new();
        let mut sink = FailingCommitSink;
        let cancel = CancellationToken::new();

        let result = run_exchange(
            stream::iter(body),
            &mut state,
            &mut sink,
            &cancel,
            &options(),
        )
        .await;

        assert!(result.is_err());
        assert!(!state.is_streaming());
    }

    #[test]
    fn test_stream_state_begin_finish_cycle() {
        let mut state = StreamState::new();
        state.begin().unwrap();
        assert!(state.is_streaming());
        state.finish();
        assert!(!state.is_streaming());
        // Reusable after finish.
        state.begin().unwrap();
    }

    #[test]
    fn test_default_options() {
        let opts = ExchangeOptions::default();
        assert_eq!(opts.chunk_timeout, DEFAULT_CHUNK_TIMEOUT);
    }
}
