//! Accumulation of streamed assistant text
//!
//! Holds the in-progress assistant message for one exchange. Deltas are
//! appended in arrival order; the full snapshot is exposed for rendering
//! after each append. Nothing here re-parses or re-scans prior content --
//! each append costs only the delta.

/// Transient buffer for the in-progress assistant message
///
/// Created when an exchange starts, appended to on every delta frame, and
/// drained (or reset) when the exchange ends.
///
/// # Examples
///
/// ```
/// use kintsugi::stream::StreamAccumulator;
///
/// let mut acc = StreamAccumulator::new();
/// assert_eq!(acc.append("Hel"), "Hel");
/// assert_eq!(acc.append("lo"), "Hello");
/// assert_eq!(acc.take(), "Hello");
/// assert!(acc.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
}

impl StreamAccumulator {
    /// Creates an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a delta and returns the full snapshot so far
    pub fn append(&mut self, delta: &str) -> &str {
        self.text.push_str(delta);
        &self.text
    }

    /// Returns the current snapshot without modifying it
    pub fn snapshot(&self) -> &str {
        &self.text
    }

    /// Clears the buffer
    pub fn reset(&mut self) {
        self.text.clear();
    }

    /// Takes the accumulated text, leaving the buffer empty
    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.text)
    }

    /// Returns true if nothing has been accumulated
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Returns the accumulated length in bytes
    pub fn len(&self) -> usize {
        self.text.len()
    }
}
