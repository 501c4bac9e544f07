//! Stateful UTF-8 decoding for chunked transport bodies
//!
//! HTTP chunk boundaries fall wherever the network decides, which means a
//! multi-byte UTF-8 sequence can be split across two chunks. Decoding each
//! chunk independently mangles those characters; this decoder carries the
//! incomplete trailing bytes of one chunk over to the next so the decoded
//! text is identical regardless of how the bytes were chunked.

/// Incremental UTF-8 decoder for a stream of byte chunks
///
/// Feed chunks in arrival order with [`decode`](Utf8StreamDecoder::decode);
/// call [`finish`](Utf8StreamDecoder::finish) once the stream ends to flush
/// any dangling partial sequence.
///
/// Invalid (not merely incomplete) sequences are replaced with U+FFFD so a
/// corrupt chunk cannot poison the rest of the stream.
///
/// # Examples
///
/// ```
/// use kintsugi::stream::Utf8StreamDecoder;
///
/// let mut decoder = Utf8StreamDecoder::new();
/// // "é" (0xC3 0xA9) split across two chunks
/// assert_eq!(decoder.decode(&[b'h', 0xC3]), "h");
/// assert_eq!(decoder.decode(&[0xA9, b'!']), "é!");
/// assert_eq!(decoder.finish(), "");
/// ```
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    /// Incomplete trailing bytes of the previous chunk (at most 3).
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    /// Creates a new decoder with no pending bytes
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes one chunk, returning all text that is complete so far
    ///
    /// Any incomplete multi-byte sequence at the end of the chunk is held
    /// back and prepended to the next call.
    ///
    /// # Arguments
    ///
    /// * `chunk` - The next raw byte chunk from the transport
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let data: Vec<u8> = if self.pending.is_empty() {
            chunk.to_vec()
        } else {
            let mut joined = std::mem::take(&mut self.pending);
            joined.extend_from_slice(chunk);
            joined
        };

        let mut out = String::with_capacity(data.len());
        let mut rest: &[u8] = &data;

        while !rest.is_empty() {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    rest = &[];
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    if let Ok(text) = std::str::from_utf8(&rest[..valid]) {
                        out.push_str(text);
                    }
                    match e.error_len() {
                        // Invalid sequence: substitute and keep going.
                        Some(len) => {
                            out.push('\u{FFFD}');
                            rest = &rest[valid + len..];
                        }
                        // Incomplete sequence at the end of input: hold it
                        // for the next chunk.
                        None => {
                            self.pending = rest[valid..].to_vec();
                            rest = &[];
                        }
                    }
                }
            }
        }

        out
    }

    /// Flushes any pending incomplete sequence as a replacement character
    ///
    /// Call after the transport reports end-of-stream. A stream that ends
    /// mid-character yields one U+FFFD; a cleanly terminated stream yields
    /// an empty string.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            "\u{FFFD}".to_string()
        }
    }

    /// Returns true if the decoder is holding an incomplete sequence
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
