//! Incremental UTF-8 decoding of network chunks.

use bytes::{Buf, BytesMut};

/// Turns a sequence of byte chunks into text without breaking multi-byte
/// characters that straddle a chunk boundary.
///
/// Invalid sequences are replaced with U+FFFD, the same way a non-fatal
/// browser `TextDecoder` behaves.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: BytesMut,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `chunk` (plus any held-back bytes) as forms whole
    /// characters. An incomplete trailing sequence is kept for the next call.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut text = String::with_capacity(self.pending.len());

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(valid) => {
                    text.push_str(valid);
                    self.pending.clear();
                    break;
                }
                Err(err) => {
                    let valid_up_to = err.valid_up_to();
                    text.push_str(std::str::from_utf8(&self.pending[..valid_up_to]).unwrap_or_default());

                    match err.error_len() {
                        Some(invalid_len) => {
                            log::warn!(
                                "Replacing {} invalid UTF-8 byte(s) in response stream",
                                invalid_len
                            );
                            text.push(char::REPLACEMENT_CHARACTER);
                            self.pending.advance(valid_up_to + invalid_len);
                        }
                        None => {
                            self.pending.advance(valid_up_to);
                            break;
                        }
                    }
                }
            }
        }

        text
    }

    /// Flush whatever is still held back at end of stream.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }

        log::warn!(
            "Response stream ended inside a UTF-8 sequence ({} byte(s) pending)",
            self.pending.len()
        );
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }

    /// Whether bytes are held back waiting for the rest of a character.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
