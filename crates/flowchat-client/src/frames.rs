//! Frame parsing for the `message:` / `data:` response framing.
//!
//! A response body looks like
//!
//! ```text
//! message:
//! data:{"event":"token","data":"Hel"}
//!
//! message:
//! data:{"event":"token","data":"Hello"}
//! ```
//!
//! but chunk boundaries fall anywhere, and the server sometimes truncates a
//! payload. [`FrameDecoder`] carries an unfinished trailing frame over to the
//! next chunk, repairs payloads that still do not parse, and drops (with a
//! warning) the ones it cannot repair without stopping the stream.

use flowchat_types::{StreamEvent, DONE_SENTINEL};

use crate::repair::repair_json;

const FRAME_PREFIX: &str = "message:";
const DATA_PREFIX: &str = "data:";
const FRAME_TERMINATOR: &str = "\n\n";

/// Upper bound on text held back between chunks.
pub const MAX_CARRY_BYTES: usize = 1024 * 1024;

#[derive(Debug)]
struct RawFrame<'a> {
    /// Offset of the segment this frame was read from.
    start: usize,
    /// Offset just past the text this frame accounts for.
    end: usize,
    payload: Option<&'a str>,
    /// Followed by a blank line or by another segment.
    terminated: bool,
}

/// Offsets of `message:` prefixes that start the buffer or a line.
fn segment_starts(buffer: &str) -> Vec<usize> {
    let bytes = buffer.as_bytes();
    let mut starts: Vec<usize> = buffer
        .match_indices(FRAME_PREFIX)
        .map(|(index, _)| index)
        .filter(|index| *index == 0 || bytes[index - 1] == b'\n')
        .collect();

    if starts.first() != Some(&0) {
        starts.insert(0, 0);
    }

    starts
}

/// Offset of a `data:` field that begins a line of `body`.
fn find_data_field(body: &str) -> Option<usize> {
    body.match_indices(DATA_PREFIX)
        .map(|(index, _)| index)
        .find(|index| {
            let line_start = body[..*index].rfind('\n').map(|i| i + 1).unwrap_or(0);
            body[line_start..*index].trim().is_empty()
        })
}

fn split_frames(buffer: &str) -> Vec<RawFrame<'_>> {
    let starts = segment_starts(buffer);
    let mut frames = Vec::with_capacity(starts.len());

    for (index, start) in starts.iter().copied().enumerate() {
        let segment_end = starts.get(index + 1).copied().unwrap_or(buffer.len());
        let is_last = index + 1 == starts.len();

        let mut cursor = if buffer[start..].starts_with(FRAME_PREFIX) {
            start + FRAME_PREFIX.len()
        } else {
            start
        };
        let mut frame_start = start;

        // A segment normally holds one data field, but plain `data:` framing
        // without `message:` prefixes puts every frame in a single segment.
        loop {
            let Some(data_offset) = find_data_field(&buffer[cursor..segment_end]) else {
                if frame_start == start {
                    frames.push(RawFrame {
                        start,
                        end: segment_end,
                        payload: None,
                        terminated: !is_last,
                    });
                }
                break;
            };

            let payload_start = cursor + data_offset + DATA_PREFIX.len();
            let region = &buffer[payload_start..segment_end];

            match region.find(FRAME_TERMINATOR) {
                Some(offset) => {
                    let end = payload_start + offset + FRAME_TERMINATOR.len();
                    frames.push(RawFrame {
                        start: frame_start,
                        end,
                        payload: Some(region[..offset].trim()),
                        terminated: true,
                    });
                    cursor = end;
                    frame_start = end;
                }
                None => {
                    frames.push(RawFrame {
                        start: frame_start,
                        end: segment_end,
                        payload: Some(region.trim()),
                        terminated: !is_last,
                    });
                    break;
                }
            }
        }
    }

    frames
}

fn normalize_line_endings(text: String) -> String {
    if text.contains('\r') {
        return text.replace("\r\n", "\n");
    }
    text
}

/// Incremental frame parser for one response stream.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    carry: String,
    dropped_frames: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next decoded chunk and return the events it completes, in
    /// wire order.
    pub fn push(&mut self, text: &str) -> Vec<StreamEvent> {
        self.carry.push_str(text);
        let buffer = normalize_line_endings(std::mem::take(&mut self.carry));
        let frames = split_frames(&buffer);

        let mut events = Vec::new();
        let mut consumed = 0;
        let frame_count = frames.len();

        for (index, frame) in frames.iter().enumerate() {
            let is_last = index + 1 == frame_count;

            if is_last && !frame.terminated {
                // Hold the frame back unless it already parses on its own.
                match frame.payload.map(StreamEvent::from_json) {
                    Some(Ok(event)) => {
                        events.push(event);
                        consumed = frame.end;
                    }
                    Some(Err(_)) if frame.payload == Some(DONE_SENTINEL) => {
                        events.push(StreamEvent::done());
                        consumed = frame.end;
                    }
                    _ => consumed = frame.start,
                }
                break;
            }

            if let Some(payload) = frame.payload {
                if let Some(event) = self.decode_payload(payload) {
                    events.push(event);
                }
            }
            consumed = frame.end;
        }

        let rest = &buffer[consumed..];
        if !rest.trim().is_empty() {
            self.carry = rest.to_string();
        }

        if self.carry.len() > MAX_CARRY_BYTES {
            log::warn!(
                "Unterminated frame exceeded {} bytes, flushing it early",
                MAX_CARRY_BYTES
            );
            events.extend(self.finish());
        }

        events
    }

    /// Flush the held-back text at end of stream, repairing it if needed.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let buffer = normalize_line_endings(std::mem::take(&mut self.carry));
        if buffer.trim().is_empty() {
            return Vec::new();
        }

        let frames = split_frames(&buffer);
        let mut events = Vec::new();
        for payload in frames.iter().filter_map(|frame| frame.payload) {
            if let Some(event) = self.decode_payload(payload) {
                events.push(event);
            }
        }
        events
    }

    /// Number of frames dropped because they could not be parsed or repaired.
    pub fn dropped_frames(&self) -> usize {
        self.dropped_frames
    }

    fn decode_payload(&mut self, payload: &str) -> Option<StreamEvent> {
        if payload.is_empty() {
            return None;
        }

        if payload == DONE_SENTINEL {
            return Some(StreamEvent::done());
        }

        let err = match StreamEvent::from_json(payload) {
            Ok(event) => return Some(event),
            Err(err) => err,
        };

        if let Some(repaired) = repair_json(payload) {
            match StreamEvent::from_json(&repaired) {
                Ok(event) => {
                    log::debug!("Recovered truncated '{}' frame", event.name());
                    return Some(event);
                }
                Err(repaired_err) => {
                    log::warn!("Dropping frame after repair: {}", repaired_err);
                }
            }
        } else {
            log::warn!("Dropping unrepairable frame: {}", err);
        }

        self.dropped_frames += 1;
        None
    }
}

/// Parse one complete chunk in isolation; every frame in it is final.
pub fn parse_chunk(text: &str) -> Vec<StreamEvent> {
    let mut decoder = FrameDecoder::new();
    let mut events = decoder.push(text);
    events.extend(decoder.finish());
    events
}

#[cfg(test)]
#[path = "frames_test.rs"]
mod tests;
