//! SSE re-framer for streaming chat completions.
//!
//! Consumes raw upstream bytes in whatever chunks the transport delivers,
//! reassembles complete `data: ` lines, and turns each upstream delta into a
//! client-schema `chat.completion.chunk` record.

use bytes::Bytes;
use serde_json::Value;

use crate::models::chat::{completion_id, unix_now, Delta, StreamChoice, StreamChunk};

const DATA_PREFIX: &str = "data: ";
const DONE_MARKER: &str = "[DONE]";

/// One outbound record.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Chunk(StreamChunk),
    /// Terminal `[DONE]` sentinel.
    Done,
}

impl StreamEvent {
    /// Frame the record for the wire: `data: <json>\n\n`, or the literal
    /// `data: [DONE]\n\n` for the sentinel.
    pub fn to_sse_bytes(&self) -> Bytes {
        match self {
            StreamEvent::Chunk(chunk) => match serde_json::to_string(chunk) {
                Ok(json) => Bytes::from(format!("{DATA_PREFIX}{json}\n\n")),
                Err(e) => {
                    // StreamChunk only holds strings and integers; this is unreachable in practice.
                    tracing::error!("Failed to serialize stream chunk: {}", e);
                    Bytes::new()
                }
            },
            StreamEvent::Done => Bytes::from_static(b"data: [DONE]\n\n"),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, StreamEvent::Done)
    }
}

/// Per-request stream state machine.
///
/// `carry` holds the bytes after the last newline seen so far. It is kept as
/// raw bytes (not text) so a multi-byte character split across transport
/// chunks is decoded only once the whole line has arrived.
pub struct StreamReframer {
    id: String,
    created: i64,
    model: String,
    carry: Vec<u8>,
    done_sent: bool,
    /// Lines dropped because their payload was not valid JSON.
    malformed: u32,
}

impl StreamReframer {
    /// `client_model` is echoed in every chunk instead of the backend id.
    pub fn new(client_model: impl Into<String>) -> Self {
        Self {
            id: completion_id(),
            created: unix_now(),
            model: client_model.into(),
            carry: Vec::new(),
            done_sent: false,
            malformed: 0,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done_sent
    }

    pub fn malformed_lines(&self) -> u32 {
        self.malformed
    }

    /// Feed one transport chunk; returns the records it completes, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.carry.extend_from_slice(chunk);

        let Some(last_newline) = self.carry.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        // Everything up to and including the last newline is complete; the
        // rest stays behind for the next chunk.
        let tail = self.carry.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.carry, tail);

        let mut events = Vec::new();
        for raw_line in complete.split(|&b| b == b'\n') {
            if let Some(event) = self.process_line(raw_line) {
                events.push(event);
            }
        }
        events
    }

    /// Upstream ended normally. Returns the sentinel unless it already went
    /// out. Bytes left in the carry buffer never formed a complete line and
    /// are discarded.
    pub fn finish(&mut self) -> Option<StreamEvent> {
        if !self.carry.is_empty() {
            tracing::debug!(bytes = self.carry.len(), "Discarding unterminated trailing line");
            self.carry.clear();
        }
        if self.done_sent {
            return None;
        }
        self.done_sent = true;
        Some(StreamEvent::Done)
    }

    fn process_line(&mut self, raw_line: &[u8]) -> Option<StreamEvent> {
        let raw_line = raw_line.strip_suffix(b"\r").unwrap_or(raw_line);
        let line = String::from_utf8_lossy(raw_line);
        let payload = line.strip_prefix(DATA_PREFIX)?;

        // Only a bare marker ends the stream; a delta whose text mentions it
        // is ordinary content.
        if payload.trim() == DONE_MARKER {
            if self.done_sent {
                return None;
            }
            self.done_sent = true;
            return Some(StreamEvent::Done);
        }

        let upstream: Value = match serde_json::from_str(payload) {
            Ok(v @ Value::Object(_)) => v,
            Ok(other) => {
                self.malformed += 1;
                tracing::warn!("Dropping non-object stream event: {}", other);
                return None;
            }
            Err(e) => {
                self.malformed += 1;
                tracing::warn!(error = %e, "Dropping malformed stream line: {}", payload);
                return None;
            }
        };

        Some(StreamEvent::Chunk(self.build_chunk(&upstream)))
    }

    fn build_chunk(&self, upstream: &Value) -> StreamChunk {
        let choice = upstream.pointer("/choices/0");
        let delta = choice.and_then(|c| c.get("delta"));

        let role = delta
            .and_then(|d| d.get("role"))
            .and_then(Value::as_str)
            .filter(|r| !r.is_empty())
            .map(str::to_string);
        let content = delta
            .and_then(|d| d.get("content"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let finish_reason = choice
            .and_then(|c| c.get("finish_reason"))
            .and_then(Value::as_str)
            .map(str::to_string);

        StreamChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".into(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![StreamChoice {
                index: 0,
                delta: Delta { role, content },
                finish_reason,
            }],
        }
    }
}
