//! Server-sent events decoding for the session stream
//!
//! [`SseDecoder`] turns arbitrarily chunked response bytes into complete
//! frames; [`ParsedFrame::parse`] maps a frame onto the stream's event
//! vocabulary (`connected`, `message`, `heartbeat`, `error`).

use serde::Deserialize;

use crate::core::error::{McpError, McpResult};
use crate::protocol::methods;
use crate::protocol::types::JsonRpcEnvelope;

/// One dispatched SSE event
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseFrame {
    /// Value of the last `event:` field, if any
    pub event: Option<String>,
    /// `data:` lines joined with `\n`
    pub data: String,
    /// Value of the last `id:` field, if any
    pub id: Option<String>,
}

impl SseFrame {
    /// Event name, defaulting to `message`
    pub fn event_name(&self) -> &str {
        self.event.as_deref().unwrap_or(methods::EVENT_MESSAGE)
    }
}

/// Incremental SSE decoder.
///
/// Bytes are buffered until a full line is available, so frames and UTF-8
/// sequences may be split across chunks. A frame is emitted at each blank
/// line; a trailing frame without one is never emitted.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect every frame it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw[..newline]);
            let line = line.strip_suffix('\r').unwrap_or(&line);

            if let Some(frame) = self.process_line(line) {
                frames.push(frame);
            }
        }
        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            // retry and unknown fields
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        if self.data.is_empty() && self.event.is_none() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            event: self.event.take(),
            data,
            id: self.id.take(),
        })
    }
}

/// Event delivered by the session stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// The server bound this stream to a session
    Connected { session_id: String },
    /// A response or notification envelope
    Message(JsonRpcEnvelope),
    /// Keep-alive; carries nothing the client acts on
    Heartbeat,
}

/// Outcome of interpreting one frame
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedFrame {
    Event(StreamEvent),
    /// The server reported a stream failure; the stream should be reopened
    ServerError(String),
    /// Unknown event name
    Ignored(String),
}

#[derive(Deserialize)]
struct ConnectedData {
    session_id: String,
}

#[derive(Deserialize)]
struct ErrorData {
    #[serde(default)]
    error: Option<String>,
}

impl ParsedFrame {
    /// Interpret a decoded frame.
    ///
    /// Malformed payloads for known events are errors; the caller decides
    /// whether to skip them.
    pub fn parse(frame: &SseFrame) -> McpResult<Self> {
        match frame.event_name() {
            methods::EVENT_CONNECTED => {
                let data: ConnectedData = serde_json::from_str(&frame.data).map_err(|e| {
                    McpError::protocol(format!("invalid connected event payload: {e}"))
                })?;
                Ok(ParsedFrame::Event(StreamEvent::Connected {
                    session_id: data.session_id,
                }))
            }
            methods::EVENT_MESSAGE => {
                let envelope: JsonRpcEnvelope = serde_json::from_str(&frame.data)?;
                Ok(ParsedFrame::Event(StreamEvent::Message(envelope)))
            }
            methods::EVENT_HEARTBEAT => Ok(ParsedFrame::Event(StreamEvent::Heartbeat)),
            methods::EVENT_ERROR => {
                let message = serde_json::from_str::<ErrorData>(&frame.data)
                    .ok()
                    .and_then(|data| data.error)
                    .unwrap_or_else(|| frame.data.clone());
                Ok(ParsedFrame::ServerError(message))
            }
            other => Ok(ParsedFrame::Ignored(other.to_string())),
        }
    }
}
