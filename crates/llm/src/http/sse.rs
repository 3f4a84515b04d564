//! Incremental decoding of streamed completion bodies.
//!
//! Bytes arrive in arbitrary network chunks. [`StreamDecoder`] buffers
//! partial lines across chunks, turns each complete line into a JSON
//! payload according to its [`Framing`], and asks a provider-specific
//! [`DeltaExtractor`] what the payload means.
//!
//! For Server-Sent Events only `data:` lines carry payloads; `event:`,
//! `id:`, `retry:` and `:` comment lines are skipped. The literal payload
//! `[DONE]` ends the stream. A payload that is not valid JSON is logged and
//! skipped without ending the stream; an error object reported by the
//! provider ends it.

use serde_json::Value;

/// How payloads are delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `data: <payload>` lines separated by blank lines
    ServerSentEvents,
    /// one JSON document per line
    NewlineDelimitedJson,
}

/// Meaning of one decoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental completion text
    Delta(String),
    /// The producer signalled the end of the completion
    Done,
    /// The provider reported a failure inside an otherwise successful response
    Error(String),
}

impl StreamEvent {
    /// Whether nothing more should be decoded after this event.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error(_))
    }
}

/// Maps a parsed payload to an event; `None` for payloads without content.
pub type DeltaExtractor = fn(&Value) -> Option<StreamEvent>;

/// Stateful line decoder for one streamed response.
pub struct StreamDecoder {
    framing: Framing,
    extract: DeltaExtractor,
    buffer: Vec<u8>,
    done: bool,
}

impl StreamDecoder {
    pub fn new(framing: Framing, extract: DeltaExtractor) -> Self {
        Self {
            framing,
            extract,
            buffer: Vec::new(),
            done: false,
        }
    }

    /// Decoder for OpenAI-style chat completion chunks.
    pub fn openai_sse() -> Self {
        Self::new(Framing::ServerSentEvents, openai_delta)
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Whether a terminal event has been decoded.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed the next network chunk and return the events it completed.
    ///
    /// Nothing is returned once a terminal event has been produced.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        if self.done {
            return Vec::new();
        }

        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if self.push_line(&line, &mut events) {
                break;
            }
        }
        events
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if !self.done && !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.push_line(&line, &mut events);
        }
        events
    }

    /// Decode one line into `events`; returns true when the stream ended.
    fn push_line(&mut self, raw: &[u8], events: &mut Vec<StreamEvent>) -> bool {
        let Some(event) = self.decode_line(raw) else {
            return false;
        };

        let done = event.is_terminal();
        events.push(event);

        if done {
            self.done = true;
            self.buffer.clear();
        }
        done
    }

    fn decode_line(&self, raw: &[u8]) -> Option<StreamEvent> {
        let text = String::from_utf8_lossy(raw);
        let line = text.trim();
        if line.is_empty() {
            return None;
        }

        let payload = match self.framing {
            Framing::ServerSentEvents => {
                let data = line.strip_prefix("data:")?.trim_start();
                if data == "[DONE]" {
                    return Some(StreamEvent::Done);
                }
                data
            }
            Framing::NewlineDelimitedJson => line,
        };

        match serde_json::from_str::<Value>(payload) {
            Ok(value) => (self.extract)(&value),
            Err(e) => {
                tracing::warn!("Skipping malformed stream event: {} ({})", e, payload);
                None
            }
        }
    }
}

impl std::fmt::Debug for StreamDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamDecoder")
            .field("framing", &self.framing)
            .field("buffered", &self.buffer.len())
            .field("done", &self.done)
            .finish()
    }
}

/// `choices[0].delta.content` of an OpenAI-style chunk.
pub fn openai_delta(value: &Value) -> Option<StreamEvent> {
    if let Some(error) = value.get("error") {
        return Some(StreamEvent::Error(error_text(error)));
    }

    value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .map(|content| StreamEvent::Delta(content.to_string()))
}

/// Readable text for a provider error: a bare string, or an object with a
/// `message` and optionally a `type`.
pub fn error_text(error: &Value) -> String {
    if let Some(text) = error.as_str() {
        return text.to_string();
    }

    let message = error.get("message").and_then(Value::as_str);
    let kind = error.get("type").and_then(Value::as_str);
    match (kind, message) {
        (Some(kind), Some(message)) => format!("{}: {}", kind, message),
        (None, Some(message)) => message.to_string(),
        _ => error.to_string(),
    }
}
