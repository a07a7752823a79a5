//! Server-sent-event assembly for plan generation responses.
//!
//! The backend streams `data: {"content": "..."}` lines terminated by
//! `data: [DONE]`, or `data: {"error": "..."}` on failure. Chunk boundaries
//! from the transport do not line up with lines (or even with UTF-8
//! characters), so incomplete tails are carried over between pushes.

pub mod session;

pub use session::{PlanStream, PlanUpdate, StreamPhase};

use serde_json::Value;
use tracing::{debug, warn};

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";
/// Bookkeeping messages from the chat endpoints that carry no text.
const CONTROL_TYPES: &[&str] = &["session_id", "message_id", "done"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Content(String),
    Done,
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssemblerState {
    Open,
    Done,
    Failed,
}

#[derive(Debug)]
pub struct SseAssembler {
    /// Bytes after the last newline seen so far.
    pending: Vec<u8>,
    content: String,
    state: AssemblerState,
}

impl Default for SseAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl SseAssembler {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            content: String::new(),
            state: AssemblerState::Open,
        }
    }

    /// Everything accumulated from `content` fragments so far.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_closed(&self) -> bool {
        self.state != AssemblerState::Open
    }

    pub fn is_done(&self) -> bool {
        self.state == AssemblerState::Done
    }

    /// Feed one transport chunk; returns the events completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.is_closed() {
            return events;
        }
        self.pending.extend_from_slice(chunk);

        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.handle_line(&line[..pos], &mut events);
            if self.is_closed() {
                self.pending.clear();
                break;
            }
        }
        events
    }

    /// End of body: a last line without a trailing newline still counts.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.is_closed() || self.pending.is_empty() {
            self.pending.clear();
            return events;
        }
        let line = std::mem::take(&mut self.pending);
        self.handle_line(&line, &mut events);
        events
    }

    fn handle_line(&mut self, raw: &[u8], events: &mut Vec<StreamEvent>) {
        let line = String::from_utf8_lossy(raw);
        let line = line.strip_suffix('\r').unwrap_or(line.as_ref());
        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            return;
        };

        match parse_payload(payload) {
            Fragment::Done => {
                self.state = AssemblerState::Done;
                events.push(StreamEvent::Done);
            }
            Fragment::Error(message) => {
                warn!("backend reported stream error: {}", message);
                self.state = AssemblerState::Failed;
                events.push(StreamEvent::Error(message));
            }
            Fragment::Content(text) => {
                if !text.is_empty() {
                    self.content.push_str(&text);
                    events.push(StreamEvent::Content(text));
                }
            }
            Fragment::Skip => {}
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Fragment {
    Content(String),
    Done,
    Error(String),
    Skip,
}

/// `payload` is everything after `data: `; plain text keeps its whitespace.
fn parse_payload(payload: &str) -> Fragment {
    let trimmed = payload.trim();
    if trimmed == DONE_SENTINEL {
        return Fragment::Done;
    }
    if trimmed.is_empty() {
        return Fragment::Skip;
    }

    let value = match serde_json::from_str::<Value>(trimmed) {
        Ok(v) => v,
        Err(e) => {
            if trimmed.starts_with('{') || trimmed.starts_with('[') {
                warn!("skipping malformed stream fragment: {} (data: {:.120})", e, trimmed);
                return Fragment::Skip;
            }
            // Some endpoints send bare text rather than JSON-wrapped content.
            return Fragment::Content(payload.to_string());
        }
    };

    match value {
        Value::Object(obj) => {
            if let Some(err) = obj.get("error") {
                let message = match err {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                return Fragment::Error(message);
            }

            if let Some(kind) = obj.get("type").and_then(Value::as_str) {
                if CONTROL_TYPES.contains(&kind) {
                    debug!("skipping control fragment of type {}", kind);
                    return Fragment::Skip;
                }
                if kind == "error" {
                    let message = obj
                        .get("data")
                        .or_else(|| obj.get("message"))
                        .and_then(Value::as_str)
                        .unwrap_or("stream error")
                        .to_string();
                    return Fragment::Error(message);
                }
            }

            for key in ["content", "message", "text", "data"] {
                if let Some(text) = obj.get(key).and_then(Value::as_str) {
                    return Fragment::Content(text.to_string());
                }
            }

            let delta = obj
                .get("choices")
                .and_then(|c| c.get(0))
                .and_then(|c| c.get("delta"))
                .and_then(|d| d.get("content"))
                .and_then(Value::as_str);
            match delta {
                Some(text) => Fragment::Content(text.to_string()),
                None => {
                    debug!("stream fragment without content: {:.120}", trimmed);
                    Fragment::Skip
                }
            }
        }
        Value::String(text) => Fragment::Content(text),
        _ => Fragment::Skip,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_all(assembler: &mut SseAssembler, chunks: &[&[u8]]) -> Vec<StreamEvent> {
        chunks.iter().flat_map(|c| assembler.push(c)).collect()
    }

    #[test]
    fn accumulates_content_until_done() {
        let mut a = SseAssembler::new();
        let events = push_all(
            &mut a,
            &[
                b"data: {\"content\":\"A\"}\n",
                b"data: {\"content\":\"B\"}\n",
                b"data: [DONE]\n",
            ],
        );
        assert_eq!(a.content(), "AB");
        assert_eq!(
            events,
            vec![
                StreamEvent::Content("A".into()),
                StreamEvent::Content("B".into()),
                StreamEvent::Done,
            ]
        );
        assert!(a.is_done());
        assert!(a.push(b"data: [DONE]\n").is_empty());
        assert!(a.finish().is_empty());
    }

    #[test]
    fn error_fragment_is_terminal() {
        let mut a = SseAssembler::new();
        let events = push_all(
            &mut a,
            &[
                b"data: {\"content\":\"A\"}\ndata: {\"error\":\"quota exceeded\"}\n",
                b"data: {\"content\":\"B\"}\n",
            ],
        );
        assert_eq!(
            events,
            vec![
                StreamEvent::Content("A".into()),
                StreamEvent::Error("quota exceeded".into()),
            ]
        );
        assert_eq!(a.content(), "A");
        assert!(a.is_closed());
        assert!(!a.is_done());
    }

    #[test]
    fn lines_split_across_chunks_are_reassembled() {
        let mut a = SseAssembler::new();
        let events = push_all(
            &mut a,
            &[b"data: {\"cont", b"ent\":\"hel", b"lo\"}\n\nda", b"ta: [DONE]\n"],
        );
        assert_eq!(a.content(), "hello");
        assert_eq!(events.last(), Some(&StreamEvent::Done));
    }

    #[test]
    fn multibyte_characters_split_across_chunks() {
        let line = "data: {\"content\":\"晨间冥想\"}\n".as_bytes();
        // Cut inside the three-byte encoding of 晨.
        let cut = line.iter().position(|&b| b >= 0x80).unwrap() + 1;
        let mut a = SseAssembler::new();
        assert!(a.push(&line[..cut]).is_empty());
        assert_eq!(a.push(&line[cut..]), vec![StreamEvent::Content("晨间冥想".into())]);
    }

    #[test]
    fn other_lines_and_control_messages_are_ignored() {
        let mut a = SseAssembler::new();
        push_all(
            &mut a,
            &[
                b": keep-alive\n",
                b"event: token\r\n",
                b"data: {\"type\":\"session_id\",\"data\":\"42\"}\n",
                b"data: {\"type\":\"content\",\"data\":\"hi\"}\r\n",
            ],
        );
        assert_eq!(a.content(), "hi");
    }

    #[test]
    fn plain_text_payload_is_content_but_broken_json_is_skipped() {
        let mut a = SseAssembler::new();
        push_all(&mut a, &[b"data: just text\n", b"data: {\"content\":\n", b"data: \"!\"\n"]);
        assert_eq!(a.content(), "just text!");
    }

    #[test]
    fn plain_text_keeps_its_spaces() {
        let mut a = SseAssembler::new();
        let events = push_all(&mut a, &[b"data: hello \n", b"data: world\r\n", b"data:  [DONE] \n"]);
        assert_eq!(a.content(), "hello world");
        assert_eq!(events.last(), Some(&StreamEvent::Done));
    }

    #[test]
    fn openai_style_delta_is_understood() {
        let mut a = SseAssembler::new();
        push_all(&mut a, &[b"data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n"]);
        assert_eq!(a.content(), "x");
    }

    #[test]
    fn typed_error_message_is_terminal() {
        let mut a = SseAssembler::new();
        let events = a.push(b"data: {\"type\":\"error\",\"data\":\"boom\"}\n");
        assert_eq!(events, vec![StreamEvent::Error("boom".into())]);
    }

    #[test]
    fn finish_flushes_an_unterminated_last_line() {
        let mut a = SseAssembler::new();
        assert!(a.push(b"data: {\"content\":\"tail\"}").is_empty());
        assert_eq!(a.finish(), vec![StreamEvent::Content("tail".into())]);
    }
}
