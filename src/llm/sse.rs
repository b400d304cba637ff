//! Server-sent-event decoding for the `/v1/responses` stream.
//!
//! Only `data:` lines matter.  Each carries a JSON object whose `type` picks
//! the event; `event:` lines, comments, blank keep-alives, `[DONE]` and
//! undecodable payloads are skipped.

use std::io::BufRead;

use serde_json::Value;

use crate::llm::client::ChatError;

/// A decoded stream event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A piece of reply text.
    Delta(String),
    /// The reply is complete.
    Completed,
    /// The server aborted the reply.
    Error(String),
}

/// Decode one SSE line.  `None` means "nothing to act on".
pub fn parse_line(line: &str) -> Option<StreamEvent> {
    let data = line.trim().strip_prefix("data:")?.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    let json: Value = serde_json::from_str(data).ok()?;

    match json.get("type").and_then(Value::as_str).unwrap_or_default() {
        "response.output_text.delta" => non_empty(json.get("delta")),
        "response.content_part.added" => non_empty(json.pointer("/part/text")),
        "response.completed" => Some(StreamEvent::Completed),
        "error" => {
            let msg = json
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| json.to_string());
            Some(StreamEvent::Error(msg))
        }
        _ => None,
    }
}

fn non_empty(v: Option<&Value>) -> Option<StreamEvent> {
    v.and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(|s| StreamEvent::Delta(s.to_string()))
}

// ---------------------------------------------------------------------------
// DeltaStream
// ---------------------------------------------------------------------------

/// Iterator of reply deltas over any line source.
///
/// Ends after `response.completed` or at end of input; yields one `Err` and
/// then ends on a stream error or read failure.
pub struct DeltaStream<R> {
    reader: R,
    done: bool,
    line: String,
}

impl<R: BufRead> DeltaStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            done: false,
            line: String::new(),
        }
    }
}

impl<R: BufRead> Iterator for DeltaStream<R> {
    type Item = Result<String, ChatError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => self.done = true,
                Ok(_) => match parse_line(&self.line) {
                    Some(StreamEvent::Delta(text)) => return Some(Ok(text)),
                    Some(StreamEvent::Completed) => self.done = true,
                    Some(StreamEvent::Error(msg)) => {
                        self.done = true;
                        return Some(Err(ChatError::Stream(msg)));
                    }
                    None => {}
                },
                Err(e) => {
                    self.done = true;
                    return Some(Err(ChatError::Read(e.to_string())));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_text_delta() {
        let line = r#"data: {"type":"response.output_text.delta","delta":"Hel"}"#;
        assert_eq!(parse_line(line), Some(StreamEvent::Delta("Hel".into())));
    }

    #[test]
    fn parses_content_part_text() {
        let line = r#"data: {"type":"response.content_part.added","part":{"text":"Hi"}}"#;
        assert_eq!(parse_line(line), Some(StreamEvent::Delta("Hi".into())));
        let empty = r#"data: {"type":"response.content_part.added","part":{"text":""}}"#;
        assert_eq!(parse_line(empty), None);
    }

    #[test]
    fn parses_error_message_or_whole_payload() {
        let line = r#"data: {"type":"error","error":{"message":"quota"}}"#;
        assert_eq!(parse_line(line), Some(StreamEvent::Error("quota".into())));

        let bare = r#"data: {"type":"error"}"#;
        assert!(matches!(parse_line(bare), Some(StreamEvent::Error(m)) if m.contains("error")));
    }

    #[test]
    fn skips_noise() {
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("event: response.output_text.delta"), None);
        assert_eq!(parse_line(": keep-alive"), None);
        assert_eq!(parse_line("data: [DONE]"), None);
        assert_eq!(parse_line("data: {not json"), None);
        assert_eq!(parse_line(r#"data: {"type":"response.created"}"#), None);
    }

    #[test]
    fn stream_yields_deltas_until_completed() {
        let body = "event: x\n\
            data: {\"type\":\"response.output_text.delta\",\"delta\":\"It is \"}\n\
            \n\
            data: {\"type\":\"response.output_text.delta\",\"delta\":\"noon.\"}\r\n\
            data: {\"type\":\"response.completed\"}\n\
            data: {\"type\":\"response.output_text.delta\",\"delta\":\"ignored\"}\n";

        let deltas: Vec<String> = DeltaStream::new(Cursor::new(body))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(deltas, vec!["It is ", "noon."]);
    }

    #[test]
    fn stream_error_ends_iteration() {
        let body = "data: {\"type\":\"response.output_text.delta\",\"delta\":\"a\"}\n\
            data: {\"type\":\"error\",\"error\":{\"message\":\"boom\"}}\n\
            data: {\"type\":\"response.output_text.delta\",\"delta\":\"b\"}\n";

        let items: Vec<_> = DeltaStream::new(Cursor::new(body)).collect();
        assert_eq!(items.len(), 2);
        assert!(matches!(&items[1], Err(ChatError::Stream(m)) if m == "boom"));
    }
}
