//! Incremental decoder for the server-sent-events framing used by streaming
//! chat completions.
//!
//! Only `data:` fields matter here; comments (`:`), `event:`/`id:` fields and
//! blank separator lines are skipped.  Bytes may be split anywhere, including
//! inside a multi-byte UTF-8 sequence.

use crate::llm::chat::LlmError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Payload of one `data:` line.
    Data(String),
    /// The `data: [DONE]` terminator.
    Done,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    /// Feed raw bytes; returns every event completed by them.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.strip_prefix(' ').unwrap_or(data);
            if data == "[DONE]" {
                events.push(SseEvent::Done);
            } else if !data.is_empty() {
                events.push(SseEvent::Data(data.to_string()));
            }
        }
        events
    }
}

/// Extract `choices[0].delta.content` from one streamed JSON payload.
///
/// Returns `Ok(None)` for role-only or empty deltas.
pub fn parse_delta(payload: &str) -> Result<Option<String>, LlmError> {
    let json: serde_json::Value =
        serde_json::from_str(payload).map_err(|e| LlmError::Parse(e.to_string()))?;

    if let Some(message) = json["error"]["message"].as_str() {
        return Err(LlmError::Request(message.to_string()));
    }

    Ok(json["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string))
}
