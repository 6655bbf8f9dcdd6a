//! Core `ChatService` trait and the `ApiChat` streaming implementation.
//!
//! `ApiChat` calls any OpenAI-compatible `/v1/chat/completions` endpoint with
//! `"stream": true`: Ollama (OpenAI mode), OpenAI, Groq, LM Studio, vLLM,
//! etc.  All connection details come from [`LlmConfig`]; nothing is
//! hardcoded.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::LlmConfig;
use crate::llm::sse::{parse_delta, SseDecoder, SseEvent};

// ---------------------------------------------------------------------------
// LlmError
// ---------------------------------------------------------------------------

/// Errors that can occur while streaming a reply.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP transport or connection error.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The endpoint answered with a non-success status.
    #[error("LLM endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The request, or the gap between two fragments, exceeded the timeout.
    #[error("LLM request timed out")]
    Timeout,

    /// A streamed event could not be parsed.
    #[error("failed to parse LLM stream: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// ChatMessage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One entry of the chat wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// ChatService trait
// ---------------------------------------------------------------------------

/// Lazy, finite sequence of reply fragments.  Not restartable.
pub type FragmentStream = BoxStream<'static, Result<String, LlmError>>;

/// Async trait for a streaming chat model.
///
/// Implementors must be `Send + Sync` so they can be shared across tasks
/// (e.g. wrapped in `Arc<dyn ChatService>`).
#[async_trait]
pub trait ChatService: Send + Sync {
    /// Open one reply stream for `messages` (oldest first).
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<FragmentStream, LlmError>;
}

// ---------------------------------------------------------------------------
// ApiChat
// ---------------------------------------------------------------------------

/// Streams replies from an OpenAI-compatible `/v1/chat/completions` endpoint.
///
/// The configured system prompt, if any, is prepended to every request; it
/// never appears in the conversation history itself.
pub struct ApiChat {
    client: reqwest::Client,
    config: LlmConfig,
}

impl ApiChat {
    /// Build an `ApiChat` from application config.
    ///
    /// Only the connect phase is bounded by the client; the stream itself is
    /// bounded per fragment by the consumer, since a long answer may
    /// legitimately take longer than `timeout_secs` overall.
    pub fn from_config(config: &LlmConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
        }
    }

    fn request_body(&self, messages: &[ChatMessage]) -> serde_json::Value {
        let mut all = Vec::with_capacity(messages.len() + 1);
        if let Some(prompt) = self.config.system_prompt.as_deref().filter(|p| !p.is_empty()) {
            all.push(ChatMessage::system(prompt));
        }
        all.extend_from_slice(messages);

        serde_json::json!({
            "model":       self.config.model,
            "messages":    all,
            "stream":      true,
            "temperature": self.config.temperature,
        })
    }
}

#[async_trait]
impl ChatService for ApiChat {
    /// The `Authorization: Bearer …` header is attached **only** when
    /// `config.api_key` is a non-empty string.
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<FragmentStream, LlmError> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let mut req = self.client.post(&url).json(&self.request_body(messages));

        let key = self.config.api_key.as_deref().unwrap_or("");
        if !key.is_empty() {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        log::debug!("llm: stream opened ({} messages)", messages.len());
        Ok(fragments(response.bytes_stream().boxed()))
    }
}

/// Turn a raw SSE byte stream into reply fragments.
///
/// Ends at `data: [DONE]`, at end of body, or after the first error.
fn fragments<B, E>(bytes: BoxStream<'static, Result<B, E>>) -> FragmentStream
where
    B: AsRef<[u8]> + Send + 'static,
    E: Into<LlmError> + Send + 'static,
{
    struct State<B, E> {
        bytes: BoxStream<'static, Result<B, E>>,
        decoder: SseDecoder,
        pending: VecDeque<String>,
        done: bool,
    }

    let state = State {
        bytes,
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(fragment) = st.pending.pop_front() {
                return Some((Ok(fragment), st));
            }
            if st.done {
                return None;
            }
            match st.bytes.next().await {
                Some(Ok(chunk)) => {
                    for event in st.decoder.feed(chunk.as_ref()) {
                        match event {
                            SseEvent::Done => st.done = true,
                            SseEvent::Data(payload) => match parse_delta(&payload) {
                                Ok(Some(text)) if !st.done => st.pending.push_back(text),
                                Ok(_) => {}
                                Err(e) => {
                                    st.done = true;
                                    return Some((Err(e), st));
                                }
                            },
                        }
                    }
                }
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(e.into()), st));
                }
                None => st.done = true,
            }
        }
    })
    .boxed()
}

// ---------------------------------------------------------------------------
// ScriptedChat  (test-only)
// ---------------------------------------------------------------------------

/// A test double that streams a fixed list of fragments.
///
/// Optional knobs: a per-fragment delay, failing to open, failing after `n`
/// fragments, or hanging forever after `n` fragments.  Every request is
/// recorded for inspection.
#[cfg(test)]
pub struct ScriptedChat {
    fragments: Vec<String>,
    delay: Duration,
    fail_open: bool,
    fail_after: Option<usize>,
    hang_after: Option<usize>,
    requests: std::sync::Mutex<Vec<Vec<ChatMessage>>>,
}

#[cfg(test)]
impl ScriptedChat {
    pub fn reply(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            delay: Duration::ZERO,
            fail_open: false,
            fail_after: None,
            hang_after: None,
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn failing_open() -> Self {
        Self {
            fail_open: true,
            ..Self::reply(&[])
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    pub fn hanging_after(mut self, n: usize) -> Self {
        self.hang_after = Some(n);
        self
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl ChatService for ScriptedChat {
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<FragmentStream, LlmError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        if self.fail_open {
            return Err(LlmError::Request("connection refused".into()));
        }

        let limit = self.fail_after.or(self.hang_after).unwrap_or(usize::MAX);
        let mut items: Vec<Result<String, LlmError>> = self
            .fragments
            .iter()
            .take(limit)
            .cloned()
            .map(Ok)
            .collect();
        if self.fail_after.is_some() {
            items.push(Err(LlmError::Request("stream reset".into())));
        }

        let delay = self.delay;
        let scripted = stream::iter(items).then(move |item| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            item
        });

        if self.hang_after.is_some() {
            Ok(scripted.chain(stream::pending()).boxed())
        } else {
            Ok(scripted.boxed())
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config(system_prompt: Option<&str>) -> LlmConfig {
        LlmConfig {
            base_url: "http://localhost:11434/".into(),
            api_key: None,
            model: "qwen2.5:3b".into(),
            temperature: 0.3,
            timeout_secs: 10,
            system_prompt: system_prompt.map(str::to_string),
        }
    }

    fn sse(chunks: &[&'static str]) -> BoxStream<'static, Result<Vec<u8>, LlmError>> {
        let items: Vec<Result<Vec<u8>, LlmError>> =
            chunks.iter().map(|c| Ok(c.as_bytes().to_vec())).collect();
        stream::iter(items).boxed()
    }

    #[test]
    fn chat_is_object_safe() {
        let chat: Box<dyn ChatService> = Box::new(ApiChat::from_config(&make_config(None)));
        drop(chat);
    }

    #[test]
    fn request_prepends_system_prompt() {
        let chat = ApiChat::from_config(&make_config(Some("be brief")));
        let body = chat.request_body(&[ChatMessage::user("hi")]);

        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "be brief");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "hi");
    }

    #[test]
    fn request_without_system_prompt_sends_history_only() {
        let chat = ApiChat::from_config(&make_config(None));
        let body = chat.request_body(&[
            ChatMessage::user("q"),
            ChatMessage::assistant("a"),
            ChatMessage::user("q2"),
        ]);
        assert_eq!(body["messages"].as_array().unwrap().len(), 3);
        assert_eq!(body["messages"][1]["role"], "assistant");
    }

    #[tokio::test]
    async fn fragments_follow_deltas_across_chunk_boundaries() {
        let bytes = sse(&[
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\ndata: {\"choi",
            "ces\":[{\"delta\":{\"content\":\"lo!\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        ]);

        let out: Vec<String> = fragments(bytes).map(|r| r.unwrap()).collect().await;
        assert_eq!(out, vec!["Hel".to_string(), "lo!".to_string()]);
    }

    #[tokio::test]
    async fn fragments_end_without_done_marker() {
        let bytes = sse(&["data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n\n"]);
        let out: Vec<_> = fragments(bytes).collect().await;
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn transport_error_ends_stream() {
        let items: Vec<Result<Vec<u8>, LlmError>> = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n".to_vec()),
            Err(LlmError::Timeout),
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n\n".to_vec()),
        ];
        let out: Vec<_> = fragments(stream::iter(items).boxed()).collect().await;
        assert_eq!(out.len(), 2);
        assert!(matches!(out[1], Err(LlmError::Timeout)));
    }

    #[tokio::test]
    async fn malformed_event_is_parse_error() {
        let out: Vec<_> = fragments(sse(&["data: {not json\n\n"])).collect().await;
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Err(LlmError::Parse(_))));
    }

    #[test]
    fn role_serialises_lowercase() {
        let json = serde_json::to_string(&ChatMessage::assistant("x")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"x"}"#);
    }
}
