//! First pipeline stage: stream a reply and cut it into [`TextChunk`]s.
//!
//! The generator owns the sending half of the text channel.  Dropping it at
//! the end of [`ResponseGenerator::run`] closes the channel, which is the
//! only signal downstream stages use to learn that generation is over.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::llm::chat::{ChatMessage, ChatService, LlmError};
use crate::llm::chunker::{SentenceChunker, TextChunk};

/// Knobs for one generator run.
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub chunk_threshold: usize,
    /// Longest wait for the stream to open, and between two fragments.
    pub fragment_timeout: Duration,
    /// Spoken instead of the reply when the model fails.
    pub apology: String,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            chunk_threshold: 40,
            fragment_timeout: Duration::from_secs(20),
            apology: "Sorry, something went wrong.".into(),
        }
    }
}

/// How a generator run ended.
#[derive(Debug)]
pub enum GenerationOutcome {
    Completed,
    /// The model failed; an apology chunk was emitted in its place.
    Failed(LlmError),
    /// Cancelled by the turn token, or the downstream stage went away.
    Cancelled,
}

#[derive(Debug)]
pub struct Generation {
    /// Everything the model produced, plus the apology on failure.
    pub reply: String,
    /// Chunks sent downstream (ordinals `0..chunks`).
    pub chunks: usize,
    pub outcome: GenerationOutcome,
}

pub struct ResponseGenerator {
    chat: Arc<dyn ChatService>,
    settings: GeneratorSettings,
}

impl ResponseGenerator {
    pub fn new(chat: Arc<dyn ChatService>, settings: GeneratorSettings) -> Self {
        Self { chat, settings }
    }

    /// Stream a reply to `utterance` given `history`, sending chunks to
    /// `text_out` as they fill up.  `text_out` is closed on return, on every
    /// path.
    pub async fn run(
        &self,
        history: &[ChatMessage],
        utterance: &str,
        text_out: mpsc::Sender<TextChunk>,
        cancel: &CancellationToken,
    ) -> Generation {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.extend_from_slice(history);
        messages.push(ChatMessage::user(utterance));

        let mut chunker = SentenceChunker::new(self.settings.chunk_threshold);
        let mut reply = String::new();
        let mut delivered = 0;

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => GenerationOutcome::Cancelled,
            outcome = self.stream_into(&messages, &mut chunker, &mut reply, &mut delivered, &text_out) => outcome,
        };

        if let GenerationOutcome::Failed(e) = &outcome {
            log::warn!("generator: model failed ({e}), apologising");
            if !reply.is_empty() && !reply.ends_with(char::is_whitespace) {
                reply.push(' ');
            }
            reply.push_str(&self.settings.apology);
            if let Some(chunk) = chunker.emit_whole(&self.settings.apology) {
                if send_chunk(&text_out, chunk, cancel).await {
                    delivered += 1;
                }
            }
        }

        log::debug!(
            "generator: done after {} chunks ({:?})",
            delivered,
            outcome
        );

        Generation {
            reply,
            chunks: delivered,
            outcome,
        }
    }

    async fn stream_into(
        &self,
        messages: &[ChatMessage],
        chunker: &mut SentenceChunker,
        reply: &mut String,
        delivered: &mut usize,
        text_out: &mpsc::Sender<TextChunk>,
    ) -> GenerationOutcome {
        let timeout = self.settings.fragment_timeout;

        let mut stream = match tokio::time::timeout(timeout, self.chat.stream_chat(messages)).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return GenerationOutcome::Failed(e),
            Err(_) => return GenerationOutcome::Failed(LlmError::Timeout),
        };

        loop {
            let next = match tokio::time::timeout(timeout, stream.next()).await {
                Ok(next) => next,
                Err(_) => return GenerationOutcome::Failed(LlmError::Timeout),
            };

            match next {
                Some(Ok(fragment)) => {
                    reply.push_str(&fragment);
                    if let Some(chunk) = chunker.push(&fragment) {
                        log::debug!("generator: chunk {} ({} chars)", chunk.ordinal, chunk.text.len());
                        if text_out.send(chunk).await.is_err() {
                            return GenerationOutcome::Cancelled;
                        }
                        *delivered += 1;
                    }
                }
                Some(Err(e)) => return GenerationOutcome::Failed(e),
                None => break,
            }
        }

        if let Some(chunk) = chunker.finish() {
            log::debug!("generator: final chunk {}", chunk.ordinal);
            if text_out.send(chunk).await.is_err() {
                return GenerationOutcome::Cancelled;
            }
            *delivered += 1;
        }
        GenerationOutcome::Completed
    }
}

async fn send_chunk(
    text_out: &mpsc::Sender<TextChunk>,
    chunk: TextChunk,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        sent = text_out.send(chunk) => sent.is_ok(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
