//! Runs one speaking turn: generator → synthesizer → player.
//!
//! The three stages run as separate tasks joined by bounded channels.
//! Completion flows downstream by channel closure: the generator drops its
//! sender, the synthesizer drains and drops its own, and the player stops
//! when its input closes.  The coordinator joins the stages in that order
//! and only then returns, so no clip outlives the turn.
//!
//! ```text
//!  ResponseGenerator ──TextChunk──▶ SpeechSynthesizer ──AudioUnit──▶ AudioPlayer
//!        (task)       bounded mpsc        (task)         bounded mpsc    (task)
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::llm::{
    ChatMessage, ChatService, GenerationOutcome, GeneratorSettings, ResponseGenerator,
    SentenceChunker, TextChunk,
};
use crate::pipeline::state::{TurnPhase, TurnReport};
use crate::playback::{AudioOutput, AudioPlayer, PlaybackReport};
use crate::tts::{SpeechService, SpeechSynthesizer, SynthesisReport};

/// Per-turn knobs, derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub generator: GeneratorSettings,
    /// Capacity of both inter-stage channels.
    pub channel_capacity: usize,
    /// How long a stage may take to stop after cancellation before it is
    /// aborted.
    pub cancel_grace: Duration,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl TurnSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            generator: GeneratorSettings {
                chunk_threshold: config.pipeline.chunk_threshold,
                fragment_timeout: Duration::from_secs(config.llm.timeout_secs),
                apology: config.conversation.apology.clone(),
            },
            channel_capacity: config.pipeline.channel_capacity.max(1),
            cancel_grace: Duration::from_millis(config.pipeline.cancel_grace_ms),
        }
    }
}

pub struct PipelineCoordinator {
    chat: Arc<dyn ChatService>,
    speech: Arc<dyn SpeechService>,
    output: Arc<dyn AudioOutput>,
    settings: TurnSettings,
}

impl PipelineCoordinator {
    pub fn new(
        chat: Arc<dyn ChatService>,
        speech: Arc<dyn SpeechService>,
        output: Arc<dyn AudioOutput>,
        settings: TurnSettings,
    ) -> Self {
        Self {
            chat,
            speech,
            output,
            settings,
        }
    }

    pub fn settings(&self) -> &TurnSettings {
        &self.settings
    }

    /// Answer `utterance` given a snapshot of `history`, speaking the reply
    /// as it streams in.  Returns after every stage has been joined.
    pub async fn run_turn(
        &self,
        history: Vec<ChatMessage>,
        utterance: String,
        cancel: &CancellationToken,
    ) -> TurnReport {
        let (text_tx, text_rx) = mpsc::channel(self.settings.channel_capacity.max(1));

        let generator =
            ResponseGenerator::new(Arc::clone(&self.chat), self.settings.generator.clone());
        let generator_cancel = cancel.clone();
        let generating = tokio::spawn(async move {
            generator
                .run(&history, &utterance, text_tx, &generator_cancel)
                .await
        });
        let (synthesizing, playing) = self.spawn_speech(text_rx, cancel);

        let mut report = TurnReport::default();
        log::debug!("turn: {}", report.phase);

        match self.join("generator", generating, cancel).await {
            Some(generation) => {
                report.reply = generation.reply;
                report.chunks_generated = generation.chunks;
                match generation.outcome {
                    GenerationOutcome::Completed => {}
                    GenerationOutcome::Failed(_) => report.model_failed = true,
                    GenerationOutcome::Cancelled => report.cancelled = true,
                }
            }
            None => report.stage_lost = true,
        }

        report.phase = TurnPhase::Draining;
        log::debug!("turn: {}", report.phase);

        self.drain(&mut report, synthesizing, playing, cancel).await;
        report
    }

    /// Speak canned `text` (greeting, farewell) through synthesis and
    /// playback, without a model call.
    pub async fn speak(&self, text: &str, cancel: &CancellationToken) -> TurnReport {
        let (text_tx, text_rx) = mpsc::channel::<TextChunk>(1);
        let mut report = TurnReport {
            reply: text.to_string(),
            phase: TurnPhase::Draining,
            ..TurnReport::default()
        };

        if let Some(chunk) = SentenceChunker::new(usize::MAX).emit_whole(text) {
            match text_tx.try_send(chunk) {
                Ok(()) => report.chunks_generated = 1,
                Err(e) => log::warn!("speak: could not queue text: {e}"),
            }
        }
        drop(text_tx);

        let (synthesizing, playing) = self.spawn_speech(text_rx, cancel);
        self.drain(&mut report, synthesizing, playing, cancel).await;
        report
    }

    fn spawn_speech(
        &self,
        text_rx: mpsc::Receiver<TextChunk>,
        cancel: &CancellationToken,
    ) -> (JoinHandle<SynthesisReport>, JoinHandle<PlaybackReport>) {
        let (audio_tx, audio_rx) = mpsc::channel(self.settings.channel_capacity.max(1));

        let synthesizer = SpeechSynthesizer::new(Arc::clone(&self.speech));
        let synth_cancel = cancel.clone();
        let synthesizing =
            tokio::spawn(async move { synthesizer.run(text_rx, audio_tx, &synth_cancel).await });

        let player = AudioPlayer::new(Arc::clone(&self.output));
        let play_cancel = cancel.clone();
        let playing = tokio::spawn(async move { player.run(audio_rx, &play_cancel).await });

        (synthesizing, playing)
    }

    async fn drain(
        &self,
        report: &mut TurnReport,
        synthesizing: JoinHandle<SynthesisReport>,
        playing: JoinHandle<PlaybackReport>,
        cancel: &CancellationToken,
    ) {
        match self.join("synthesizer", synthesizing, cancel).await {
            Some(synthesis) => {
                report.chunks_skipped = synthesis.skipped;
                report.cancelled |= synthesis.cancelled;
                report.order_violations += synthesis.order_violations;
            }
            None => report.stage_lost = true,
        }

        match self.join("player", playing, cancel).await {
            Some(playback) => {
                report.units_played = playback.played;
                report.units_failed = playback.failed;
                report.cancelled |= playback.stopped;
                report.order_violations += playback.order_violations;
            }
            None => report.stage_lost = true,
        }

        report.cancelled |= cancel.is_cancelled();
        report.phase = TurnPhase::Done;
        log::info!(
            "turn: {} ({} chunks, {} played, {} skipped, {} failed{}{})",
            report.phase,
            report.chunks_generated,
            report.units_played.len(),
            report.chunks_skipped.len(),
            report.units_failed.len(),
            if report.model_failed { ", model failed" } else { "" },
            if report.cancelled { ", cancelled" } else { "" },
        );
    }

    /// Wait for a stage.  Once `cancel` fires the stage gets the grace
    /// period to wind down, then it is aborted.
    async fn join<T>(
        &self,
        stage: &str,
        mut handle: JoinHandle<T>,
        cancel: &CancellationToken,
    ) -> Option<T> {
        let joined = tokio::select! {
            biased;
            joined = &mut handle => joined,
            () = cancel.cancelled() => {
                match tokio::time::timeout(self.settings.cancel_grace, &mut handle).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        log::warn!("turn: {stage} ignored cancellation, aborting");
                        handle.abort();
                        return None;
                    }
                }
            }
        };

        match joined {
            Ok(value) => Some(value),
            Err(e) => {
                log::error!("turn: {stage} task failed: {e}");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedChat;
    use crate::playback::RecordingOutput;
    use crate::tts::ScriptedSpeech;
    use rand::Rng;

    const WORDS: [&str; 6] = ["alpha ", "bravo ", "charlie ", "delta ", "hotel ", "foxtrot "];

    fn settings(threshold: usize, capacity: usize) -> TurnSettings {
        TurnSettings {
            generator: GeneratorSettings {
                chunk_threshold: threshold,
                fragment_timeout: Duration::from_secs(5),
                apology: "Sorry.".into(),
            },
            channel_capacity: capacity,
            cancel_grace: Duration::from_millis(500),
        }
    }

    fn expected_texts() -> Vec<String> {
        WORDS.iter().map(|w| w.trim().to_string()).collect()
    }

    async fn run(
        coordinator: &PipelineCoordinator,
        utterance: &str,
        cancel: &CancellationToken,
    ) -> TurnReport {
        tokio::time::timeout(
            Duration::from_secs(10),
            coordinator.run_turn(Vec::new(), utterance.into(), cancel),
        )
        .await
        .expect("turn must finish")
    }

    #[tokio::test]
    async fn ordering_holds_under_random_latency() {
        for _ in 0..5 {
            let delays: Vec<Duration> = {
                let mut rng = rand::rng();
                (0..WORDS.len())
                    .map(|_| Duration::from_millis(rng.random_range(0..25)))
                    .collect()
            };

            let speech = Arc::new(ScriptedSpeech::new().with_delays(delays));
            let output = Arc::new(RecordingOutput::new().with_delay(Duration::from_millis(2)));
            let coordinator = PipelineCoordinator::new(
                Arc::new(ScriptedChat::reply(&WORDS).with_delay(Duration::from_millis(1))),
                speech.clone(),
                output.clone(),
                settings(5, 2),
            );

            let report = run(&coordinator, "spell", &CancellationToken::new()).await;

            assert!(report.is_clean(), "{report:?}");
            assert_eq!(report.chunks_generated, WORDS.len());
            assert_eq!(report.units_played, (0..WORDS.len()).collect::<Vec<_>>());
            assert_eq!(output.played(), expected_texts());
            assert_eq!(output.max_overlap(), 1);
            assert!(speech.leaked().is_empty());
        }
    }

    #[tokio::test]
    async fn zero_one_and_many_chunks_terminate() {
        for (fragments, expected) in [
            (&[][..], 0usize),
            (&["Just one."][..], 1),
            (&WORDS[..], WORDS.len()),
        ] {
            let output = Arc::new(RecordingOutput::new());
            let coordinator = PipelineCoordinator::new(
                Arc::new(ScriptedChat::reply(fragments)),
                Arc::new(ScriptedSpeech::new()),
                output.clone(),
                settings(5, 1),
            );

            let report = run(&coordinator, "go", &CancellationToken::new()).await;

            assert_eq!(report.phase, TurnPhase::Done);
            assert_eq!(report.units_played.len(), expected);
            assert_eq!(output.played().len(), expected);
        }
    }

    #[tokio::test]
    async fn failed_synthesis_skips_one_chunk() {
        let speech = Arc::new(ScriptedSpeech::new().failing_on("charlie"));
        let output = Arc::new(RecordingOutput::new());
        let coordinator = PipelineCoordinator::new(
            Arc::new(ScriptedChat::reply(&WORDS)),
            speech.clone(),
            output.clone(),
            settings(5, 4),
        );

        let report = run(&coordinator, "spell", &CancellationToken::new()).await;

        assert_eq!(report.chunks_skipped, vec![2]);
        assert_eq!(report.units_played, vec![0, 1, 3, 4, 5]);
        assert!(!output.played().contains(&"charlie".to_string()));
        assert!(speech.leaked().is_empty());
    }

    #[tokio::test]
    async fn failed_playback_does_not_stop_the_turn() {
        let output = Arc::new(RecordingOutput::new().failing_on("bravo"));
        let coordinator = PipelineCoordinator::new(
            Arc::new(ScriptedChat::reply(&WORDS)),
            Arc::new(ScriptedSpeech::new()),
            output.clone(),
            settings(5, 4),
        );

        let report = run(&coordinator, "spell", &CancellationToken::new()).await;

        assert_eq!(report.units_failed, vec![1]);
        assert_eq!(report.units_played.len(), WORDS.len() - 1);
    }

    #[tokio::test]
    async fn model_failure_speaks_apology() {
        let output = Arc::new(RecordingOutput::new());
        let coordinator = PipelineCoordinator::new(
            Arc::new(ScriptedChat::failing_open()),
            Arc::new(ScriptedSpeech::new()),
            output.clone(),
            settings(40, 4),
        );

        let report = run(&coordinator, "hello", &CancellationToken::new()).await;

        assert!(report.model_failed);
        assert_eq!(report.reply, "Sorry.");
        assert_eq!(output.played(), vec!["Sorry.".to_string()]);
    }

    #[tokio::test]
    async fn cancellation_at_any_point_leaks_nothing() {
        for cancel_after_ms in [0u64, 3, 10, 25, 60, 120] {
            let speech = Arc::new(
                ScriptedSpeech::new().with_delays(vec![Duration::from_millis(8); WORDS.len()]),
            );
            let output = Arc::new(RecordingOutput::new().with_delay(Duration::from_millis(15)));
            let coordinator = PipelineCoordinator::new(
                Arc::new(ScriptedChat::reply(&WORDS).with_delay(Duration::from_millis(4))),
                speech.clone(),
                output.clone(),
                settings(5, 2),
            );
            let cancel = CancellationToken::new();

            let trigger = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(cancel_after_ms)).await;
                trigger.cancel();
            });

            let report = run(&coordinator, "spell", &cancel).await;

            assert!(!report.stage_lost, "stage lost at {cancel_after_ms}ms");
            assert!(speech.leaked().is_empty(), "leak at {cancel_after_ms}ms");
            let played = output.played();
            assert_eq!(played[..], expected_texts()[..played.len()]);
        }
    }

    #[tokio::test]
    async fn hung_model_is_cut_off_by_cancel() {
        let coordinator = PipelineCoordinator::new(
            Arc::new(ScriptedChat::reply(&["never "]).hanging_after(1)),
            Arc::new(ScriptedSpeech::new()),
            Arc::new(RecordingOutput::new()),
            TurnSettings {
                generator: GeneratorSettings {
                    fragment_timeout: Duration::from_secs(60),
                    ..settings(100, 1).generator
                },
                ..settings(100, 1)
            },
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        let report = run(&coordinator, "hi", &cancel).await;

        assert!(report.cancelled);
        assert!(report.units_played.is_empty());
    }

    #[tokio::test]
    async fn speak_plays_canned_text_without_model() {
        let chat = Arc::new(ScriptedChat::reply(&["unused"]));
        let output = Arc::new(RecordingOutput::new());
        let coordinator = PipelineCoordinator::new(
            chat.clone(),
            Arc::new(ScriptedSpeech::new()),
            output.clone(),
            settings(5, 1),
        );

        let report = coordinator
            .speak("Hi! What **can** I do?", &CancellationToken::new())
            .await;

        assert_eq!(report.units_played, vec![0]);
        assert_eq!(output.played(), vec!["Hi! What can I do?".to_string()]);
        assert!(chat.requests().is_empty());
    }

    #[tokio::test]
    async fn speak_blank_text_plays_nothing() {
        let output = Arc::new(RecordingOutput::new());
        let coordinator = PipelineCoordinator::new(
            Arc::new(ScriptedChat::reply(&[])),
            Arc::new(ScriptedSpeech::new()),
            output.clone(),
            settings(5, 1),
        );

        let report = coordinator.speak("   ", &CancellationToken::new()).await;

        assert_eq!(report.chunks_generated, 0);
        assert!(output.played().is_empty());
    }

    #[test]
    fn settings_follow_config() {
        let mut config = AppConfig::default();
        config.pipeline.chunk_threshold = 12;
        config.pipeline.channel_capacity = 0;
        config.conversation.apology = "Oops.".into();

        let s = TurnSettings::from_config(&config);
        assert_eq!(s.generator.chunk_threshold, 12);
        assert_eq!(s.channel_capacity, 1);
        assert_eq!(s.generator.apology, "Oops.");
    }
}
