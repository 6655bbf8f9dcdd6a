//! Conversation loop: transcripts in, spoken turns out.
//!
//! [`ConversationLoop`] owns the [`SessionStateMachine`] and reacts to
//! transcripts arriving over a `tokio::sync::mpsc` channel.
//!
//! # Flow
//!
//! ```text
//! transcript
//!   └─▶ SessionStateMachine::on_utterance
//!         ├─ Ignore      → nothing
//!         ├─ Greet       → speak greeting
//!         ├─ EndSession  → speak farewell
//!         └─ StartTurn   → PipelineCoordinator::run_turn   [child token]
//!                            while running: exit phrase → cancel, then sleep
//!                            on completion: record the exchange
//! ```
//!
//! The session history is only read and written here, between turns.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::ConversationConfig;
use crate::conversation::{Action, SessionStateMachine};
use crate::pipeline::coordinator::PipelineCoordinator;
use crate::pipeline::state::TurnReport;

/// Drives sessions and turns from a stream of transcripts.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
/// use talkback::config::AppConfig;
/// use talkback::conversation::{NullTranscriptLog, SessionStateMachine};
/// use talkback::llm::ApiChat;
/// use talkback::pipeline::{ConversationLoop, PipelineCoordinator, TurnSettings};
/// use talkback::playback::CpalOutput;
/// use talkback::tts::ApiSpeech;
///
/// # async fn example() {
/// let config = AppConfig::default();
/// let coordinator = PipelineCoordinator::new(
///     Arc::new(ApiChat::from_config(&config.llm)),
///     Arc::new(ApiSpeech::from_config(&config.tts, std::env::temp_dir())),
///     Arc::new(CpalOutput::new()),
///     TurnSettings::from_config(&config),
/// );
/// let session = SessionStateMachine::new(&config.conversation, Arc::new(NullTranscriptLog));
/// let mut conversation = ConversationLoop::new(session, coordinator, &config.conversation);
///
/// let (transcript_tx, transcript_rx) = tokio::sync::mpsc::channel(8);
/// # drop(transcript_tx);
/// conversation.run(transcript_rx, CancellationToken::new()).await;
/// # }
/// ```
pub struct ConversationLoop {
    session: SessionStateMachine,
    coordinator: PipelineCoordinator,
    greeting: String,
    farewell: Option<String>,
}

impl ConversationLoop {
    pub fn new(
        session: SessionStateMachine,
        coordinator: PipelineCoordinator,
        config: &ConversationConfig,
    ) -> Self {
        Self {
            session,
            coordinator,
            greeting: config.greeting.clone(),
            farewell: config.farewell.clone().filter(|f| !f.trim().is_empty()),
        }
    }

    pub fn session(&self) -> &SessionStateMachine {
        &self.session
    }

    /// Run until `transcripts` closes or `shutdown` fires.
    pub async fn run(
        &mut self,
        mut transcripts: mpsc::Receiver<String>,
        shutdown: CancellationToken,
    ) {
        loop {
            let transcript = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                next = transcripts.recv() => match next {
                    Some(text) => text,
                    None => break,
                },
            };

            match self.session.on_utterance(&transcript) {
                Action::Ignore => log::debug!("conversation: ignoring {transcript:?}"),
                Action::Greet => {
                    let greeting = self.greeting.clone();
                    self.coordinator
                        .speak(&greeting, &shutdown.child_token())
                        .await;
                }
                Action::EndSession => self.say_farewell(&shutdown).await,
                Action::StartTurn(payload) => {
                    self.take_turn(payload, &mut transcripts, &shutdown).await;
                }
            }
        }

        self.session.end_session();
        log::info!("conversation: stopped");
    }

    async fn take_turn(
        &mut self,
        payload: String,
        transcripts: &mut mpsc::Receiver<String>,
        shutdown: &CancellationToken,
    ) {
        let turn_cancel = shutdown.child_token();
        let history = self.session.history().to_vec();

        let mut exit_heard = false;
        let mut input_open = true;

        let report: TurnReport = {
            let turn = self
                .coordinator
                .run_turn(history, payload.clone(), &turn_cancel);
            tokio::pin!(turn);

            loop {
                tokio::select! {
                    report = &mut turn => break report,
                    next = transcripts.recv(), if input_open && !exit_heard => match next {
                        Some(text) if self.session.detector().is_exit(&text) => {
                            log::info!("conversation: exit phrase during turn, interrupting");
                            exit_heard = true;
                            turn_cancel.cancel();
                        }
                        Some(text) => log::debug!("conversation: busy, dropping {text:?}"),
                        None => input_open = false,
                    },
                }
            }
        };

        if exit_heard {
            self.session.end_session();
            self.say_farewell(shutdown).await;
        } else if report.cancelled {
            log::info!("conversation: turn cancelled, not recorded");
        } else {
            self.session.record_turn(payload, report.reply);
        }
    }

    async fn say_farewell(&self, shutdown: &CancellationToken) {
        if let Some(farewell) = &self.farewell {
            self.coordinator
                .speak(farewell, &shutdown.child_token())
                .await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use crate::conversation::{SessionState, TranscriptLog};
    use crate::llm::{Role, ScriptedChat};
    use crate::pipeline::coordinator::TurnSettings;
    use crate::playback::RecordingOutput;
    use crate::tts::ScriptedSpeech;

    /// Transcript log that keeps lines in memory.
    #[derive(Default)]
    struct MemoryLog(Mutex<Vec<String>>);

    impl TranscriptLog for MemoryLog {
        fn append(&self, line: &str) {
            self.0.lock().unwrap().push(line.to_string());
        }
    }

    struct Harness {
        conversation: ConversationLoop,
        chat: Arc<ScriptedChat>,
        output: Arc<RecordingOutput>,
        log: Arc<MemoryLog>,
    }

    /// Gap between transcripts; long enough for a scripted turn to finish.
    const PACE: Duration = Duration::from_millis(150);

    fn harness(chat: ScriptedChat, output: RecordingOutput) -> Harness {
        harness_with_farewell(chat, output, Some("Bye."))
    }

    fn harness_with_farewell(
        chat: ScriptedChat,
        output: RecordingOutput,
        farewell: Option<&str>,
    ) -> Harness {
        let config = ConversationConfig {
            greeting: "Hello there.".into(),
            farewell: farewell.map(str::to_string),
            ..ConversationConfig::default()
        };
        let chat = Arc::new(chat);
        let output = Arc::new(output);
        let log = Arc::new(MemoryLog::default());

        let coordinator = PipelineCoordinator::new(
            chat.clone(),
            Arc::new(ScriptedSpeech::new()),
            output.clone(),
            TurnSettings {
                cancel_grace: Duration::from_millis(500),
                ..TurnSettings::default()
            },
        );
        let session = SessionStateMachine::new(&config, log.clone());

        Harness {
            conversation: ConversationLoop::new(session, coordinator, &config),
            chat,
            output,
            log,
        }
    }

    /// Feed `transcripts` one at a time, `PACE` apart, then close the input.
    async fn drive(h: &mut Harness, transcripts: &[&str]) {
        let (tx, rx) = mpsc::channel(16);
        let lines: Vec<String> = transcripts.iter().map(|t| t.to_string()).collect();
        let feeder = async move {
            for line in lines {
                tx.send(line).await.unwrap();
                tokio::time::sleep(PACE).await;
            }
        };

        let run = h.conversation.run(rx, CancellationToken::new());
        tokio::time::timeout(Duration::from_secs(10), async { tokio::join!(run, feeder) })
            .await
            .expect("conversation must finish when input closes");
    }

    fn log_lines(h: &Harness) -> Vec<String> {
        h.log.0.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn sleeping_ignores_speech_without_wake_word() {
        let mut h = harness(ScriptedChat::reply(&["ok"]), RecordingOutput::new());

        drive(&mut h, &["what time is it", "that's all"]).await;

        assert!(h.chat.requests().is_empty());
        assert!(h.output.played().is_empty());
    }

    #[tokio::test]
    async fn wake_word_alone_greets() {
        let mut h = harness(ScriptedChat::reply(&["ok"]), RecordingOutput::new());

        drive(&mut h, &["Buddy"]).await;

        assert_eq!(h.output.played(), vec!["Hello there.".to_string()]);
        assert!(h.chat.requests().is_empty());
    }

    #[tokio::test]
    async fn wake_word_with_request_starts_turn() {
        let mut h = harness(ScriptedChat::reply(&["It is noon."]), RecordingOutput::new());

        drive(&mut h, &["hey buddy what time is it"]).await;

        let sent = &h.chat.requests()[0];
        assert_eq!(sent.last().unwrap().content, "what time is it");
        assert_eq!(h.output.played(), vec!["It is noon.".to_string()]);

        let log = log_lines(&h);
        assert!(log.contains(&"user: what time is it".to_string()));
        assert!(log.contains(&"assistant: It is noon.".to_string()));
    }

    #[tokio::test]
    async fn history_accumulates_across_turns() {
        let mut h = harness(ScriptedChat::reply(&["Sure."]), RecordingOutput::new());

        drive(&mut h, &["buddy first question", "second question"]).await;

        let requests = h.chat.requests();
        assert_eq!(requests.len(), 2);
        let second = &requests[1];
        assert_eq!(second.len(), 3);
        assert_eq!(second[0].role, Role::User);
        assert_eq!(second[0].content, "first question");
        assert_eq!(second[1].role, Role::Assistant);
        assert_eq!(second[1].content, "Sure.");
        assert_eq!(second[2].content, "second question");
    }

    #[tokio::test]
    async fn exit_phrase_ends_session_and_says_farewell() {
        let mut h = harness(ScriptedChat::reply(&["Yes."]), RecordingOutput::new());

        drive(&mut h, &["buddy are you there", "that's all", "are you still there"]).await;

        assert_eq!(h.chat.requests().len(), 1);
        assert_eq!(
            h.output.played(),
            vec!["Yes.".to_string(), "Bye.".to_string()]
        );
        assert_eq!(h.conversation.session().state(), SessionState::Sleeping);
    }

    #[tokio::test]
    async fn wake_after_exit_starts_with_empty_history() {
        let mut h = harness(ScriptedChat::reply(&["Okay."]), RecordingOutput::new());

        drive(
            &mut h,
            &["buddy remember blue", "that is all", "buddy what colour"],
        )
        .await;

        let requests = h.chat.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].len(), 1);
        assert_eq!(requests[1][0].content, "what colour");
    }

    #[tokio::test]
    async fn exit_phrase_interrupts_running_turn() {
        let mut h = harness_with_farewell(
            ScriptedChat::reply(&["A very long answer that goes on. ", "And on. "])
                .with_delay(Duration::from_millis(20)),
            RecordingOutput::new().with_delay(Duration::from_secs(30)),
            None,
        );

        let (tx, rx) = mpsc::channel(4);
        tx.send("buddy tell me a story".to_string()).await.unwrap();
        let run = h.conversation.run(rx, CancellationToken::new());
        let interrupt = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            tx.send("okay that's all".to_string()).await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            drop(tx);
        };

        tokio::time::timeout(Duration::from_secs(5), async { tokio::join!(run, interrupt) })
            .await
            .expect("exit phrase must interrupt a long turn");

        assert_eq!(h.conversation.session().state(), SessionState::Sleeping);
        assert!(h.conversation.session().history().is_empty());
        let log = log_lines(&h);
        assert!(!log.iter().any(|l| l.starts_with("assistant:")));
        assert!(log.contains(&"--- session ended ---".to_string()));
    }

    #[tokio::test]
    async fn non_exit_speech_during_turn_is_dropped() {
        let mut h = harness(
            ScriptedChat::reply(&["Answer."]).with_delay(Duration::from_millis(50)),
            RecordingOutput::new(),
        );

        // Both queued up front: the second arrives while the first turn runs.
        let (tx, rx) = mpsc::channel(4);
        tx.send("buddy question".to_string()).await.unwrap();
        tx.send("buddy interrupting".to_string()).await.unwrap();
        drop(tx);
        tokio::time::timeout(
            Duration::from_secs(5),
            h.conversation.run(rx, CancellationToken::new()),
        )
        .await
        .expect("conversation must finish");

        assert_eq!(h.chat.requests().len(), 1);
        assert_eq!(h.output.played(), vec!["Answer.".to_string()]);
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let mut h = harness(
            ScriptedChat::reply(&["x"]).hanging_after(1),
            RecordingOutput::new(),
        );
        let (tx, rx) = mpsc::channel(4);
        tx.send("buddy hang forever".to_string()).await.unwrap();
        let shutdown = CancellationToken::new();

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        tokio::time::timeout(Duration::from_secs(5), h.conversation.run(rx, shutdown))
            .await
            .expect("shutdown must stop the loop");
        drop(tx);

        assert_eq!(h.conversation.session().state(), SessionState::Sleeping);
    }
}
