//! Application entry point.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (defaults on first run) and fill API keys
//!    from the environment.
//! 3. Create the tokio runtime and a process-wide shutdown token, cancelled
//!    on Ctrl-C.
//! 4. Start the listen thread: microphone → segmenter → utterance channel.
//! 5. Spawn transcript forwarding: utterance → recognizer → transcript channel.
//! 6. Run the conversation loop until shutdown.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use talkback::{
    audio::{CaptureError, ListenEvent, Microphone, UtteranceSegmenter},
    config::{AppConfig, AppPaths, AudioConfig},
    conversation::{FileTranscriptLog, SessionStateMachine},
    llm::ApiChat,
    pipeline::{ConversationLoop, PipelineCoordinator, TurnSettings},
    playback::CpalOutput,
    stt::{forward_transcripts, ApiRecognizer, Recognizer},
    tts::ApiSpeech,
};

/// Utterances waiting for recognition before new ones are dropped.
const UTTERANCE_BACKLOG: usize = 2;

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 2. Configuration
    let paths = AppPaths::new();
    let mut config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            log::warn!("could not read {}: {e}; using defaults", paths.settings_file.display());
            AppConfig::default()
        }
    };
    if !paths.settings_file.exists() {
        if let Err(e) = config.save() {
            log::warn!("could not write default settings: {e}");
        }
    }
    config.apply_env();

    // 3. Runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(run(config, paths))
}

async fn run(config: AppConfig, paths: AppPaths) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("interrupt received, shutting down");
            }
            shutdown.cancel();
        });
    }

    // 4. Listen thread. The cpal stream is not Send, so it lives and dies
    //    on this thread.
    let (utterance_tx, utterance_rx) = mpsc::channel::<Vec<f32>>(UTTERANCE_BACKLOG);
    {
        let audio = config.audio.clone();
        let shutdown = shutdown.clone();
        std::thread::Builder::new()
            .name("listen".into())
            .spawn(move || {
                if let Err(e) = listen(&audio, utterance_tx, &shutdown) {
                    log::error!("microphone unavailable: {e}");
                    shutdown.cancel();
                }
            })?;
    }

    // 5. Recognition
    let recognizer: Arc<dyn Recognizer> =
        Arc::new(ApiRecognizer::from_config(&config.stt, &config.audio));
    let (transcript_tx, transcript_rx) = mpsc::channel::<String>(8);
    let recognizing = tokio::spawn(forward_transcripts(
        recognizer,
        utterance_rx,
        transcript_tx,
        shutdown.clone(),
    ));

    // 6. Conversation
    let coordinator = PipelineCoordinator::new(
        Arc::new(ApiChat::from_config(&config.llm)),
        Arc::new(ApiSpeech::from_config(&config.tts, paths.audio_dir.clone())),
        Arc::new(CpalOutput::new()),
        TurnSettings::from_config(&config),
    );
    let transcript_log = Arc::new(FileTranscriptLog::new(paths.transcript_file.clone()));
    let session = SessionStateMachine::new(&config.conversation, transcript_log);
    let mut conversation = ConversationLoop::new(session, coordinator, &config.conversation);

    log::info!(
        "ready; say \"{}\" to start talking",
        config.conversation.wake_word
    );
    conversation.run(transcript_rx, shutdown.clone()).await;

    shutdown.cancel();
    if let Err(e) = recognizing.await {
        log::warn!("recognition task failed: {e}");
    }
    Ok(())
}

/// Capture frames and hand finished utterances to the recognizer until
/// shutdown or until the recognizer goes away.
fn listen(
    audio: &AudioConfig,
    utterance_tx: mpsc::Sender<Vec<f32>>,
    shutdown: &CancellationToken,
) -> Result<(), CaptureError> {
    let mic = Microphone::open(audio.sample_rate)?;
    let (frame_tx, frame_rx) = std::sync::mpsc::channel::<Vec<f32>>();
    let _stream = mic.start(frame_tx)?;
    let mut segmenter = UtteranceSegmenter::new(audio);

    while let Ok(frame) = frame_rx.recv() {
        if shutdown.is_cancelled() {
            break;
        }
        match segmenter.push(&frame) {
            Some(ListenEvent::Utterance(samples)) => match utterance_tx.try_send(samples) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    log::warn!("listen: recognizer is behind, dropping utterance");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => break,
            },
            Some(ListenEvent::Timeout) => log::trace!("listen: nothing heard"),
            None => {}
        }
    }
    log::debug!("listen: stopped");
    Ok(())
}
