//! Local continuous engine
//!
//! Continuous wake-word listener backed by an offline Vosk model. The
//! recognizer runs fully on-device, so this engine is what keeps the
//! microphone open between wake-ups without shipping audio anywhere.
//!
//! Vosk links against a native library, so the backend sits behind the
//! `vosk` cargo feature. Without it the engine reports
//! [`EngineError::NotAvailable`] from `start` and the session falls back to
//! treating every session start as a fatal condition.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::engine::{EngineError, EngineEvent, SpeechEngine};

/// Continuous offline recognizer
pub struct LocalWakeEngine {
    model_dir: PathBuf,
    task: Option<JoinHandle<()>>,
}

impl LocalWakeEngine {
    /// Create an engine that loads its model from `model_dir` on start
    #[must_use]
    pub fn new(model_dir: PathBuf) -> Self {
        Self {
            model_dir,
            task: None,
        }
    }
}

#[async_trait]
impl SpeechEngine for LocalWakeEngine {
    fn continuous(&self) -> bool {
        true
    }

    #[cfg(not(feature = "vosk"))]
    async fn start(&mut self, events: mpsc::Sender<EngineEvent>) -> Result<(), EngineError> {
        let _ = (&self.model_dir, &events);
        Err(EngineError::NotAvailable(
            "built without the vosk feature".to_string(),
        ))
    }

    #[cfg(feature = "vosk")]
    async fn start(&mut self, events: mpsc::Sender<EngineEvent>) -> Result<(), EngineError> {
        use super::capture::CaptureThread;

        if self.task.is_some() {
            return Err(EngineError::Busy);
        }

        if !self.model_dir.is_dir() {
            return Err(EngineError::NotAvailable(format!(
                "model not installed at {}",
                self.model_dir.display()
            )));
        }

        // Model loading reads hundreds of megabytes, keep it off the runtime
        let model_dir = self.model_dir.clone();
        let recognizer = tokio::task::spawn_blocking(move || backend::open(&model_dir))
            .await
            .map_err(|e| EngineError::Unknown(e.to_string()))??;

        let capture = tokio::task::spawn_blocking(CaptureThread::spawn)
            .await
            .map_err(|e| EngineError::Unknown(e.to_string()))?
            .map_err(|e| EngineError::NotAvailable(e.to_string()))?;

        self.task = Some(tokio::spawn(backend::run(recognizer, capture, events)));
        tracing::info!(model_dir = %self.model_dir.display(), "local wake engine started");
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!("local wake engine stopped");
        }
    }

    async fn destroy(&mut self) {
        self.stop().await;
    }
}

#[cfg(feature = "vosk")]
mod backend {
    use std::path::Path;
    use std::time::Duration;

    use tokio::sync::mpsc;
    use vosk::{DecodingState, Model, Recognizer};

    use crate::voice::capture::{CaptureThread, SAMPLE_RATE};
    use crate::voice::engine::{EngineError, EngineEvent};
    use crate::voice::hypothesis::RecognitionHypothesis;

    const POLL_INTERVAL: Duration = Duration::from_millis(100);

    /// Load the model and build a recognizer
    pub fn open(model_dir: &Path) -> Result<Recognizer, EngineError> {
        let path = model_dir.to_string_lossy();
        let model = Model::new(&path)
            .ok_or_else(|| EngineError::NotAvailable(format!("failed to load model at {path}")))?;

        #[allow(clippy::cast_precision_loss)]
        let mut recognizer = Recognizer::new(&model, SAMPLE_RATE as f32)
            .ok_or_else(|| EngineError::Unknown("failed to create recognizer".to_string()))?;
        recognizer.set_words(false);
        Ok(recognizer)
    }

    /// Feed captured audio through the recognizer until aborted
    pub async fn run(
        mut recognizer: Recognizer,
        capture: CaptureThread,
        events: mpsc::Sender<EngineEvent>,
    ) {
        loop {
            tokio::time::sleep(POLL_INTERVAL).await;

            let chunk = capture.take_buffer();
            if chunk.is_empty() {
                continue;
            }

            #[allow(clippy::cast_possible_truncation)]
            let pcm: Vec<i16> = chunk
                .iter()
                .map(|&s| (s * 32767.0).clamp(-32768.0, 32767.0) as i16)
                .collect();

            let event = match recognizer.accept_waveform(&pcm) {
                Ok(DecodingState::Finalized) => recognizer
                    .result()
                    .single()
                    .map(|r| RecognitionHypothesis::final_text(r.text)),
                Ok(DecodingState::Running) => {
                    let partial = recognizer.partial_result().partial;
                    if partial.is_empty() {
                        None
                    } else {
                        Some(RecognitionHypothesis::partial(partial))
                    }
                }
                Ok(DecodingState::Failed) => {
                    let _ = events
                        .send(EngineEvent::Error(EngineError::Unknown(
                            "recognizer decoding failed".to_string(),
                        )))
                        .await;
                    return;
                }
                Err(e) => {
                    let _ = events
                        .send(EngineEvent::Error(EngineError::Unknown(format!(
                            "accept_waveform: {e}"
                        ))))
                        .await;
                    return;
                }
            };

            if let Some(hypothesis) = event
                && !hypothesis.is_empty()
                && events.send(EngineEvent::Hypothesis(hypothesis)).await.is_err()
            {
                // Receiver gone, session is over
                return;
            }
        }
    }
}
