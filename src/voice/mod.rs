//! Voice pipeline: capture, recognition engines, wake word, session control

pub mod capture;
pub mod cloud;
pub mod engine;
pub mod hypothesis;
pub mod local;
pub mod session;
pub mod status;
pub mod tts;
pub mod wake_word;

use std::path::PathBuf;
use std::sync::Arc;

pub use capture::{CaptureThread, SAMPLE_RATE, samples_to_wav};
pub use cloud::CloudCommandEngine;
pub use engine::{EngineError, EngineEvent, EngineFactory, Severity, SpeechEngine};
pub use hypothesis::RecognitionHypothesis;
pub use local::LocalWakeEngine;
pub use session::{
    ChatBackend, SessionController, SessionHandle, SessionOptions,
};
pub use status::{Phase, SessionStatus, StatusPublisher};
pub use tts::VoiceManager;
pub use wake_word::{WakeWordMatch, WakeWordMatcher};

use crate::config::SettingsStore;

/// Production engine factory: local Vosk for wake listening, cloud
/// transcription for command capture
///
/// Settings are read at engine creation time, so a model or endpoint change
/// takes effect on the next session start.
pub struct DefaultEngineFactory {
    settings: Arc<SettingsStore>,
    models_dir: PathBuf,
}

impl DefaultEngineFactory {
    #[must_use]
    pub fn new(settings: Arc<SettingsStore>, models_dir: PathBuf) -> Self {
        Self {
            settings,
            models_dir,
        }
    }
}

impl EngineFactory for DefaultEngineFactory {
    fn wake_engine(&self) -> Box<dyn SpeechEngine> {
        let settings = self.settings.current();
        let manager = crate::model::ModelManager::new(self.models_dir.clone());
        let model_id = manager.pick_best(&settings.model_id).map_or_else(
            || settings.model_id.clone(),
            |picked| {
                if picked != settings.model_id {
                    tracing::info!(
                        configured = %settings.model_id,
                        using = %picked,
                        "configured model not installed, using fallback"
                    );
                }
                picked
            },
        );
        Box::new(LocalWakeEngine::new(self.models_dir.join(model_id)))
    }

    fn command_engine(&self) -> Box<dyn SpeechEngine> {
        let settings = self.settings.current();
        Box::new(CloudCommandEngine::new(
            settings.transcribe_url,
            settings.transcribe_api_key,
            settings.transcribe_model,
        ))
    }
}
