//! Speech engine abstraction
//!
//! A [`SpeechEngine`] turns microphone audio into recognition hypotheses.
//! Two renditions exist: the continuous local engine ([`super::local`]) used
//! for wake-word listening, and the one-shot cloud engine ([`super::cloud`])
//! used for command capture. The session controller treats both uniformly
//! through this trait, branching only on [`SpeechEngine::continuous`].

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::hypothesis::RecognitionHypothesis;

/// How the session controller should react to an engine error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Expected outcome of normal operation; resume listening immediately
    Benign,
    /// Transient failure; retry after a short delay
    Recoverable,
    /// Cannot be fixed by retrying; stop the session
    Fatal,
}

/// Errors surfaced by speech engines
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("no speech detected")]
    NoSpeechDetected,

    #[error("speech timeout")]
    Timeout,

    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("network unavailable")]
    NetworkUnavailable,

    #[error("recognizer busy")]
    Busy,

    #[error("recognizer client error: {0}")]
    Client(String),

    #[error("recognizer server error: {0}")]
    Server(String),

    #[error("engine not available: {0}")]
    NotAvailable(String),

    #[error("recognizer error: {0}")]
    Unknown(String),
}

impl EngineError {
    /// Classify this error for the session controller
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::NoSpeechDetected | Self::Timeout => Severity::Benign,
            Self::NetworkUnavailable
            | Self::Busy
            | Self::Client(_)
            | Self::Server(_)
            | Self::Unknown(_) => Severity::Recoverable,
            Self::PermissionDenied | Self::NotAvailable(_) => Severity::Fatal,
        }
    }
}

/// Event emitted by a running engine
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A recognition hypothesis (partial or final)
    Hypothesis(RecognitionHypothesis),
    /// The engine hit an error and stopped recognizing
    Error(EngineError),
}

/// A speech recognition engine
///
/// `start` begins a recognition pass, delivering results on `events`. A
/// continuous engine keeps emitting hypotheses until stopped; a one-shot
/// engine emits exactly one terminal event (a final hypothesis or an error)
/// per start. Startup failures are returned from `start` itself rather than
/// through the channel, so callers can distinguish "never started" from
/// "started then failed".
#[async_trait]
pub trait SpeechEngine: Send {
    /// Whether this engine keeps recognizing until stopped
    fn continuous(&self) -> bool;

    /// Begin recognizing, delivering events on `events`
    ///
    /// # Errors
    ///
    /// Returns error if recognition could not be started at all.
    async fn start(&mut self, events: mpsc::Sender<EngineEvent>) -> Result<(), EngineError>;

    /// Stop the current recognition pass, releasing the microphone
    async fn stop(&mut self);

    /// Release all resources; the engine must not be started again
    async fn destroy(&mut self);
}

/// Creates engines on demand for the session controller
///
/// A fresh pair is created per session so a fatal teardown never leaks a
/// half-dead engine into the next session.
pub trait EngineFactory: Send {
    /// Engine used for wake-word listening (continuous)
    fn wake_engine(&self) -> Box<dyn SpeechEngine>;

    /// Engine used for command capture (one-shot)
    fn command_engine(&self) -> Box<dyn SpeechEngine>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_classification() {
        assert_eq!(EngineError::NoSpeechDetected.severity(), Severity::Benign);
        assert_eq!(EngineError::Timeout.severity(), Severity::Benign);
        assert_eq!(
            EngineError::NetworkUnavailable.severity(),
            Severity::Recoverable
        );
        assert_eq!(EngineError::Busy.severity(), Severity::Recoverable);
        assert_eq!(
            EngineError::Server("502".into()).severity(),
            Severity::Recoverable
        );
        assert_eq!(EngineError::PermissionDenied.severity(), Severity::Fatal);
        assert_eq!(
            EngineError::NotAvailable("no model".into()).severity(),
            Severity::Fatal
        );
    }
}
