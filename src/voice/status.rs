//! Session status reporting
//!
//! The controller publishes its phase and user-facing messages through a
//! watch channel; frontends (the CLI daemon, tests) subscribe and render.

use tokio::sync::watch;

/// Phase of the voice session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// No session active, microphone released
    #[default]
    Idle,
    /// Continuous engine running, watching for the wake phrase
    WakeWordListening,
    /// Wake phrase heard, command engine starting
    WakeWordDetected,
    /// One-shot command engine capturing an utterance
    CommandCapture,
    /// Chat request in flight
    Dispatching,
}

impl Phase {
    /// Short label for logs and the CLI status line
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::WakeWordListening => "listening",
            Self::WakeWordDetected => "wake word detected",
            Self::CommandCapture => "capturing command",
            Self::Dispatching => "thinking",
        }
    }
}

/// A point-in-time status snapshot
#[derive(Debug, Clone, Default)]
pub struct SessionStatus {
    pub phase: Phase,
    /// Most recent user-facing message (reply text, error description)
    pub message: Option<String>,
}

/// Publishes status snapshots to any number of observers
#[derive(Debug)]
pub struct StatusPublisher {
    tx: watch::Sender<SessionStatus>,
}

impl Default for StatusPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusPublisher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tx: watch::channel(SessionStatus::default()).0,
        }
    }

    /// Subscribe to status updates
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.tx.subscribe()
    }

    /// Publish a phase change, keeping the current message
    pub fn set_phase(&self, phase: Phase) {
        self.tx.send_modify(|s| s.phase = phase);
        tracing::debug!(phase = phase.label(), "session phase");
    }

    /// Publish a phase change together with a message
    pub fn set_phase_message(&self, phase: Phase, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(phase = phase.label(), %message, "session phase");
        self.tx.send_modify(|s| {
            s.phase = phase;
            s.message = Some(message);
        });
    }

    /// Publish a message without changing phase
    pub fn set_message(&self, message: impl Into<String>) {
        self.tx.send_modify(|s| s.message = Some(message.into()));
    }

    /// Current snapshot
    #[must_use]
    pub fn current(&self) -> SessionStatus {
        self.tx.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_changes_reach_subscribers() {
        let publisher = StatusPublisher::new();
        let rx = publisher.subscribe();

        publisher.set_phase(Phase::WakeWordListening);
        assert_eq!(rx.borrow().phase, Phase::WakeWordListening);

        publisher.set_phase_message(Phase::Idle, "stopped");
        let status = rx.borrow().clone();
        assert_eq!(status.phase, Phase::Idle);
        assert_eq!(status.message.as_deref(), Some("stopped"));
    }

    #[test]
    fn message_survives_phase_change() {
        let publisher = StatusPublisher::new();
        publisher.set_message("hello");
        publisher.set_phase(Phase::Dispatching);
        assert_eq!(publisher.current().message.as_deref(), Some("hello"));
    }
}
