//! Voice session controller
//!
//! One task owns the whole wake-word/command state machine:
//!
//! ```text
//! Idle -> WakeWordListening -> WakeWordDetected -> CommandCapture
//!                 ^                                      |
//!                 |              Dispatching <-----------+
//!                 +------------------(cooldown)
//! ```
//!
//! All continuations (engine events, chat results, timers) arrive as
//! messages on a single internal channel, so transitions are serialized
//! without locks. Every message carries the generation counter it was
//! spawned under; a `stop`/`start` bumps the counter, which makes any
//! in-flight continuation from the previous session stale and silently
//! dropped. That guard is what keeps a slow chat response from a stopped
//! session from mutating the next one.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, watch};

use crate::action::ActionSink;
use crate::api::{ChatError, ChatReply, ChatRequest, SolusClient};
use crate::config::SettingsStore;

use super::engine::{EngineError, EngineEvent, EngineFactory, Severity, SpeechEngine};
use super::status::{Phase, SessionStatus, StatusPublisher};
use super::wake_word::WakeWordMatcher;

/// Timing knobs for the session state machine
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Pause after a reply before listening resumes
    pub cooldown: Duration,
    /// Pause before retrying after a recoverable error
    pub retry_delay: Duration,
    /// Pause before the wake engine restarts after command capture
    pub restart_delay: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(3),
            retry_delay: Duration::from_secs(1),
            restart_delay: Duration::from_millis(500),
        }
    }
}

/// Chat transport used by the controller; object-safe so tests can script it
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatReply, ChatError>;
}

#[async_trait]
impl ChatBackend for SolusClient {
    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatReply, ChatError> {
        Self::send_chat(self, request).await
    }
}

/// Commands accepted by a running controller
pub enum SessionCommand {
    /// Begin a session; the reply carries the startup outcome
    Start(oneshot::Sender<Result<(), EngineError>>),
    /// End the session, releasing the microphone; idempotent
    Stop(oneshot::Sender<()>),
    /// Stop and exit the controller task
    Shutdown,
}

/// Handle for driving a spawned controller
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    status: watch::Receiver<SessionStatus>,
}

impl SessionHandle {
    /// Start listening
    ///
    /// # Errors
    ///
    /// Returns the engine startup error if the wake engine could not start.
    pub async fn start(&self) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Start(tx))
            .await
            .map_err(|_| EngineError::Unknown("controller gone".to_string()))?;
        rx.await
            .map_err(|_| EngineError::Unknown("controller gone".to_string()))?
    }

    /// Stop listening; completes once the controller reaches idle
    pub async fn stop(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(SessionCommand::Stop(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// Stop and terminate the controller task
    pub async fn shutdown(&self) {
        let _ = self.commands.send(SessionCommand::Shutdown).await;
    }

    /// Subscribe to status updates
    #[must_use]
    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }
}

/// State held only while a session is active
struct ActiveSession {
    wake_engine: Box<dyn SpeechEngine>,
    command_engine: Box<dyn SpeechEngine>,
    matcher: WakeWordMatcher,
    wake_word_enabled: bool,
    user_id: String,
}

enum State {
    Idle,
    WakeWordListening,
    CommandCapture,
    Dispatching,
    /// Waiting on a timer before listening resumes
    Paused,
}

enum TimerKind {
    /// Post-reply pause
    Cooldown,
    /// Recoverable-error backoff
    Retry,
    /// Short gap between command capture and wake listening
    Restart,
}

/// Which engine produced an event; a stale callback from a stopped engine
/// must never be read as output of the other one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineRole {
    Wake,
    Command,
}

enum Internal {
    Engine {
        generation: u64,
        role: EngineRole,
        event: EngineEvent,
    },
    DispatchDone {
        generation: u64,
        result: Result<ChatReply, ChatError>,
    },
    Timer {
        generation: u64,
        kind: TimerKind,
    },
}

/// The session state machine; runs as a single tokio task
pub struct SessionController {
    factory: Box<dyn EngineFactory>,
    chat: Arc<dyn ChatBackend>,
    actions: Arc<dyn ActionSink>,
    settings: Arc<SettingsStore>,
    options: SessionOptions,
    status: StatusPublisher,

    state: State,
    generation: u64,
    session: Option<ActiveSession>,
    internal_tx: mpsc::Sender<Internal>,
    internal_rx: mpsc::Receiver<Internal>,
}

impl SessionController {
    /// Spawn a controller task and return its handle
    #[must_use]
    pub fn spawn(
        factory: Box<dyn EngineFactory>,
        chat: Arc<dyn ChatBackend>,
        actions: Arc<dyn ActionSink>,
        settings: Arc<SettingsStore>,
        options: SessionOptions,
    ) -> SessionHandle {
        let status = StatusPublisher::new();
        let status_rx = status.subscribe();
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (internal_tx, internal_rx) = mpsc::channel(64);

        let controller = Self {
            factory,
            chat,
            actions,
            settings,
            options,
            status,
            state: State::Idle,
            generation: 0,
            session: None,
            internal_tx,
            internal_rx,
        };

        tokio::spawn(controller.run(cmd_rx));

        SessionHandle {
            commands: cmd_tx,
            status: status_rx,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(SessionCommand::Start(respond)) => {
                        let result = self.handle_start().await;
                        let _ = respond.send(result);
                    }
                    Some(SessionCommand::Stop(respond)) => {
                        self.teardown(None).await;
                        let _ = respond.send(());
                    }
                    Some(SessionCommand::Shutdown) | None => {
                        self.teardown(None).await;
                        break;
                    }
                },
                Some(event) = self.internal_rx.recv() => {
                    self.handle_internal(event).await;
                }
            }
        }
        tracing::debug!("session controller exited");
    }

    async fn handle_start(&mut self) -> Result<(), EngineError> {
        if !matches!(self.state, State::Idle) {
            tracing::debug!("start ignored, session already active");
            return Ok(());
        }

        self.generation += 1;
        let settings = self.settings.current();

        let mut session = ActiveSession {
            wake_engine: self.factory.wake_engine(),
            command_engine: self.factory.command_engine(),
            matcher: WakeWordMatcher::new(&settings.wake_word),
            wake_word_enabled: settings.wake_word_enabled,
            user_id: settings.user_id,
        };

        let started = start_engine(
            session.wake_engine.as_mut(),
            EngineRole::Wake,
            self.generation,
            &self.internal_tx,
        )
        .await;

        match started {
            Ok(()) => {
                self.session = Some(session);
                self.state = State::WakeWordListening;
                self.status.set_phase_message(
                    Phase::WakeWordListening,
                    format!("listening for \"{}\"", session_phrase(self.session.as_ref())),
                );
                Ok(())
            }
            Err(e) => {
                session.wake_engine.destroy().await;
                session.command_engine.destroy().await;
                tracing::warn!(error = %e, "wake engine failed to start");
                Err(e)
            }
        }
    }

    /// Tear everything down and return to idle; safe to call from any state
    async fn teardown(&mut self, message: Option<String>) {
        self.generation += 1;
        if let Some(mut session) = self.session.take() {
            session.wake_engine.destroy().await;
            session.command_engine.destroy().await;
        }
        self.state = State::Idle;
        match message {
            Some(message) => self.status.set_phase_message(Phase::Idle, message),
            None => self.status.set_phase(Phase::Idle),
        }
    }

    async fn handle_internal(&mut self, event: Internal) {
        match event {
            Internal::Engine {
                generation,
                role,
                event,
            } => {
                if generation != self.generation {
                    tracing::trace!(generation, current = self.generation, "stale event dropped");
                    return;
                }
                if !self.role_is_active(role) {
                    // Callback from an engine we already stopped, e.g. a
                    // second wake hit arriving during the engine swap
                    tracing::trace!(?role, "event from inactive engine dropped");
                    return;
                }
                match event {
                    EngineEvent::Hypothesis(hypothesis) => {
                        // Partial results are informational only; acting on
                        // them would fire the wake word many times per
                        // utterance
                        if hypothesis.is_final && !hypothesis.is_empty() {
                            self.handle_transcript(hypothesis.text).await;
                        }
                    }
                    EngineEvent::Error(error) => self.handle_engine_error(error).await,
                }
            }
            Internal::DispatchDone { generation, result } => {
                if generation == self.generation {
                    self.handle_dispatch_done(result).await;
                }
            }
            Internal::Timer { generation, kind } => {
                if generation == self.generation {
                    self.handle_timer(kind).await;
                }
            }
        }
    }

    const fn role_is_active(&self, role: EngineRole) -> bool {
        match self.state {
            State::WakeWordListening => matches!(role, EngineRole::Wake),
            State::CommandCapture => matches!(role, EngineRole::Command),
            State::Idle | State::Dispatching | State::Paused => false,
        }
    }

    async fn handle_transcript(&mut self, text: String) {
        match self.state {
            State::WakeWordListening => self.handle_wake_transcript(text).await,
            State::CommandCapture => {
                tracing::info!(command = %text, "command captured");
                self.begin_dispatch(text).await;
            }
            _ => {
                tracing::debug!(%text, "transcript ignored in current state");
            }
        }
    }

    async fn handle_wake_transcript(&mut self, text: String) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        if !session.wake_word_enabled {
            session.wake_engine.stop().await;
            self.begin_dispatch(text).await;
            return;
        }

        let Some(matched) = session.matcher.match_transcript(&text) else {
            tracing::trace!(%text, "no wake word");
            return;
        };

        tracing::info!(%text, "wake word detected");
        session.wake_engine.stop().await;

        if let Some(command) = matched.trailing_command {
            // The command rode along with the wake phrase; skip capture
            self.begin_dispatch(command).await;
        } else {
            self.begin_command_capture().await;
        }
    }

    async fn begin_command_capture(&mut self) {
        self.status
            .set_phase_message(Phase::WakeWordDetected, "yes?");

        let Some(session) = self.session.as_mut() else {
            return;
        };

        // One-shot engines are inert after a capture; a fresh one per
        // attempt keeps their lifecycle unambiguous
        session.command_engine.destroy().await;
        session.command_engine = self.factory.command_engine();

        let started = start_engine(
            session.command_engine.as_mut(),
            EngineRole::Command,
            self.generation,
            &self.internal_tx,
        )
        .await;

        match started {
            Ok(()) => {
                self.state = State::CommandCapture;
                self.status.set_phase(Phase::CommandCapture);
            }
            Err(e) => self.handle_engine_error(e).await,
        }
    }

    async fn begin_dispatch(&mut self, text: String) {
        let Some(session) = self.session.as_ref() else {
            return;
        };

        self.state = State::Dispatching;
        self.status
            .set_phase_message(Phase::Dispatching, format!("processing: {text}"));

        let request = ChatRequest {
            text,
            user_id: session.user_id.clone(),
            conversation_id: self.settings.current().conversation_id,
        };

        let chat = Arc::clone(&self.chat);
        let internal = self.internal_tx.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            let result = chat.send_chat(&request).await;
            let _ = internal
                .send(Internal::DispatchDone { generation, result })
                .await;
        });
    }

    async fn handle_dispatch_done(&mut self, result: Result<ChatReply, ChatError>) {
        if !matches!(self.state, State::Dispatching) {
            return;
        }

        match result {
            Ok(reply) => {
                tracing::info!(
                    conversation_id = %reply.conversation_id,
                    reply = %reply.response_text,
                    "chat reply received"
                );

                if let Err(e) = self
                    .settings
                    .set_conversation_id(Some(reply.conversation_id))
                {
                    tracing::warn!(error = %e, "failed to persist conversation id");
                }

                self.status.set_message(reply.response_text);

                if let Some(action) = reply.action {
                    // Fire and forget; the sink isolates its own failures
                    let actions = Arc::clone(&self.actions);
                    tokio::spawn(async move {
                        actions.dispatch(action).await;
                    });
                }

                self.pause_then_resume(TimerKind::Cooldown, self.options.cooldown);
            }
            Err(e) => {
                tracing::warn!(error = %e, "chat request failed");
                self.status.set_message(format!("request failed: {e}"));
                self.pause_then_resume(TimerKind::Retry, self.options.retry_delay);
            }
        }
    }

    async fn handle_engine_error(&mut self, error: EngineError) {
        match error.severity() {
            Severity::Benign => {
                tracing::debug!(error = %error, "benign recognizer outcome");
                if matches!(self.state, State::CommandCapture) {
                    self.status.set_message("didn't catch that");
                }
                // The erroring engine must be stopped before the restart
                // timer fires, or a continuous engine still holding its
                // task would refuse the next start
                self.stop_active_engines().await;
                self.pause_then_resume(TimerKind::Restart, self.options.restart_delay);
            }
            Severity::Recoverable => {
                tracing::warn!(error = %error, "recoverable engine error, will retry");
                self.stop_active_engines().await;
                self.status.set_message(format!("recognizer error: {error}"));
                self.pause_then_resume(TimerKind::Retry, self.options.retry_delay);
            }
            Severity::Fatal => {
                tracing::error!(error = %error, "fatal engine error, stopping session");
                self.teardown(Some(format!("stopped: {error}"))).await;
            }
        }
    }

    async fn handle_timer(&mut self, kind: TimerKind) {
        if !matches!(self.state, State::Paused) {
            return;
        }
        match kind {
            TimerKind::Cooldown | TimerKind::Retry | TimerKind::Restart => {
                self.resume_wake_listening().await;
            }
        }
    }

    fn pause_then_resume(&mut self, kind: TimerKind, delay: Duration) {
        self.state = State::Paused;
        let internal = self.internal_tx.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = internal.send(Internal::Timer { generation, kind }).await;
        });
    }

    async fn stop_active_engines(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.wake_engine.stop().await;
            session.command_engine.stop().await;
        }
    }

    async fn resume_wake_listening(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        // A stray one-shot capture must not hold the microphone
        session.command_engine.stop().await;

        let started = start_engine(
            session.wake_engine.as_mut(),
            EngineRole::Wake,
            self.generation,
            &self.internal_tx,
        )
        .await;

        match started {
            Ok(()) => {
                self.state = State::WakeWordListening;
                self.status.set_phase(Phase::WakeWordListening);
            }
            Err(e) => match e.severity() {
                Severity::Fatal => self.teardown(Some(format!("stopped: {e}"))).await,
                _ => {
                    tracing::warn!(error = %e, "wake engine restart failed, retrying");
                    self.pause_then_resume(TimerKind::Retry, self.options.retry_delay);
                }
            },
        }
    }
}

/// Start an engine, stamping its events with the generation and role on
/// the way into the controller's internal channel
async fn start_engine(
    engine: &mut dyn SpeechEngine,
    role: EngineRole,
    generation: u64,
    internal: &mpsc::Sender<Internal>,
) -> Result<(), EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineEvent>(16);
    engine.start(tx).await?;

    let internal = internal.clone();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if internal
                .send(Internal::Engine {
                    generation,
                    role,
                    event,
                })
                .await
                .is_err()
            {
                break;
            }
        }
    });
    Ok(())
}

fn session_phrase(session: Option<&ActiveSession>) -> String {
    session.map_or_else(String::new, |s| s.matcher.phrase().to_string())
}
