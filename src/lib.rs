//! Solus client - hands-free voice assistant frontend
//!
//! This library provides the core functionality for the Solus client:
//! - Wake word listening via an offline recognizer
//! - Command capture via cloud transcription
//! - Conversation with the Solus chat server
//! - Server-requested device actions
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                 Session Controller                │
//! │   Idle → Listening → Capture → Dispatch → ...    │
//! └───────┬───────────────┬──────────────┬───────────┘
//!         │               │              │
//! ┌───────▼──────┐ ┌──────▼───────┐ ┌────▼──────────┐
//! │  Wake Engine │ │ Command      │ │  Chat Client  │
//! │  (local)     │ │ Engine       │ │  + Actions    │
//! │              │ │ (cloud)      │ │               │
//! └──────────────┘ └──────────────┘ └───────────────┘
//! ```

pub mod action;
pub mod api;
pub mod config;
pub mod error;
pub mod model;
pub mod voice;

pub use action::{ActionSink, DesktopActions};
pub use api::{ChatReply, ChatRequest, ServerAction, SolusClient};
pub use config::{Settings, SettingsStore};
pub use error::{Error, Result};
pub use model::{ModelManager, ModelSpec};
pub use voice::{
    DefaultEngineFactory, EngineError, EngineFactory, Phase, SessionController, SessionHandle,
    SessionOptions, SpeechEngine, VoiceManager, WakeWordMatcher,
};
