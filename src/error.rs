//! Error types for the Solus client

use thiserror::Error;

/// Result type alias for Solus client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Solus client
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech engine error
    #[error("engine error: {0}")]
    Engine(#[from] crate::voice::EngineError),

    /// Chat backend error
    #[error("chat error: {0}")]
    Chat(#[from] crate::api::ChatError),

    /// Action execution error
    #[error("action error: {0}")]
    Action(String),

    /// Speech model error
    #[error("model error: {0}")]
    Model(String),

    /// Text-to-speech error
    #[error("tts error: {0}")]
    Tts(String),

    /// Voice session error
    #[error("session error: {0}")]
    Session(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Zip archive error
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}
