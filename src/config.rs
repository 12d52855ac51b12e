//! Settings management for the Solus client
//!
//! Settings live in a TOML file under the platform config directory and are
//! published through a [`tokio::sync::watch`] channel so long-running tasks
//! (the voice session controller in particular) can observe changes. A value
//! read from the channel applies to the *next* engine initialization, never
//! retroactively to a running engine.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::{Error, Result};

/// Default chat server host
pub const DEFAULT_SERVER_HOST: &str = "http://127.0.0.1";

/// Default chat server port
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default wake phrase
pub const DEFAULT_WAKE_WORD: &str = "hey solus";

/// Default offline speech model
pub const DEFAULT_MODEL_ID: &str = "vosk-model-small-en-us-0.15";

/// Default synthesis voice (see [`crate::voice::tts::VOICES`])
pub const DEFAULT_TTS_VOICE: &str = "en_US-lessac-medium";

/// Persisted client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Chat server host, including scheme (e.g. `http://192.168.1.10`)
    pub server_host: String,

    /// Chat server port
    pub server_port: u16,

    /// Stable per-install user identifier, generated on first run
    pub user_id: String,

    /// Current conversation identifier, assigned by the server
    pub conversation_id: Option<String>,

    /// Wake phrase matched against recognized speech (case-insensitive)
    pub wake_word: String,

    /// When false, every final hypothesis is treated as a command
    pub wake_word_enabled: bool,

    /// Offline speech model identifier (see [`crate::model::CATALOG`])
    pub model_id: String,

    /// Start listening as soon as the daemon launches
    pub auto_start: bool,

    /// Cloud transcription endpoint for command capture
    /// (OpenAI-compatible `audio/transcriptions` shape)
    pub transcribe_url: Option<String>,

    /// API key for the cloud transcription endpoint
    pub transcribe_api_key: Option<String>,

    /// Cloud transcription model identifier
    pub transcribe_model: String,

    /// Speak chat replies aloud when a synthesis voice is installed
    pub tts_enabled: bool,

    /// Synthesis voice identifier (see [`crate::voice::tts::VOICES`])
    pub tts_voice: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_host: DEFAULT_SERVER_HOST.to_string(),
            server_port: DEFAULT_SERVER_PORT,
            user_id: String::new(),
            conversation_id: None,
            wake_word: DEFAULT_WAKE_WORD.to_string(),
            wake_word_enabled: true,
            model_id: DEFAULT_MODEL_ID.to_string(),
            auto_start: true,
            transcribe_url: None,
            transcribe_api_key: None,
            transcribe_model: "whisper-1".to_string(),
            tts_enabled: false,
            tts_voice: DEFAULT_TTS_VOICE.to_string(),
        }
    }
}

impl Settings {
    /// Base URL of the chat server, trailing slash stripped
    #[must_use]
    pub fn server_base_url(&self) -> String {
        format!(
            "{}:{}",
            self.server_host.trim_end_matches('/'),
            self.server_port
        )
    }
}

/// Settings store: owns the file, publishes changes via a watch channel
pub struct SettingsStore {
    path: Option<PathBuf>,
    tx: watch::Sender<Settings>,
}

impl SettingsStore {
    /// Open the store, loading settings from disk and the environment
    ///
    /// Generates and persists a `user_id` on first run.
    ///
    /// # Errors
    ///
    /// Returns error if the config directory cannot be created or the
    /// settings file cannot be parsed.
    pub fn open() -> Result<Self> {
        let path = settings_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut settings = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            toml::from_str(&content)?
        } else {
            Settings::default()
        };

        apply_env_overrides(&mut settings);

        let mut dirty = false;
        if settings.user_id.is_empty() {
            settings.user_id = format!("solus_{}", uuid::Uuid::new_v4());
            tracing::info!(user_id = %settings.user_id, "generated user id");
            dirty = true;
        }

        let store = Self {
            path: Some(path),
            tx: watch::channel(settings.clone()).0,
        };

        if dirty {
            store.persist(&settings)?;
        }

        Ok(store)
    }

    /// In-memory store with no backing file (tests, one-shot commands)
    #[must_use]
    pub fn ephemeral(settings: Settings) -> Self {
        Self {
            path: None,
            tx: watch::channel(settings).0,
        }
    }

    /// Snapshot of the current settings
    #[must_use]
    pub fn current(&self) -> Settings {
        self.tx.borrow().clone()
    }

    /// Subscribe to settings changes
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Settings> {
        self.tx.subscribe()
    }

    /// Update the conversation id (or clear it with `None`) and persist
    ///
    /// # Errors
    ///
    /// Returns error if the settings file cannot be written.
    pub fn set_conversation_id(&self, id: Option<String>) -> Result<()> {
        self.update(|s| s.conversation_id = id)
    }

    /// Update the chat server host and persist
    ///
    /// # Errors
    ///
    /// Returns error if the settings file cannot be written.
    pub fn set_server_host(&self, host: String) -> Result<()> {
        self.update(|s| s.server_host = host)
    }

    /// Update the wake phrase and persist
    ///
    /// # Errors
    ///
    /// Returns error if the settings file cannot be written.
    pub fn set_wake_word(&self, wake_word: String) -> Result<()> {
        self.update(|s| s.wake_word = wake_word)
    }

    /// Update the offline model id and persist
    ///
    /// # Errors
    ///
    /// Returns error if the settings file cannot be written.
    pub fn set_model_id(&self, model_id: String) -> Result<()> {
        self.update(|s| s.model_id = model_id)
    }

    /// Update the synthesis voice and persist
    ///
    /// # Errors
    ///
    /// Returns error if the settings file cannot be written.
    pub fn set_tts_voice(&self, voice_id: String) -> Result<()> {
        self.update(|s| s.tts_voice = voice_id)
    }

    fn update(&self, f: impl FnOnce(&mut Settings)) -> Result<()> {
        let mut settings = self.tx.borrow().clone();
        f(&mut settings);
        self.persist(&settings)?;
        // send_replace never fails even with no receivers
        self.tx.send_replace(settings);
        Ok(())
    }

    fn persist(&self, settings: &Settings) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let content = toml::to_string_pretty(settings)
            .map_err(|e| Error::Config(format!("failed to serialize settings: {e}")))?;
        std::fs::write(path, content)?;
        tracing::debug!(path = %path.display(), "settings persisted");
        Ok(())
    }
}

fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(host) = std::env::var("SOLUS_SERVER_HOST") {
        settings.server_host = host;
    }
    if let Ok(port) = std::env::var("SOLUS_SERVER_PORT")
        && let Ok(port) = port.parse()
    {
        settings.server_port = port;
    }
    if let Ok(wake_word) = std::env::var("SOLUS_WAKE_WORD") {
        settings.wake_word = wake_word;
    }
    if let Ok(model_id) = std::env::var("SOLUS_MODEL_ID") {
        settings.model_id = model_id;
    }
    if let Ok(url) = std::env::var("SOLUS_TRANSCRIBE_URL") {
        settings.transcribe_url = Some(url);
    }
    if let Ok(key) = std::env::var("SOLUS_TRANSCRIBE_API_KEY") {
        settings.transcribe_api_key = Some(key);
    }
    if let Ok(model) = std::env::var("SOLUS_TRANSCRIBE_MODEL") {
        settings.transcribe_model = model;
    }
    if let Ok(voice) = std::env::var("SOLUS_TTS_VOICE") {
        settings.tts_voice = voice;
    }
}

/// Path to the settings file (`~/.config/solus/settings.toml` on Linux)
#[must_use]
pub fn settings_path() -> PathBuf {
    directories::ProjectDirs::from("dev", "solus", "solus").map_or_else(
        || PathBuf::from(".solus/settings.toml"),
        |d| d.config_dir().join("settings.toml"),
    )
}

/// Data directory for models and notes (`~/.local/share/solus` on Linux)
#[must_use]
pub fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("dev", "solus", "solus")
        .map_or_else(|| PathBuf::from(".solus"), |d| d.data_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_base_url() {
        let settings = Settings::default();
        assert_eq!(settings.server_base_url(), "http://127.0.0.1:8000");
    }

    #[test]
    fn base_url_strips_trailing_slash() {
        let settings = Settings {
            server_host: "http://10.0.0.2/".to_string(),
            server_port: 9000,
            ..Settings::default()
        };
        assert_eq!(settings.server_base_url(), "http://10.0.0.2:9000");
    }

    #[test]
    fn ephemeral_store_round_trip() {
        let store = SettingsStore::ephemeral(Settings::default());
        let mut rx = store.watch();

        store
            .set_conversation_id(Some("abc".to_string()))
            .expect("update");

        assert!(rx.has_changed().expect("channel open"));
        assert_eq!(
            rx.borrow_and_update().conversation_id.as_deref(),
            Some("abc")
        );

        store.set_conversation_id(None).expect("update");
        assert_eq!(store.current().conversation_id, None);
    }

    #[test]
    fn settings_toml_round_trip() {
        let settings = Settings {
            user_id: "solus_test".to_string(),
            conversation_id: Some("conv-1".to_string()),
            ..Settings::default()
        };
        let toml = toml::to_string_pretty(&settings).expect("serialize");
        let parsed: Settings = toml::from_str(&toml).expect("parse");
        assert_eq!(parsed.user_id, "solus_test");
        assert_eq!(parsed.conversation_id.as_deref(), Some("conv-1"));
        assert_eq!(parsed.wake_word, DEFAULT_WAKE_WORD);
        assert!(!parsed.tts_enabled);
        assert_eq!(parsed.tts_voice, DEFAULT_TTS_VOICE);
    }

    #[test]
    fn tts_voice_update_is_published() {
        let store = SettingsStore::ephemeral(Settings::default());
        store
            .set_tts_voice("en_GB-alan-medium".to_string())
            .expect("update");
        assert_eq!(store.current().tts_voice, "en_GB-alan-medium");
    }
}
