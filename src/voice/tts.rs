//! Synthesis voice catalog and downloader
//!
//! Piper voices come as a pair of files from the upstream voice collection:
//! the onnx model (the large one) and its json config. A voice is installed
//! only when both files are present, so a download interrupted between the
//! two reads as not installed. Download progress covers the model at
//! 0..=90 percent and the config at 90..=100.

use std::path::PathBuf;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use crate::model::Progress;
use crate::{Error, Result};

/// A downloadable synthesis voice
#[derive(Debug, Clone, Copy)]
pub struct VoiceSpec {
    pub id: &'static str,
    pub language: &'static str,
    pub size_mb: u32,
    pub description: &'static str,
    pub model_url: &'static str,
    pub config_url: &'static str,
}

/// Known voices, default first
pub const VOICES: &[VoiceSpec] = &[
    VoiceSpec {
        id: "en_US-lessac-medium",
        language: "en-US",
        size_mb: 63,
        description: "Lessac, US English, medium quality",
        model_url: "https://huggingface.co/rhasspy/piper-voices/resolve/main/en/en_US/lessac/medium/en_US-lessac-medium.onnx",
        config_url: "https://huggingface.co/rhasspy/piper-voices/resolve/main/en/en_US/lessac/medium/en_US-lessac-medium.onnx.json",
    },
    VoiceSpec {
        id: "en_US-amy-medium",
        language: "en-US",
        size_mb: 63,
        description: "Amy, US English, medium quality",
        model_url: "https://huggingface.co/rhasspy/piper-voices/resolve/main/en/en_US/amy/medium/en_US-amy-medium.onnx",
        config_url: "https://huggingface.co/rhasspy/piper-voices/resolve/main/en/en_US/amy/medium/en_US-amy-medium.onnx.json",
    },
    VoiceSpec {
        id: "en_GB-alan-medium",
        language: "en-GB",
        size_mb: 63,
        description: "Alan, British English, medium quality",
        model_url: "https://huggingface.co/rhasspy/piper-voices/resolve/main/en/en_GB/alan/medium/en_GB-alan-medium.onnx",
        config_url: "https://huggingface.co/rhasspy/piper-voices/resolve/main/en/en_GB/alan/medium/en_GB-alan-medium.onnx.json",
    },
    VoiceSpec {
        id: "en_US-lessac-low",
        language: "en-US",
        size_mb: 20,
        description: "Lessac, US English, low quality, faster",
        model_url: "https://huggingface.co/rhasspy/piper-voices/resolve/main/en/en_US/lessac/low/en_US-lessac-low.onnx",
        config_url: "https://huggingface.co/rhasspy/piper-voices/resolve/main/en/en_US/lessac/low/en_US-lessac-low.onnx.json",
    },
];

/// Look up a catalog entry by id
#[must_use]
pub fn find_voice(id: &str) -> Option<&'static VoiceSpec> {
    VOICES.iter().find(|v| v.id == id)
}

/// Manages the local voice store
pub struct VoiceManager {
    voices_dir: PathBuf,
    client: reqwest::Client,
}

impl VoiceManager {
    #[must_use]
    pub fn new(voices_dir: PathBuf) -> Self {
        Self {
            voices_dir,
            client: reqwest::Client::new(),
        }
    }

    /// Path of the onnx model for `id`
    #[must_use]
    pub fn model_path(&self, id: &str) -> PathBuf {
        self.voices_dir.join(format!("{id}.onnx"))
    }

    /// Path of the json config for `id`
    #[must_use]
    pub fn config_path(&self, id: &str) -> PathBuf {
        self.voices_dir.join(format!("{id}.onnx.json"))
    }

    /// Whether `id` is installed (both the model and its config exist)
    #[must_use]
    pub fn is_installed(&self, id: &str) -> bool {
        self.model_path(id).is_file() && self.config_path(id).is_file()
    }

    /// Choose a voice to load: `preferred` when installed, otherwise the
    /// first installed catalog voice
    #[must_use]
    pub fn pick_voice(&self, preferred: &str) -> Option<String> {
        if self.is_installed(preferred) {
            return Some(preferred.to_string());
        }
        VOICES
            .iter()
            .map(|v| v.id)
            .find(|id| self.is_installed(id))
            .map(String::from)
    }

    /// Ids of all installed voices, catalog order
    #[must_use]
    pub fn installed(&self) -> Vec<String> {
        VOICES
            .iter()
            .map(|v| v.id)
            .filter(|id| self.is_installed(id))
            .map(String::from)
            .collect()
    }

    /// Download and install a voice, reporting progress
    ///
    /// # Errors
    ///
    /// Returns error on unknown id or network failure.
    pub async fn download(&self, id: &str, progress: Progress) -> Result<()> {
        let spec = find_voice(id).ok_or_else(|| Error::Tts(format!("unknown voice: {id}")))?;

        tokio::fs::create_dir_all(&self.voices_dir).await?;

        tracing::info!(voice = id, url = spec.model_url, "downloading voice model");
        self.fetch(
            spec.model_url,
            &self.model_path(id),
            u64::from(spec.size_mb) * 1024 * 1024,
            (0, 90),
            &progress,
        )
        .await?;

        tracing::info!(voice = id, url = spec.config_url, "downloading voice config");
        self.fetch(spec.config_url, &self.config_path(id), 4096, (90, 100), &progress)
            .await?;

        progress(100);
        tracing::info!(voice = id, "voice installed");
        Ok(())
    }

    /// Delete an installed voice
    ///
    /// # Errors
    ///
    /// Returns error if a file cannot be removed.
    pub fn remove(&self, id: &str) -> Result<()> {
        for path in [self.model_path(id), self.config_path(id)] {
            if path.is_file() {
                std::fs::remove_file(&path)?;
            }
        }
        tracing::info!(voice = id, "voice removed");
        Ok(())
    }

    /// Stream `url` into `dest`, mapping byte progress onto `range`
    ///
    /// Writes to a `.part` file and renames on completion, so a killed
    /// download never leaves a truncated file at the install path.
    async fn fetch(
        &self,
        url: &str,
        dest: &std::path::Path,
        size_hint: u64,
        range: (u8, u8),
        progress: &Progress,
    ) -> Result<()> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Tts(format!("voice server returned {status} for {url}")));
        }

        let total = response.content_length().unwrap_or(size_hint).max(1);
        let span = u64::from(range.1 - range.0);

        let part = dest.with_extension("part");
        let mut file = tokio::fs::File::create(&part).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            #[allow(clippy::cast_possible_truncation)]
            let percent = range.0 + ((downloaded.min(total) * span) / total) as u8;
            progress(percent);
        }

        file.flush().await?;
        drop(file);
        tokio::fs::rename(&part, dest).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_lookup() {
        let spec = find_voice("en_US-lessac-medium").expect("in catalog");
        assert!(spec.model_url.ends_with(".onnx"));
        assert!(spec.config_url.ends_with(".onnx.json"));
        assert!(find_voice("no-such-voice").is_none());
    }

    #[test]
    fn install_requires_both_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = VoiceManager::new(dir.path().to_path_buf());
        let id = "en_US-lessac-medium";

        assert!(!manager.is_installed(id));

        // The model alone (config download interrupted) reads as absent
        std::fs::write(manager.model_path(id), b"onnx").expect("write");
        assert!(!manager.is_installed(id));

        std::fs::write(manager.config_path(id), b"{}").expect("write");
        assert!(manager.is_installed(id));
    }

    #[test]
    fn pick_voice_prefers_configured_voice() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = VoiceManager::new(dir.path().to_path_buf());

        assert_eq!(manager.pick_voice("en_US-lessac-medium"), None);

        let install = |id: &str| {
            std::fs::write(manager.model_path(id), b"onnx").expect("write");
            std::fs::write(manager.config_path(id), b"{}").expect("write");
        };

        install("en_GB-alan-medium");
        assert_eq!(
            manager.pick_voice("en_US-lessac-medium").as_deref(),
            Some("en_GB-alan-medium")
        );

        install("en_US-lessac-medium");
        assert_eq!(
            manager.pick_voice("en_US-lessac-medium").as_deref(),
            Some("en_US-lessac-medium")
        );
        assert_eq!(
            manager.installed(),
            vec!["en_US-lessac-medium", "en_GB-alan-medium"]
        );
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = VoiceManager::new(dir.path().to_path_buf());
        let id = "en_US-amy-medium";

        std::fs::write(manager.model_path(id), b"onnx").expect("write");
        std::fs::write(manager.config_path(id), b"{}").expect("write");

        manager.remove(id).expect("remove");
        assert!(!manager.is_installed(id));
        manager.remove(id).expect("second remove");
    }
}
