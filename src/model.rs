//! Offline model catalog and downloader
//!
//! Models come from the upstream Vosk distribution site as zip archives
//! whose single top-level directory is the model id. Download streams to a
//! `.part` file next to the install location, extraction happens entry by
//! entry so progress can be reported, and an install is only considered
//! present when its directory is non-empty (a killed extraction leaves an
//! empty directory behind, which reads as not installed).

use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use crate::{Error, Result};

/// A downloadable recognition model
#[derive(Debug, Clone, Copy)]
pub struct ModelSpec {
    pub id: &'static str,
    pub url: &'static str,
    pub size_mb: u32,
    pub description: &'static str,
}

/// Known models, smallest first
pub const CATALOG: &[ModelSpec] = &[
    ModelSpec {
        id: "vosk-model-small-en-us-0.15",
        url: "https://alphacephei.com/vosk/models/vosk-model-small-en-us-0.15.zip",
        size_mb: 40,
        description: "Small US English model, fast, good for wake words",
    },
    ModelSpec {
        id: "vosk-model-en-us-0.22-lgraph",
        url: "https://alphacephei.com/vosk/models/vosk-model-en-us-0.22-lgraph.zip",
        size_mb: 128,
        description: "Medium US English model with dynamic graph",
    },
    ModelSpec {
        id: "vosk-model-en-us-0.22",
        url: "https://alphacephei.com/vosk/models/vosk-model-en-us-0.22.zip",
        size_mb: 1800,
        description: "Large US English model, best accuracy",
    },
    ModelSpec {
        id: "vosk-model-small-en-in-0.4",
        url: "https://alphacephei.com/vosk/models/vosk-model-small-en-in-0.4.zip",
        size_mb: 36,
        description: "Small Indian English model",
    },
];

/// Look up a catalog entry by id
#[must_use]
pub fn find(id: &str) -> Option<&'static ModelSpec> {
    CATALOG.iter().find(|m| m.id == id)
}

/// Progress callback; receives percent complete (0..=100)
pub type Progress = Arc<dyn Fn(u8) + Send + Sync>;

/// Manages the local model store
pub struct ModelManager {
    models_dir: PathBuf,
    client: reqwest::Client,
}

impl ModelManager {
    #[must_use]
    pub fn new(models_dir: PathBuf) -> Self {
        Self {
            models_dir,
            client: reqwest::Client::new(),
        }
    }

    /// Install directory for `id`
    #[must_use]
    pub fn model_dir(&self, id: &str) -> PathBuf {
        self.models_dir.join(id)
    }

    /// Whether `id` is installed (directory exists and is non-empty)
    #[must_use]
    pub fn is_installed(&self, id: &str) -> bool {
        std::fs::read_dir(self.model_dir(id))
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false)
    }

    /// Choose a model to load: `preferred` when installed, otherwise the
    /// first installed catalog model (catalog order, smallest first)
    #[must_use]
    pub fn pick_best(&self, preferred: &str) -> Option<String> {
        if self.is_installed(preferred) {
            return Some(preferred.to_string());
        }
        CATALOG
            .iter()
            .map(|m| m.id)
            .find(|id| self.is_installed(id))
            .map(String::from)
    }

    /// Ids of all installed models
    #[must_use]
    pub fn installed(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.models_dir) else {
            return Vec::new();
        };
        let mut ids: Vec<String> = entries
            .filter_map(std::result::Result::ok)
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|id| !id.starts_with('.') && self.is_installed(id))
            .collect();
        ids.sort();
        ids
    }

    /// Download and install a model, reporting progress
    ///
    /// Download covers 0..=50 percent, extraction 50..=100.
    ///
    /// # Errors
    ///
    /// Returns error on unknown id, network failure, or a corrupt archive.
    pub async fn download(&self, id: &str, progress: Progress) -> Result<PathBuf> {
        let spec =
            find(id).ok_or_else(|| Error::Model(format!("unknown model: {id}")))?;

        tokio::fs::create_dir_all(&self.models_dir).await?;
        let archive_path = self.models_dir.join(format!("{id}.zip.part"));

        tracing::info!(model = id, url = spec.url, "downloading model");
        self.fetch_archive(spec, &archive_path, &progress).await?;

        // Extract into a staging directory, then move the finished model
        // into place in one rename so a crash never leaves a half-extracted
        // install behind
        let staging = self.models_dir.join(format!(".staging-{id}"));
        if staging.exists() {
            tokio::fs::remove_dir_all(&staging).await?;
        }
        tokio::fs::create_dir_all(&staging).await?;

        tracing::info!(model = id, "extracting model");
        let extract_dest = staging.clone();
        let extract_archive = archive_path.clone();
        let extract_progress = Arc::clone(&progress);
        tokio::task::spawn_blocking(move || {
            extract(&extract_archive, &extract_dest, &extract_progress)
        })
        .await
        .map_err(|e| Error::Model(format!("extraction task failed: {e}")))??;

        tokio::fs::remove_file(&archive_path).await?;

        let extracted = staging.join(id);
        if !extracted.is_dir() {
            tokio::fs::remove_dir_all(&staging).await?;
            return Err(Error::Model(format!(
                "archive did not contain {id} at its top level"
            )));
        }

        let model_dir = self.model_dir(id);
        if model_dir.exists() {
            tokio::fs::remove_dir_all(&model_dir).await?;
        }
        tokio::fs::rename(&extracted, &model_dir).await?;
        tokio::fs::remove_dir_all(&staging).await?;

        progress(100);
        tracing::info!(model = id, path = %model_dir.display(), "model installed");
        Ok(model_dir)
    }

    /// Delete an installed model
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be removed.
    pub fn remove(&self, id: &str) -> Result<()> {
        let dir = self.model_dir(id);
        if dir.is_dir() {
            std::fs::remove_dir_all(&dir)?;
            tracing::info!(model = id, "model removed");
        }
        Ok(())
    }

    async fn fetch_archive(
        &self,
        spec: &ModelSpec,
        archive_path: &std::path::Path,
        progress: &Progress,
    ) -> Result<()> {
        let response = self.client.get(spec.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Model(format!(
                "model server returned {status} for {}",
                spec.url
            )));
        }

        let total = response
            .content_length()
            .unwrap_or(u64::from(spec.size_mb) * 1024 * 1024);

        let mut file = tokio::fs::File::create(archive_path).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            #[allow(clippy::cast_possible_truncation)]
            let percent = ((downloaded.min(total) * 50) / total.max(1)) as u8;
            progress(percent);
        }

        file.flush().await?;
        Ok(())
    }
}

/// Extract every entry of `archive_path` under `dest`
fn extract(
    archive_path: &std::path::Path,
    dest: &std::path::Path,
    progress: &Progress,
) -> Result<()> {
    let file = std::fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    let total = archive.len().max(1);

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        // Entries with traversal components are skipped outright
        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!(name = entry.name(), "skipping unsafe archive entry");
            continue;
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
        } else {
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut out = std::fs::File::create(&out_path)?;
            std::io::copy(&mut entry, &mut out)?;
        }

        #[allow(clippy::cast_possible_truncation)]
        let percent = 50 + (((index + 1) * 50) / total) as u8;
        progress(percent);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_lookup() {
        let spec = find("vosk-model-small-en-us-0.15").expect("in catalog");
        assert!(spec.url.ends_with(".zip"));
        assert!(find("no-such-model").is_none());
    }

    #[test]
    fn empty_directory_is_not_installed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = ModelManager::new(dir.path().to_path_buf());
        let id = "vosk-model-small-en-us-0.15";

        assert!(!manager.is_installed(id));

        // A bare directory (interrupted extraction) still counts as absent
        std::fs::create_dir_all(manager.model_dir(id)).expect("mkdir");
        assert!(!manager.is_installed(id));

        std::fs::write(manager.model_dir(id).join("README"), "model").expect("write");
        assert!(manager.is_installed(id));
    }

    #[test]
    fn installed_lists_only_populated_models() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = ModelManager::new(dir.path().to_path_buf());

        std::fs::create_dir_all(dir.path().join("vosk-model-en-us-0.22")).expect("mkdir");
        std::fs::create_dir_all(dir.path().join("vosk-model-small-en-us-0.15")).expect("mkdir");
        std::fs::write(
            dir.path().join("vosk-model-small-en-us-0.15/am.bin"),
            b"data",
        )
        .expect("write");

        assert_eq!(manager.installed(), vec!["vosk-model-small-en-us-0.15"]);
    }

    #[test]
    fn pick_best_prefers_configured_model() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = ModelManager::new(dir.path().to_path_buf());

        assert_eq!(manager.pick_best("vosk-model-small-en-us-0.15"), None);

        let install = |id: &str| {
            std::fs::create_dir_all(dir.path().join(id)).expect("mkdir");
            std::fs::write(dir.path().join(id).join("am.bin"), b"data").expect("write");
        };

        install("vosk-model-en-us-0.22");
        assert_eq!(
            manager.pick_best("vosk-model-small-en-us-0.15").as_deref(),
            Some("vosk-model-en-us-0.22")
        );

        install("vosk-model-small-en-us-0.15");
        assert_eq!(
            manager.pick_best("vosk-model-small-en-us-0.15").as_deref(),
            Some("vosk-model-small-en-us-0.15")
        );
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = ModelManager::new(dir.path().to_path_buf());
        let id = "vosk-model-small-en-us-0.15";

        std::fs::create_dir_all(manager.model_dir(id)).expect("mkdir");
        std::fs::write(manager.model_dir(id).join("a"), b"x").expect("write");

        manager.remove(id).expect("remove");
        assert!(!manager.is_installed(id));
        manager.remove(id).expect("second remove");
    }

    #[test]
    fn extraction_unpacks_nested_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive_path = dir.path().join("model.zip");

        {
            let file = std::fs::File::create(&archive_path).expect("create");
            let mut writer = zip::ZipWriter::new(file);
            let options = zip::write::SimpleFileOptions::default();
            writer
                .start_file("vosk-model-small-en-us-0.15/conf/model.conf", options)
                .expect("entry");
            std::io::Write::write_all(&mut writer, b"--sample-rate=16000").expect("write");
            writer.finish().expect("finish");
        }

        let reported = Arc::new(std::sync::Mutex::new(Vec::<u8>::new()));
        let sink = Arc::clone(&reported);
        let progress: Progress = Arc::new(move |p| sink.lock().expect("lock").push(p));

        extract(&archive_path, dir.path(), &progress).expect("extract");

        let content = std::fs::read_to_string(
            dir.path().join("vosk-model-small-en-us-0.15/conf/model.conf"),
        )
        .expect("read");
        assert_eq!(content, "--sample-rate=16000");
        assert_eq!(*reported.lock().expect("lock"), vec![100]);
    }
}
