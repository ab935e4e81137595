use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::RewardConfig;

// ============================================================================
// Reward Store - durable copy of the active RewardConfig
// ============================================================================
//
// The whole file is replaced on every save. Writes go to a sibling temp
// file which is synced and then renamed over the target, and the directory
// is synced after the rename. A crash leaves either the previous record or
// the new one, never a torn file.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Reward store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Reward store contents are invalid: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct RewardStore {
    path: PathBuf,
}

impl RewardStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<RewardConfig, StoreError> {
        let contents = fs::read_to_string(&self.path).map_err(|source| self.io_error(source))?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Best-effort read used at startup. A missing or unreadable record falls
    /// back to the built-in defaults.
    pub fn load_or_default(&self) -> RewardConfig {
        match self.load() {
            Ok(config) => {
                tracing::info!(
                    path = %self.path.display(),
                    rewards = config.len(),
                    "Loaded saved reward weights"
                );
                config
            }
            Err(StoreError::Io { ref source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "No rewards saved, using defaults");
                RewardConfig::default()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot decode saved rewards, using defaults");
                RewardConfig::default()
            }
        }
    }

    pub fn save(&self, config: &RewardConfig) -> Result<(), StoreError> {
        let json = config.to_json()?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }

        let tmp_path = self.tmp_path();
        let write = || -> std::io::Result<()> {
            let mut file = File::create(&tmp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp_path, &self.path)
        };

        if let Err(source) = write() {
            let _ = fs::remove_file(&tmp_path);
            return Err(self.io_error(source));
        }
        self.sync_parent().map_err(|source| self.io_error(source))?;

        tracing::debug!(path = %self.path.display(), "Persisted reward weights");
        Ok(())
    }

    /// Make the rename itself durable
    #[cfg(unix)]
    fn sync_parent(&self) -> std::io::Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        File::open(parent)?.sync_all()
    }

    #[cfg(not(unix))]
    fn sync_parent(&self) -> std::io::Result<()> {
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "rewards.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
