use crate::error::{CrawlError, Result};
use crate::models::TeacherIdentity;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Create every missing parent directory of `path`. Safe to call repeatedly.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| CrawlError::write(parent, e))?;
        }
    }
    Ok(())
}

/// Write `value` as pretty JSON, creating parent directories.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    ensure_parent_dir(path)?;
    let text = serde_json::to_string_pretty(value)?;
    std::fs::write(path, text).map_err(|e| CrawlError::write(path, e))
}

/// Read and deserialize a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Teacher id derived at login, at `<state_dir>/teacher.json`.
pub struct TeacherStore {
    path: PathBuf,
}

impl TeacherStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join("teacher.json"),
        }
    }

    /// The cached teacher id, if any.
    pub fn load(&self) -> Option<String> {
        read_json::<TeacherIdentity>(&self.path)
            .ok()
            .map(|t| t.teacher_id)
            .filter(|id| !id.is_empty())
    }

    /// Persist `teacher_id` unless one is already cached.
    pub fn remember(&self, teacher_id: &str) -> Result<()> {
        if self.load().is_some() {
            return Ok(());
        }
        write_json(
            &self.path,
            &TeacherIdentity {
                teacher_id: teacher_id.to_string(),
            },
        )
    }
}

/// One cached page snapshot, keyed by (section, class).
#[derive(Debug, Clone)]
pub struct CacheEntry {
    path: PathBuf,
}

impl CacheEntry {
    /// Cache entry for the progress page of one class.
    pub fn for_class(cache_dir: &Path, section_id: &str, class_id: &str) -> Self {
        Self {
            path: cache_dir.join(section_id).join(class_id).join("index.html"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cached markup, or `None` when absent or unreadable.
    pub async fn read(&self) -> Option<String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(markup) => Some(markup),
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "no cached page");
                None
            }
        }
    }

    /// Store `markup`, creating parent directories.
    pub async fn write(&self, markup: &str) -> Result<()> {
        ensure_parent_dir(&self.path)?;
        tokio::fs::write(&self.path, markup)
            .await
            .map_err(|e| CrawlError::write(&self.path, e))
    }
}
