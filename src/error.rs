use std::path::{Path, PathBuf};

/// Failures the crawl pipeline distinguishes between.
///
/// `Auth`, `Decrypt` and `MissingAsset` are fatal for the whole run.
/// `Navigation` is recovered where it happens and only logged. `Write` fails a
/// single class without affecting the others.
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error("login rejected by the portal: {0}")]
    Auth(String),

    #[error("the {0} you entered is incorrect")]
    Decrypt(&'static str),

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("missing required component: {0}")]
    MissingAsset(String),

    #[error("failed to write {}: {reason}", path.display())]
    Write { path: PathBuf, reason: String },

    #[error("invalid class selection '{0}'")]
    InvalidSelection(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unexpected portal response from {url}: {reason}")]
    Response { url: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CrawlError {
    /// Navigation failure for `url`.
    pub fn navigation(url: &str, reason: impl std::fmt::Display) -> Self {
        CrawlError::Navigation {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Output failure for `path`.
    pub fn write(path: &Path, reason: impl std::fmt::Display) -> Self {
        CrawlError::Write {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// Fatal errors end the run instead of being reported per class.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CrawlError::Auth(_) | CrawlError::Decrypt(_) | CrawlError::MissingAsset(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CrawlError>;
