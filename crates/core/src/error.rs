use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while preparing or running a tree build.
///
/// `Configuration` and `BuildEnvironment` are fatal for the run that raised
/// them. `FileIndex` only ever degrades a single file.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("build environment error: {0}")]
    BuildEnvironment(String),

    #[error("cannot index {}: {reason}", path.display())]
    FileIndex { path: PathBuf, reason: String },
}

impl IndexError {
    pub fn file_index(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        IndexError::FileIndex {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, IndexError::FileIndex { .. })
    }
}
