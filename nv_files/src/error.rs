use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use nv_core::NoteError;

/// Failure to open the backing file of a handle.
///
/// Cloneable so one failure can be handed to every task that was waiting on
/// the same open.
#[derive(thiserror::Error, Debug, Clone)]
#[error("failed to open {}: {source}", .path.display())]
pub struct OpenError {
    pub path: PathBuf,
    #[source]
    pub source: Arc<io::Error>,
}

impl OpenError {
    pub fn new(path: PathBuf, source: io::Error) -> Self {
        Self {
            path,
            source: Arc::new(source),
        }
    }

    pub fn kind(&self) -> io::ErrorKind {
        self.source.kind()
    }
}

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum HandleError {
    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error(transparent)]
    Open(#[from] OpenError),

    #[error("cipher backend: {0:#}")]
    Backend(#[from] anyhow::Error),

    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("decode: {0}")]
    Decode(#[from] NoteError),

    #[error("operation cancelled")]
    Cancelled,
}

impl HandleError {
    pub(crate) fn illegal(msg: impl Into<String>) -> Self {
        HandleError::IllegalState(msg.into())
    }
}

impl From<tokio::task::JoinError> for HandleError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            HandleError::Cancelled
        } else {
            HandleError::Backend(anyhow::anyhow!("blocking task failed: {err}"))
        }
    }
}
