use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Probe failed for {}: {message}", path.display())]
    Probe { path: PathBuf, message: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Engine failed: {0}")]
    Engine(#[from] crate::ffmpeg::FfmpegError),

    #[error("Resource error: {0}")]
    Resource(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MediaError {
    pub fn probe(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Probe {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Raw engine diagnostic output, when the failure came from the engine.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            MediaError::Engine(crate::ffmpeg::FfmpegError::ExecutionFailed { output, .. }) => {
                Some(output.as_str())
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, MediaError>;
