use thiserror::Error;
use tokio::task::JoinError;

pub type Result<T, E = ThumbnailError> = std::result::Result<T, E>;

/// Failures of the thumbnail subsystem.
#[derive(Error, Debug)]
pub enum ThumbnailError {
    #[error("media source unavailable: {source_url}: {reason}")]
    SourceUnavailable { source_url: String, reason: String },
    #[error("frame at {time:.3}s was not ready within {timeout_ms}ms")]
    SeekTimeout { time: f64, timeout_ms: u128 },
    #[error("time {time}s is outside [0, {duration}]")]
    TimeOutOfRange { time: f64, duration: f64 },
    #[error("thumbnail generator has been disposed")]
    GeneratorDisposed,
    #[error("failed to encode frame: {0}")]
    EncodeFailure(String),
    #[error("no frame could be decoded at {time:.3}s: {reason}")]
    Decode { time: f64, reason: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("capture worker stopped unexpectedly")]
    Worker,
    #[error("background task failed: {0}")]
    BackgroundTaskFailed(#[from] JoinError),
}

impl ThumbnailError {
    pub(crate) fn unavailable(source_url: &str, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            source_url: source_url.to_owned(),
            reason: reason.to_string(),
        }
    }

    /// True when the media itself could not be loaded, which affects every
    /// capture against it identically.
    pub fn is_source_failure(&self) -> bool {
        matches!(self, Self::SourceUnavailable { .. })
    }

    /// Errors after which no further capture on the same generator can succeed.
    pub(crate) fn is_terminal(&self) -> bool {
        matches!(self, Self::GeneratorDisposed | Self::Worker)
    }
}

impl From<image::ImageError> for ThumbnailError {
    fn from(err: image::ImageError) -> Self {
        Self::EncodeFailure(err.to_string())
    }
}
