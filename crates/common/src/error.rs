//! Error types shared across Splice crates.

use std::path::PathBuf;

/// Top-level error type for Splice operations.
#[derive(Debug, thiserror::Error)]
pub enum SpliceError {
    #[error("Probe error: {message}")]
    Probe { message: String },

    #[error("Transcode error: {message}")]
    Transcode { message: String },

    #[error("Muxer error: {message}")]
    Muxer { message: String },

    /// A track appended to an existing output does not match the format
    /// already written for that track.
    #[error("Muxer append error: {message}")]
    MuxerAppend { message: String },

    #[error("Copy error: {message}")]
    Copy { message: String },

    #[error("Composition error: {message}")]
    Composition { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Export cancelled")]
    Cancelled,

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using SpliceError.
pub type SpliceResult<T> = Result<T, SpliceError>;

impl SpliceError {
    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe {
            message: msg.into(),
        }
    }

    pub fn transcode(msg: impl Into<String>) -> Self {
        Self::Transcode {
            message: msg.into(),
        }
    }

    pub fn muxer(msg: impl Into<String>) -> Self {
        Self::Muxer {
            message: msg.into(),
        }
    }

    pub fn muxer_append(msg: impl Into<String>) -> Self {
        Self::MuxerAppend {
            message: msg.into(),
        }
    }

    pub fn copy(msg: impl Into<String>) -> Self {
        Self::Copy {
            message: msg.into(),
        }
    }

    pub fn composition(msg: impl Into<String>) -> Self {
        Self::Composition {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Whether this error means appended output is structurally incompatible
    /// with what an earlier phase already wrote.
    pub fn is_append_mismatch(&self) -> bool {
        matches!(self, Self::MuxerAppend { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_mismatch_classification() {
        assert!(SpliceError::muxer_append("csd differs").is_append_mismatch());
        assert!(!SpliceError::muxer("disk full").is_append_mismatch());
        assert!(SpliceError::Cancelled.is_cancelled());
    }

    #[test]
    fn test_display_includes_message() {
        let err = SpliceError::probe("no video track");
        assert_eq!(err.to_string(), "Probe error: no video track");
    }
}
