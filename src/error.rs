use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Every failure the composition engine can surface.
///
/// Validation variants are produced before any external process is spawned or any
/// intermediate file is created. The rest can only happen once work has started.
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("invalid ratio '{0}', expected 'W:H' with positive integers (e.g. '4:5')")]
    InvalidRatio(String),

    #[error("output format 'custom' requires a ratio such as '4:5'")]
    MissingRatio,

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("file not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("cannot open {} for decoding: {reason}", .path.display())]
    SourceOpen { path: PathBuf, reason: String },

    #[error("cannot open {} for encoding: {reason}", .path.display())]
    EncoderOpen { path: PathBuf, reason: String },

    #[error("{tool} failed ({status}): {stderr}")]
    ExternalTool {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("failed to merge burned video with original audio: {0}")]
    Remux(String),

    #[error("stream '{0}' is not part of the filter graph")]
    InvalidStream(String),

    #[error("transcription failed: {0}")]
    Transcription(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ComposeError {
    pub(crate) fn tool(tool: &str, status: ExitStatus, stderr: &[u8]) -> Self {
        Self::ExternalTool {
            tool: tool.to_string(),
            status: status.to_string(),
            stderr: String::from_utf8_lossy(stderr).trim().to_string(),
        }
    }

    /// True for the failures raised by argument checking alone.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidRatio(_) | Self::MissingRatio | Self::Validation(_) | Self::SourceNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ComposeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_tool_diagnostics() {
        let err = ComposeError::ExternalTool {
            tool: "ffmpeg".to_string(),
            status: "exit status: 1".to_string(),
            stderr: "Unknown encoder 'libfoo'".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ffmpeg"));
        assert!(msg.contains("Unknown encoder 'libfoo'"));
    }

    #[test]
    fn test_validation_classification() {
        assert!(ComposeError::MissingRatio.is_validation());
        assert!(ComposeError::InvalidRatio("a:b".into()).is_validation());
        assert!(!ComposeError::Remux("boom".into()).is_validation());
    }
}
