//! Error types shared across MediaMerge crates.

use std::path::PathBuf;

/// Discriminant for every failure the composition engine can report.
///
/// Callers use the kind to pick a recovery policy (for example retrying
/// with a fallback codec on [`ErrorKind::EncoderUnavailable`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnsupportedFormat,
    CorruptAsset,
    MissingRequiredAsset,
    AssetLimitExceeded,
    InvalidConfig,
    PlanInfeasible,
    EncoderUnavailable,
    RecordingAborted,
    ResourceExhausted,
    Cancelled,
    Io,
    Other,
}

/// Top-level error type for MediaMerge operations.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("Unsupported format: {message}")]
    UnsupportedFormat { message: String },

    #[error("Corrupt asset '{asset}': {message}")]
    CorruptAsset { asset: String, message: String },

    #[error("Missing required asset: {message}")]
    MissingRequiredAsset { message: String },

    #[error("Too many {what}: {count} supplied, at most {max} allowed")]
    AssetLimitExceeded {
        what: String,
        count: usize,
        max: usize,
    },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Timeline plan is infeasible: {message}")]
    PlanInfeasible { message: String },

    #[error("Encoder unavailable: {message}")]
    EncoderUnavailable { message: String },

    #[error("Recording aborted: {message}")]
    RecordingAborted { message: String },

    #[error("Resource exhausted: {message}")]
    ResourceExhausted { message: String },

    #[error("Composition cancelled")]
    Cancelled,

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using MergeError.
pub type MergeResult<T> = Result<T, MergeError>;

impl MergeError {
    pub fn unsupported_format(msg: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            message: msg.into(),
        }
    }

    pub fn corrupt_asset(asset: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::CorruptAsset {
            asset: asset.into(),
            message: msg.into(),
        }
    }

    pub fn missing_asset(msg: impl Into<String>) -> Self {
        Self::MissingRequiredAsset {
            message: msg.into(),
        }
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: msg.into(),
        }
    }

    pub fn plan_infeasible(msg: impl Into<String>) -> Self {
        Self::PlanInfeasible {
            message: msg.into(),
        }
    }

    pub fn encoder_unavailable(msg: impl Into<String>) -> Self {
        Self::EncoderUnavailable {
            message: msg.into(),
        }
    }

    pub fn recording_aborted(msg: impl Into<String>) -> Self {
        Self::RecordingAborted {
            message: msg.into(),
        }
    }

    pub fn resource_exhausted(msg: impl Into<String>) -> Self {
        Self::ResourceExhausted {
            message: msg.into(),
        }
    }

    /// The taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            Self::CorruptAsset { .. } => ErrorKind::CorruptAsset,
            Self::MissingRequiredAsset { .. } => ErrorKind::MissingRequiredAsset,
            Self::AssetLimitExceeded { .. } => ErrorKind::AssetLimitExceeded,
            Self::InvalidConfig { .. } => ErrorKind::InvalidConfig,
            Self::PlanInfeasible { .. } => ErrorKind::PlanInfeasible,
            Self::EncoderUnavailable { .. } => ErrorKind::EncoderUnavailable,
            Self::RecordingAborted { .. } => ErrorKind::RecordingAborted,
            Self::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::FileNotFound { .. } | Self::Io(_) => ErrorKind::Io,
            Self::Json(_) | Self::Other(_) => ErrorKind::Other,
        }
    }

    /// Short message suitable for showing to an end user.
    ///
    /// Every kind the engine can disambiguate gets its own wording.
    pub fn user_message(&self) -> String {
        match self {
            Self::UnsupportedFormat { message } => {
                format!("This file type can't be decoded here ({message}). Try MP4/WebM video, JPG/PNG images, or MP3/WAV audio.")
            }
            Self::CorruptAsset { asset, .. } => {
                format!("'{asset}' could not be read. The file may be damaged or incomplete.")
            }
            Self::MissingRequiredAsset { message } => {
                format!("Some media is missing: {message}.")
            }
            Self::AssetLimitExceeded { what, max, .. } => {
                format!("You can add at most {max} {what}. Remove a few and try again.")
            }
            Self::InvalidConfig { message } => format!("Invalid settings: {message}."),
            Self::PlanInfeasible { .. } => {
                "The intro and end card don't fit in the target length. Use fewer cover images or a longer target.".to_string()
            }
            Self::EncoderUnavailable { .. } => {
                "No supported video encoder is available for the selected output format.".to_string()
            }
            Self::RecordingAborted { .. } => {
                "Recording stopped unexpectedly before the video was finished.".to_string()
            }
            Self::ResourceExhausted { .. } => {
                "The system ran out of resources while rendering. Try a shorter video or lower resolution.".to_string()
            }
            Self::Cancelled => "Rendering was cancelled.".to_string(),
            Self::FileNotFound { path } => format!("File not found: {}", path.display()),
            Self::Io(e) => format!("A file operation failed: {e}"),
            Self::Json(e) => format!("Could not parse settings: {e}"),
            Self::Other(e) => format!("Unexpected error: {e}"),
        }
    }
}
