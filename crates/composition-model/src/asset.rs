//! Raw input assets and asset-set validation.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use mediamerge_common::error::{MergeError, MergeResult};

/// Kind of media an asset carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Video,
    Audio,
}

impl AssetKind {
    /// Classify a MIME type against the formats the loader accepts.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" | "image/png" => Some(Self::Image),
            "video/mp4" | "video/webm" => Some(Self::Video),
            "audio/mpeg" | "audio/mp3" | "audio/wav" | "audio/x-wav" | "audio/wave" => {
                Some(Self::Audio)
            }
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

/// Guess a MIME type from a file extension.
pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "mp4" => Some("video/mp4"),
        "webm" => Some("video/webm"),
        "mp3" => Some("audio/mpeg"),
        "wav" => Some("audio/wav"),
        _ => None,
    }
}

/// An uploaded file before decoding.
#[derive(Debug, Clone)]
pub struct RawFile {
    /// Original file name, used in logs and error messages.
    pub name: String,

    /// Declared MIME type.
    pub mime: String,

    /// File contents.
    pub bytes: Arc<[u8]>,
}

impl RawFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, inferring the MIME type from its extension.
    pub fn from_path(path: &Path) -> MergeResult<Self> {
        if !path.exists() {
            return Err(MergeError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let mime = mime_for_path(path).ok_or_else(|| {
            MergeError::unsupported_format(format!(
                "cannot infer media type of {}",
                path.display()
            ))
        })?;
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, mime, bytes))
    }

    /// Accepted kind for this file's MIME type.
    pub fn kind(&self) -> MergeResult<AssetKind> {
        AssetKind::from_mime(&self.mime).ok_or_else(|| {
            MergeError::unsupported_format(format!("'{}' has type {}", self.name, self.mime))
        })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Limits applied to an asset set before planning.
#[derive(Debug, Clone, Copy)]
pub struct AssetLimits {
    /// Maximum number of cover images.
    pub max_banners: usize,
}

impl Default for AssetLimits {
    fn default() -> Self {
        Self { max_banners: 15 }
    }
}

/// Counts of each asset kind supplied for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssetCounts {
    pub images: usize,
    pub videos: usize,
    pub audio_tracks: usize,
}

impl AssetCounts {
    /// Validate the set: at least one image, exactly one video, at least one
    /// audio track, and no more images than the limit allows.
    ///
    /// The image limit is checked here so an oversized set never reaches
    /// the planner.
    pub fn validate(&self, limits: AssetLimits) -> MergeResult<()> {
        if self.images == 0 {
            return Err(MergeError::missing_asset("at least one cover image is required"));
        }
        if self.images > limits.max_banners {
            return Err(MergeError::AssetLimitExceeded {
                what: "cover images".to_string(),
                count: self.images,
                max: limits.max_banners,
            });
        }
        match self.videos {
            0 => return Err(MergeError::missing_asset("a screen recording is required")),
            1 => {}
            n => {
                return Err(MergeError::AssetLimitExceeded {
                    what: "screen recordings".to_string(),
                    count: n,
                    max: 1,
                })
            }
        }
        if self.audio_tracks == 0 {
            return Err(MergeError::missing_asset("at least one audio track is required"));
        }
        Ok(())
    }
}
