//! Finished compositions and the collaborator that receives them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mediamerge_common::error::MergeResult;

use crate::format::{format_bytes, format_duration};

/// A finalized binary stream tagged with its container/codec MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    /// e.g. `video/mp4; codecs="avc1.640028, mp4a.40.2"`.
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl Blob {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// MIME type without codec parameters.
    pub fn container(&self) -> &str {
        self.mime.split(';').next().unwrap_or(&self.mime).trim()
    }

    /// File extension matching the container.
    pub fn extension(&self) -> &'static str {
        match self.container() {
            "video/webm" => "webm",
            _ => "mp4",
        }
    }
}

/// Output of one successful composition run.
///
/// Ownership moves to the caller as soon as the run finishes; the engine
/// keeps no reference to it.
#[derive(Debug, Clone)]
pub struct CompositionResult {
    /// Identifier generated from the creation timestamp.
    pub id: String,

    /// Name shown in history listings and used for downloads.
    pub display_name: String,

    /// The muxed audio+video output.
    pub blob: Blob,

    /// PNG-encoded still frame.
    pub thumbnail_png: Vec<u8>,

    /// Resolved output length in seconds.
    pub duration_secs: f64,

    /// Size of the blob in bytes.
    pub byte_size: u64,

    pub created_at: DateTime<Utc>,
}

impl CompositionResult {
    /// Assemble a result, deriving id, name, and size.
    pub fn new(
        blob: Blob,
        thumbnail_png: Vec<u8>,
        duration_secs: f64,
        created_at: DateTime<Utc>,
    ) -> Self {
        let display_name = format!(
            "MediaMerge_{}.{}",
            created_at.format("%Y-%m-%d_%H-%M-%S"),
            blob.extension()
        );
        Self {
            id: created_at.timestamp_millis().to_string(),
            display_name,
            byte_size: blob.len() as u64,
            blob,
            thumbnail_png,
            duration_secs,
            created_at,
        }
    }

    /// Listing metadata without the payload.
    pub fn summary(&self) -> ResultSummary {
        ResultSummary {
            id: self.id.clone(),
            name: self.display_name.clone(),
            mime: self.blob.mime.clone(),
            duration: format_duration(self.duration_secs),
            size: format_bytes(self.byte_size, 2),
            timestamp: self.created_at.timestamp_millis(),
        }
    }
}

/// Serializable history-listing metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub id: String,
    pub name: String,
    pub mime: String,
    pub duration: String,
    pub size: String,
    pub timestamp: i64,
}

/// Collaborator that persists finished compositions.
///
/// The engine only ever writes through this trait; it never reads
/// history back.
pub trait HistoryStore {
    fn save(&mut self, result: CompositionResult) -> MergeResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_result_naming() {
        let created = Utc.with_ymd_and_hms(2026, 10, 16, 12, 30, 5).unwrap();
        let blob = Blob {
            mime: "video/webm; codecs=\"vp9, opus\"".into(),
            bytes: vec![0u8; 2048],
        };
        let result = CompositionResult::new(blob, vec![1, 2, 3], 94.0, created);
        assert_eq!(result.display_name, "MediaMerge_2026-10-16_12-30-05.webm");
        assert_eq!(result.id, created.timestamp_millis().to_string());
        assert_eq!(result.byte_size, 2048);

        let summary = result.summary();
        assert_eq!(summary.duration, "01:34");
        assert_eq!(summary.size, "2 KB");
    }

    #[test]
    fn test_blob_container() {
        let blob = Blob {
            mime: "video/mp4; codecs=\"avc1.640028, mp4a.40.2\"".into(),
            bytes: vec![],
        };
        assert_eq!(blob.container(), "video/mp4");
        assert_eq!(blob.extension(), "mp4");
        assert!(blob.is_empty());
    }
}
