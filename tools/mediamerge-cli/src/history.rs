//! On-disk history: the video, a PNG thumbnail, and a JSON summary.

use std::path::{Path, PathBuf};

use mediamerge_common::error::MergeResult;
use mediamerge_composition_model::result::{CompositionResult, HistoryStore};

/// Paths written for one saved composition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFiles {
    pub video: PathBuf,
    pub thumbnail: PathBuf,
    pub summary: PathBuf,
}

/// Writes each result into a directory, or to an explicit output path.
#[derive(Debug)]
pub struct DirectoryStore {
    dir: PathBuf,
    output: Option<PathBuf>,
    saved: Vec<SavedFiles>,
}

impl DirectoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            output: None,
            saved: Vec::new(),
        }
    }

    /// Write the next video to `path` instead of `<dir>/<display name>`.
    pub fn with_output(mut self, path: Option<PathBuf>) -> Self {
        self.output = path;
        self
    }

    pub fn saved(&self) -> &[SavedFiles] {
        &self.saved
    }

    fn video_path(&self, result: &CompositionResult) -> PathBuf {
        match &self.output {
            Some(path) if path.extension().is_some() => path.with_extension(result.blob.extension()),
            Some(path) => path.clone(),
            None => self.dir.join(&result.display_name),
        }
    }
}

impl HistoryStore for DirectoryStore {
    fn save(&mut self, result: CompositionResult) -> MergeResult<()> {
        let video = self.video_path(&result);
        if let Some(parent) = video.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let thumbnail = sibling(&video, "png");
        let summary = sibling(&video, "json");

        std::fs::write(&video, &result.blob.bytes)?;
        std::fs::write(&thumbnail, &result.thumbnail_png)?;
        std::fs::write(&summary, serde_json::to_string_pretty(&result.summary())?)?;

        tracing::info!(
            video = %video.display(),
            thumbnail = %thumbnail.display(),
            "Saved composition"
        );
        self.saved.push(SavedFiles {
            video,
            thumbnail,
            summary,
        });
        Ok(())
    }
}

fn sibling(video: &Path, extension: &str) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "composition".to_string());
    video.with_file_name(format!("{stem}.thumb.{extension}"))
}
