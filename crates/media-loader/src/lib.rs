//! MediaMerge Media Loader
//!
//! Turns uploaded [`RawFile`]s into decoded handles:
//! - Cover images are decoded in-process to RGBA
//! - Screen recordings are spooled to a temporary file, probed, and opened
//!   as a looping decode session
//! - Audio tracks are fully decoded to interleaved stereo `f32`
//!
//! Video and audio decoding shell out to `ffmpeg`/`ffprobe`. A missing tool
//! is reported as [`MergeError::UnsupportedFormat`].

pub mod audio;
pub mod cover;
pub mod probe;
pub mod spool;
pub mod video;

use std::time::Duration;

use mediamerge_common::config::RenderDefaults;
use mediamerge_common::error::{MergeError, MergeResult};
use mediamerge_composition_model::asset::{AssetKind, RawFile};

pub use audio::AudioBuffer;
pub use cover::ImageHandle;
pub use probe::{ffmpeg_available, MediaInfo};
pub use video::{DecodeOptions, FfmpegVideo, SyntheticVideo, VideoSource};

/// A decoded asset.
pub enum DecodedHandle {
    Image(ImageHandle),
    Video(Box<dyn VideoSource>),
    Audio(AudioBuffer),
}

impl DecodedHandle {
    pub fn kind(&self) -> AssetKind {
        match self {
            Self::Image(_) => AssetKind::Image,
            Self::Video(_) => AssetKind::Video,
            Self::Audio(_) => AssetKind::Audio,
        }
    }
}

impl std::fmt::Debug for DecodedHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Image(img) => f.debug_tuple("Image").field(&img.name).finish(),
            Self::Video(video) => f.debug_tuple("Video").field(&video.name()).finish(),
            Self::Audio(audio) => f.debug_tuple("Audio").field(&audio.name).finish(),
        }
    }
}

/// Loader settings.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Sample rate audio is resampled to.
    pub sample_rate: u32,

    /// Video decode settings.
    pub decode: DecodeOptions,

    /// Upper bound on a single metadata probe.
    pub probe_timeout: Duration,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            decode: DecodeOptions::default(),
            probe_timeout: Duration::from_secs(10),
        }
    }
}

impl LoadOptions {
    /// Derive loader settings from the application render defaults.
    pub fn from_render_defaults(defaults: &RenderDefaults, max_size: Option<(u32, u32)>) -> Self {
        Self {
            sample_rate: defaults.audio_sample_rate,
            decode: DecodeOptions {
                fps: defaults.fps,
                max_size,
            },
            probe_timeout: Duration::from_secs_f64(defaults.probe_timeout_secs.max(0.1)),
        }
    }
}

/// Decodes raw uploads.
pub struct MediaLoader {
    options: LoadOptions,
}

impl MediaLoader {
    pub fn new(options: LoadOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Decode one file according to its MIME type.
    pub fn load(&self, file: &RawFile) -> MergeResult<DecodedHandle> {
        match file.kind()? {
            AssetKind::Image => cover::decode_image(file).map(DecodedHandle::Image),
            AssetKind::Video => self.load_video(file).map(DecodedHandle::Video),
            AssetKind::Audio => self.load_audio(file).map(DecodedHandle::Audio),
        }
    }

    /// Decode a cover image.
    pub fn load_image(&self, file: &RawFile) -> MergeResult<ImageHandle> {
        expect_kind(file, AssetKind::Image)?;
        cover::decode_image(file)
    }

    /// Spool, probe, and open a looping decode session.
    pub fn load_video(&self, file: &RawFile) -> MergeResult<Box<dyn VideoSource>> {
        expect_kind(file, AssetKind::Video)?;
        require_ffmpeg()?;
        if file.is_empty() {
            return Err(MergeError::corrupt_asset(&file.name, "file is empty"));
        }

        let tmp = spool::spool(file)?;
        let info = probe::probe_media(tmp.path(), &file.name, self.options.probe_timeout)?;
        let video = FfmpegVideo::new(file.name.clone(), tmp, info, self.options.decode)?;

        tracing::info!(
            asset = %file.name,
            duration_secs = info.duration_secs,
            dimensions = ?video.dimensions(),
            "Loaded screen recording"
        );
        Ok(Box::new(video))
    }

    /// Spool, probe, and fully decode an audio track.
    pub fn load_audio(&self, file: &RawFile) -> MergeResult<AudioBuffer> {
        expect_kind(file, AssetKind::Audio)?;
        require_ffmpeg()?;
        if file.is_empty() {
            return Err(MergeError::corrupt_asset(&file.name, "file is empty"));
        }

        let tmp = spool::spool(file)?;
        probe::probe_media(tmp.path(), &file.name, self.options.probe_timeout)?;
        audio::decode_audio_file(tmp.path(), &file.name, self.options.sample_rate)
    }
}

fn expect_kind(file: &RawFile, expected: AssetKind) -> MergeResult<()> {
    let kind = file.kind()?;
    if kind != expected {
        return Err(MergeError::unsupported_format(format!(
            "'{}' is {} but {} was expected",
            file.name,
            kind.as_str(),
            expected.as_str()
        )));
    }
    Ok(())
}

fn require_ffmpeg() -> MergeResult<()> {
    if !ffmpeg_available() {
        return Err(MergeError::unsupported_format(
            "ffmpeg and ffprobe are required to decode video and audio",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediamerge_common::error::ErrorKind;

    #[test]
    fn test_rejects_unknown_mime() {
        let loader = MediaLoader::new(LoadOptions::default());
        let file = RawFile::new("slides.pdf", "application/pdf", vec![1u8; 4]);
        assert_eq!(loader.load(&file).unwrap_err().kind(), ErrorKind::UnsupportedFormat);
    }

    #[test]
    fn test_kind_mismatch_is_unsupported() {
        let loader = MediaLoader::new(LoadOptions::default());
        let file = RawFile::new("cover.png", "image/png", vec![1u8; 4]);
        assert_eq!(
            loader.load_audio(&file).unwrap_err().kind(),
            ErrorKind::UnsupportedFormat
        );
    }

    #[test]
    fn test_options_from_render_defaults() {
        let defaults = RenderDefaults::default();
        let options = LoadOptions::from_render_defaults(&defaults, Some((1920, 1080)));
        assert_eq!(options.sample_rate, 48_000);
        assert_eq!(options.decode.fps, 30);
        assert_eq!(options.decode.max_size, Some((1920, 1080)));
    }
}
