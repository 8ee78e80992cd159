//! Output containers and codecs.

use serde::{Deserialize, Serialize};

/// Container/codec pair written by the recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// H.264 + AAC in fragmented MP4.
    #[default]
    Mp4H264Aac,
    /// VP9 + Opus in WebM.
    WebmVp9Opus,
}

impl OutputFormat {
    /// Full MIME type including codec parameters.
    pub fn mime(self) -> &'static str {
        match self {
            Self::Mp4H264Aac => "video/mp4; codecs=\"avc1.640028, mp4a.40.2\"",
            Self::WebmVp9Opus => "video/webm; codecs=\"vp9, opus\"",
        }
    }

    /// MIME type without codec parameters.
    pub fn container_mime(self) -> &'static str {
        match self {
            Self::Mp4H264Aac => "video/mp4",
            Self::WebmVp9Opus => "video/webm",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4H264Aac => "mp4",
            Self::WebmVp9Opus => "webm",
        }
    }

    /// Format to retry with when this one has no encoder.
    pub fn fallback(self) -> Option<Self> {
        match self {
            Self::Mp4H264Aac => Some(Self::WebmVp9Opus),
            Self::WebmVp9Opus => None,
        }
    }

    /// ffmpeg encoder names required for `(video, audio)`.
    pub fn encoders(self) -> (&'static str, &'static str) {
        match self {
            Self::Mp4H264Aac => ("libx264", "aac"),
            Self::WebmVp9Opus => ("libvpx-vp9", "libopus"),
        }
    }

    /// Muxer arguments for a streamable (non-seekable) output.
    pub fn muxer_args(self) -> &'static [&'static str] {
        match self {
            Self::Mp4H264Aac => &[
                "-movflags",
                "frag_keyframe+empty_moov+default_base_moof",
                "-f",
                "mp4",
            ],
            Self::WebmVp9Opus => &["-f", "webm"],
        }
    }

    /// Guess the format from an output path's extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "mp4" | "m4v" => Some(Self::Mp4H264Aac),
            "webm" => Some(Self::WebmVp9Opus),
            _ => None,
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Mp4H264Aac => "mp4 (h264/aac)",
            Self::WebmVp9Opus => "webm (vp9/opus)",
        })
    }
}
