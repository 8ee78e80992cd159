//! Recorder backend interface.

use std::path::PathBuf;

use mediamerge_common::error::MergeResult;

use crate::format::OutputFormat;

/// Shape of the video stream fed to a recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpec {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl StreamSpec {
    /// Bytes in one raw RGBA frame.
    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// The mixed audio destination: interleaved `f32le` PCM on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioStream {
    pub path: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Encoder settings for one recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecorderSettings {
    pub format: OutputFormat,
    pub video_bitrate_kbps: u32,
    pub audio_bitrate_kbps: u32,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            video_bitrate_kbps: 5000,
            audio_bitrate_kbps: 192,
        }
    }
}

/// An encoder that accepts raw frames and produces container chunks.
///
/// Chunks become available asynchronously; callers poll with
/// [`Recorder::try_recv_chunk`] while recording and collect the remainder
/// from [`Recorder::finish`].
pub trait Recorder: Send {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Whether this backend can encode `format` on this machine.
    fn supports(&mut self, format: OutputFormat) -> bool;

    /// Begin a recording.
    fn start(
        &mut self,
        stream: &StreamSpec,
        audio: Option<&AudioStream>,
        settings: &RecorderSettings,
    ) -> MergeResult<()>;

    /// Encode one raw RGBA frame of `stream.frame_bytes()` bytes.
    fn write_frame(&mut self, rgba: &[u8]) -> MergeResult<()>;

    /// Next encoded chunk if one is ready. Never blocks.
    fn try_recv_chunk(&mut self) -> MergeResult<Option<Vec<u8>>>;

    /// Close the input, wait for the encoder to flush, and return every
    /// chunk not yet received.
    fn finish(&mut self) -> MergeResult<Vec<Vec<u8>>>;

    /// Tear down without finalizing. Safe to call in any state.
    fn abort(&mut self);
}
