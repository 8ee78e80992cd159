//! Capture sink: frames and audio in, one finalized blob out.

use image::RgbaImage;

use mediamerge_common::error::{MergeError, MergeResult};
use mediamerge_composition_model::result::Blob;

use crate::format::OutputFormat;
use crate::recorder::{AudioStream, Recorder, RecorderSettings, StreamSpec};

/// Default cap on encoded bytes buffered before `stop`.
pub const DEFAULT_MAX_BUFFERED_BYTES: usize = 2 * 1024 * 1024 * 1024;

/// State of the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    /// No recording in progress.
    Idle,
    /// Frames are being accepted.
    Recording,
    /// The recorder failed or was aborted; only `abort` is meaningful.
    Failed,
}

/// Token for an active recording.
///
/// Returned by [`CaptureSink::start`] and consumed by
/// [`CaptureSink::stop`], so a recording can be finalized only once.
#[derive(Debug)]
pub struct RecordingHandle {
    id: u64,
    format: OutputFormat,
    stream: StreamSpec,
}

impl RecordingHandle {
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn stream(&self) -> StreamSpec {
        self.stream
    }
}

/// Sink statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct SinkStats {
    pub frames_pushed: u64,
    pub chunks_received: u64,
    pub bytes_buffered: usize,
}

/// Wraps a [`Recorder`] and buffers its chunks until the recording stops.
pub struct CaptureSink {
    recorder: Box<dyn Recorder>,
    state: SinkState,
    next_id: u64,
    active_id: Option<u64>,
    chunks: Vec<Vec<u8>>,
    stats: SinkStats,
    max_buffered_bytes: usize,
}

impl CaptureSink {
    pub fn new(recorder: Box<dyn Recorder>) -> Self {
        Self {
            recorder,
            state: SinkState::Idle,
            next_id: 1,
            active_id: None,
            chunks: Vec::new(),
            stats: SinkStats::default(),
            max_buffered_bytes: DEFAULT_MAX_BUFFERED_BYTES,
        }
    }

    /// Fail with `ResourceExhausted` once buffered output exceeds `bytes`.
    pub fn with_max_buffered_bytes(mut self, bytes: usize) -> Self {
        self.max_buffered_bytes = bytes;
        self
    }

    pub fn state(&self) -> SinkState {
        self.state
    }

    pub fn stats(&self) -> SinkStats {
        self.stats
    }

    /// Whether the underlying recorder can produce `format`.
    pub fn supports(&mut self, format: OutputFormat) -> bool {
        self.recorder.supports(format)
    }

    /// Start recording the given surface stream and audio destination.
    pub fn start(
        &mut self,
        stream: StreamSpec,
        audio: Option<&AudioStream>,
        settings: RecorderSettings,
    ) -> MergeResult<RecordingHandle> {
        if self.state != SinkState::Idle {
            return Err(MergeError::recording_aborted(
                "a recording is already in progress",
            ));
        }
        if !self.recorder.supports(settings.format) {
            return Err(MergeError::encoder_unavailable(format!(
                "{} cannot encode {}",
                self.recorder.name(),
                settings.format
            )));
        }

        self.recorder.start(&stream, audio, &settings)?;

        let id = self.next_id;
        self.next_id += 1;
        self.active_id = Some(id);
        self.chunks.clear();
        self.stats = SinkStats::default();
        self.state = SinkState::Recording;

        tracing::info!(
            recording = id,
            recorder = self.recorder.name(),
            format = %settings.format,
            video_kbps = settings.video_bitrate_kbps,
            audio_kbps = settings.audio_bitrate_kbps,
            "Recording started"
        );
        Ok(RecordingHandle {
            id,
            format: settings.format,
            stream,
        })
    }

    /// Encode one composited frame.
    pub fn push_frame(&mut self, handle: &RecordingHandle, frame: &RgbaImage) -> MergeResult<()> {
        self.check_active(handle)?;
        if (frame.width(), frame.height()) != (handle.stream.width, handle.stream.height) {
            return Err(MergeError::recording_aborted(format!(
                "frame is {}x{}, stream is {}x{}",
                frame.width(),
                frame.height(),
                handle.stream.width,
                handle.stream.height
            )));
        }
        if let Err(e) = self.recorder.write_frame(frame.as_raw()) {
            self.state = SinkState::Failed;
            return Err(e);
        }
        self.stats.frames_pushed += 1;
        self.collect_ready()
    }

    /// Finalize and return the concatenated output.
    ///
    /// Returns only after every chunk the recorder produced was collected.
    pub fn stop(&mut self, handle: RecordingHandle) -> MergeResult<Blob> {
        if let Err(e) = self.check_active(&handle).and_then(|()| self.collect_ready()) {
            self.abort(handle);
            return Err(e);
        }

        let trailing = match self.recorder.finish() {
            Ok(trailing) => trailing,
            Err(e) => {
                self.reset();
                return Err(e);
            }
        };
        for chunk in trailing {
            if let Err(e) = self.buffer(chunk) {
                self.reset();
                return Err(e);
            }
        }

        let bytes = self.chunks.concat();
        let stats = self.stats;
        self.reset();

        if bytes.is_empty() {
            return Err(MergeError::recording_aborted("recorder produced no output"));
        }

        tracing::info!(
            recording = handle.id,
            frames = stats.frames_pushed,
            chunks = stats.chunks_received,
            bytes = bytes.len(),
            "Recording finalized"
        );
        Ok(Blob {
            mime: handle.format.mime().to_string(),
            bytes,
        })
    }

    /// Tear down the recording without producing output.
    pub fn abort(&mut self, handle: RecordingHandle) {
        if self.active_id == Some(handle.id) {
            tracing::warn!(
                recording = handle.id,
                frames = self.stats.frames_pushed,
                "Recording aborted"
            );
            self.recorder.abort();
            self.reset();
        }
    }

    fn check_active(&self, handle: &RecordingHandle) -> MergeResult<()> {
        if self.active_id != Some(handle.id) {
            return Err(MergeError::recording_aborted("recording handle is not active"));
        }
        if self.state == SinkState::Failed {
            return Err(MergeError::recording_aborted("recording already failed"));
        }
        Ok(())
    }

    fn collect_ready(&mut self) -> MergeResult<()> {
        while let Some(chunk) = self.recorder.try_recv_chunk()? {
            self.buffer(chunk)?;
        }
        Ok(())
    }

    fn buffer(&mut self, chunk: Vec<u8>) -> MergeResult<()> {
        self.stats.chunks_received += 1;
        self.stats.bytes_buffered += chunk.len();
        if self.stats.bytes_buffered > self.max_buffered_bytes {
            self.state = SinkState::Failed;
            return Err(MergeError::resource_exhausted(format!(
                "encoded output exceeded {} buffered bytes",
                self.max_buffered_bytes
            )));
        }
        self.chunks.push(chunk);
        Ok(())
    }

    fn reset(&mut self) {
        self.active_id = None;
        self.chunks.clear();
        self.state = SinkState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryRecorder, MEMORY_HEADER};
    use image::Rgba;
    use mediamerge_common::error::ErrorKind;

    fn stream() -> StreamSpec {
        StreamSpec {
            width: 4,
            height: 2,
            fps: 10,
        }
    }

    fn frame(v: u8) -> RgbaImage {
        RgbaImage::from_pixel(4, 2, Rgba([v, v, v, 255]))
    }

    #[test]
    fn test_stop_concatenates_all_chunks() {
        let recorder = MemoryRecorder::new();
        let log = recorder.log();
        let mut sink = CaptureSink::new(Box::new(recorder));

        let handle = sink.start(stream(), None, RecorderSettings::default()).unwrap();
        for v in 0..5 {
            sink.push_frame(&handle, &frame(v)).unwrap();
        }
        let blob = sink.stop(handle).unwrap();

        assert!(blob.mime.starts_with("video/mp4"));
        assert_eq!(blob.len(), MEMORY_HEADER.len() + 5 * 8);
        assert!(blob.bytes.starts_with(MEMORY_HEADER));
        assert_eq!(log.lock().unwrap().frames(), 5);
        assert_eq!(sink.state(), SinkState::Idle);
    }

    #[test]
    fn test_unsupported_format_is_encoder_unavailable() {
        let recorder = MemoryRecorder::new().without_format(OutputFormat::Mp4H264Aac);
        let log = recorder.log();
        let mut sink = CaptureSink::new(Box::new(recorder));

        let err = sink
            .start(stream(), None, RecorderSettings::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EncoderUnavailable);
        assert_eq!(log.lock().unwrap().starts, 0);

        let webm = RecorderSettings {
            format: OutputFormat::WebmVp9Opus,
            ..RecorderSettings::default()
        };
        let handle = sink.start(stream(), None, webm).unwrap();
        sink.push_frame(&handle, &frame(1)).unwrap();
        assert!(sink.stop(handle).unwrap().mime.starts_with("video/webm"));
    }

    #[test]
    fn test_early_stream_end_is_recording_aborted() {
        let mut sink = CaptureSink::new(Box::new(MemoryRecorder::new().failing_after(2)));
        let handle = sink.start(stream(), None, RecorderSettings::default()).unwrap();
        sink.push_frame(&handle, &frame(0)).unwrap();
        sink.push_frame(&handle, &frame(1)).unwrap();
        let err = sink.push_frame(&handle, &frame(2)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RecordingAborted);
        assert_eq!(sink.state(), SinkState::Failed);
        sink.abort(handle);
        assert_eq!(sink.state(), SinkState::Idle);
    }

    #[test]
    fn test_wrong_frame_size_rejected() {
        let mut sink = CaptureSink::new(Box::new(MemoryRecorder::new()));
        let handle = sink.start(stream(), None, RecorderSettings::default()).unwrap();
        let err = sink
            .push_frame(&handle, &RgbaImage::new(3, 3))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RecordingAborted);
    }

    #[test]
    fn test_buffer_cap_is_resource_exhausted() {
        let mut sink =
            CaptureSink::new(Box::new(MemoryRecorder::new())).with_max_buffered_bytes(16);
        let handle = sink.start(stream(), None, RecorderSettings::default()).unwrap();
        sink.push_frame(&handle, &frame(0)).unwrap();
        let err = sink.push_frame(&handle, &frame(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    }
}
