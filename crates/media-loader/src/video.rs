//! Screen-recording decode sessions.
//!
//! A [`VideoSource`] is advanced by media time rather than by wall time, so
//! the compositor decides where playback is. Sources loop seamlessly: media
//! time keeps growing past the natural duration and wraps onto the start of
//! the recording without a reset.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread::JoinHandle;

use image::{Rgba, RgbaImage};
use tempfile::NamedTempFile;

use mediamerge_common::error::{MergeError, MergeResult};

use crate::probe::MediaInfo;

/// Frames buffered between the decoder thread and the compositor.
const DECODE_QUEUE_DEPTH: usize = 8;

/// A playable, seekable-forward video.
pub trait VideoSource: Send {
    fn name(&self) -> &str;

    /// Natural duration in seconds.
    fn duration_secs(&self) -> f64;

    /// Dimensions of the frames returned by [`VideoSource::frame_at`].
    fn dimensions(&self) -> (u32, u32);

    /// Start (or resume) decoding.
    fn play(&mut self) -> MergeResult<()>;

    /// Stop advancing; `frame_at` keeps returning the current frame.
    fn pause(&mut self);

    fn set_playback_rate(&mut self, rate: f64);

    fn playback_rate(&self) -> f64;

    /// Most recent decoded frame at or before `media_secs`.
    ///
    /// Returns the previous frame when the decoder has not caught up, and
    /// `None` until the first frame is available.
    fn frame_at(&mut self, media_secs: f64) -> Option<&RgbaImage>;
}

/// Largest even-sized `(w, h)` with the aspect of `src` that fits `max`.
/// Never upscales.
pub fn fit_within(src: (u32, u32), max: (u32, u32)) -> (u32, u32) {
    let (w, h) = (src.0.max(1) as f64, src.1.max(1) as f64);
    let scale = (max.0 as f64 / w).min(max.1 as f64 / h).min(1.0);
    let even = |v: f64| ((v / 2.0).round() as u32 * 2).max(2);
    (even(w * scale), even(h * scale))
}

/// Options for the ffmpeg-backed decoder.
#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    /// Frames per second of media time produced by the decoder.
    pub fps: u32,

    /// Downscale frames to fit within these dimensions.
    pub max_size: Option<(u32, u32)>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            fps: 30,
            max_size: None,
        }
    }
}

struct DecodeSession {
    child: Child,
    frames: Option<Receiver<Vec<u8>>>,
    reader: Option<JoinHandle<()>>,
    stderr: Option<JoinHandle<String>>,
}

impl Drop for DecodeSession {
    fn drop(&mut self) {
        // Drop the receiver first so a reader blocked on a full queue exits.
        self.frames.take();
        let _ = self.child.kill();
        let _ = self.child.wait();
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        if let Some(stderr) = self.stderr.take() {
            if let Ok(output) = stderr.join() {
                let output = output.trim();
                if !output.is_empty() {
                    tracing::debug!(stderr = output, "Video decoder stderr");
                }
            }
        }
    }
}

/// Decodes a spooled recording through an `ffmpeg` subprocess that loops
/// the input and writes raw RGBA frames to a pipe.
pub struct FfmpegVideo {
    name: String,
    spool: NamedTempFile,
    info: MediaInfo,
    size: (u32, u32),
    fps: u32,
    rate: f64,
    playing: bool,
    ended: bool,
    session: Option<DecodeSession>,
    current: Option<RgbaImage>,
    current_index: Option<u64>,
}

impl FfmpegVideo {
    /// Wrap a spooled file whose metadata has already been probed.
    pub fn new(
        name: impl Into<String>,
        spool: NamedTempFile,
        info: MediaInfo,
        options: DecodeOptions,
    ) -> MergeResult<Self> {
        let name = name.into();
        let native = info.dimensions.ok_or_else(|| {
            MergeError::corrupt_asset(&name, "container has no video stream")
        })?;
        let size = match options.max_size {
            Some(max) => fit_within(native, max),
            None => fit_within(native, native),
        };
        Ok(Self {
            name,
            spool,
            info,
            size,
            fps: options.fps.max(1),
            rate: 1.0,
            playing: false,
            ended: false,
            session: None,
            current: None,
            current_index: None,
        })
    }

    fn spawn_session(&self) -> MergeResult<DecodeSession> {
        let (w, h) = self.size;
        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-nostdin", "-stream_loop", "-1", "-i"])
            .arg(self.spool.path())
            .args(["-an", "-vf"])
            .arg(format!("fps={},scale={w}:{h}", self.fps))
            .args(["-f", "rawvideo", "-pix_fmt", "rgba", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                MergeError::unsupported_format(format!("failed to start video decoder: {e}"))
            })?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| MergeError::corrupt_asset(&self.name, "failed to capture decoder stdout"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| MergeError::corrupt_asset(&self.name, "failed to capture decoder stderr"))?;

        let frame_bytes = w as usize * h as usize * 4;
        let (tx, rx) = mpsc::sync_channel::<Vec<u8>>(DECODE_QUEUE_DEPTH);
        let reader = std::thread::Builder::new()
            .name("mediamerge-video-decode".into())
            .spawn(move || loop {
                let mut buf = vec![0u8; frame_bytes];
                if stdout.read_exact(&mut buf).is_err() {
                    break;
                }
                if tx.send(buf).is_err() {
                    break;
                }
            })?;
        let stderr_task = std::thread::spawn(move || -> String {
            let mut output = String::new();
            match stderr.read_to_string(&mut output) {
                Ok(_) => output,
                Err(err) => format!("<failed to read decoder stderr: {err}>"),
            }
        });

        tracing::info!(
            asset = %self.name,
            pid = child.id(),
            width = w,
            height = h,
            fps = self.fps,
            "Video decoder started"
        );

        Ok(DecodeSession {
            child,
            frames: Some(rx),
            reader: Some(reader),
            stderr: Some(stderr_task),
        })
    }
}

impl VideoSource for FfmpegVideo {
    fn name(&self) -> &str {
        &self.name
    }

    fn duration_secs(&self) -> f64 {
        self.info.duration_secs
    }

    fn dimensions(&self) -> (u32, u32) {
        self.size
    }

    fn play(&mut self) -> MergeResult<()> {
        if self.session.is_none() {
            self.session = Some(self.spawn_session()?);
        }
        self.playing = true;
        Ok(())
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn set_playback_rate(&mut self, rate: f64) {
        if rate.is_finite() && rate > 0.0 {
            self.rate = rate;
        }
    }

    fn playback_rate(&self) -> f64 {
        self.rate
    }

    fn frame_at(&mut self, media_secs: f64) -> Option<&RgbaImage> {
        if !self.playing || self.ended {
            return self.current.as_ref();
        }
        let Some(frames) = self.session.as_ref().and_then(|s| s.frames.as_ref()) else {
            return self.current.as_ref();
        };

        let target = (media_secs.max(0.0) * self.fps as f64).floor() as u64;
        let mut latest = None;
        while self.current_index.map_or(true, |i| i < target) {
            match frames.try_recv() {
                Ok(buf) => {
                    self.current_index = Some(self.current_index.map_or(0, |i| i + 1));
                    latest = Some(buf);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::warn!(asset = %self.name, "Video decoder stopped producing frames");
                    self.ended = true;
                    break;
                }
            }
        }

        if let Some(buf) = latest {
            let (w, h) = self.size;
            match RgbaImage::from_raw(w, h, buf) {
                Some(frame) => self.current = Some(frame),
                None => tracing::warn!(asset = %self.name, "Discarded short video frame"),
            }
        }
        self.current.as_ref()
    }
}

/// Procedurally generated video: each frame is a flat colour derived from
/// its index. Used where a real recording is unnecessary.
#[derive(Debug, Clone)]
pub struct SyntheticVideo {
    name: String,
    duration_secs: f64,
    size: (u32, u32),
    fps: u32,
    rate: f64,
    playing: bool,
    warmup_calls: u32,
    calls: u32,
    current: Option<RgbaImage>,
    current_index: Option<u64>,
}

impl SyntheticVideo {
    pub fn new(name: impl Into<String>, duration_secs: f64, size: (u32, u32), fps: u32) -> Self {
        Self {
            name: name.into(),
            duration_secs,
            size,
            fps: fps.max(1),
            rate: 1.0,
            playing: false,
            warmup_calls: 0,
            calls: 0,
            current: None,
            current_index: None,
        }
    }

    /// Report "not ready" for the first `calls` frame requests.
    pub fn with_warmup(mut self, calls: u32) -> Self {
        self.warmup_calls = calls;
        self
    }

    /// Colour of the frame at `index` after looping.
    pub fn color_for_index(index: u64) -> Rgba<u8> {
        Rgba([
            (index.wrapping_mul(37) % 256) as u8,
            (index.wrapping_mul(91) % 256) as u8,
            (index.wrapping_mul(13) % 256) as u8,
            255,
        ])
    }

    fn frames_per_loop(&self) -> u64 {
        ((self.duration_secs * self.fps as f64).round() as u64).max(1)
    }
}

impl VideoSource for SyntheticVideo {
    fn name(&self) -> &str {
        &self.name
    }

    fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    fn dimensions(&self) -> (u32, u32) {
        self.size
    }

    fn play(&mut self) -> MergeResult<()> {
        self.playing = true;
        Ok(())
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn set_playback_rate(&mut self, rate: f64) {
        self.rate = rate;
    }

    fn playback_rate(&self) -> f64 {
        self.rate
    }

    fn frame_at(&mut self, media_secs: f64) -> Option<&RgbaImage> {
        if !self.playing {
            return self.current.as_ref();
        }
        self.calls += 1;
        if self.calls <= self.warmup_calls {
            return self.current.as_ref();
        }
        let index = (media_secs.max(0.0) * self.fps as f64).floor() as u64 % self.frames_per_loop();
        if self.current_index != Some(index) {
            let (w, h) = self.size;
            self.current = Some(RgbaImage::from_pixel(w, h, Self::color_for_index(index)));
            self.current_index = Some(index);
        }
        self.current.as_ref()
    }
}
