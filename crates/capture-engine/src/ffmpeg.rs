//! ffmpeg subprocess recorder.
//!
//! Raw RGBA frames go to ffmpeg's stdin, the mixed PCM track is read from a
//! file, and the muxed stream comes back on stdout. A reader thread turns
//! stdout into chunks delivered over a channel.

use std::collections::HashMap;
use std::io::{ErrorKind as IoErrorKind, Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread::JoinHandle;

use mediamerge_common::error::{MergeError, MergeResult};

use crate::format::OutputFormat;
use crate::recorder::{AudioStream, Recorder, RecorderSettings, StreamSpec};

const CHUNK_SIZE: usize = 64 * 1024;

/// Recorder backed by the system `ffmpeg` binary.
#[derive(Default)]
pub struct FfmpegRecorder {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    chunks: Option<Receiver<Vec<u8>>>,
    reader: Option<JoinHandle<()>>,
    stderr: Option<JoinHandle<String>>,
    frame_bytes: usize,
    frames_written: u64,
    support_cache: HashMap<OutputFormat, bool>,
}

impl FfmpegRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn build_command(
        stream: &StreamSpec,
        audio: Option<&AudioStream>,
        settings: &RecorderSettings,
    ) -> Command {
        let (video_codec, audio_codec) = settings.format.encoders();
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-hide_banner", "-loglevel", "error"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgba"])
            .arg("-s")
            .arg(format!("{}x{}", stream.width, stream.height))
            .arg("-r")
            .arg(stream.fps.to_string())
            .args(["-i", "pipe:0"]);

        if let Some(audio) = audio {
            cmd.args(["-f", "f32le", "-ar"])
                .arg(audio.sample_rate.to_string())
                .arg("-ac")
                .arg(audio.channels.to_string())
                .arg("-i")
                .arg(&audio.path)
                .args(["-c:a", audio_codec, "-b:a"])
                .arg(format!("{}k", settings.audio_bitrate_kbps))
                .arg("-shortest");
        } else {
            cmd.arg("-an");
        }

        cmd.args(["-c:v", video_codec, "-pix_fmt", "yuv420p", "-b:v"])
            .arg(format!("{}k", settings.video_bitrate_kbps));
        if settings.format == OutputFormat::WebmVp9Opus {
            cmd.args(["-deadline", "realtime", "-row-mt", "1"]);
        } else {
            cmd.args(["-preset", "veryfast"]);
        }
        cmd.args(settings.format.muxer_args()).arg("pipe:1");
        cmd
    }

    fn stderr_output(&mut self) -> String {
        self.stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default()
    }
}

/// Whether ffmpeg lists `encoder` in `ffmpeg -encoders`.
pub fn encoder_available(encoder: &str) -> bool {
    let Ok(output) = Command::new("ffmpeg")
        .args(["-hide_banner", "-encoders"])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
    else {
        return false;
    };
    if !output.status.success() {
        return false;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .any(|line| line.split_whitespace().nth(1) == Some(encoder))
}

impl Recorder for FfmpegRecorder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn supports(&mut self, format: OutputFormat) -> bool {
        *self.support_cache.entry(format).or_insert_with(|| {
            let (video, audio) = format.encoders();
            let ok = encoder_available(video) && encoder_available(audio);
            tracing::debug!(%format, video, audio, supported = ok, "Probed encoder support");
            ok
        })
    }

    fn start(
        &mut self,
        stream: &StreamSpec,
        audio: Option<&AudioStream>,
        settings: &RecorderSettings,
    ) -> MergeResult<()> {
        if self.child.is_some() {
            return Err(MergeError::recording_aborted("recorder already started"));
        }

        let mut cmd = Self::build_command(stream, audio, settings);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = cmd.spawn().map_err(|e| {
            MergeError::encoder_unavailable(format!("failed to start ffmpeg: {e}"))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MergeError::recording_aborted("failed to open ffmpeg stdin"))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| MergeError::recording_aborted("failed to capture ffmpeg stdout"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| MergeError::recording_aborted("failed to capture ffmpeg stderr"))?;

        let (tx, rx) = mpsc::channel::<Vec<u8>>();
        let reader = std::thread::Builder::new()
            .name("mediamerge-chunk-reader".into())
            .spawn(move || {
                let mut buf = vec![0u8; CHUNK_SIZE];
                loop {
                    match stdout.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            if tx.send(buf[..n].to_vec()).is_err() {
                                break;
                            }
                        }
                        Err(e) if e.kind() == IoErrorKind::Interrupted => continue,
                        Err(_) => break,
                    }
                }
            })?;

        // Drain stderr concurrently so ffmpeg never blocks on a full pipe.
        let stderr_task = std::thread::spawn(move || -> String {
            let mut output = String::new();
            match stderr.read_to_string(&mut output) {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        tracing::info!(
            pid = child.id(),
            format = %settings.format,
            width = stream.width,
            height = stream.height,
            fps = stream.fps,
            audio = audio.is_some(),
            "Recorder started"
        );

        self.child = Some(child);
        self.stdin = Some(stdin);
        self.chunks = Some(rx);
        self.reader = Some(reader);
        self.stderr = Some(stderr_task);
        self.frame_bytes = stream.frame_bytes();
        self.frames_written = 0;
        Ok(())
    }

    fn write_frame(&mut self, rgba: &[u8]) -> MergeResult<()> {
        if rgba.len() != self.frame_bytes {
            return Err(MergeError::recording_aborted(format!(
                "frame has {} bytes, expected {}",
                rgba.len(),
                self.frame_bytes
            )));
        }
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(MergeError::recording_aborted("recorder is not running"));
        };
        if let Err(e) = stdin.write_all(rgba) {
            self.stdin.take();
            let stderr = self.stderr_output();
            return Err(MergeError::recording_aborted(format!(
                "encoder closed its input after {} frames ({e}): {}",
                self.frames_written,
                stderr.trim()
            )));
        }
        self.frames_written += 1;
        Ok(())
    }

    fn try_recv_chunk(&mut self) -> MergeResult<Option<Vec<u8>>> {
        let Some(rx) = self.chunks.as_ref() else {
            return Ok(None);
        };
        match rx.try_recv() {
            Ok(chunk) => Ok(Some(chunk)),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => Ok(None),
        }
    }

    fn finish(&mut self) -> MergeResult<Vec<Vec<u8>>> {
        // Closing stdin signals end of stream.
        drop(self.stdin.take());

        let mut remaining = Vec::new();
        if let Some(rx) = self.chunks.take() {
            while let Ok(chunk) = rx.recv() {
                remaining.push(chunk);
            }
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }

        let mut child = self
            .child
            .take()
            .ok_or_else(|| MergeError::recording_aborted("recorder was never started"))?;
        let status = child.wait()?;
        let stderr = self.stderr_output();

        if !status.success() {
            return Err(MergeError::recording_aborted(format!(
                "ffmpeg exited with status {status}: {}",
                stderr.trim()
            )));
        }

        tracing::info!(
            frames = self.frames_written,
            trailing_chunks = remaining.len(),
            "Recorder finished"
        );
        Ok(remaining)
    }

    fn abort(&mut self) {
        drop(self.stdin.take());
        self.chunks.take();
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
            tracing::warn!(frames = self.frames_written, "Recorder aborted");
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        self.stderr_output();
    }
}

impl Drop for FfmpegRecorder {
    fn drop(&mut self) {
        self.abort();
    }
}
