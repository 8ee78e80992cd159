//! Backing-track decoding to interleaved `f32` PCM.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};

use mediamerge_common::error::{MergeError, MergeResult};

use crate::probe::classify_tool_failure;

/// Fully decoded audio, interleaved.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub name: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl AudioBuffer {
    pub fn new(name: impl Into<String>, sample_rate: u32, channels: u16, samples: Vec<f32>) -> Self {
        Self {
            name: name.into(),
            sample_rate,
            channels: channels.max(1),
            samples,
        }
    }

    /// Number of sample frames (one sample per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }
}

/// Decode any container ffmpeg understands to stereo `f32le` at
/// `sample_rate`.
pub fn decode_audio_file(path: &Path, asset: &str, sample_rate: u32) -> MergeResult<AudioBuffer> {
    let mut child = Command::new("ffmpeg")
        .args(["-v", "error", "-nostdin", "-i"])
        .arg(path)
        .args(["-vn", "-f", "f32le", "-acodec", "pcm_f32le", "-ac", "2", "-ar"])
        .arg(sample_rate.to_string())
        .arg("pipe:1")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| MergeError::unsupported_format(format!("failed to start audio decoder: {e}")))?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| MergeError::corrupt_asset(asset, "failed to capture decoder stdout"))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| MergeError::corrupt_asset(asset, "failed to capture decoder stderr"))?;

    let stderr_task = std::thread::spawn(move || -> String {
        let mut output = String::new();
        match stderr.read_to_string(&mut output) {
            Ok(_) => output,
            Err(err) => format!("<failed to read decoder stderr: {err}>"),
        }
    });

    let mut raw = Vec::new();
    stdout.read_to_end(&mut raw)?;
    let status = child.wait()?;
    let stderr_output = stderr_task
        .join()
        .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

    if !status.success() {
        return Err(classify_tool_failure(
            asset,
            &format!("audio decode failed (status {status})"),
            &stderr_output,
        ));
    }

    let samples = f32le_to_samples(&raw);
    let buffer = AudioBuffer::new(asset, sample_rate, 2, samples);
    if buffer.is_empty() {
        return Err(MergeError::corrupt_asset(asset, "decoder produced no audio"));
    }

    tracing::debug!(
        asset,
        duration_secs = buffer.duration_secs(),
        sample_rate,
        "Decoded audio"
    );
    Ok(buffer)
}

fn f32le_to_samples(raw: &[u8]) -> Vec<f32> {
    raw.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
