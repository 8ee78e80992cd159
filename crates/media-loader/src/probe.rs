//! External tool discovery and ffprobe metadata probing.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde::Deserialize;

use mediamerge_common::error::{MergeError, MergeResult};

/// Metadata read from a media container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaInfo {
    pub duration_secs: f64,

    /// Pixel dimensions of the first video stream, if any.
    pub dimensions: Option<(u32, u32)>,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

pub fn command_exists(binary: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Whether both `ffmpeg` and `ffprobe` are on `PATH`.
pub fn ffmpeg_available() -> bool {
    command_exists("ffmpeg") && command_exists("ffprobe")
}

/// Probe duration and dimensions with ffprobe, killing it after `timeout`.
///
/// Unreadable containers are [`MergeError::UnsupportedFormat`]. Other
/// failures and timeouts are [`MergeError::CorruptAsset`] against `asset`.
pub fn probe_media(path: &Path, asset: &str, timeout: Duration) -> MergeResult<MediaInfo> {
    if !command_exists("ffprobe") {
        return Err(MergeError::unsupported_format(
            "ffprobe is not installed; cannot read video or audio metadata",
        ));
    }

    let mut child = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_entries",
            "format=duration:stream=codec_type,width,height,duration",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| MergeError::corrupt_asset(asset, format!("failed to start ffprobe: {e}")))?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| MergeError::corrupt_asset(asset, "failed to capture ffprobe stdout"))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| MergeError::corrupt_asset(asset, "failed to capture ffprobe stderr"))?;

    let stdout_task = std::thread::spawn(move || -> Vec<u8> {
        let mut buf = Vec::new();
        let _ = stdout.read_to_end(&mut buf);
        buf
    });
    let stderr_task = std::thread::spawn(move || -> String {
        let mut output = String::new();
        match stderr.read_to_string(&mut output) {
            Ok(_) => output,
            Err(err) => format!("<failed to read ffprobe stderr: {err}>"),
        }
    });

    let started = Instant::now();
    let status = loop {
        match child.try_wait()? {
            Some(status) => break status,
            None if started.elapsed() >= timeout => {
                let _ = child.kill();
                let _ = child.wait();
                tracing::warn!(
                    asset,
                    timeout_secs = timeout.as_secs_f64(),
                    "ffprobe timed out"
                );
                return Err(MergeError::corrupt_asset(
                    asset,
                    format!("metadata probe timed out after {:.1}s", timeout.as_secs_f64()),
                ));
            }
            None => std::thread::sleep(Duration::from_millis(20)),
        }
    };

    let raw = stdout_task.join().unwrap_or_default();
    let stderr_output = stderr_task
        .join()
        .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

    if !status.success() {
        return Err(classify_tool_failure(
            asset,
            &format!("ffprobe failed (status {status})"),
            &stderr_output,
        ));
    }

    let info = parse_probe_output(&raw).map_err(|msg| MergeError::corrupt_asset(asset, msg))?;
    tracing::debug!(
        asset,
        duration_secs = info.duration_secs,
        dimensions = ?info.dimensions,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Probed media"
    );
    Ok(info)
}

/// Stderr fragments meaning the tools cannot read this container or codec.
const UNSUPPORTED_MARKERS: &[&str] = &[
    "invalid data found",
    "could not find codec parameters",
    "decoder not found",
    "unknown decoder",
];

/// Map a failed ffprobe/ffmpeg run to an error.
///
/// Input the tools cannot parse at all is an unsupported format. Anything
/// else is a corrupt asset.
pub(crate) fn classify_tool_failure(asset: &str, context: &str, stderr: &str) -> MergeError {
    let detail = stderr.trim();
    let lowered = detail.to_ascii_lowercase();
    if UNSUPPORTED_MARKERS.iter().any(|m| lowered.contains(m)) {
        tracing::debug!(asset, "Tool rejected the container format");
        return MergeError::unsupported_format(format!("'{asset}' is not a readable media file: {detail}"));
    }
    MergeError::corrupt_asset(asset, format!("{context}: {detail}"))
}

fn parse_probe_output(raw: &[u8]) -> Result<MediaInfo, String> {
    let parsed: ProbeOutput =
        serde_json::from_slice(raw).map_err(|e| format!("unreadable probe output: {e}"))?;

    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));

    let dimensions = video.and_then(|s| match (s.width, s.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
        _ => None,
    });

    // Containers written by live recorders often leave the format duration
    // unset; fall back to the longest stream.
    let format_duration = parsed
        .format
        .as_ref()
        .and_then(|f| parse_duration(f.duration.as_deref()));
    let stream_duration = parsed
        .streams
        .iter()
        .filter_map(|s| parse_duration(s.duration.as_deref()))
        .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.max(d))));

    let duration_secs = format_duration
        .or(stream_duration)
        .ok_or_else(|| "container reports no duration".to_string())?;

    Ok(MediaInfo {
        duration_secs,
        dimensions,
    })
}

fn parse_duration(raw: Option<&str>) -> Option<f64> {
    let secs = raw?.trim().parse::<f64>().ok()?;
    (secs.is_finite() && secs > 0.0).then_some(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediamerge_common::error::ErrorKind;

    #[test]
    fn test_invalid_data_is_unsupported_format() {
        let err = classify_tool_failure(
            "notes.mp4",
            "ffprobe failed (status 1)",
            "notes.mp4: Invalid data found when processing input\n",
        );
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
        assert!(err.to_string().contains("notes.mp4"));
    }

    #[test]
    fn test_missing_codec_parameters_is_unsupported_format() {
        let stderr = "[mov,mp4] Could not find codec parameters for stream 0 (Video: none)";
        let err = classify_tool_failure("clip.mov", "audio decode failed (status 1)", stderr);
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    }

    #[test]
    fn test_other_failures_are_corrupt_asset() {
        let err = classify_tool_failure(
            "demo.mp4",
            "ffprobe failed (status 1)",
            "  moov atom not found\n",
        );
        assert_eq!(err.kind(), ErrorKind::CorruptAsset);
        assert!(err.to_string().contains("moov atom not found"));
    }

    #[test]
    fn test_parse_probe_output_video() {
        let raw = br#"{
            "streams": [
                {"codec_type": "audio", "duration": "55.9"},
                {"codec_type": "video", "width": 1920, "height": 1080, "duration": "56.0"}
            ],
            "format": {"duration": "56.021"}
        }"#;
        let info = parse_probe_output(raw).unwrap();
        assert!((info.duration_secs - 56.021).abs() < 1e-9);
        assert_eq!(info.dimensions, Some((1920, 1080)));
    }

    #[test]
    fn test_parse_probe_output_falls_back_to_stream_duration() {
        let raw = br#"{
            "streams": [{"codec_type": "video", "width": 1280, "height": 720, "duration": "12.5"}],
            "format": {"duration": "N/A"}
        }"#;
        let info = parse_probe_output(raw).unwrap();
        assert!((info.duration_secs - 12.5).abs() < 1e-9);
    }

    #[test]
    fn test_parse_probe_output_audio_only() {
        let raw = br#"{"streams": [{"codec_type": "audio"}], "format": {"duration": "180.0"}}"#;
        let info = parse_probe_output(raw).unwrap();
        assert_eq!(info.dimensions, None);
    }

    #[test]
    fn test_parse_probe_output_rejects_missing_duration() {
        let raw = br#"{"streams": [], "format": {}}"#;
        assert!(parse_probe_output(raw).is_err());
        assert!(parse_probe_output(b"not json").is_err());
    }

    #[test]
    fn test_command_exists_for_shell() {
        assert!(command_exists("sh"));
        assert!(!command_exists("mediamerge-definitely-not-a-binary"));
    }
}
