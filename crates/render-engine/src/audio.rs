//! Audio scheduler: track selection, gain envelope, and the looped mix.

use std::path::Path;

use mediamerge_common::error::{MergeError, MergeResult};
use mediamerge_media_loader::AudioBuffer;

/// Channels of the rendered mix.
pub const MIX_CHANNELS: u16 = 2;

/// Default length of the cross-faded loop seam.
pub const DEFAULT_SEAM_SECS: f64 = 0.05;

/// Piecewise-linear gain automation over output time.
#[derive(Debug, Clone, PartialEq)]
pub struct GainCurve {
    points: Vec<(f64, f64)>,
}

impl GainCurve {
    /// Build from `(time, gain)` points sorted by time.
    pub fn new(points: Vec<(f64, f64)>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    /// Gain at `t` seconds, holding the end values outside the curve.
    pub fn value_at(&self, t: f64) -> f64 {
        let Some(&(first_t, first_v)) = self.points.first() else {
            return 0.0;
        };
        if t <= first_t {
            return first_v;
        }
        for pair in self.points.windows(2) {
            let (t0, v0) = pair[0];
            let (t1, v1) = pair[1];
            if t <= t1 {
                if t1 <= t0 {
                    return v1;
                }
                return v0 + (v1 - v0) * (t - t0) / (t1 - t0);
            }
        }
        self.points.last().map_or(0.0, |&(_, v)| v)
    }
}

/// Gain automation for a run of `total_secs`.
///
/// With `fade` the gain ramps 0 → `volume` over the first second, holds,
/// and ramps back to 0 over the last second. Runs shorter than two
/// seconds peak at the midpoint. Without `fade` the gain is `volume`
/// throughout.
pub fn build_envelope(total_secs: f64, volume: f64, fade: bool) -> GainCurve {
    let total = total_secs.max(0.0);
    if !fade {
        return GainCurve::new(vec![(0.0, volume), (total, volume)]);
    }
    if total < 2.0 {
        return GainCurve::new(vec![(0.0, 0.0), (total / 2.0, volume), (total, 0.0)]);
    }
    GainCurve::new(vec![
        (0.0, 0.0),
        (1.0, volume),
        (total - 1.0, volume),
        (total, 0.0),
    ])
}

/// Pick one track uniformly at random.
pub fn select_track<'a>(pool: &'a [AudioBuffer], rng: &mut fastrand::Rng) -> MergeResult<&'a AudioBuffer> {
    if pool.is_empty() {
        return Err(MergeError::missing_asset("at least one audio track is required"));
    }
    let track = &pool[rng.usize(..pool.len())];
    tracing::debug!(track = %track.name, pool = pool.len(), "Selected backing track");
    Ok(track)
}

/// The rendered audio destination stream.
#[derive(Debug, Clone, PartialEq)]
pub struct MixBuffer {
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved stereo samples.
    pub samples: Vec<f32>,
}

impl MixBuffer {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate.max(1) as f64
    }
}

/// Loop `track` to `total_secs`, cross-fading each loop seam over
/// `seam_secs`, and apply `gain`.
///
/// The seam is capped at a quarter of the track so short tracks still
/// loop. Mono sources are duplicated to both channels.
pub fn render_mix(track: &AudioBuffer, total_secs: f64, gain: &GainCurve, seam_secs: f64) -> MixBuffer {
    let rate = track.sample_rate.max(1);
    let out_frames = (total_secs.max(0.0) * rate as f64).round() as usize;
    let mut samples = vec![0.0f32; out_frames * MIX_CHANNELS as usize];

    let len = track.frames();
    if len == 0 {
        tracing::warn!(track = %track.name, "Backing track is empty; mixing silence");
        return MixBuffer {
            sample_rate: rate,
            channels: MIX_CHANNELS,
            samples,
        };
    }

    let seam = ((seam_secs.max(0.0) * rate as f64).round() as usize).min(len / 4);
    let period = len - seam;

    for n in 0..out_frames {
        let lap = n / period;
        let local = n - lap * period;
        let (mut l, mut r) = stereo_frame(track, local);
        if lap > 0 && local < seam {
            // Tail of the previous lap fades out while this lap fades in.
            let w_in = local as f32 / seam as f32;
            let (pl, pr) = stereo_frame(track, local + period);
            l = l * w_in + pl * (1.0 - w_in);
            r = r * w_in + pr * (1.0 - w_in);
        }
        let g = gain.value_at(n as f64 / rate as f64) as f32;
        samples[n * 2] = (l * g).clamp(-1.0, 1.0);
        samples[n * 2 + 1] = (r * g).clamp(-1.0, 1.0);
    }

    MixBuffer {
        sample_rate: rate,
        channels: MIX_CHANNELS,
        samples,
    }
}

fn stereo_frame(track: &AudioBuffer, frame: usize) -> (f32, f32) {
    let channels = track.channels as usize;
    let i = frame * channels;
    let l = track.samples[i];
    let r = if channels > 1 { track.samples[i + 1] } else { l };
    (l, r)
}

/// Write interleaved samples as raw little-endian `f32`.
pub fn write_mix_to_f32le_file(samples: &[f32], out_path: &Path) -> MergeResult<()> {
    let mut bytes = Vec::<u8>::with_capacity(samples.len() * 4);
    for &sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    std::fs::write(out_path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn constant_track(value: f32, frames: usize) -> AudioBuffer {
        AudioBuffer::new("tone.wav", 100, 2, vec![value; frames * 2])
    }

    #[test]
    fn test_envelope_with_fade() {
        let curve = build_envelope(10.0, 0.8, true);
        assert!(approx(curve.value_at(0.0), 0.0));
        assert!(approx(curve.value_at(0.5), 0.4));
        assert!(approx(curve.value_at(1.0), 0.8));
        assert!(approx(curve.value_at(5.0), 0.8));
        assert!(approx(curve.value_at(9.0), 0.8));
        assert!(approx(curve.value_at(10.0), 0.0));
    }

    #[test]
    fn test_envelope_without_fade_is_constant() {
        let curve = build_envelope(17.0, 0.8, false);
        for t in [0.0, 0.5, 8.0, 16.9, 17.0] {
            assert!(approx(curve.value_at(t), 0.8));
        }
    }

    #[test]
    fn test_short_envelope_peaks_at_midpoint() {
        let curve = build_envelope(1.0, 0.6, true);
        assert_eq!(curve.points(), &[(0.0, 0.0), (0.5, 0.6), (1.0, 0.0)]);
        assert!(approx(curve.value_at(0.25), 0.3));
    }

    #[test]
    fn test_select_track_is_seeded() {
        let pool = vec![constant_track(0.1, 10), constant_track(0.2, 10), constant_track(0.3, 10)];
        let a = select_track(&pool, &mut fastrand::Rng::with_seed(9)).unwrap();
        let b = select_track(&pool, &mut fastrand::Rng::with_seed(9)).unwrap();
        assert!(std::ptr::eq(a, b));
    }

    #[test]
    fn test_select_track_empty_pool() {
        let err = select_track(&[], &mut fastrand::Rng::with_seed(1)).unwrap_err();
        assert_eq!(err.kind(), mediamerge_common::error::ErrorKind::MissingRequiredAsset);
    }

    #[test]
    fn test_loop_seam_has_no_gap() {
        // 1 s of constant signal looped to 3.5 s: a gap would show as zeros.
        let track = constant_track(0.5, 100);
        let mix = render_mix(&track, 3.5, &build_envelope(3.5, 1.0, false), 0.1);
        assert_eq!(mix.frames(), 350);
        assert!(mix.samples.iter().all(|s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_loop_seam_crossfades() {
        // Ramp 0..1 over the track; the seam blends tail into head.
        let frames = 100;
        let samples: Vec<f32> = (0..frames)
            .flat_map(|i| {
                let v = i as f32 / frames as f32;
                [v, v]
            })
            .collect();
        let track = AudioBuffer::new("ramp.wav", 100, 2, samples);
        let mix = render_mix(&track, 2.0, &build_envelope(2.0, 1.0, false), 0.1);
        // period = 90; the frame right after the seam start is mostly tail.
        let first_seam = mix.samples[90 * 2];
        assert!(first_seam > 0.85, "got {first_seam}");
        // Past the seam the head plays alone.
        assert!((mix.samples[100 * 2] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_mix_applies_gain() {
        let track = constant_track(1.0, 400);
        let mix = render_mix(&track, 4.0, &build_envelope(4.0, 0.5, true), 0.05);
        assert!(mix.samples[0].abs() < 1e-6);
        assert!((mix.samples[200 * 2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_mono_track_is_duplicated() {
        let track = AudioBuffer::new("mono.wav", 100, 1, vec![0.25; 100]);
        let mix = render_mix(&track, 0.5, &build_envelope(0.5, 1.0, false), 0.0);
        assert_eq!(mix.channels, 2);
        assert_eq!(mix.samples.len(), 100);
        assert!(mix.samples.iter().all(|&s| s == 0.25));
    }

    #[test]
    fn test_write_f32le() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mix.f32le");
        write_mix_to_f32le_file(&[0.5, -1.0], &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 8);
        assert_eq!(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]), 0.5);
    }
}
