//! Timeline plan: the ordered phases of one output video.
//!
//! Offsets are stored as integer nanoseconds. Phases are contiguous, so the
//! sum of phase durations telescopes to the plan total without rounding.

use serde::{Deserialize, Serialize};

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Visual source that owns a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PhaseKind {
    /// A cover image from the intro.
    Banner,
    /// The screen recording.
    MainContent,
    /// The closing title card.
    EndCard,
}

/// A contiguous time segment with one primary visual source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub kind: PhaseKind,

    /// Start offset from the beginning of the output (ns).
    pub start_ns: u64,

    /// End offset, exclusive (ns).
    pub end_ns: u64,

    /// Index into the banner images for banner phases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_index: Option<usize>,
}

impl Phase {
    pub fn duration_ns(&self) -> u64 {
        self.end_ns - self.start_ns
    }

    pub fn start_secs(&self) -> f64 {
        self.start_ns as f64 / NANOS_PER_SEC
    }

    pub fn end_secs(&self) -> f64 {
        self.end_ns as f64 / NANOS_PER_SEC
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_ns() as f64 / NANOS_PER_SEC
    }

    /// Whether `t` (seconds) falls inside `[start, end)`.
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start_secs() && t < self.end_secs()
    }
}

/// Strategy used to derive the total output length.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "kebab-case")]
pub enum DurationPolicy {
    /// `max(minimum, intro + main natural length + end card)`; main content
    /// loops at the configured speed to fill its slot.
    AdditiveMinimum { minimum_secs: f64 },

    /// Fixed total; main-content playback rate is derived to land on it.
    ExactTarget { target_secs: f64 },

    /// `banners * slot + main / speed + end card`.
    BannerCountScaled,
}

impl DurationPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AdditiveMinimum { .. } => "additive-minimum",
            Self::ExactTarget { .. } => "exact-target",
            Self::BannerCountScaled => "banner-count-scaled",
        }
    }
}

impl Default for DurationPolicy {
    fn default() -> Self {
        Self::AdditiveMinimum { minimum_secs: 60.0 }
    }
}

/// The resolved timeline for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelinePlan {
    /// Phases in playback order.
    pub phases: Vec<Phase>,

    /// Total output length (ns); equals the last phase's end.
    pub total_ns: u64,

    /// Crossfade window at the tail of each banner phase (ns).
    pub crossfade_ns: u64,

    /// Rate at which the main content is played back.
    pub main_playback_rate: f64,

    /// Natural length of the main content source (seconds).
    pub main_source_secs: f64,

    /// Policy the plan was derived with.
    pub policy: DurationPolicy,
}

impl TimelinePlan {
    pub fn total_secs(&self) -> f64 {
        self.total_ns as f64 / NANOS_PER_SEC
    }

    pub fn crossfade_secs(&self) -> f64 {
        self.crossfade_ns as f64 / NANOS_PER_SEC
    }

    /// Index of the phase active at `t` seconds.
    ///
    /// Times before zero map to the first phase; times at or beyond the end
    /// map to the last phase.
    pub fn phase_index_at(&self, t: f64) -> usize {
        for (i, phase) in self.phases.iter().enumerate() {
            if t < phase.end_secs() {
                return i;
            }
        }
        self.phases.len().saturating_sub(1)
    }

    /// Phase active at `t` seconds (clamped to the plan).
    pub fn phase_at(&self, t: f64) -> Option<&Phase> {
        self.phases.get(self.phase_index_at(t))
    }

    pub fn banner_count(&self) -> usize {
        self.phases
            .iter()
            .filter(|p| p.kind == PhaseKind::Banner)
            .count()
    }

    pub fn main_content(&self) -> Option<&Phase> {
        self.phases.iter().find(|p| p.kind == PhaseKind::MainContent)
    }

    pub fn end_card(&self) -> Option<&Phase> {
        self.phases.iter().find(|p| p.kind == PhaseKind::EndCard)
    }

    /// Media time of the main-content source at output time `t`.
    ///
    /// Media time keeps increasing across loop boundaries; decoders wrap it
    /// onto the source so looping continues seamlessly.
    pub fn main_media_time(&self, t: f64) -> f64 {
        match self.main_content() {
            Some(main) => {
                let local = (t.min(main.end_secs()) - main.start_secs()).max(0.0);
                local * self.main_playback_rate
            }
            None => 0.0,
        }
    }

    /// Output time used for the result thumbnail: one second into the main
    /// content, clamped to that phase.
    pub fn thumbnail_time(&self) -> f64 {
        match self.main_content() {
            Some(main) => (main.start_secs() + 1.0).min(main.end_secs()),
            None => 0.0,
        }
    }

    /// Check the structural invariants: contiguous from zero, non-empty
    /// phases, at least one banner first, exactly one main content, at most
    /// one end card in last position.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut cursor = 0u64;
        for (i, phase) in self.phases.iter().enumerate() {
            if phase.start_ns != cursor {
                return Err(format!("phase {i} starts at {} not {cursor}", phase.start_ns));
            }
            if phase.end_ns <= phase.start_ns {
                return Err(format!("phase {i} is empty"));
            }
            cursor = phase.end_ns;
        }
        if cursor != self.total_ns {
            return Err(format!("phases end at {cursor}, total is {}", self.total_ns));
        }
        if self.phases.first().map(|p| p.kind) != Some(PhaseKind::Banner) {
            return Err("plan must open with a banner".to_string());
        }
        let mains = self
            .phases
            .iter()
            .filter(|p| p.kind == PhaseKind::MainContent)
            .count();
        if mains != 1 {
            return Err(format!("expected one main-content phase, found {mains}"));
        }
        let cards: Vec<usize> = self
            .phases
            .iter()
            .enumerate()
            .filter(|(_, p)| p.kind == PhaseKind::EndCard)
            .map(|(i, _)| i)
            .collect();
        match cards.as_slice() {
            [] => {}
            [i] if *i == self.phases.len() - 1 => {}
            _ => return Err("end card must appear at most once, last".to_string()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phase(kind: PhaseKind, start: u64, end: u64, idx: Option<usize>) -> Phase {
        Phase {
            kind,
            start_ns: start,
            end_ns: end,
            source_index: idx,
        }
    }

    fn sample_plan() -> TimelinePlan {
        const S: u64 = 1_000_000_000;
        TimelinePlan {
            phases: vec![
                phase(PhaseKind::Banner, 0, 4 * S, Some(0)),
                phase(PhaseKind::MainContent, 4 * S, 14 * S, None),
                phase(PhaseKind::EndCard, 14 * S, 18 * S, None),
            ],
            total_ns: 18 * S,
            crossfade_ns: S,
            main_playback_rate: 2.0,
            main_source_secs: 20.0,
            policy: DurationPolicy::BannerCountScaled,
        }
    }

    #[test]
    fn test_phase_lookup_clamps() {
        let plan = sample_plan();
        assert_eq!(plan.phase_index_at(-1.0), 0);
        assert_eq!(plan.phase_index_at(3.999), 0);
        assert_eq!(plan.phase_index_at(4.0), 1);
        assert_eq!(plan.phase_index_at(17.9), 2);
        assert_eq!(plan.phase_index_at(500.0), 2);
    }

    #[test]
    fn test_main_media_time_uses_rate() {
        let plan = sample_plan();
        assert_eq!(plan.main_media_time(2.0), 0.0);
        assert!((plan.main_media_time(6.0) - 4.0).abs() < 1e-9);
        // Frozen on the last frame once main content is over.
        assert!((plan.main_media_time(16.0) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_thumbnail_time() {
        assert!((sample_plan().thumbnail_time() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_invariants_hold_for_sample() {
        assert!(sample_plan().check_invariants().is_ok());
    }

    #[test]
    fn test_invariants_detect_gap() {
        let mut plan = sample_plan();
        plan.phases[1].start_ns += 1;
        assert!(plan.check_invariants().is_err());
    }

    #[test]
    fn test_policy_serde_tag() {
        let json = serde_json::to_string(&DurationPolicy::ExactTarget { target_secs: 90.0 }).unwrap();
        assert_eq!(json, r#"{"policy":"exact-target","target_secs":90.0}"#);
        let parsed: DurationPolicy = serde_json::from_str(r#"{"policy":"banner-count-scaled"}"#).unwrap();
        assert_eq!(parsed, DurationPolicy::BannerCountScaled);
    }
}
