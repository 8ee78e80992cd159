//! Duration policies and phase layout.
//!
//! # Algorithm
//!
//! 1. **Validate** the run config and the inputs (at least one banner, a
//!    main-content source with a positive length).
//! 2. **Quantize** every fixed length (banner slot, end card, source length)
//!    to integer nanoseconds.
//! 3. **Resolve** the total and the main-content slot with the active policy.
//! 4. **Lay out** banners in insertion order, then main content, then the
//!    optional end card, each starting where the previous one ended.

use mediamerge_common::clock::RenderClock;
use mediamerge_common::error::{MergeError, MergeResult};
use mediamerge_composition_model::config::Config;
use mediamerge_composition_model::timeline::{DurationPolicy, Phase, PhaseKind, TimelinePlan};

/// Fixed lengths used by every policy.
#[derive(Debug, Clone)]
pub struct PlanSettings {
    /// Length of one cover-image slot in seconds.
    pub banner_secs: f64,

    /// Crossfade window at the tail of each banner slot. Clamped to half a
    /// slot so consecutive windows never overlap.
    pub crossfade_secs: f64,

    /// End-card length, or `None` to omit the end card.
    pub end_card_secs: Option<f64>,

    /// Output frame rate, used to report the plan in frames.
    pub fps: u32,
}

impl Default for PlanSettings {
    fn default() -> Self {
        Self {
            banner_secs: 4.0,
            crossfade_secs: 1.0,
            end_card_secs: None,
            fps: 30,
        }
    }
}

/// Asset facts the planner needs.
#[derive(Debug, Clone, Copy)]
pub struct PlanInputs {
    /// Number of cover images, in insertion order.
    pub banner_count: usize,

    /// Natural length of the screen recording in seconds.
    pub main_source_secs: f64,
}

/// Plan one run with the given settings.
pub fn plan(
    inputs: &PlanInputs,
    config: &Config,
    policy: DurationPolicy,
    settings: PlanSettings,
) -> MergeResult<TimelinePlan> {
    TimelinePlanner::new(settings).plan(inputs, config, policy)
}

/// The timeline planner.
pub struct TimelinePlanner {
    settings: PlanSettings,
}

impl TimelinePlanner {
    /// Create a planner with the given fixed lengths.
    pub fn new(settings: PlanSettings) -> Self {
        Self { settings }
    }

    /// Create a planner with default lengths (4 s slots, 1 s crossfade,
    /// no end card).
    pub fn with_defaults() -> Self {
        Self::new(PlanSettings::default())
    }

    pub fn settings(&self) -> &PlanSettings {
        &self.settings
    }

    /// Build the plan for one run.
    pub fn plan(
        &self,
        inputs: &PlanInputs,
        config: &Config,
        policy: DurationPolicy,
    ) -> MergeResult<TimelinePlan> {
        config.validate()?;
        self.validate_settings()?;

        if inputs.banner_count == 0 {
            return Err(MergeError::missing_asset(
                "at least one cover image is required for the intro",
            ));
        }
        if !inputs.main_source_secs.is_finite() || inputs.main_source_secs <= 0.0 {
            return Err(MergeError::corrupt_asset(
                "screen recording",
                format!("unusable duration {}", inputs.main_source_secs),
            ));
        }

        let banner_ns = RenderClock::secs_to_ns(self.settings.banner_secs);
        let intro_ns = banner_ns
            .checked_mul(inputs.banner_count as u64)
            .ok_or_else(too_long)?;
        let end_card_ns = self
            .settings
            .end_card_secs
            .map(RenderClock::secs_to_ns)
            .unwrap_or(0);
        let natural_ns = RenderClock::secs_to_ns(inputs.main_source_secs);
        let speed = config.playback_speed;

        let (total_ns, main_ns, rate) = match policy {
            DurationPolicy::AdditiveMinimum { minimum_secs } => {
                let floor_ns = RenderClock::secs_to_ns(minimum_secs.max(0.0));
                let total = floor_ns.max(sum_ns(&[intro_ns, natural_ns, end_card_ns])?);
                (total, total - intro_ns - end_card_ns, speed)
            }
            DurationPolicy::ExactTarget { target_secs } => {
                let total = RenderClock::secs_to_ns(target_secs.max(0.0));
                if sum_ns(&[intro_ns, end_card_ns])? >= total {
                    return Err(MergeError::plan_infeasible(format!(
                        "{} cover image(s) of {:.1}s plus a {:.1}s end card leave no room in a {:.1}s target",
                        inputs.banner_count,
                        self.settings.banner_secs,
                        RenderClock::ns_to_secs(end_card_ns),
                        target_secs
                    )));
                }
                let main = total - intro_ns - end_card_ns;
                (total, main, inputs.main_source_secs / RenderClock::ns_to_secs(main))
            }
            DurationPolicy::BannerCountScaled => {
                let main = RenderClock::secs_to_ns(inputs.main_source_secs / speed);
                (sum_ns(&[intro_ns, main, end_card_ns])?, main, speed)
            }
        };

        if main_ns == 0 {
            return Err(MergeError::plan_infeasible(
                "main content resolved to zero length",
            ));
        }

        let mut phases = Vec::with_capacity(inputs.banner_count + 2);
        let mut cursor = 0u64;
        for index in 0..inputs.banner_count {
            phases.push(Phase {
                kind: PhaseKind::Banner,
                start_ns: cursor,
                end_ns: cursor + banner_ns,
                source_index: Some(index),
            });
            cursor += banner_ns;
        }
        phases.push(Phase {
            kind: PhaseKind::MainContent,
            start_ns: cursor,
            end_ns: cursor + main_ns,
            source_index: None,
        });
        cursor += main_ns;
        if end_card_ns > 0 {
            phases.push(Phase {
                kind: PhaseKind::EndCard,
                start_ns: cursor,
                end_ns: cursor + end_card_ns,
                source_index: None,
            });
            cursor += end_card_ns;
        }
        debug_assert_eq!(cursor, total_ns);

        let crossfade_ns = RenderClock::secs_to_ns(self.settings.crossfade_secs).min(banner_ns / 2);

        let plan = TimelinePlan {
            phases,
            total_ns,
            crossfade_ns,
            main_playback_rate: rate,
            main_source_secs: inputs.main_source_secs,
            policy,
        };

        tracing::debug!(
            policy = policy.name(),
            banners = inputs.banner_count,
            total_secs = plan.total_secs(),
            main_secs = RenderClock::ns_to_secs(main_ns),
            playback_rate = rate,
            total_frames = (plan.total_secs() * self.settings.fps.max(1) as f64).round() as u64,
            "Timeline planned"
        );

        Ok(plan)
    }

    fn validate_settings(&self) -> MergeResult<()> {
        let s = &self.settings;
        if !s.banner_secs.is_finite() || s.banner_secs <= 0.0 {
            return Err(MergeError::invalid_config(format!(
                "banner slot must be positive, got {}",
                s.banner_secs
            )));
        }
        if !s.crossfade_secs.is_finite() || s.crossfade_secs < 0.0 {
            return Err(MergeError::invalid_config(format!(
                "crossfade window must be non-negative, got {}",
                s.crossfade_secs
            )));
        }
        if let Some(end) = s.end_card_secs {
            if !end.is_finite() || end < 0.0 {
                return Err(MergeError::invalid_config(format!(
                    "end card length must be non-negative, got {end}"
                )));
            }
        }
        Ok(())
    }
}

fn too_long() -> MergeError {
    MergeError::plan_infeasible("timeline is too long to represent")
}

/// Sum phase lengths, failing instead of wrapping.
fn sum_ns(parts: &[u64]) -> MergeResult<u64> {
    parts
        .iter()
        .try_fold(0u64, |acc, &ns| acc.checked_add(ns))
        .ok_or_else(too_long)
}
