//! Per-run composition options.
//!
//! A [`Config`] is snapshotted when a run starts and never mutated during
//! rendering. Enum values serialize to the same kebab-case names the
//! options are known by in the UI (`zoom-in`, `bw`, `linkedin`, ...).

use serde::{Deserialize, Serialize};

use mediamerge_common::error::{MergeError, MergeResult};

/// Immutable-per-run snapshot of visual and audio options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Easing applied to cover images during the intro.
    pub intro_transition: IntroTransition,

    /// Style of the crossfade between phases.
    pub transition_pack: TransitionPack,

    /// Colour filter applied to every primary layer.
    pub color_filter: ColorFilter,

    /// Output resolution preset.
    pub output_preset: OutputPreset,

    /// Backing-track volume in `[0, 1]`.
    pub audio_volume: f64,

    /// Fade the backing track in and out.
    pub audio_fade: bool,

    /// Bottom-right text overlay.
    pub watermark: Watermark,

    /// Darken frame edges with a radial gradient.
    pub vignette: bool,

    /// Round the corners of the main content frame.
    pub rounded_corners: bool,

    /// Main-content playback speed (e.g. 0.5 to 2.0).
    pub playback_speed: f64,

    /// Closing card shown after the main content.
    pub end_card: Option<EndCard>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            intro_transition: IntroTransition::Fade,
            transition_pack: TransitionPack::Basic,
            color_filter: ColorFilter::None,
            output_preset: OutputPreset::Youtube,
            audio_volume: 0.8,
            audio_fade: true,
            watermark: Watermark::default(),
            vignette: false,
            rounded_corners: false,
            playback_speed: 1.0,
            end_card: None,
        }
    }
}

impl Config {
    /// Check the invariants every run relies on.
    pub fn validate(&self) -> MergeResult<()> {
        if !(0.0..=1.0).contains(&self.audio_volume) {
            return Err(MergeError::invalid_config(format!(
                "audio volume must be within [0, 1], got {}",
                self.audio_volume
            )));
        }
        if !self.playback_speed.is_finite() || self.playback_speed <= 0.0 {
            return Err(MergeError::invalid_config(format!(
                "playback speed must be positive, got {}",
                self.playback_speed
            )));
        }
        Ok(())
    }

    /// Watermark text if the overlay is enabled and non-empty.
    pub fn watermark_text(&self) -> Option<&str> {
        if !self.watermark.enabled {
            return None;
        }
        let text = self.watermark.text.trim();
        (!text.is_empty()).then_some(text)
    }

    /// Caption for the end card, falling back to the watermark text.
    pub fn end_card_caption(&self) -> Option<&str> {
        self.end_card
            .as_ref()
            .and_then(|card| card.caption.as_deref())
            .map(str::trim)
            .filter(|caption| !caption.is_empty())
            .or_else(|| {
                let text = self.watermark.text.trim();
                (!text.is_empty()).then_some(text)
            })
    }
}

/// Intro easing for cover images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntroTransition {
    #[default]
    Fade,
    ZoomIn,
    ZoomOut,
    Blur,
}

/// Crossfade style between consecutive phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionPack {
    #[default]
    Basic,
    Cinematic,
    Glitch,
    Modern,
}

/// Compositing-wide colour filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorFilter {
    #[default]
    None,
    Bw,
    Sepia,
    Contrast,
    Warm,
    Cool,
    Retro,
}

/// Output resolution preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputPreset {
    /// 16:9 tutorial format.
    #[default]
    Youtube,
    /// 4:5 portrait format.
    Linkedin,
}

impl OutputPreset {
    /// Output `(width, height)` in pixels.
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Self::Youtube => (1920, 1080),
            Self::Linkedin => (1080, 1350),
        }
    }
}

/// Watermark overlay settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Watermark {
    pub enabled: bool,
    pub text: String,
}

/// End-card text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndCard {
    /// Centred headline.
    pub title: String,

    /// Secondary line under the title. Falls back to the watermark text.
    #[serde(default)]
    pub caption: Option<String>,
}
