//! MediaMerge Render Engine
//!
//! Real-time composition of cover images, a screen recording, and a
//! backing track into one muxed video.
//!
//! # Pipeline Architecture
//!
//! ```text
//! images ─┐
//! video ──┼── validate ─▶ plan ─▶ pick track ─▶ envelope ─▶ mix (f32le)
//! audio ──┘                                                    │
//!                                                              ▼
//!                  ┌──────────── render loop (clock) ─────────────┐
//!                  │ compositor ─▶ surface ─▶ capture sink ◀─ mix │
//!                  └──────────────────────────────────────────────┘
//!                                        │
//!                                        ▼
//!                           CompositionResult (blob + PNG)
//! ```

pub mod audio;
pub mod canvas;
pub mod color;
pub mod compositor;
pub mod driver;
pub mod text;

use std::io::Cursor;
use std::path::PathBuf;

use image::{DynamicImage, ImageFormat, RgbaImage};

use mediamerge_capture_engine::{AudioStream, CaptureSink, RecorderSettings};
use mediamerge_common::clock::FrameClock;
use mediamerge_common::config::RenderDefaults;
use mediamerge_common::error::{MergeError, MergeResult};
use mediamerge_composition_model::asset::{AssetCounts, AssetKind, AssetLimits, RawFile};
use mediamerge_composition_model::config::Config;
use mediamerge_composition_model::result::{CompositionResult, HistoryStore};
use mediamerge_composition_model::timeline::{DurationPolicy, TimelinePlan};
use mediamerge_media_loader::{AudioBuffer, ImageHandle, MediaLoader, VideoSource};
use mediamerge_planner::{PlanInputs, PlanSettings, TimelinePlanner};

pub use audio::{build_envelope, render_mix, select_track, GainCurve, MixBuffer};
pub use canvas::Surface;
pub use color::ColorMatrix;
pub use compositor::{Compositor, FrameAssets, FrameOutcome};
pub use driver::{
    CancelToken, LoopState, ProgressCallback, RenderLoop, RenderProgress, RenderSession,
    RenderStage, RunOutcome,
};
pub use text::TextRenderer;

/// Decoded media for one run.
pub struct ComposeAssets {
    /// Cover images in insertion order.
    pub images: Vec<ImageHandle>,
    pub video: Box<dyn VideoSource>,
    /// Pool the backing track is picked from.
    pub audio: Vec<AudioBuffer>,
}

impl std::fmt::Debug for ComposeAssets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComposeAssets")
            .field("images", &self.images.len())
            .field("video", &self.video.name())
            .field("audio", &self.audio.len())
            .finish()
    }
}

impl ComposeAssets {
    pub fn counts(&self) -> AssetCounts {
        AssetCounts {
            images: self.images.len(),
            videos: 1,
            audio_tracks: self.audio.len(),
        }
    }

    /// Validate the raw set, then decode every file.
    ///
    /// Validation runs before any decoding so an oversized or incomplete
    /// set fails without touching ffmpeg.
    pub fn load(loader: &MediaLoader, files: &[RawFile], limits: AssetLimits) -> MergeResult<Self> {
        let mut counts = AssetCounts::default();
        for file in files {
            match file.kind()? {
                AssetKind::Image => counts.images += 1,
                AssetKind::Video => counts.videos += 1,
                AssetKind::Audio => counts.audio_tracks += 1,
            }
        }
        counts.validate(limits)?;

        let mut images = Vec::with_capacity(counts.images);
        let mut video = None;
        let mut audio = Vec::with_capacity(counts.audio_tracks);
        for file in files {
            match file.kind()? {
                AssetKind::Image => images.push(loader.load_image(file)?),
                AssetKind::Video => video = Some(loader.load_video(file)?),
                AssetKind::Audio => audio.push(loader.load_audio(file)?),
            }
        }
        let video = video.ok_or_else(|| MergeError::missing_asset("a screen recording is required"))?;

        tracing::info!(
            images = images.len(),
            video = %video.name(),
            audio_tracks = audio.len(),
            "Assets loaded"
        );
        Ok(Self { images, video, audio })
    }
}

/// Engine settings for one run.
#[derive(Debug, Clone)]
pub struct ComposeOptions {
    pub plan: PlanSettings,
    pub limits: AssetLimits,
    pub recorder: RecorderSettings,

    /// Output frame rate.
    pub fps: u32,

    /// Output size; defaults to the config's preset dimensions.
    pub size: Option<(u32, u32)>,

    /// Seeds track selection and the glitch transition.
    pub seed: u64,

    /// Length of the cross-faded loop seam in the backing track.
    pub seam_secs: f64,

    /// TrueType font for end-card and watermark text.
    pub font_path: Option<PathBuf>,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            plan: PlanSettings::default(),
            limits: AssetLimits::default(),
            recorder: RecorderSettings::default(),
            fps: 30,
            size: None,
            seed: 0,
            seam_secs: audio::DEFAULT_SEAM_SECS,
            font_path: None,
        }
    }
}

impl ComposeOptions {
    /// Derive options from the application render defaults.
    pub fn from_render_defaults(defaults: &RenderDefaults) -> Self {
        Self {
            plan: PlanSettings {
                banner_secs: defaults.banner_secs,
                crossfade_secs: defaults.crossfade_secs,
                end_card_secs: None,
                fps: defaults.fps,
            },
            limits: AssetLimits {
                max_banners: defaults.max_banners,
            },
            recorder: RecorderSettings {
                video_bitrate_kbps: defaults.video_bitrate_kbps,
                audio_bitrate_kbps: defaults.audio_bitrate_kbps,
                ..RecorderSettings::default()
            },
            fps: defaults.fps,
            font_path: defaults.font_path.clone(),
            ..Self::default()
        }
    }
}

/// One composition request.
#[derive(Debug)]
pub struct ComposeRequest {
    pub assets: ComposeAssets,
    pub config: Config,
    pub policy: DurationPolicy,
    pub options: ComposeOptions,
}

/// Runs composition requests against a capture sink and a render loop.
pub struct Composer {
    sink: CaptureSink,
    render_loop: RenderLoop,
}

impl Composer {
    pub fn new(sink: CaptureSink, clock: Box<dyn FrameClock + Send>) -> Self {
        Self {
            sink,
            render_loop: RenderLoop::new(clock),
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.render_loop = self.render_loop.with_cancel_token(cancel);
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.render_loop = self.render_loop.with_progress(progress);
        self
    }

    pub fn sink_mut(&mut self) -> &mut CaptureSink {
        &mut self.sink
    }

    pub fn state(&self) -> LoopState {
        self.render_loop.state()
    }

    /// Validate, plan, mix, render, and package one composition.
    pub fn compose(&mut self, request: ComposeRequest) -> MergeResult<CompositionResult> {
        let ComposeRequest {
            assets,
            config,
            policy,
            options,
        } = request;
        assets.counts().validate(options.limits)?;
        config.validate()?;
        let ComposeAssets {
            images,
            mut video,
            audio,
        } = assets;

        let plan = plan_for(&images, video.as_ref(), &config, policy, &options)?;

        let mut rng = fastrand::Rng::with_seed(options.seed);
        let track = select_track(&audio, &mut rng)?;
        let envelope = build_envelope(plan.total_secs(), config.audio_volume, config.audio_fade);
        let mix = render_mix(track, plan.total_secs(), &envelope, options.seam_secs);

        let mix_file = tempfile::Builder::new()
            .prefix("mediamerge-mix-")
            .suffix(".f32le")
            .tempfile()?;
        audio::write_mix_to_f32le_file(&mix.samples, mix_file.path())?;
        let audio_stream = AudioStream {
            path: mix_file.path().to_path_buf(),
            sample_rate: mix.sample_rate,
            channels: mix.channels,
        };
        tracing::info!(
            track = %track.name,
            volume = config.audio_volume,
            fade = config.audio_fade,
            mix_secs = mix.duration_secs(),
            "Audio destination rendered"
        );

        let (width, height) = options.size.unwrap_or_else(|| config.output_preset.dimensions());
        let mut surface = Surface::new(width, height);
        let mut compositor = Compositor::new(load_font(&options), options.seed);

        let outcome = self.render_loop.run(RenderSession {
            plan: &plan,
            config: &config,
            compositor: &mut compositor,
            surface: &mut surface,
            assets: FrameAssets {
                banners: &images,
                video: video.as_mut(),
            },
            sink: &mut self.sink,
            audio: Some(&audio_stream),
            settings: options.recorder,
            fps: options.fps,
            thumbnail_secs: plan.thumbnail_time(),
        })?;

        let still = outcome.thumbnail.as_ref().unwrap_or_else(|| surface.image());
        let thumbnail_png = encode_png(still)?;
        let result = CompositionResult::new(
            outcome.blob,
            thumbnail_png,
            plan.total_secs(),
            chrono::Utc::now(),
        );

        tracing::info!(
            id = %result.id,
            name = %result.display_name,
            duration_secs = result.duration_secs,
            bytes = result.byte_size,
            "Composition finished"
        );
        Ok(result)
    }

    /// Compose and hand the result to `store`.
    pub fn compose_into(
        &mut self,
        request: ComposeRequest,
        store: &mut dyn HistoryStore,
    ) -> MergeResult<()> {
        let result = self.compose(request)?;
        store.save(result)
    }
}

/// Plan a run for already-decoded assets.
pub fn plan_for(
    images: &[ImageHandle],
    video: &dyn VideoSource,
    config: &Config,
    policy: DurationPolicy,
    options: &ComposeOptions,
) -> MergeResult<TimelinePlan> {
    let inputs = PlanInputs {
        banner_count: images.len(),
        main_source_secs: video.duration_secs(),
    };
    let mut settings = options.plan.clone();
    settings.fps = options.fps;
    TimelinePlanner::new(settings).plan(&inputs, config, policy)
}

fn load_font(options: &ComposeOptions) -> Option<TextRenderer> {
    let path = options.font_path.as_ref()?;
    match TextRenderer::from_path(path) {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to load font; text layers are skipped");
            None
        }
    }
}

/// Encode a frame as PNG.
pub fn encode_png(frame: &RgbaImage) -> MergeResult<Vec<u8>> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(frame.clone())
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| MergeError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_encode_png_round_trip_dimensions() {
        let png = encode_png(&RgbaImage::from_pixel(3, 2, Rgba([1, 2, 3, 255]))).unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (3, 2));
    }

    #[test]
    fn test_options_from_render_defaults() {
        let defaults = RenderDefaults {
            fps: 24,
            max_banners: 5,
            ..RenderDefaults::default()
        };
        let options = ComposeOptions::from_render_defaults(&defaults);
        assert_eq!(options.fps, 24);
        assert_eq!(options.plan.fps, 24);
        assert_eq!(options.limits.max_banners, 5);
        assert_eq!(options.recorder.video_bitrate_kbps, 5000);
    }

    #[test]
    fn test_load_validates_before_decoding() {
        let loader = MediaLoader::new(Default::default());
        // Garbage bytes would fail to decode; the count check fires first.
        let mut files: Vec<RawFile> = (0..16)
            .map(|i| RawFile::new(format!("cover{i}.png"), "image/png", vec![0u8; 4]))
            .collect();
        files.push(RawFile::new("screen.mp4", "video/mp4", vec![0u8; 4]));
        files.push(RawFile::new("track.mp3", "audio/mpeg", vec![0u8; 4]));
        let err = ComposeAssets::load(&loader, &files, AssetLimits::default()).unwrap_err();
        assert_eq!(err.kind(), mediamerge_common::error::ErrorKind::AssetLimitExceeded);
    }
}
