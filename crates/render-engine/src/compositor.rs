//! Frame compositor: draws one output frame for a point on the timeline.
//!
//! Layer order per frame:
//!
//! ```text
//! clear ─▶ primary (filtered) ─▶ incoming crossfade (filtered)
//!       ─▶ vignette ─▶ watermark
//! ```
//!
//! The compositor owns no media. Banners and the screen recording are
//! borrowed for each call through [`FrameAssets`].

use image::RgbaImage;

use mediamerge_common::error::{MergeError, MergeResult};
use mediamerge_composition_model::config::{Config, IntroTransition, TransitionPack};
use mediamerge_composition_model::timeline::{Phase, PhaseKind, TimelinePlan};
use mediamerge_media_loader::{ImageHandle, VideoSource};

use crate::canvas::{contain_rect, cover_rect, DrawOptions, Rect, Surface};
use crate::color::ColorMatrix;
use crate::text::{Anchor, TextRenderer};

/// Extra scale reached by the zoom intro transitions.
pub const ZOOM_DELTA: f32 = 0.1;

/// Extra scale of the incoming layer at the start of a cinematic crossfade.
const CINEMATIC_ZOOM: f32 = 0.15;

/// Largest horizontal glitch offset as a fraction of the width.
const GLITCH_OFFSET: f32 = 0.05;

/// Blur radius at the start of a blur intro, as a fraction of the height.
const INTRO_BLUR: f32 = 0.02;

/// Corner radius of the main content, as a fraction of the height.
const CORNER_RADIUS: f32 = 0.025;

const END_CARD_BACKGROUND: [u8; 4] = [0x0f, 0x17, 0x2a, 255];
const WATERMARK_COLOR: [u8; 4] = [255, 255, 255, 153];

/// Media borrowed for one frame.
pub struct FrameAssets<'a> {
    /// Cover images, indexed by banner phase `source_index`.
    pub banners: &'a [ImageHandle],

    /// The screen recording.
    pub video: &'a mut dyn VideoSource,
}

/// What happened to the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A full frame was drawn.
    Rendered,
    /// The video had no frame yet; the previous surface was left untouched.
    Held,
}

/// Draws frames onto a [`Surface`].
#[derive(Debug)]
pub struct Compositor {
    text: Option<TextRenderer>,
    seed: u64,
    warned_no_font: bool,
}

impl Compositor {
    /// `seed` drives the glitch transition so output is reproducible.
    pub fn new(text: Option<TextRenderer>, seed: u64) -> Self {
        Self {
            text,
            seed,
            warned_no_font: false,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn has_font(&self) -> bool {
        self.text.is_some()
    }

    /// Render the frame at `clock_secs`.
    ///
    /// Times beyond the plan render the terminal frame.
    pub fn render_frame(
        &mut self,
        surface: &mut Surface,
        plan: &TimelinePlan,
        clock_secs: f64,
        config: &Config,
        assets: &mut FrameAssets<'_>,
    ) -> MergeResult<FrameOutcome> {
        let t = clock_secs.clamp(0.0, (plan.total_secs() - 1e-6).max(0.0));
        let index = plan.phase_index_at(t);
        let phase = *plan
            .phases
            .get(index)
            .ok_or_else(|| MergeError::plan_infeasible("plan has no phases"))?;

        let filter = ColorMatrix::for_filter(config.color_filter);

        match phase.kind {
            PhaseKind::MainContent => {
                let media_secs = plan.main_media_time(t);
                let Some(frame) = assets.video.frame_at(media_secs) else {
                    return Ok(FrameOutcome::Held);
                };
                surface.clear([0, 0, 0, 255]);
                surface.set_filter(filter);
                draw_main(surface, frame, config, 1.0, None);
            }
            PhaseKind::Banner => {
                surface.clear([0, 0, 0, 255]);
                surface.set_filter(filter);
                let image = banner(assets.banners, &phase)?;
                let progress = ((t - phase.start_secs()) / phase.duration_secs()) as f32;
                draw_banner(surface, &image.pixels, config.intro_transition, progress, 1.0, None);
            }
            PhaseKind::EndCard => {
                surface.clear([0, 0, 0, 255]);
                surface.set_filter(filter);
                self.draw_end_card(surface, config);
            }
        }

        if phase.kind == PhaseKind::Banner {
            if let Some(next) = plan.phases.get(index + 1) {
                let window = plan.crossfade_secs();
                let window_start = phase.end_secs() - window;
                if window > 0.0 && t >= window_start {
                    let ramp = (((t - window_start) / window) as f32).clamp(0.0, 1.0);
                    self.draw_incoming(surface, next, ramp, t, config, assets)?;
                }
            }
        }

        surface.set_filter(None);
        if config.vignette {
            surface.vignette(0.45, 0.7);
        }
        self.draw_watermark(surface, config);

        Ok(FrameOutcome::Rendered)
    }

    /// First visual layer of `next`, blended in by `ramp`.
    fn draw_incoming(
        &mut self,
        surface: &mut Surface,
        next: &Phase,
        ramp: f32,
        t: f64,
        config: &Config,
        assets: &mut FrameAssets<'_>,
    ) -> MergeResult<()> {
        let w = surface.width() as f32;
        let transform = match config.transition_pack {
            TransitionPack::Basic => Incoming::default(),
            TransitionPack::Cinematic => Incoming {
                scale: 1.0 + CINEMATIC_ZOOM * (1.0 - ramp),
                ..Incoming::default()
            },
            TransitionPack::Glitch => {
                let mut rng = fastrand::Rng::with_seed(self.seed ^ (t * 1000.0).round() as u64);
                Incoming {
                    dx: (rng.f32() * 2.0 - 1.0) * GLITCH_OFFSET * w * (1.0 - ramp),
                    ..Incoming::default()
                }
            }
            TransitionPack::Modern => Incoming {
                dx: w * (1.0 - ramp),
                ..Incoming::default()
            },
        };

        match next.kind {
            PhaseKind::Banner => {
                let image = banner(assets.banners, next)?;
                draw_banner(
                    surface,
                    &image.pixels,
                    config.intro_transition,
                    0.0,
                    ramp,
                    Some(transform),
                );
            }
            PhaseKind::MainContent => {
                // No decoded frame yet: the primary layer carries the window.
                if let Some(frame) = assets.video.frame_at(0.0) {
                    draw_main(surface, frame, config, ramp, Some(transform));
                }
            }
            PhaseKind::EndCard => {}
        }
        Ok(())
    }

    fn draw_end_card(&mut self, surface: &mut Surface, config: &Config) {
        let (w, h) = (surface.width() as f32, surface.height() as f32);
        surface.fill_rect(Rect::new(0.0, 0.0, w, h), END_CARD_BACKGROUND);

        let title = config
            .end_card
            .as_ref()
            .map(|card| card.title.trim())
            .filter(|title| !title.is_empty());
        let caption = config.end_card_caption();
        if title.is_none() && caption.is_none() {
            return;
        }
        let Some(text) = self.text_renderer() else {
            return;
        };
        if let Some(title) = title {
            text.draw(surface, title, h * 0.07, w / 2.0, h * 0.45, Anchor::Center, [255, 255, 255, 255]);
        }
        if let Some(caption) = caption {
            text.draw(surface, caption, h * 0.035, w / 2.0, h * 0.58, Anchor::Center, [203, 213, 225, 255]);
        }
    }

    fn draw_watermark(&mut self, surface: &mut Surface, config: &Config) {
        let Some(label) = config.watermark_text() else {
            return;
        };
        let (w, h) = (surface.width() as f32, surface.height() as f32);
        if let Some(text) = self.text_renderer() {
            text.draw(surface, label, h * 0.03, w - w * 0.02, h - h * 0.03, Anchor::Right, WATERMARK_COLOR);
        }
    }

    fn text_renderer(&mut self) -> Option<&TextRenderer> {
        if self.text.is_none() && !self.warned_no_font {
            tracing::warn!("No font configured; text layers are skipped");
            self.warned_no_font = true;
        }
        self.text.as_ref()
    }
}

/// Geometry applied to an incoming crossfade layer.
#[derive(Debug, Clone, Copy)]
struct Incoming {
    scale: f32,
    dx: f32,
}

impl Default for Incoming {
    fn default() -> Self {
        Self { scale: 1.0, dx: 0.0 }
    }
}

fn banner<'a>(banners: &'a [ImageHandle], phase: &Phase) -> MergeResult<&'a ImageHandle> {
    let index = phase.source_index.unwrap_or(0);
    banners.get(index).ok_or_else(|| {
        MergeError::missing_asset(format!(
            "banner {index} is planned but only {} cover images were loaded",
            banners.len()
        ))
    })
}

fn draw_banner(
    surface: &mut Surface,
    image: &RgbaImage,
    intro: IntroTransition,
    progress: f32,
    alpha: f32,
    incoming: Option<Incoming>,
) {
    let progress = progress.clamp(0.0, 1.0);
    let mut scale = 1.0;
    let mut blur_radius = 0;
    match intro {
        IntroTransition::Fade => {}
        IntroTransition::ZoomIn => scale = 1.0 + ZOOM_DELTA * progress,
        IntroTransition::ZoomOut => scale = 1.0 + ZOOM_DELTA * (1.0 - progress),
        IntroTransition::Blur => {
            let remaining = (1.0 - progress * 2.0).max(0.0);
            blur_radius = (surface.height() as f32 * INTRO_BLUR * remaining).round() as u32;
        }
    }

    let mut dest = cover_rect(image.dimensions(), surface.size()).scaled(scale);
    if let Some(incoming) = incoming {
        dest = dest.scaled(incoming.scale).offset(incoming.dx, 0.0);
    }
    surface.draw_image(
        image,
        dest,
        DrawOptions {
            alpha,
            blur_radius,
            ..DrawOptions::default()
        },
    );
}

fn draw_main(
    surface: &mut Surface,
    frame: &RgbaImage,
    config: &Config,
    alpha: f32,
    incoming: Option<Incoming>,
) {
    let mut dest = contain_rect(frame.dimensions(), surface.size());
    if let Some(incoming) = incoming {
        dest = dest.scaled(incoming.scale).offset(incoming.dx, 0.0);
    }
    let corner_radius = if config.rounded_corners {
        surface.height() as f32 * CORNER_RADIUS
    } else {
        0.0
    };
    surface.draw_image(
        frame,
        dest,
        DrawOptions {
            alpha,
            corner_radius,
            ..DrawOptions::default()
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use mediamerge_composition_model::config::{ColorFilter, Watermark};
    use mediamerge_composition_model::timeline::DurationPolicy;
    use mediamerge_media_loader::SyntheticVideo;

    const S: u64 = 1_000_000_000;

    fn plan() -> TimelinePlan {
        let phase = |kind, start, end, idx| Phase {
            kind,
            start_ns: start * S,
            end_ns: end * S,
            source_index: idx,
        };
        TimelinePlan {
            phases: vec![
                phase(PhaseKind::Banner, 0, 4, Some(0)),
                phase(PhaseKind::Banner, 4, 8, Some(1)),
                phase(PhaseKind::MainContent, 8, 18, None),
                phase(PhaseKind::EndCard, 18, 22, None),
            ],
            total_ns: 22 * S,
            crossfade_ns: S,
            main_playback_rate: 1.0,
            main_source_secs: 10.0,
            policy: DurationPolicy::BannerCountScaled,
        }
    }

    fn banners() -> Vec<ImageHandle> {
        vec![
            ImageHandle {
                name: "red.png".into(),
                pixels: RgbaImage::from_pixel(16, 9, Rgba([255, 0, 0, 255])),
            },
            ImageHandle {
                name: "blue.png".into(),
                pixels: RgbaImage::from_pixel(16, 9, Rgba([0, 0, 255, 255])),
            },
        ]
    }

    /// 16x9 banner whose pixels come from `f(x, y)`.
    fn banner_from(name: &str, f: impl Fn(u32, u32) -> [u8; 4]) -> ImageHandle {
        ImageHandle {
            name: name.into(),
            pixels: RgbaImage::from_fn(16, 9, |x, y| Rgba(f(x, y))),
        }
    }

    /// Red channel rising from 0 at the left edge to 255 at the right.
    fn gradient() -> ImageHandle {
        banner_from("gradient.png", |x, _| [(x * 17) as u8, 0, 0, 255])
    }

    fn render(
        compositor: &mut Compositor,
        surface: &mut Surface,
        video: &mut SyntheticVideo,
        config: &Config,
        t: f64,
    ) -> FrameOutcome {
        render_with(compositor, surface, video, config, &banners(), t)
    }

    fn render_with(
        compositor: &mut Compositor,
        surface: &mut Surface,
        video: &mut SyntheticVideo,
        config: &Config,
        banners: &[ImageHandle],
        t: f64,
    ) -> FrameOutcome {
        let mut assets = FrameAssets { banners, video };
        compositor
            .render_frame(surface, &plan(), t, config, &mut assets)
            .unwrap()
    }

    fn playing_video() -> SyntheticVideo {
        let mut video = SyntheticVideo::new("screen.mp4", 10.0, (32, 18), 10);
        video.play().unwrap();
        video
    }

    #[test]
    fn test_banner_fills_frame() {
        let mut compositor = Compositor::new(None, 7);
        let mut surface = Surface::new(32, 18);
        let mut video = playing_video();
        let outcome = render(&mut compositor, &mut surface, &mut video, &Config::default(), 1.0);
        assert_eq!(outcome, FrameOutcome::Rendered);
        assert_eq!(surface.image().get_pixel(16, 9).0, [255, 0, 0, 255]);
    }

    #[test]
    fn test_crossfade_blends_next_banner() {
        let mut compositor = Compositor::new(None, 7);
        let mut surface = Surface::new(32, 18);
        let mut video = playing_video();
        render(&mut compositor, &mut surface, &mut video, &Config::default(), 3.5);
        let px = surface.image().get_pixel(16, 9).0;
        assert!((px[0] as i32 - 128).abs() <= 1, "got {px:?}");
        assert!((px[2] as i32 - 128).abs() <= 1, "got {px:?}");
    }

    #[test]
    fn test_modern_slide_leaves_left_half_uncovered() {
        let config = Config {
            transition_pack: TransitionPack::Modern,
            ..Config::default()
        };
        let mut compositor = Compositor::new(None, 7);
        let mut surface = Surface::new(32, 18);
        let mut video = playing_video();
        render(&mut compositor, &mut surface, &mut video, &config, 3.5);
        // Incoming layer starts at x = 16.
        assert_eq!(surface.image().get_pixel(4, 9).0, [255, 0, 0, 255]);
        assert_ne!(surface.image().get_pixel(28, 9).0, [255, 0, 0, 255]);
    }

    #[test]
    fn test_glitch_is_idempotent_for_same_seed() {
        let config = Config {
            transition_pack: TransitionPack::Glitch,
            ..Config::default()
        };
        let mut first = Surface::new(32, 18);
        let mut second = Surface::new(32, 18);
        let mut video = playing_video();
        render(&mut Compositor::new(None, 42), &mut first, &mut video, &config, 3.3);
        render(&mut Compositor::new(None, 42), &mut second, &mut video, &config, 3.3);
        assert_eq!(first.image(), second.image());
    }

    #[test]
    fn test_main_content_uses_video_frame() {
        let mut compositor = Compositor::new(None, 7);
        let mut surface = Surface::new(32, 18);
        let mut video = playing_video();
        render(&mut compositor, &mut surface, &mut video, &Config::default(), 8.5);
        let expected = SyntheticVideo::color_for_index(5).0;
        assert_eq!(surface.image().get_pixel(16, 9).0, expected);
    }

    #[test]
    fn test_video_not_ready_holds_surface() {
        let mut compositor = Compositor::new(None, 7);
        let mut surface = Surface::new(32, 18);
        surface.clear([9, 9, 9, 255]);
        let mut video = SyntheticVideo::new("screen.mp4", 10.0, (32, 18), 10).with_warmup(1);
        video.play().unwrap();
        let outcome = render(&mut compositor, &mut surface, &mut video, &Config::default(), 9.0);
        assert_eq!(outcome, FrameOutcome::Held);
        assert_eq!(surface.image().get_pixel(0, 0).0, [9, 9, 9, 255]);
        let outcome = render(&mut compositor, &mut surface, &mut video, &Config::default(), 9.1);
        assert_eq!(outcome, FrameOutcome::Rendered);
    }

    #[test]
    fn test_end_card_background_and_terminal_clamp() {
        let mut compositor = Compositor::new(None, 7);
        let mut surface = Surface::new(32, 18);
        let mut video = playing_video();
        render(&mut compositor, &mut surface, &mut video, &Config::default(), 100.0);
        assert_eq!(surface.image().get_pixel(0, 0).0, END_CARD_BACKGROUND);
    }

    #[test]
    fn test_filter_applies_to_primary_layer() {
        let config = Config {
            color_filter: ColorFilter::Bw,
            ..Config::default()
        };
        let mut compositor = Compositor::new(None, 7);
        let mut surface = Surface::new(32, 18);
        let mut video = playing_video();
        render(&mut compositor, &mut surface, &mut video, &config, 1.0);
        let px = surface.image().get_pixel(16, 9).0;
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
        assert_eq!(surface.filter(), None);
    }

    #[test]
    fn test_vignette_darkens_edges() {
        let config = Config {
            vignette: true,
            ..Config::default()
        };
        let mut compositor = Compositor::new(None, 7);
        let mut surface = Surface::new(32, 18);
        let mut video = playing_video();
        render(&mut compositor, &mut surface, &mut video, &config, 1.0);
        assert!(surface.image().get_pixel(0, 0)[0] < 255);
        assert_eq!(surface.image().get_pixel(16, 9)[0], 255);
    }

    #[test]
    fn test_missing_banner_is_error() {
        let mut compositor = Compositor::new(None, 7);
        let mut surface = Surface::new(32, 18);
        let mut video = playing_video();
        let mut assets = FrameAssets {
            banners: &[],
            video: &mut video,
        };
        let err = compositor
            .render_frame(&mut surface, &plan(), 0.0, &Config::default(), &mut assets)
            .unwrap_err();
        assert_eq!(err.kind(), mediamerge_common::error::ErrorKind::MissingRequiredAsset);
    }

    /// Render the first banner slot at `t` with `intro`.
    fn intro_frame(intro: IntroTransition, banners: &[ImageHandle], size: (u32, u32), t: f64) -> Surface {
        let config = Config {
            intro_transition: intro,
            ..Config::default()
        };
        let mut surface = Surface::new(size.0, size.1);
        let mut video = playing_video();
        render_with(&mut Compositor::new(None, 7), &mut surface, &mut video, &config, banners, t);
        surface
    }

    #[test]
    fn test_zoom_in_grows_over_slot() {
        let banners = [gradient()];
        let start = intro_frame(IntroTransition::ZoomIn, &banners, (32, 18), 0.0);
        let late = intro_frame(IntroTransition::ZoomIn, &banners, (32, 18), 2.9);
        let fade = intro_frame(IntroTransition::Fade, &banners, (32, 18), 0.0);

        // Unscaled at the start of the slot.
        assert_eq!(start.image(), fade.image());
        // Scaling around the centre pushes both edges outwards.
        assert!(late.image().get_pixel(0, 9)[0] > start.image().get_pixel(0, 9)[0]);
        assert!(late.image().get_pixel(31, 9)[0] < start.image().get_pixel(31, 9)[0]);
    }

    #[test]
    fn test_zoom_out_shrinks_over_slot() {
        let banners = [gradient()];
        let start = intro_frame(IntroTransition::ZoomOut, &banners, (32, 18), 0.0);
        let late = intro_frame(IntroTransition::ZoomOut, &banners, (32, 18), 2.9);
        let fade = intro_frame(IntroTransition::Fade, &banners, (32, 18), 0.0);

        assert_ne!(start.image(), fade.image());
        assert!(start.image().get_pixel(0, 9)[0] > late.image().get_pixel(0, 9)[0]);
        assert!(start.image().get_pixel(31, 9)[0] < late.image().get_pixel(31, 9)[0]);
    }

    #[test]
    fn test_blur_clears_by_mid_slot() {
        let checker = [banner_from("checker.png", |x, y| {
            if (x + y) % 2 == 0 {
                [255, 255, 255, 255]
            } else {
                [0, 0, 0, 255]
            }
        })];
        let size = (160, 90);

        let blurred = intro_frame(IntroTransition::Blur, &checker, size, 0.0);
        let sharp = intro_frame(IntroTransition::Fade, &checker, size, 0.0);
        assert_ne!(blurred.image(), sharp.image());

        // Progress 0.5 of the 4 s slot: the radius has decayed to zero.
        let mid = intro_frame(IntroTransition::Blur, &checker, size, 2.0);
        let faded = intro_frame(IntroTransition::Fade, &checker, size, 2.0);
        assert_eq!(mid.image(), faded.image());
    }

    #[test]
    fn test_cinematic_incoming_layer_is_zoomed() {
        let banners = [
            banner_from("black.png", |_, _| [0, 0, 0, 255]),
            gradient(),
        ];
        let frame = |pack| {
            let config = Config {
                transition_pack: pack,
                ..Config::default()
            };
            let mut surface = Surface::new(32, 18);
            let mut video = playing_video();
            render_with(&mut Compositor::new(None, 7), &mut surface, &mut video, &config, &banners, 3.5);
            surface
        };
        let basic = frame(TransitionPack::Basic);
        let cinematic = frame(TransitionPack::Cinematic);

        // Halfway through the window the incoming banner is still scaled up.
        assert!(cinematic.image().get_pixel(0, 9)[0] > basic.image().get_pixel(0, 9)[0]);
        assert!(cinematic.image().get_pixel(31, 9)[0] < basic.image().get_pixel(31, 9)[0]);
    }

    #[test]
    fn test_rounded_corners_keep_corner_black() {
        let config = Config {
            rounded_corners: true,
            ..Config::default()
        };
        let expected = SyntheticVideo::color_for_index(5).0;

        let mut compositor = Compositor::new(None, 7);
        let mut surface = Surface::new(640, 360);
        let mut video = playing_video();
        render(&mut compositor, &mut surface, &mut video, &config, 8.5);
        assert_eq!(surface.image().get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert_eq!(surface.image().get_pixel(639, 359).0, [0, 0, 0, 255]);
        assert_eq!(surface.image().get_pixel(320, 180).0, expected);

        let mut square = Surface::new(640, 360);
        let mut video = playing_video();
        render(&mut compositor, &mut square, &mut video, &Config::default(), 8.5);
        assert_eq!(square.image().get_pixel(0, 0).0, expected);
    }

    fn system_font() -> Option<TextRenderer> {
        [
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/TTF/DejaVuSans.ttf",
            "/Library/Fonts/Arial.ttf",
            "C:\\Windows\\Fonts\\arial.ttf",
        ]
        .iter()
        .find_map(|path| TextRenderer::from_path(std::path::Path::new(path)).ok())
    }

    #[test]
    fn test_watermark_drawn_after_filter_reset() {
        let black = [banner_from("black.png", |_, _| [0, 0, 0, 255])];
        for filter in [ColorFilter::Bw, ColorFilter::Sepia] {
            let Some(font) = system_font() else {
                eprintln!("skipping: no system font found");
                return;
            };
            let config = Config {
                color_filter: filter,
                watermark: Watermark {
                    enabled: true,
                    text: "MediaMerge".into(),
                },
                ..Config::default()
            };
            let mut compositor = Compositor::new(Some(font), 7);
            let mut surface = Surface::new(640, 360);
            let mut video = playing_video();
            render_with(&mut compositor, &mut surface, &mut video, &config, &black, 1.0);
            assert_eq!(surface.filter(), None);

            // Bottom-right corner holds the label over a black background.
            let mut brightest = 0;
            for y in 320..360 {
                for x in 320..640 {
                    let px = surface.image().get_pixel(x, y).0;
                    // A filtered white would pick up the sepia tint.
                    assert_eq!(px[0], px[1], "{filter:?} tinted ({x}, {y}): {px:?}");
                    assert_eq!(px[1], px[2], "{filter:?} tinted ({x}, {y}): {px:?}");
                    brightest = brightest.max(px[0]);
                }
            }
            assert!(brightest > 60, "{filter:?}: watermark not drawn");
            assert_eq!(surface.image().get_pixel(16, 16).0, [0, 0, 0, 255]);
        }
    }
}
