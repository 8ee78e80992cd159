//! Render loop driver.
//!
//! Runs the composition against a [`FrameClock`]: every tick reads the
//! clock, renders the frame for that time, and pushes as many copies to
//! the capture sink as output frame slots elapsed. The encoded stream
//! therefore follows the clock even when ticks arrive late.
//!
//! ```text
//!  Idle ──run──▶ Running ──clock ≥ total──▶ Stopping ──▶ Idle
//!                   │                          ▲
//!                   └──── cancel / failure ────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::RgbaImage;

use mediamerge_capture_engine::{AudioStream, CaptureSink, RecorderSettings, StreamSpec};
use mediamerge_common::clock::{FrameClock, FramePacer};
use mediamerge_common::error::{MergeError, MergeResult};
use mediamerge_composition_model::config::Config;
use mediamerge_composition_model::result::Blob;
use mediamerge_composition_model::timeline::TimelinePlan;

use crate::canvas::Surface;
use crate::compositor::{Compositor, FrameAssets, FrameOutcome};

/// Driver state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Stopping,
}

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Stages reported through the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStage {
    Rendering,
    Finalizing,
    Complete,
}

/// Progress report.
#[derive(Debug, Clone)]
pub struct RenderProgress {
    /// `clock / total`, in `[0.0, 1.0]`.
    pub progress: f64,

    /// Clock reading for this report.
    pub clock_secs: f64,

    /// Frames pushed to the sink so far.
    pub frames_pushed: u64,

    /// Frames the finished output will hold.
    pub total_frames: u64,

    pub stage: RenderStage,
}

/// Progress callback for the render loop.
pub type ProgressCallback = Box<dyn Fn(RenderProgress) + Send>;

/// Everything one run borrows.
pub struct RenderSession<'a> {
    pub plan: &'a TimelinePlan,
    pub config: &'a Config,
    pub compositor: &'a mut Compositor,
    pub surface: &'a mut Surface,
    pub assets: FrameAssets<'a>,
    pub sink: &'a mut CaptureSink,
    pub audio: Option<&'a AudioStream>,
    pub settings: RecorderSettings,

    /// Output frame rate; frame slots are laid on this grid.
    pub fps: u32,

    /// Capture a still of the first frame rendered at or after this time.
    pub thumbnail_secs: f64,
}

/// Output of a completed run.
#[derive(Debug)]
pub struct RunOutcome {
    pub blob: Blob,

    /// Still frame for the thumbnail, if a frame at or after the requested
    /// time was rendered.
    pub thumbnail: Option<RgbaImage>,

    pub frames_pushed: u64,

    /// Loop iterations (ticks) taken.
    pub ticks: u64,

    /// Ticks where the video had no frame and the surface was held.
    pub held_ticks: u64,
}

/// The render loop.
pub struct RenderLoop {
    clock: Box<dyn FrameClock + Send>,
    cancel: CancelToken,
    progress: Option<ProgressCallback>,
    state: LoopState,
}

impl RenderLoop {
    pub fn new(clock: Box<dyn FrameClock + Send>) -> Self {
        Self {
            clock,
            cancel: CancelToken::new(),
            progress: None,
            state: LoopState::Idle,
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Drive one run to completion.
    ///
    /// The sink and the clock are started together, after the caller has
    /// rendered the audio destination. On cancellation the sink is
    /// finalized and `Cancelled` is returned; on any other failure the
    /// recording is aborted. Either way the loop is back in
    /// [`LoopState::Idle`] before the error surfaces.
    pub fn run(&mut self, session: RenderSession<'_>) -> MergeResult<RunOutcome> {
        if self.state != LoopState::Idle {
            return Err(MergeError::recording_aborted("render loop is already running"));
        }

        let RenderSession {
            plan,
            config,
            compositor,
            surface,
            mut assets,
            sink,
            audio,
            settings,
            fps,
            thumbnail_secs,
        } = session;

        let fps = fps.max(1);
        let stream = StreamSpec {
            width: surface.width(),
            height: surface.height(),
            fps,
        };
        let total = plan.total_secs();
        let mut pacer = FramePacer::new(fps);
        let total_frames = pacer.total_frames(total);

        assets.video.set_playback_rate(plan.main_playback_rate);
        assets.video.play()?;

        let handle = match sink.start(stream, audio, settings) {
            Ok(handle) => handle,
            Err(e) => {
                assets.video.pause();
                return Err(e);
            }
        };
        self.clock.start();
        self.state = LoopState::Running;

        tracing::info!(
            total_secs = total,
            total_frames,
            fps,
            width = stream.width,
            height = stream.height,
            "Render loop started"
        );

        let mut thumbnail = None;
        let mut ticks = 0u64;
        let mut held_ticks = 0u64;
        let result = loop {
            if self.cancel.is_cancelled() {
                break Err(MergeError::Cancelled);
            }

            let now = self.clock.now_secs();
            ticks += 1;
            match compositor.render_frame(surface, plan, now, config, &mut assets) {
                Ok(FrameOutcome::Rendered) => {
                    if thumbnail.is_none() && now >= thumbnail_secs {
                        thumbnail = Some(surface.image().clone());
                    }
                }
                Ok(FrameOutcome::Held) => held_ticks += 1,
                Err(e) => break Err(e),
            }

            let due = pacer.take_due(now, total_frames);
            if let Err(e) = (0..due).try_for_each(|_| sink.push_frame(&handle, surface.image())) {
                break Err(e);
            }

            self.report(RenderProgress {
                progress: (now / total).clamp(0.0, 1.0),
                clock_secs: now,
                frames_pushed: pacer.emitted(),
                total_frames,
                stage: RenderStage::Rendering,
            });

            if now >= total {
                break Ok(());
            }
            self.clock.wait_next_tick(pacer.interval());
        };

        self.state = LoopState::Stopping;
        assets.video.pause();
        let frames_pushed = sink.stats().frames_pushed;

        let outcome = match result {
            Ok(()) => {
                self.report(RenderProgress {
                    progress: 1.0,
                    clock_secs: self.clock.now_secs(),
                    frames_pushed,
                    total_frames,
                    stage: RenderStage::Finalizing,
                });
                sink.stop(handle).map(|blob| RunOutcome {
                    blob,
                    thumbnail,
                    frames_pushed,
                    ticks,
                    held_ticks,
                })
            }
            Err(MergeError::Cancelled) => {
                tracing::warn!(frames_pushed, ticks, "Render loop cancelled");
                // Drain in-flight chunks; the partial output is discarded.
                if let Err(e) = sink.stop(handle) {
                    tracing::debug!(error = %e, "Finalizing cancelled recording failed");
                }
                Err(MergeError::Cancelled)
            }
            Err(e) => {
                tracing::error!(error = %e, frames_pushed, ticks, "Render loop failed");
                sink.abort(handle);
                Err(e)
            }
        };
        self.state = LoopState::Idle;

        if let Ok(outcome) = &outcome {
            self.report(RenderProgress {
                progress: 1.0,
                clock_secs: self.clock.now_secs(),
                frames_pushed: outcome.frames_pushed,
                total_frames,
                stage: RenderStage::Complete,
            });
            tracing::info!(
                frames = outcome.frames_pushed,
                ticks = outcome.ticks,
                held_ticks = outcome.held_ticks,
                bytes = outcome.blob.len(),
                "Render loop finished"
            );
        }
        outcome
    }

    fn report(&self, progress: RenderProgress) {
        if let Some(cb) = &self.progress {
            cb(progress);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use image::Rgba;
    use mediamerge_capture_engine::MemoryRecorder;
    use mediamerge_common::clock::ManualFrameClock;
    use mediamerge_common::error::ErrorKind;
    use mediamerge_composition_model::timeline::{DurationPolicy, Phase, PhaseKind};
    use mediamerge_media_loader::{ImageHandle, SyntheticVideo};

    const S: u64 = 1_000_000_000;

    fn plan() -> TimelinePlan {
        TimelinePlan {
            phases: vec![
                Phase {
                    kind: PhaseKind::Banner,
                    start_ns: 0,
                    end_ns: S,
                    source_index: Some(0),
                },
                Phase {
                    kind: PhaseKind::MainContent,
                    start_ns: S,
                    end_ns: 3 * S,
                    source_index: None,
                },
            ],
            total_ns: 3 * S,
            crossfade_ns: S / 2,
            main_playback_rate: 1.0,
            main_source_secs: 2.0,
            policy: DurationPolicy::BannerCountScaled,
        }
    }

    struct Fixture {
        banners: Vec<ImageHandle>,
        video: SyntheticVideo,
        compositor: Compositor,
        surface: Surface,
        plan: TimelinePlan,
        config: Config,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                banners: vec![ImageHandle::new(
                    "cover.png",
                    RgbaImage::from_pixel(8, 8, Rgba([200, 10, 10, 255])),
                )],
                video: SyntheticVideo::new("screen.webm", 2.0, (16, 8), 10),
                compositor: Compositor::new(None, 1),
                surface: Surface::new(16, 8),
                plan: plan(),
                config: Config::default(),
            }
        }

        fn session<'a>(&'a mut self, sink: &'a mut CaptureSink) -> RenderSession<'a> {
            RenderSession {
                plan: &self.plan,
                config: &self.config,
                compositor: &mut self.compositor,
                surface: &mut self.surface,
                assets: FrameAssets {
                    banners: &self.banners,
                    video: &mut self.video,
                },
                sink,
                audio: None,
                settings: RecorderSettings::default(),
                fps: 10,
                thumbnail_secs: self.plan.thumbnail_time(),
            }
        }
    }

    #[test]
    fn test_run_pushes_one_frame_per_slot() {
        let recorder = MemoryRecorder::new();
        let log = recorder.log();
        let mut sink = CaptureSink::new(Box::new(recorder));
        let mut fixture = Fixture::new();
        let mut driver = RenderLoop::new(Box::new(ManualFrameClock::new(0.1)));

        let outcome = driver.run(fixture.session(&mut sink)).unwrap();
        assert_eq!(outcome.frames_pushed, 30);
        assert_eq!(log.lock().unwrap().frames(), 30);
        assert!(outcome.thumbnail.is_some());
        assert_eq!(driver.state(), LoopState::Idle);
    }

    #[test]
    fn test_slow_ticks_repeat_frames() {
        let mut sink = CaptureSink::new(Box::new(MemoryRecorder::new()));
        let mut fixture = Fixture::new();
        // Ticks every 0.25 s at 10 fps: frame slots still follow the clock.
        let mut driver = RenderLoop::new(Box::new(ManualFrameClock::new(0.25)));
        let outcome = driver.run(fixture.session(&mut sink)).unwrap();
        assert_eq!(outcome.frames_pushed, 30);
        assert_eq!(outcome.ticks, 13);
    }

    #[test]
    fn test_progress_is_monotonic_and_completes() {
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink_reports = Arc::clone(&reports);
        let mut sink = CaptureSink::new(Box::new(MemoryRecorder::new()));
        let mut fixture = Fixture::new();
        let mut driver = RenderLoop::new(Box::new(ManualFrameClock::new(0.5))).with_progress(
            Box::new(move |p: RenderProgress| sink_reports.lock().unwrap().push(p)),
        );
        driver.run(fixture.session(&mut sink)).unwrap();

        let reports = reports.lock().unwrap();
        let rendering: Vec<f64> = reports
            .iter()
            .filter(|p| p.stage == RenderStage::Rendering)
            .map(|p| p.progress)
            .collect();
        assert!(rendering.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(rendering.last().copied(), Some(1.0));
        assert_eq!(reports.last().map(|p| p.stage), Some(RenderStage::Complete));
    }

    #[test]
    fn test_cancel_finalizes_sink_and_returns_cancelled() {
        let recorder = MemoryRecorder::new();
        let log = recorder.log();
        let mut sink = CaptureSink::new(Box::new(recorder));
        let mut fixture = Fixture::new();
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let mut driver = RenderLoop::new(Box::new(ManualFrameClock::new(0.1)))
            .with_cancel_token(cancel)
            .with_progress(Box::new(move |p: RenderProgress| {
                if p.clock_secs >= 1.0 {
                    trigger.cancel();
                }
            }));

        let err = driver.run(fixture.session(&mut sink)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(driver.state(), LoopState::Idle);
        let log = log.lock().unwrap();
        assert!(log.finished);
        assert!(log.frames() < 30);
        assert_eq!(sink.state(), mediamerge_capture_engine::SinkState::Idle);
    }

    #[test]
    fn test_recorder_failure_tears_down_first() {
        let mut sink = CaptureSink::new(Box::new(MemoryRecorder::new().failing_after(5)));
        let mut fixture = Fixture::new();
        let mut driver = RenderLoop::new(Box::new(ManualFrameClock::new(0.1)));
        let err = driver.run(fixture.session(&mut sink)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RecordingAborted);
        assert_eq!(driver.state(), LoopState::Idle);
        assert_eq!(sink.state(), mediamerge_capture_engine::SinkState::Idle);
    }

    #[test]
    fn test_held_frames_are_still_pushed() {
        let mut sink = CaptureSink::new(Box::new(MemoryRecorder::new()));
        let mut fixture = Fixture::new();
        fixture.video = SyntheticVideo::new("screen.webm", 2.0, (16, 8), 10).with_warmup(10);
        let mut driver = RenderLoop::new(Box::new(ManualFrameClock::new(0.1)));
        let outcome = driver.run(fixture.session(&mut sink)).unwrap();
        assert_eq!(outcome.frames_pushed, 30);
        assert!(outcome.held_ticks > 0);
    }
}
