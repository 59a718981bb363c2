use std::time::Duration;

use heatmap_common::config::{Config, PollTimeouts, SaturationPolicy};
use heatmap_common::frame::FrameError;
use tracing::{debug, error, info};

use crate::controller::keys::event_for;
use crate::controller::{Controller, Directive, StopReason};
use crate::display::{DisplayError, DisplayOptions, DisplaySink};
use crate::input::InputEvents;
use crate::motion::accumulator::accumulate;
use crate::motion::diff::{diff, MOTION_MARKER};
use crate::render::{RenderMode, Renderer};
use crate::source::{FrameSource, SourceError, SourceOpener, SourceTarget};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Display(#[from] DisplayError),
    #[error("internal invariant violated: {0}")]
    Invariant(#[from] FrameError),
}

/// Outcome of a single iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop(StopReason),
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub window: String,
    pub fullscreen: bool,
    pub mirror_camera: bool,
    pub poll_timeouts: PollTimeouts,
    pub saturation: SaturationPolicy,
    pub progress_interval: u32,
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            window: config.display.window.clone(),
            fullscreen: config.display.fullscreen,
            mirror_camera: config.source.mirror_camera,
            poll_timeouts: config.poll_timeout_ms,
            saturation: config.pipeline.saturation,
            progress_interval: config.pipeline.progress_interval,
        }
    }
}

impl PipelineSettings {
    fn poll_timeout(&self, mode: RenderMode) -> Duration {
        let t = &self.poll_timeouts;
        Duration::from_millis(match mode {
            RenderMode::Normal => t.normal,
            RenderMode::FrameDiff => t.frame_diff,
            RenderMode::Motion => t.motion,
            RenderMode::Colorized => t.colorized,
        })
    }
}

/// The frame-processing loop: read, diff, accumulate, render, show, poll.
pub struct Pipeline<O: SourceOpener, D: DisplaySink, I: InputEvents> {
    opener: O,
    source: O::Source,
    display: D,
    input: I,
    controller: Controller,
    renderer: Renderer,
    settings: PipelineSettings,
}

impl<O: SourceOpener, D: DisplaySink, I: InputEvents> Pipeline<O, D, I> {
    /// Configure the display and open the controller's initial source.
    pub fn start(
        mut opener: O,
        mut display: D,
        input: I,
        controller: Controller,
        settings: PipelineSettings,
    ) -> Result<Self, PipelineError> {
        display.configure(
            &settings.window,
            DisplayOptions {
                fullscreen: settings.fullscreen,
            },
        )?;

        let target = controller.current_target();
        let sink = display.name();
        info!(target = %target, sink, "opening initial source");
        let source = opener.open(&target)?;

        Ok(Self {
            opener,
            source,
            display,
            input,
            controller,
            renderer: Renderer::new(),
            settings,
        })
    }

    /// Run iterations until a stop condition or a fatal error.
    pub fn run(mut self) -> Result<StopReason, PipelineError> {
        info!(
            mode = self.controller.mode().name(),
            mode_index = self.controller.mode_index(),
            "pipeline running"
        );
        loop {
            match self.step() {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop(reason)) => {
                    info!(?reason, "pipeline stopped");
                    return Ok(reason);
                }
                Err(e) => {
                    error!(error = %e, "pipeline failed");
                    return Err(e);
                }
            }
        }
    }

    /// One iteration: one frame read, processing, render and one input poll.
    pub fn step(&mut self) -> Result<Flow, PipelineError> {
        let Some(frame) = self.source.read()? else {
            let directive = self.controller.on_end_of_stream();
            return self.follow(directive);
        };

        let camera = self.controller.is_camera();
        let frame = if camera && self.settings.mirror_camera {
            frame.mirrored()
        } else {
            frame
        };

        let mode = self.controller.mode();
        let state = self.controller.state_mut();
        if let Some(previous) = state.previous_frame.take() {
            let mask = diff(&previous.image, &frame.image, MOTION_MARKER)?;
            let accumulator = accumulate(state.accumulator.take(), &mask, self.settings.saturation)?;
            let rendered = self
                .renderer
                .render(mode, &frame.image, &mask, Some(&accumulator));
            state.accumulator = Some(accumulator);

            if let Some(image) = rendered {
                match self.display.show(&self.settings.window, &image, frame.stamp()) {
                    Ok(()) => {}
                    Err(DisplayError::Closed) => {
                        info!("display closed");
                        return Ok(Flow::Stop(StopReason::DisplayClosed));
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            if camera {
                self.controller.on_camera_frame();
                let counter = self.controller.state().frame_counter;
                if self.settings.progress_interval > 0 && counter % self.settings.progress_interval == 0 {
                    debug!(frame_counter = counter, "camera frames since reset");
                }
            }
        }

        if let Some(key) = self.input.poll(self.settings.poll_timeout(mode)) {
            if let Some(event) = event_for(key) {
                debug!(?key, ?event, "control event");
                match self.controller.handle(event) {
                    Directive::Continue => {}
                    // The new source starts without a previous frame.
                    directive => return self.follow(directive),
                }
            }
        }

        self.controller.state_mut().previous_frame = Some(frame);
        Ok(Flow::Continue)
    }

    fn follow(&mut self, directive: Directive) -> Result<Flow, PipelineError> {
        match directive {
            Directive::Continue => Ok(Flow::Continue),
            Directive::Reopen(target) => {
                self.reopen(&target)?;
                Ok(Flow::Continue)
            }
            Directive::Stop(reason) => Ok(Flow::Stop(reason)),
        }
    }

    fn reopen(&mut self, target: &SourceTarget) -> Result<(), PipelineError> {
        info!(target = %target, "reopening source");
        self.source = self.opener.open(target)?;
        Ok(())
    }

    #[cfg(test)]
    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    #[cfg(test)]
    pub fn display(&self) -> &D {
        &self.display
    }

    #[cfg(test)]
    pub fn opener(&self) -> &O {
        &self.opener
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::state::ActiveSource;
    use crate::controller::ControllerSettings;
    use crate::input::KeyCode;
    use crate::render::RenderedImage;
    use heatmap_common::config::DefaultSource;
    use heatmap_common::frame::{CapturedFrame, FrameStamp};
    use image::{Rgb, RgbImage};
    use std::collections::{HashMap, VecDeque};
    use std::path::PathBuf;

    const W: u32 = 12;
    const H: u32 = 8;

    /// Serves fixed frame lists per target and records every open.
    #[derive(Default)]
    struct ScriptedOpener {
        camera: Option<Vec<RgbImage>>,
        files: HashMap<PathBuf, Vec<RgbImage>>,
        opened: Vec<SourceTarget>,
    }

    struct ScriptedSource {
        frames: VecDeque<RgbImage>,
        seq: u64,
    }

    impl FrameSource for ScriptedSource {
        fn read(&mut self) -> Result<Option<CapturedFrame>, SourceError> {
            Ok(self.frames.pop_front().map(|image| {
                self.seq += 1;
                CapturedFrame::new(image, self.seq as i64 * 40, self.seq)
            }))
        }
    }

    impl SourceOpener for ScriptedOpener {
        type Source = ScriptedSource;

        fn open(&mut self, target: &SourceTarget) -> Result<ScriptedSource, SourceError> {
            let frames = match target {
                SourceTarget::Camera => self.camera.clone(),
                SourceTarget::File(path) => self.files.get(path).cloned(),
            }
            .ok_or_else(|| SourceError::open(target, "not scripted"))?;
            self.opened.push(target.clone());
            Ok(ScriptedSource {
                frames: frames.into(),
                seq: 0,
            })
        }
    }

    #[derive(Default)]
    struct RecordingDisplay {
        shown: Vec<RenderedImage>,
        stamps: Vec<FrameStamp>,
        options: Option<DisplayOptions>,
    }

    impl DisplaySink for RecordingDisplay {
        fn configure(&mut self, _window: &str, options: DisplayOptions) -> Result<(), DisplayError> {
            self.options = Some(options);
            Ok(())
        }

        fn show(
            &mut self,
            _window: &str,
            image: &RenderedImage,
            stamp: FrameStamp,
        ) -> Result<(), DisplayError> {
            self.shown.push(image.clone());
            self.stamps.push(stamp);
            Ok(())
        }
    }

    /// Answers polls from a script; `None` entries and an exhausted script
    /// mean no key was pressed.
    #[derive(Default)]
    struct ScriptedInput {
        keys: VecDeque<Option<KeyCode>>,
        timeouts: Vec<Duration>,
    }

    impl ScriptedInput {
        fn new(keys: &[Option<KeyCode>]) -> Self {
            Self {
                keys: keys.iter().copied().collect(),
                timeouts: Vec::new(),
            }
        }
    }

    impl InputEvents for ScriptedInput {
        fn poll(&mut self, timeout: Duration) -> Option<KeyCode> {
            self.timeouts.push(timeout);
            self.keys.pop_front().flatten()
        }
    }

    type TestPipeline = Pipeline<ScriptedOpener, RecordingDisplay, ScriptedInput>;

    fn background() -> RgbImage {
        RgbImage::from_pixel(W, H, Rgb([30, 30, 30]))
    }

    /// Background with a bright rectangle over columns `xs` and rows `ys`.
    fn with_rect(xs: std::ops::Range<u32>, ys: std::ops::Range<u32>) -> RgbImage {
        let mut image = background();
        for y in ys {
            for x in xs.clone() {
                image.put_pixel(x, y, Rgb([230, 230, 230]));
            }
        }
        image
    }

    fn settings() -> PipelineSettings {
        PipelineSettings {
            window: "HEATMAP".into(),
            fullscreen: true,
            mirror_camera: false,
            poll_timeouts: PollTimeouts::default(),
            saturation: SaturationPolicy::Clamp,
            progress_interval: 50,
        }
    }

    fn controller_settings(default_source: DefaultSource, files: &[&str]) -> ControllerSettings {
        ControllerSettings {
            has_normal_mode: false,
            default_mode: 0,
            files: files.iter().map(PathBuf::from).collect(),
            default_source,
            default_file_index: 0,
            fallback_to_camera: false,
            reset_threshold: 400,
        }
    }

    fn file_pipeline(
        files: &[(&str, Vec<RgbImage>)],
        default_mode: usize,
        keys: &[Option<KeyCode>],
    ) -> TestPipeline {
        let mut opener = ScriptedOpener::default();
        for (name, frames) in files {
            opener.files.insert(PathBuf::from(name), frames.clone());
        }
        let names: Vec<&str> = files.iter().map(|(n, _)| *n).collect();
        let mut cs = controller_settings(DefaultSource::File, &names);
        cs.default_mode = default_mode;
        Pipeline::start(
            opener,
            RecordingDisplay::default(),
            ScriptedInput::new(keys),
            Controller::new(cs),
            settings(),
        )
        .unwrap()
    }

    fn camera_pipeline(frames: Vec<RgbImage>, keys: &[Option<KeyCode>]) -> TestPipeline {
        let opener = ScriptedOpener {
            camera: Some(frames),
            ..Default::default()
        };
        Pipeline::start(
            opener,
            RecordingDisplay::default(),
            ScriptedInput::new(keys),
            Controller::new(controller_settings(DefaultSource::Camera, &[])),
            settings(),
        )
        .unwrap()
    }

    fn gray(image: &RenderedImage) -> &image::GrayImage {
        match image {
            RenderedImage::Gray(gray) => gray,
            other => panic!("expected gray image, got {other:?}"),
        }
    }

    #[test]
    fn start_configures_display_and_opens_default_source() {
        let pipeline = camera_pipeline(vec![background()], &[]);
        assert_eq!(pipeline.opener().opened, vec![SourceTarget::Camera]);
        assert!(pipeline.display().options.is_some_and(|o| o.fullscreen));
    }

    #[test]
    fn start_fails_when_camera_cannot_open() {
        let result = Pipeline::start(
            ScriptedOpener::default(),
            RecordingDisplay::default(),
            ScriptedInput::default(),
            Controller::new(controller_settings(DefaultSource::Camera, &[])),
            settings(),
        );
        match result {
            Err(PipelineError::Source(SourceError::Open { kind, .. })) => {
                assert_eq!(kind, crate::source::SourceKind::Camera)
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("start should fail"),
        }
    }

    #[test]
    fn first_frame_only_primes_previous_frame() {
        let mut pipeline = file_pipeline(&[("clip.mp4", vec![background(), background()])], 0, &[]);
        assert_eq!(pipeline.step().unwrap(), Flow::Continue);
        assert!(pipeline.controller().state().previous_frame.is_some());
        assert!(pipeline.controller().state().accumulator.is_none());
        assert!(pipeline.display().shown.is_empty());
    }

    #[test]
    fn frame_diff_shows_only_changed_rectangle() {
        let frames = vec![background(), with_rect(3..7, 2..5)];
        let mut pipeline = file_pipeline(&[("clip.mp4", frames)], 0, &[]);
        assert_eq!(pipeline.controller().mode(), RenderMode::FrameDiff);

        pipeline.step().unwrap();
        pipeline.step().unwrap();

        let shown = &pipeline.display().shown;
        assert_eq!(shown.len(), 1);
        for (x, y, p) in gray(&shown[0]).enumerate_pixels() {
            let inside = (3..7).contains(&x) && (2..5).contains(&y);
            assert_eq!(p.0[0], if inside { 255 } else { 0 }, "pixel ({x}, {y})");
        }
    }

    #[test]
    fn shown_images_carry_the_current_frame_stamp() {
        let frames = vec![background(), with_rect(3..7, 2..5), background()];
        let mut pipeline = file_pipeline(&[("clip.mp4", frames)], 0, &[]);
        for _ in 0..3 {
            pipeline.step().unwrap();
        }

        let stamps = &pipeline.display().stamps;
        assert_eq!(
            stamps,
            &vec![
                FrameStamp {
                    captured_at_ms: 80,
                    seq: 2
                },
                FrameStamp {
                    captured_at_ms: 120,
                    seq: 3
                },
            ]
        );
    }

    #[test]
    fn frame_diff_skips_display_without_motion() {
        let mut pipeline = file_pipeline(&[("clip.mp4", vec![background(), background()])], 0, &[]);
        pipeline.step().unwrap();
        pipeline.step().unwrap();
        assert!(pipeline.display().shown.is_empty());
        assert!(pipeline.controller().state().accumulator.is_some());
    }

    #[test]
    fn motion_mode_normalizes_to_changed_region() {
        let frames = vec![background(), with_rect(3..7, 2..5)];
        let mut pipeline = file_pipeline(&[("clip.mp4", frames)], 1, &[]);
        assert_eq!(pipeline.controller().mode(), RenderMode::Motion);

        pipeline.step().unwrap();
        pipeline.step().unwrap();

        let scaled = pipeline
            .controller()
            .state()
            .accumulator
            .as_ref()
            .unwrap()
            .scale();
        assert_eq!(scaled.max(), 1.0);
        for y in 0..H {
            for x in 0..W {
                let inside = (3..7).contains(&x) && (2..5).contains(&y);
                assert_eq!(scaled.get(x, y), if inside { 1.0 } else { 0.0 });
            }
        }

        let shown = gray(&pipeline.display().shown[0]);
        assert_eq!(shown.get_pixel(4, 3).0[0], 255);
        assert_eq!(shown.get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn colorized_mode_blends_over_frame() {
        let frames = vec![background(), with_rect(3..7, 2..5)];
        let mut pipeline = file_pipeline(&[("clip.mp4", frames)], 2, &[]);
        pipeline.step().unwrap();
        pipeline.step().unwrap();
        match &pipeline.display().shown[0] {
            RenderedImage::Color(image) => {
                let hot = image.get_pixel(4, 3);
                let cold = image.get_pixel(0, 0);
                assert!(hot.0[0] > hot.0[2]);
                assert!(cold.0[2] > cold.0[0]);
            }
            other => panic!("expected color image, got {other:?}"),
        }
    }

    #[test]
    fn end_of_file_reopens_same_file() {
        let files = [
            ("a.mp4", vec![background()]),
            ("b.mp4", vec![background(), background()]),
        ];
        let mut pipeline = file_pipeline(&files, 1, &[]);

        pipeline.step().unwrap();
        assert!(pipeline.controller().state().previous_frame.is_some());
        assert_eq!(pipeline.step().unwrap(), Flow::Continue);

        let a = SourceTarget::File(PathBuf::from("a.mp4"));
        assert_eq!(pipeline.opener().opened, vec![a.clone(), a]);
        assert_eq!(pipeline.controller().source(), ActiveSource::File(0));
        assert_eq!(pipeline.controller().mode(), RenderMode::Motion);
        assert!(pipeline.controller().state().previous_frame.is_none());
        assert!(pipeline.controller().state().accumulator.is_none());
    }

    #[test]
    fn end_of_file_falls_back_to_camera() {
        let mut opener = ScriptedOpener {
            camera: Some(vec![background()]),
            ..Default::default()
        };
        opener.files.insert(PathBuf::from("a.mp4"), vec![background()]);
        let mut cs = controller_settings(DefaultSource::File, &["a.mp4"]);
        cs.fallback_to_camera = true;
        let mut pipeline = Pipeline::start(
            opener,
            RecordingDisplay::default(),
            ScriptedInput::default(),
            Controller::new(cs),
            settings(),
        )
        .unwrap();

        pipeline.step().unwrap();
        pipeline.step().unwrap();
        assert_eq!(pipeline.controller().source(), ActiveSource::Camera);
        assert_eq!(pipeline.opener().opened.last(), Some(&SourceTarget::Camera));
    }

    #[test]
    fn camera_end_of_stream_stops() {
        let mut pipeline = camera_pipeline(vec![background()], &[]);
        assert_eq!(pipeline.step().unwrap(), Flow::Continue);
        assert_eq!(
            pipeline.step().unwrap(),
            Flow::Stop(StopReason::CameraDisconnected)
        );
    }

    #[test]
    fn quit_key_stops_run() {
        let frames = vec![background(); 10];
        let pipeline = camera_pipeline(frames, &[None, None, Some(KeyCode::Char('q'))]);
        assert_eq!(pipeline.run().unwrap(), StopReason::Quit);
    }

    #[test]
    fn toggle_key_switches_source_and_drops_frame() {
        let mut opener = ScriptedOpener {
            camera: Some(vec![background(); 4]),
            ..Default::default()
        };
        opener.files.insert(PathBuf::from("a.mp4"), vec![background(); 4]);
        let mut pipeline = Pipeline::start(
            opener,
            RecordingDisplay::default(),
            ScriptedInput::new(&[None, Some(KeyCode::Char('t'))]),
            Controller::new(controller_settings(DefaultSource::Camera, &["a.mp4"])),
            settings(),
        )
        .unwrap();

        pipeline.step().unwrap();
        pipeline.step().unwrap();
        assert_eq!(pipeline.controller().source(), ActiveSource::File(0));
        assert_eq!(
            pipeline.opener().opened,
            vec![SourceTarget::Camera, SourceTarget::File(PathBuf::from("a.mp4"))]
        );
        let state = pipeline.controller().state();
        assert!(state.previous_frame.is_none());
        assert!(state.accumulator.is_none());
        assert_eq!(state.frame_counter, 0);
    }

    #[test]
    fn space_advances_render_mode() {
        let frames = vec![background(); 3];
        let mut pipeline = camera_pipeline(frames, &[Some(KeyCode::Char(' '))]);
        pipeline.step().unwrap();
        assert_eq!(pipeline.controller().mode(), RenderMode::Motion);
        assert!(pipeline.controller().state().previous_frame.is_some());
    }

    #[test]
    fn poll_timeout_follows_mode() {
        let frames = vec![background(); 3];
        let mut pipeline = camera_pipeline(frames, &[Some(KeyCode::Char(' ')), Some(KeyCode::Char(' '))]);
        pipeline.step().unwrap();
        pipeline.step().unwrap();
        pipeline.step().unwrap();
        let timeouts = &pipeline.input.timeouts;
        assert_eq!(
            timeouts,
            &vec![
                Duration::from_millis(1),
                Duration::from_millis(1),
                Duration::from_millis(10)
            ]
        );
    }

    #[test]
    fn camera_counter_resets_accumulator_past_threshold() {
        let frames = vec![background(); 8];
        let opener = ScriptedOpener {
            camera: Some(frames),
            ..Default::default()
        };
        let mut cs = controller_settings(DefaultSource::Camera, &[]);
        cs.reset_threshold = 3;
        let mut pipeline = Pipeline::start(
            opener,
            RecordingDisplay::default(),
            ScriptedInput::default(),
            Controller::new(cs),
            settings(),
        )
        .unwrap();

        // Frame 1 primes; frames 2..=4 count to 3; frame 5 crosses.
        for _ in 0..4 {
            pipeline.step().unwrap();
        }
        assert_eq!(pipeline.controller().state().frame_counter, 3);
        assert!(pipeline.controller().state().accumulator.is_some());

        pipeline.step().unwrap();
        assert_eq!(pipeline.controller().state().frame_counter, 0);
        assert!(pipeline.controller().state().accumulator.is_none());

        pipeline.step().unwrap();
        assert_eq!(pipeline.controller().state().frame_counter, 1);
        assert!(pipeline.controller().state().accumulator.is_some());
    }

    #[test]
    fn camera_frames_are_mirrored() {
        let frames = vec![background(), with_rect(0..2, 0..H)];
        let opener = ScriptedOpener {
            camera: Some(frames),
            ..Default::default()
        };
        let mut s = settings();
        s.mirror_camera = true;
        let mut pipeline = Pipeline::start(
            opener,
            RecordingDisplay::default(),
            ScriptedInput::default(),
            Controller::new(controller_settings(DefaultSource::Camera, &[])),
            s,
        )
        .unwrap();

        pipeline.step().unwrap();
        pipeline.step().unwrap();
        let shown = gray(&pipeline.display().shown[0]);
        assert_eq!(shown.get_pixel(W - 1, 0).0[0], 255);
        assert_eq!(shown.get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn mismatched_frame_sizes_are_an_invariant_error() {
        let frames = vec![background(), RgbImage::new(W + 1, H)];
        let mut pipeline = file_pipeline(&[("clip.mp4", frames)], 0, &[]);
        pipeline.step().unwrap();
        assert!(matches!(
            pipeline.step(),
            Err(PipelineError::Invariant(FrameError::DimensionMismatch { .. }))
        ));
    }
}
