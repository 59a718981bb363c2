use std::path::PathBuf;

use heatmap_common::config::{Config, DefaultSource};
use heatmap_common::frame::CapturedFrame;
use tracing::{debug, info, warn};

use crate::motion::accumulator::Accumulator;
use crate::render::RenderMode;
use crate::source::SourceTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveSource {
    Camera,
    /// Index into the configured file candidates.
    File(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    AdvanceMode,
    ClearAccumulator,
    ToggleSource,
    NextFile,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Quit,
    CameraDisconnected,
    DisplayClosed,
}

/// What the processing loop must do after the controller handled an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Continue,
    /// Open this target and read from it from now on.
    Reopen(SourceTarget),
    Stop(StopReason),
}

/// Mutable state of the processing loop.
#[derive(Debug, Default)]
pub struct PipelineState {
    pub previous_frame: Option<CapturedFrame>,
    pub accumulator: Option<Accumulator>,
    /// Camera frames diffed since the last periodic reset.
    pub frame_counter: u32,
}

impl PipelineState {
    fn reset_stream(&mut self) {
        self.previous_frame = None;
        self.accumulator = None;
        self.frame_counter = 0;
    }
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub has_normal_mode: bool,
    pub default_mode: usize,
    pub files: Vec<PathBuf>,
    pub default_source: DefaultSource,
    pub default_file_index: usize,
    pub fallback_to_camera: bool,
    pub reset_threshold: u32,
}

impl From<&Config> for ControllerSettings {
    fn from(config: &Config) -> Self {
        Self {
            has_normal_mode: config.pipeline.has_normal_mode,
            default_mode: config.pipeline.default_mode,
            files: config.source.files.clone(),
            default_source: config.source.default,
            default_file_index: config.source.default_file_index,
            fallback_to_camera: config.source.fallback_to_camera,
            reset_threshold: config.pipeline.reset_threshold,
        }
    }
}

/// Mode/source state machine driven by control events, end-of-stream
/// signals and the periodic camera reset.
pub struct Controller {
    state: PipelineState,
    modes: &'static [RenderMode],
    mode: usize,
    source: ActiveSource,
    /// File to resume when toggling back from the camera.
    last_file: usize,
    files: Vec<PathBuf>,
    fallback_to_camera: bool,
    reset_threshold: u32,
}

impl Controller {
    pub fn new(settings: ControllerSettings) -> Self {
        let modes = RenderMode::cycle(settings.has_normal_mode);
        let last_file = if settings.files.is_empty() {
            0
        } else {
            settings.default_file_index % settings.files.len()
        };
        let source = match settings.default_source {
            DefaultSource::File if !settings.files.is_empty() => ActiveSource::File(last_file),
            DefaultSource::File => {
                warn!("no video files configured, starting on the camera");
                ActiveSource::Camera
            }
            DefaultSource::Camera => ActiveSource::Camera,
        };

        Self {
            state: PipelineState::default(),
            modes,
            mode: settings.default_mode % modes.len(),
            source,
            last_file,
            files: settings.files,
            fallback_to_camera: settings.fallback_to_camera,
            reset_threshold: settings.reset_threshold,
        }
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut PipelineState {
        &mut self.state
    }

    pub fn mode(&self) -> RenderMode {
        self.modes[self.mode]
    }

    pub fn mode_index(&self) -> usize {
        self.mode
    }

    #[cfg(test)]
    pub fn source(&self) -> ActiveSource {
        self.source
    }

    pub fn is_camera(&self) -> bool {
        self.source == ActiveSource::Camera
    }

    /// Target for the active source.
    pub fn current_target(&self) -> SourceTarget {
        match self.source {
            ActiveSource::Camera => SourceTarget::Camera,
            // File indices are only ever taken modulo a non-empty `files`.
            ActiveSource::File(index) => SourceTarget::File(self.files[index].clone()),
        }
    }

    pub fn handle(&mut self, event: ControlEvent) -> Directive {
        match event {
            ControlEvent::AdvanceMode => {
                self.mode = (self.mode + 1) % self.modes.len();
                info!(mode = self.mode().name(), "render mode changed");
                Directive::Continue
            }
            ControlEvent::ClearAccumulator => {
                self.state.accumulator = None;
                info!("motion accumulator cleared");
                Directive::Continue
            }
            ControlEvent::ToggleSource => self.toggle_source(),
            ControlEvent::NextFile => self.next_file(),
            ControlEvent::Quit => {
                info!("quit requested");
                Directive::Stop(StopReason::Quit)
            }
        }
    }

    fn toggle_source(&mut self) -> Directive {
        match self.source {
            ActiveSource::Camera => {
                if self.files.is_empty() {
                    warn!("no video files configured, staying on the camera");
                    return Directive::Continue;
                }
                self.source = ActiveSource::File(self.last_file);
            }
            ActiveSource::File(index) => {
                self.last_file = index;
                self.source = ActiveSource::Camera;
            }
        }
        self.state.reset_stream();
        let target = self.current_target();
        info!(target = %target, "source toggled");
        Directive::Reopen(target)
    }

    fn next_file(&mut self) -> Directive {
        let ActiveSource::File(index) = self.source else {
            debug!("next file ignored while on the camera");
            return Directive::Continue;
        };
        let next = (index + 1) % self.files.len();
        self.source = ActiveSource::File(next);
        self.last_file = next;
        self.state.reset_stream();
        let target = self.current_target();
        info!(target = %target, index = next, "switched to next file");
        Directive::Reopen(target)
    }

    /// Count one diffed camera frame. Past the reset threshold the counter
    /// and accumulator are cleared; returns whether that happened.
    pub fn on_camera_frame(&mut self) -> bool {
        if !self.is_camera() {
            return false;
        }
        self.state.frame_counter += 1;
        if self.state.frame_counter > self.reset_threshold {
            self.state.frame_counter = 0;
            self.state.accumulator = None;
            debug!(threshold = self.reset_threshold, "periodic accumulator reset");
            return true;
        }
        false
    }

    /// The active source ran out of frames.
    pub fn on_end_of_stream(&mut self) -> Directive {
        match self.source {
            ActiveSource::Camera => {
                warn!("camera disconnected");
                Directive::Stop(StopReason::CameraDisconnected)
            }
            ActiveSource::File(index) => {
                if self.fallback_to_camera {
                    self.last_file = index;
                    self.source = ActiveSource::Camera;
                    info!("video ended, switching back to the camera");
                } else {
                    info!(index, "video ended, looping");
                }
                self.state.reset_stream();
                Directive::Reopen(self.current_target())
            }
        }
    }
}
