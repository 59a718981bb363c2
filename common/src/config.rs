use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub poll_timeout_ms: PollTimeouts,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which source the viewer starts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultSource {
    Camera,
    File,
}

/// Overflow behavior of the motion accumulator counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaturationPolicy {
    /// Counters stop at their maximum value.
    Clamp,
    /// Counters wrap around to zero.
    Wrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayKind {
    Ffplay,
    Snapshots,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_source")]
    pub default: DefaultSource,
    /// Ordered playback candidates, cycled with the "next file" key.
    #[serde(default)]
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub default_file_index: usize,
    /// Switch to the camera when a file ends instead of looping it.
    #[serde(default)]
    pub fallback_to_camera: bool,
    #[serde(default = "default_true")]
    pub mirror_camera: bool,
    #[serde(default = "default_camera_device")]
    pub camera_device: String,
    #[serde(default = "default_camera_format")]
    pub camera_format: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Decode files at their native frame rate rather than as fast as possible.
    #[serde(default = "default_true")]
    pub realtime_files: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub has_normal_mode: bool,
    #[serde(default)]
    pub default_mode: usize,
    #[serde(default = "default_reset_threshold")]
    pub reset_threshold: u32,
    #[serde(default = "default_saturation")]
    pub saturation: SaturationPolicy,
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u32,
}

/// Input poll timeouts in milliseconds, one per render mode.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PollTimeouts {
    #[serde(default = "default_fast_poll")]
    pub normal: u64,
    #[serde(default = "default_fast_poll")]
    pub frame_diff: u64,
    #[serde(default = "default_fast_poll")]
    pub motion: u64,
    #[serde(default = "default_colorized_poll")]
    pub colorized: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_display_kind")]
    pub kind: DisplayKind,
    #[serde(default = "default_window")]
    pub window: String,
    #[serde(default = "default_true")]
    pub fullscreen: bool,
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: PathBuf,
    #[serde(default = "default_snapshot_every")]
    pub snapshot_every: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            default: default_source(),
            files: Vec::new(),
            default_file_index: 0,
            fallback_to_camera: false,
            mirror_camera: true,
            camera_device: default_camera_device(),
            camera_format: default_camera_format(),
            width: default_width(),
            height: default_height(),
            realtime_files: true,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            has_normal_mode: false,
            default_mode: 0,
            reset_threshold: default_reset_threshold(),
            saturation: default_saturation(),
            progress_interval: default_progress_interval(),
        }
    }
}

impl Default for PollTimeouts {
    fn default() -> Self {
        Self {
            normal: default_fast_poll(),
            frame_diff: default_fast_poll(),
            motion: default_fast_poll(),
            colorized: default_colorized_poll(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            kind: default_display_kind(),
            window: default_window(),
            fullscreen: true,
            snapshot_dir: default_snapshot_dir(),
            snapshot_every: default_snapshot_every(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            pipeline: PipelineConfig::default(),
            poll_timeout_ms: PollTimeouts::default(),
            display: DisplayConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        let config = Self::parse(&content)?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Number of render modes in the cycle.
    pub fn mode_count(&self) -> usize {
        if self.pipeline.has_normal_mode {
            4
        } else {
            3
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.default_mode >= self.mode_count() {
            return Err(ConfigError::Invalid(format!(
                "pipeline.default_mode {} is out of range for {} modes",
                self.pipeline.default_mode,
                self.mode_count()
            )));
        }
        if self.pipeline.reset_threshold == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.reset_threshold must be positive".into(),
            ));
        }
        if self.source.default == DefaultSource::File && self.source.files.is_empty() {
            return Err(ConfigError::Invalid(
                "source.default is \"file\" but source.files is empty".into(),
            ));
        }
        if !self.source.files.is_empty()
            && self.source.default_file_index >= self.source.files.len()
        {
            return Err(ConfigError::Invalid(format!(
                "source.default_file_index {} is out of range for {} files",
                self.source.default_file_index,
                self.source.files.len()
            )));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(ConfigError::Invalid(
                "source.width and source.height must be positive".into(),
            ));
        }
        if self.display.snapshot_every == 0 {
            return Err(ConfigError::Invalid(
                "display.snapshot_every must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_source() -> DefaultSource {
    DefaultSource::Camera
}
fn default_camera_device() -> String {
    "/dev/video0".into()
}
fn default_camera_format() -> String {
    "v4l2".into()
}
fn default_width() -> u32 {
    640
}
fn default_height() -> u32 {
    480
}
fn default_reset_threshold() -> u32 {
    400
}
fn default_saturation() -> SaturationPolicy {
    SaturationPolicy::Clamp
}
fn default_progress_interval() -> u32 {
    50
}
fn default_fast_poll() -> u64 {
    1
}
fn default_colorized_poll() -> u64 {
    10
}
fn default_display_kind() -> DisplayKind {
    DisplayKind::Ffplay
}
fn default_window() -> String {
    "HEATMAP".into()
}
fn default_snapshot_dir() -> PathBuf {
    PathBuf::from("snapshots")
}
fn default_snapshot_every() -> u32 {
    30
}
fn default_log_level() -> String {
    "info".into()
}
