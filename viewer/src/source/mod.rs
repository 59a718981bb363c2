pub mod ffmpeg;

use heatmap_common::frame::CapturedFrame;
use std::fmt;
use std::path::PathBuf;

/// Where frames come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceTarget {
    /// The default camera device.
    Camera,
    /// A video file, played from the start.
    File(PathBuf),
}

impl SourceTarget {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceTarget::Camera => SourceKind::Camera,
            SourceTarget::File(_) => SourceKind::File,
        }
    }
}

impl fmt::Display for SourceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceTarget::Camera => f.write_str("default camera"),
            SourceTarget::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Camera,
    File,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceKind::Camera => "camera",
            SourceKind::File => "file",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to open {kind} source {target}: {reason}")]
    Open {
        kind: SourceKind,
        target: String,
        reason: String,
    },
    #[error("failed to read frame from {kind} source: {reason}")]
    Read { kind: SourceKind, reason: String },
}

impl SourceError {
    pub fn open(target: &SourceTarget, reason: impl Into<String>) -> Self {
        SourceError::Open {
            kind: target.kind(),
            target: target.to_string(),
            reason: reason.into(),
        }
    }
}

/// An open stream of frames. Dropping it closes the stream.
pub trait FrameSource {
    /// Next frame, or `None` once the stream has ended.
    fn read(&mut self) -> Result<Option<CapturedFrame>, SourceError>;
}

/// Opens frame sources on demand; the pipeline reopens through it on every
/// source switch and file loop.
pub trait SourceOpener {
    type Source: FrameSource;

    fn open(&mut self, target: &SourceTarget) -> Result<Self::Source, SourceError>;
}
