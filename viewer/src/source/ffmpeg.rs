use std::io::{ErrorKind, Read};
use std::process::{Child, ChildStdout, Command, Stdio};

use chrono::Utc;
use heatmap_common::config::SourceConfig;
use heatmap_common::frame::{rgb24_len, CapturedFrame};
use tracing::{debug, info, warn};

use super::{FrameSource, SourceError, SourceKind, SourceOpener, SourceTarget};

/// Opens cameras and video files by decoding them with an `ffmpeg`
/// subprocess into raw `rgb24` frames of a fixed size.
pub struct FfmpegOpener {
    camera_device: String,
    camera_format: String,
    width: u32,
    height: u32,
    realtime_files: bool,
}

impl FfmpegOpener {
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            camera_device: config.camera_device.clone(),
            camera_format: config.camera_format.clone(),
            width: config.width,
            height: config.height,
            realtime_files: config.realtime_files,
        }
    }

    fn command(&self, target: &SourceTarget) -> Command {
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-hide_banner", "-loglevel", "error", "-nostdin"]);
        match target {
            SourceTarget::Camera => {
                cmd.args(["-f", &self.camera_format, "-i", &self.camera_device]);
            }
            SourceTarget::File(path) => {
                if self.realtime_files {
                    cmd.arg("-re");
                }
                cmd.arg("-i").arg(path);
            }
        }
        let scale = format!("scale={}:{}", self.width, self.height);
        cmd.args([
            "-an",
            "-vf", &scale,
            "-pix_fmt", "rgb24",
            "-f", "rawvideo",
            "pipe:1",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());
        cmd
    }
}

impl SourceOpener for FfmpegOpener {
    type Source = FfmpegSource;

    /// Spawn the decoder and read the first frame, so a target that cannot
    /// produce any frame fails here rather than looking like an empty stream.
    fn open(&mut self, target: &SourceTarget) -> Result<FfmpegSource, SourceError> {
        if let SourceTarget::File(path) = target {
            if !path.is_file() {
                return Err(SourceError::open(target, "video file not found"));
            }
        }

        let mut child = self
            .command(target)
            .spawn()
            .map_err(|e| SourceError::open(target, format!("failed to spawn ffmpeg: {e}")))?;
        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                return Err(SourceError::open(target, "could not get ffmpeg stdout handle"));
            }
        };

        let mut frames = RawFrames::new(stdout, target.kind(), self.width, self.height);
        match frames.prime() {
            Ok(true) => {}
            Ok(false) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SourceError::open(target, "ffmpeg produced no frames"));
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SourceError::open(target, e.to_string()));
            }
        }

        info!(
            target = %target,
            width = self.width,
            height = self.height,
            "frame source opened"
        );
        Ok(FfmpegSource { child, frames })
    }
}

pub struct FfmpegSource {
    child: Child,
    frames: RawFrames<ChildStdout>,
}

impl FrameSource for FfmpegSource {
    fn read(&mut self) -> Result<Option<CapturedFrame>, SourceError> {
        self.frames.read()
    }
}

/// Splits a packed `rgb24` byte stream into fixed-size frames.
struct RawFrames<R> {
    reader: R,
    kind: SourceKind,
    width: u32,
    height: u32,
    pending: Option<CapturedFrame>,
    seq: u64,
}

impl<R: Read> RawFrames<R> {
    fn new(reader: R, kind: SourceKind, width: u32, height: u32) -> Self {
        Self {
            reader,
            kind,
            width,
            height,
            pending: None,
            seq: 0,
        }
    }

    /// Decode the first frame ahead of time. Returns false when the stream is empty.
    fn prime(&mut self) -> Result<bool, SourceError> {
        self.pending = self.decode_next()?;
        Ok(self.pending.is_some())
    }

    fn read(&mut self) -> Result<Option<CapturedFrame>, SourceError> {
        match self.pending.take() {
            Some(frame) => Ok(Some(frame)),
            None => self.decode_next(),
        }
    }

    fn decode_next(&mut self) -> Result<Option<CapturedFrame>, SourceError> {
        let mut buf = vec![0u8; rgb24_len(self.width, self.height)];
        let filled = self.fill(&mut buf).map_err(|e| SourceError::Read {
            kind: self.kind,
            reason: e.to_string(),
        })?;
        if filled == 0 {
            debug!(kind = %self.kind, frames = self.seq, "ffmpeg stream ended");
            return Ok(None);
        }
        if filled < buf.len() {
            warn!(
                kind = %self.kind,
                frames = self.seq,
                got = filled,
                expected = buf.len(),
                "ffmpeg stream ended mid-frame, dropping partial frame"
            );
            return Ok(None);
        }

        let frame = CapturedFrame::from_rgb24(
            buf,
            self.width,
            self.height,
            Utc::now().timestamp_millis(),
            self.seq,
        )
        .map_err(|e| SourceError::Read {
            kind: self.kind,
            reason: e.to_string(),
        })?;
        self.seq += 1;
        Ok(Some(frame))
    }

    /// Read until `buf` is full or the stream ends, returning the bytes read.
    fn fill(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        if let Err(e) = self.child.kill() {
            // Already exited on its own at end of stream.
            debug!(error = %e, "ffmpeg decoder kill failed");
        }
        if let Err(e) = self.child.wait() {
            warn!(error = %e, "failed to reap ffmpeg decoder");
        }
    }
}

/// Check whether a tool is available on PATH. Logs a warning if not found.
pub fn check_tool_available(tool: &str) {
    match Command::new(tool).arg("-version").output() {
        Ok(out) if out.status.success() => {
            debug!(tool, "tool is available");
        }
        Ok(_) => {
            warn!(tool, "tool returned non-zero for -version; it may not work");
        }
        Err(e) => {
            warn!(
                tool,
                error = %e,
                "tool not found on PATH; install ffmpeg (which ships ffplay)"
            );
        }
    }
}
