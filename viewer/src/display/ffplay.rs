use std::io::{ErrorKind, Write};
use std::process::{Child, ChildStdin, Command, Stdio};

use heatmap_common::frame::FrameStamp;
use tracing::{debug, info, warn};

use super::{DisplayError, DisplayOptions, DisplaySink};
use crate::render::RenderedImage;

/// Shows frames in an `ffplay` window fed raw `rgb24` over stdin.
pub struct FfplaySink {
    fullscreen: bool,
    player: Option<Player>,
}

struct Player {
    child: Child,
    stdin: ChildStdin,
    width: u32,
    height: u32,
    frames: u64,
}

impl FfplaySink {
    pub fn new() -> Self {
        Self {
            fullscreen: false,
            player: None,
        }
    }

    fn args(&self, window: &str, width: u32, height: u32) -> Vec<String> {
        let mut args: Vec<String> = [
            "-hide_banner",
            "-loglevel", "error",
            "-f", "rawvideo",
            "-pixel_format", "rgb24",
            "-video_size",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.push(format!("{width}x{height}"));
        args.push("-window_title".into());
        args.push(window.into());
        if self.fullscreen {
            args.push("-fs".into());
        }
        args.push("-".into());
        args
    }

    fn spawn(&self, window: &str, width: u32, height: u32) -> Result<Player, DisplayError> {
        let mut child = Command::new("ffplay")
            .args(self.args(window, width, height))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| DisplayError::Spawn(format!("failed to spawn ffplay: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DisplayError::Spawn("could not get ffplay stdin handle".into()))?;

        info!(window, width, height, fullscreen = self.fullscreen, "ffplay window started");
        Ok(Player {
            child,
            stdin,
            width,
            height,
            frames: 0,
        })
    }
}

impl Default for FfplaySink {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplaySink for FfplaySink {
    fn configure(&mut self, _window: &str, options: DisplayOptions) -> Result<(), DisplayError> {
        self.fullscreen = options.fullscreen;
        Ok(())
    }

    fn show(
        &mut self,
        window: &str,
        image: &RenderedImage,
        _stamp: FrameStamp,
    ) -> Result<(), DisplayError> {
        let (width, height) = image.dimensions();
        let size_changed = self
            .player
            .as_ref()
            .is_some_and(|p| (p.width, p.height) != (width, height));
        if size_changed {
            debug!(width, height, "frame size changed, restarting ffplay");
            self.player = None;
        }

        let player = match self.player.take() {
            Some(player) => player,
            None => self.spawn(window, width, height)?,
        };
        let player = self.player.insert(player);

        let rgb = image.to_rgb();
        match player.stdin.write_all(rgb.as_raw()) {
            Ok(()) => {
                player.frames += 1;
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::BrokenPipe => Err(DisplayError::Closed),
            Err(e) => Err(DisplayError::Write(e.to_string())),
        }
    }

    fn name(&self) -> &str {
        "ffplay"
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        debug!(frames = self.frames, "closing ffplay window");
        if let Err(e) = self.child.kill() {
            debug!(error = %e, "ffplay kill failed");
        }
        if let Err(e) = self.child.wait() {
            warn!(error = %e, "failed to reap ffplay");
        }
    }
}
