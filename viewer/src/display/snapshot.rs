use std::path::PathBuf;

use heatmap_common::frame::FrameStamp;
use tracing::{debug, info};

use super::keys::snapshot_key;
use super::{DisplayError, DisplaySink};
use crate::render::RenderedImage;

/// Headless display: saves every Nth shown image as a JPEG, named by the
/// capture time and sequence number of the frame it was rendered from.
pub struct SnapshotSink {
    dir: PathBuf,
    every: u32,
    shown: u64,
}

impl SnapshotSink {
    pub fn new(dir: PathBuf, every: u32) -> Self {
        Self {
            dir,
            every: every.max(1),
            shown: 0,
        }
    }
}

impl DisplaySink for SnapshotSink {
    fn show(
        &mut self,
        window: &str,
        image: &RenderedImage,
        stamp: FrameStamp,
    ) -> Result<(), DisplayError> {
        self.shown += 1;
        if self.shown % self.every as u64 != 0 {
            return Ok(());
        }

        let path = self
            .dir
            .join(snapshot_key(window, stamp.captured_at_ms, stamp.seq));
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DisplayError::Write(format!("{}: {e}", parent.display())))?;
        }

        let saved = match image {
            RenderedImage::Gray(gray) => gray.save(&path),
            RenderedImage::Color(rgb) => rgb.save(&path),
        };
        saved.map_err(|e| DisplayError::Write(format!("{}: {e}", path.display())))?;

        if self.shown == self.every as u64 {
            info!(dir = %self.dir.display(), every = self.every, "writing snapshots");
        }
        debug!(path = %path.display(), "snapshot saved");
        Ok(())
    }

    fn name(&self) -> &str {
        "snapshots"
    }
}
