pub mod ffplay;
pub mod keys;
pub mod snapshot;

use heatmap_common::frame::FrameStamp;

use crate::render::RenderedImage;

#[derive(Debug, Clone, Copy, Default)]
pub struct DisplayOptions {
    pub fullscreen: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    /// The viewer window went away, usually because the user closed it.
    #[error("display window closed")]
    Closed,
    #[error("failed to start display: {0}")]
    Spawn(String),
    #[error("failed to write image: {0}")]
    Write(String),
}

/// Presents rendered images in a named window.
pub trait DisplaySink {
    /// Called once before the first image is shown.
    fn configure(&mut self, _window: &str, _options: DisplayOptions) -> Result<(), DisplayError> {
        Ok(())
    }

    /// Present `image`, rendered from the frame described by `stamp`.
    fn show(
        &mut self,
        window: &str,
        image: &RenderedImage,
        stamp: FrameStamp,
    ) -> Result<(), DisplayError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

impl<T: DisplaySink + ?Sized> DisplaySink for Box<T> {
    fn configure(&mut self, window: &str, options: DisplayOptions) -> Result<(), DisplayError> {
        (**self).configure(window, options)
    }

    fn show(
        &mut self,
        window: &str,
        image: &RenderedImage,
        stamp: FrameStamp,
    ) -> Result<(), DisplayError> {
        (**self).show(window, image, stamp)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
