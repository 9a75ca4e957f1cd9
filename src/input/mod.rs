use std::path::PathBuf;

use image::RgbImage;

pub mod annotations;
pub mod raster;

pub use raster::RasterSlideSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlideDimensions {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum SlideError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode slide {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("slide {0} has zero width or height")]
    Empty(PathBuf),
    #[error("level {0} is not available (single-resolution slide)")]
    UnsupportedLevel(u32),
    #[error("region ({x}, {y}) size {size} is outside the slide ({width}x{height})")]
    OutOfBounds {
        x: u32,
        y: u32,
        size: u32,
        width: u32,
        height: u32,
    },
}

/// Read handle on one slide. Handles are never shared between workers; each
/// worker obtains its own from [`SlideSource::open`].
pub trait SlideReader {
    fn dimensions(&self) -> SlideDimensions;

    fn thumbnail(&self, width: u32, height: u32) -> Result<RgbImage, SlideError>;

    fn read_region(&self, x: u32, y: u32, level: u32, size: u32) -> Result<RgbImage, SlideError>;
}

pub trait SlideSource: Send + Sync {
    fn path(&self) -> &std::path::Path;

    fn open(&self) -> Result<Box<dyn SlideReader>, SlideError>;
}

#[cfg(test)]
#[path = "../../tests/src_inline/input/tests.rs"]
mod tests;
