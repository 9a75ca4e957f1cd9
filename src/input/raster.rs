use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use image::RgbImage;
use image::imageops::{self, FilterType};

use crate::input::{SlideDimensions, SlideError, SlideReader, SlideSource};

// Single-resolution raster (TIFF/PNG/JPEG). Pixels are decoded once on the
// first `open` and shared read-only between every handle handed out.
#[derive(Debug)]
pub struct RasterSlideSource {
    path: PathBuf,
    pixels: OnceLock<Arc<RgbImage>>,
}

impl RasterSlideSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pixels: OnceLock::new(),
        }
    }

    #[cfg(test)]
    pub fn from_image(path: impl Into<PathBuf>, image: RgbImage) -> Self {
        let pixels = OnceLock::new();
        let _ = pixels.set(Arc::new(image));
        Self {
            path: path.into(),
            pixels,
        }
    }

    fn pixels(&self) -> Result<Arc<RgbImage>, SlideError> {
        if let Some(px) = self.pixels.get() {
            return Ok(px.clone());
        }
        let decoded = image::open(&self.path)
            .map_err(|source| match source {
                image::ImageError::IoError(e) => SlideError::Io(e),
                other => SlideError::Decode {
                    path: self.path.clone(),
                    source: other,
                },
            })?
            .to_rgb8();
        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(SlideError::Empty(self.path.clone()));
        }
        tracing::debug!(
            path = %self.path.display(),
            width = decoded.width(),
            height = decoded.height(),
            "decoded raster slide"
        );
        // Two workers may race here; whichever set wins is the shared copy.
        Ok(self.pixels.get_or_init(|| Arc::new(decoded)).clone())
    }
}

impl SlideSource for RasterSlideSource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<Box<dyn SlideReader>, SlideError> {
        Ok(Box::new(RasterSlide {
            pixels: self.pixels()?,
        }))
    }
}

#[derive(Debug, Clone)]
pub struct RasterSlide {
    pixels: Arc<RgbImage>,
}

impl SlideReader for RasterSlide {
    fn dimensions(&self) -> SlideDimensions {
        SlideDimensions {
            width: self.pixels.width(),
            height: self.pixels.height(),
        }
    }

    fn thumbnail(&self, width: u32, height: u32) -> Result<RgbImage, SlideError> {
        Ok(imageops::resize(
            self.pixels.as_ref(),
            width.max(1),
            height.max(1),
            FilterType::Triangle,
        ))
    }

    fn read_region(&self, x: u32, y: u32, level: u32, size: u32) -> Result<RgbImage, SlideError> {
        if level != 0 {
            return Err(SlideError::UnsupportedLevel(level));
        }
        let dims = self.dimensions();
        let fits_x = x.checked_add(size).is_some_and(|end| end <= dims.width);
        let fits_y = y.checked_add(size).is_some_and(|end| end <= dims.height);
        if !fits_x || !fits_y {
            return Err(SlideError::OutOfBounds {
                x,
                y,
                size,
                width: dims.width,
                height: dims.height,
            });
        }
        Ok(imageops::crop_imm(self.pixels.as_ref(), x, y, size, size).to_image())
    }
}
