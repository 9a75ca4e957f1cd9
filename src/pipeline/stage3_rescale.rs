use crate::input::SlideDimensions;

pub const DEFAULT_THUMBNAIL_WIDTH: u32 = 2000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThumbnailGeometry {
    pub slide_width: u32,
    pub slide_height: u32,
    pub thumb_width: u32,
    pub thumb_height: u32,
    pub scale_x: f64,
    pub scale_y: f64,
}

/// Half-open pixel rectangle in thumbnail space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footprint {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl Footprint {
    pub fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }

    #[cfg(test)]
    pub fn area(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            (self.x1 - self.x0) as usize * (self.y1 - self.y0) as usize
        }
    }
}

impl ThumbnailGeometry {
    // Height follows the slide aspect ratio off the fixed width, so scale_x
    // and scale_y can differ slightly after truncation.
    pub fn for_slide(dims: SlideDimensions, thumb_width: u32) -> Self {
        let slide_width = dims.width.max(1);
        let slide_height = dims.height.max(1);
        let thumb_width = thumb_width.max(1);
        let thumb_height =
            ((thumb_width as u64 * slide_height as u64) / slide_width as u64).max(1) as u32;
        Self {
            slide_width,
            slide_height,
            thumb_width,
            thumb_height,
            scale_x: thumb_width as f64 / slide_width as f64,
            scale_y: thumb_height as f64 / slide_height as f64,
        }
    }

    pub fn n_pixels(&self) -> usize {
        self.thumb_width as usize * self.thumb_height as usize
    }

    pub fn rescale(&self, x: u32, y: u32, size: u32) -> Footprint {
        let x0 = (x as f64 * self.scale_x).floor() as u32;
        let y0 = (y as f64 * self.scale_y).floor() as u32;
        let w = (size as f64 * self.scale_x).floor() as u32;
        let h = (size as f64 * self.scale_y).floor() as u32;
        let x0 = x0.min(self.thumb_width);
        let y0 = y0.min(self.thumb_height);
        Footprint {
            x0,
            y0,
            x1: x0.saturating_add(w).min(self.thumb_width),
            y1: y0.saturating_add(h).min(self.thumb_height),
        }
    }
}
