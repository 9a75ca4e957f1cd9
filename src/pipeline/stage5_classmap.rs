use crate::model::palette::Palette;
use crate::pipeline::stage2_dispatch::PatchResult;
use crate::pipeline::stage3_rescale::ThumbnailGeometry;

/// How a pixel covered by several patches picks its colour. Both policies
/// are independent of the order results arrive in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OverlapPolicy {
    /// Highest confidence wins; equal confidence goes to the later grid patch.
    #[default]
    HighestConfidence,
    /// The patch with the highest row-major grid index wins.
    PatchIndex,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Owner {
    confidence: f32,
    index: usize,
}

impl Owner {
    fn beats(&self, other: &Owner, policy: OverlapPolicy) -> bool {
        match policy {
            OverlapPolicy::HighestConfidence => {
                self.confidence > other.confidence
                    || (self.confidence == other.confidence && self.index > other.index)
            }
            OverlapPolicy::PatchIndex => self.index > other.index,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassificationMap {
    pub width: u32,
    pub height: u32,
    /// Normalised RGB per pixel, row-major; unpainted pixels stay black.
    pixels: Vec<[f32; 3]>,
    owners: Vec<Option<Owner>>,
    policy: OverlapPolicy,
}

impl ClassificationMap {
    pub fn new(geometry: &ThumbnailGeometry, policy: OverlapPolicy) -> Self {
        let n = geometry.n_pixels();
        Self {
            width: geometry.thumb_width,
            height: geometry.thumb_height,
            pixels: vec![[0.0; 3]; n],
            owners: vec![None; n],
            policy,
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> [f32; 3] {
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    #[cfg(test)]
    pub fn is_painted(&self, x: u32, y: u32) -> bool {
        self.owners[y as usize * self.width as usize + x as usize].is_some()
    }

    fn paint(&mut self, geometry: &ThumbnailGeometry, result: &PatchResult, size: u32, rgb: [f32; 3]) {
        let fp = geometry.rescale(result.x, result.y, size);
        if fp.is_empty() {
            return;
        }
        let candidate = Owner {
            confidence: result.confidence,
            index: result.index,
        };
        let width = self.width as usize;
        for row in fp.y0 as usize..fp.y1 as usize {
            for col in fp.x0 as usize..fp.x1 as usize {
                let i = row * width + col;
                let wins = match &self.owners[i] {
                    None => true,
                    Some(current) => candidate.beats(current, self.policy),
                };
                if wins {
                    self.owners[i] = Some(candidate);
                    self.pixels[i] = rgb;
                }
            }
        }
    }
}

pub fn run_stage5(
    results: &[PatchResult],
    geometry: &ThumbnailGeometry,
    patch_size: u32,
    palette: &Palette,
    policy: OverlapPolicy,
) -> ClassificationMap {
    let mut map = ClassificationMap::new(geometry, policy);
    for r in results {
        let rgb = palette.rgb(&r.prediction);
        map.paint(geometry, r, patch_size, rgb);
    }
    map
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage5_classmap.rs"]
mod tests;
