use rayon::prelude::*;

use crate::pipeline::stage2_dispatch::PatchResult;
use crate::pipeline::stage3_rescale::{Footprint, ThumbnailGeometry};

/// Heatmap panels rendered into `class_heatmaps.png`. Every class is still
/// accumulated.
pub const DISPLAY_CAP: usize = 12;

#[derive(Debug, Clone)]
pub struct ClassHeatmaps {
    pub width: u32,
    pub height: u32,
    /// One probability-sum plane per class, row-major.
    sums: Vec<Vec<f32>>,
    /// Overlap count per pixel. Every result touches every class plane, so
    /// the count plane is the same for all classes.
    counts: Vec<u32>,
}

impl ClassHeatmaps {
    pub fn new(geometry: &ThumbnailGeometry, n_classes: usize) -> Self {
        let n = geometry.n_pixels();
        Self {
            width: geometry.thumb_width,
            height: geometry.thumb_height,
            sums: vec![vec![0.0; n]; n_classes],
            counts: vec![0; n],
        }
    }

    pub fn n_classes(&self) -> usize {
        self.sums.len()
    }

    #[cfg(test)]
    pub fn count_at(&self, x: u32, y: u32) -> u32 {
        self.counts[self.offset(x, y)]
    }

    #[cfg(test)]
    pub fn sum_at(&self, class_idx: usize, x: u32, y: u32) -> f32 {
        self.sums[class_idx][self.offset(x, y)]
    }

    /// Mean probability for one pixel; 0 where no patch landed.
    #[cfg(test)]
    pub fn mean_at(&self, class_idx: usize, x: u32, y: u32) -> f32 {
        let i = self.offset(x, y);
        mean_cell(self.sums[class_idx][i], self.counts[i])
    }

    /// Normalised plane for one class: sum / count, exactly 0 where count is 0.
    pub fn mean(&self, class_idx: usize) -> Vec<f32> {
        self.sums[class_idx]
            .iter()
            .zip(&self.counts)
            .map(|(&s, &c)| mean_cell(s, c))
            .collect()
    }

    /// Adds each footprint once to the count plane and its class probability
    /// to every sum plane. Class planes are filled in parallel.
    pub fn accumulate_all(&mut self, items: &[(Footprint, &[f32])]) {
        let width = self.width as usize;
        for (fp, _) in items {
            for_each_row(*fp, width, |range| {
                for c in &mut self.counts[range] {
                    *c += 1;
                }
            });
        }
        self.sums
            .par_iter_mut()
            .enumerate()
            .for_each(|(class_idx, plane)| {
                for (fp, probabilities) in items {
                    let Some(&p) = probabilities.get(class_idx) else {
                        continue;
                    };
                    for_each_row(*fp, width, |range| {
                        for v in &mut plane[range] {
                            *v += p;
                        }
                    });
                }
            });
    }

    #[cfg(test)]
    fn offset(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

fn for_each_row(fp: Footprint, width: usize, mut f: impl FnMut(std::ops::Range<usize>)) {
    if fp.is_empty() {
        return;
    }
    for row in fp.y0 as usize..fp.y1 as usize {
        let base = row * width;
        f(base + fp.x0 as usize..base + fp.x1 as usize);
    }
}

fn mean_cell(sum: f32, count: u32) -> f32 {
    if count == 0 { 0.0 } else { sum / count as f32 }
}

/// Accumulates every result into per-class sum planes and the shared count
/// plane. Results whose vector length disagrees with the class count are
/// skipped.
pub fn run_stage4(
    results: &[PatchResult],
    geometry: &ThumbnailGeometry,
    patch_size: u32,
    n_classes: usize,
) -> ClassHeatmaps {
    let mut heatmaps = ClassHeatmaps::new(geometry, n_classes);
    let mut items = Vec::with_capacity(results.len());
    for r in results {
        if r.probabilities.len() != n_classes {
            tracing::warn!(
                x = r.x,
                y = r.y,
                "skipping result with {} probabilities (expected {n_classes})",
                r.probabilities.len()
            );
            continue;
        }
        items.push((geometry.rescale(r.x, r.y, patch_size), r.probabilities.as_slice()));
    }
    heatmaps.accumulate_all(&items);
    heatmaps
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage4_heatmap.rs"]
mod tests;
