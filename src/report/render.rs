use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

use crate::model::ClassList;
use crate::model::palette::Palette;
use crate::pipeline::stage4_heatmap::{ClassHeatmaps, DISPLAY_CAP};
use crate::pipeline::stage5_classmap::ClassificationMap;

const GRID_COLS: u32 = 4;
const GRID_ROWS: u32 = 3;
const PANEL_MAX_WIDTH: u32 = 500;
const GAP: u32 = 8;
const WHITE: [f32; 3] = [1.0, 1.0, 1.0];

/// A fixed 3x4 sheet with one panel per class in class-list order, up to
/// twelve; unused slots stay white. Each panel is the thumbnail at half
/// strength under a white-to-class-colour ramp of the mean probability
/// (alpha 0.7, range fixed to [0, 1]).
pub fn render_class_heatmaps(
    thumbnail: &RgbImage,
    heatmaps: &ClassHeatmaps,
    classes: &ClassList,
    palette: &Palette,
) -> RgbImage {
    let n_panels = classes.len().min(DISPLAY_CAP).min(heatmaps.n_classes()) as u32;
    let panel_w = heatmaps.width.min(PANEL_MAX_WIDTH).max(1);
    let panel_h = ((heatmaps.height as u64 * panel_w as u64) / heatmaps.width.max(1) as u64)
        .max(1) as u32;
    let mut canvas = RgbImage::from_pixel(
        GRID_COLS * panel_w + (GRID_COLS + 1) * GAP,
        GRID_ROWS * panel_h + (GRID_ROWS + 1) * GAP,
        Rgb([255, 255, 255]),
    );

    let base = imageops::resize(thumbnail, panel_w, panel_h, FilterType::Triangle);
    for panel in 0..n_panels {
        let class_idx = panel as usize;
        let color = classes
            .name(class_idx)
            .map(|name| palette.rgb(name))
            .unwrap_or(WHITE);
        let mean = heatmaps.mean(class_idx);
        let ox = GAP + (panel % GRID_COLS) * (panel_w + GAP);
        let oy = GAP + (panel / GRID_COLS) * (panel_h + GAP);
        for py in 0..panel_h {
            let hy = sample_coord(py, panel_h, heatmaps.height);
            for px in 0..panel_w {
                let hx = sample_coord(px, panel_w, heatmaps.width);
                let v = mean[hy as usize * heatmaps.width as usize + hx as usize].clamp(0.0, 1.0);
                let under = blend(to_unit(base.get_pixel(px, py)), WHITE, 0.5);
                let ramp = blend(color, WHITE, v);
                canvas.put_pixel(ox + px, oy + py, to_rgb8(blend(ramp, under, 0.7)));
            }
        }
    }
    canvas
}

/// Thumbnail on the left; on the right the classification map at alpha 0.7
/// over the thumbnail at alpha 0.3.
pub fn render_overview(thumbnail: &RgbImage, map: &ClassificationMap) -> RgbImage {
    let (w, h) = (map.width, map.height);
    let thumb = if thumbnail.dimensions() == (w, h) {
        thumbnail.clone()
    } else {
        imageops::resize(thumbnail, w, h, FilterType::Triangle)
    };
    let mut canvas = RgbImage::from_pixel(2 * w + 3 * GAP, h + 2 * GAP, Rgb([255, 255, 255]));
    imageops::replace(&mut canvas, &thumb, GAP as i64, GAP as i64);

    let ox = 2 * GAP + w;
    for y in 0..h {
        for x in 0..w {
            let under = blend(to_unit(thumb.get_pixel(x, y)), WHITE, 0.3);
            let out = blend(map.pixel(x, y), under, 0.7);
            canvas.put_pixel(ox + x, GAP + y, to_rgb8(out));
        }
    }
    canvas
}

fn sample_coord(p: u32, panel_extent: u32, source_extent: u32) -> u32 {
    let s = (p as u64 * source_extent as u64 / panel_extent.max(1) as u64) as u32;
    s.min(source_extent.saturating_sub(1))
}

// `alpha * top + (1 - alpha) * bottom`
fn blend(top: [f32; 3], bottom: [f32; 3], alpha: f32) -> [f32; 3] {
    [
        alpha * top[0] + (1.0 - alpha) * bottom[0],
        alpha * top[1] + (1.0 - alpha) * bottom[1],
        alpha * top[2] + (1.0 - alpha) * bottom[2],
    ]
}

fn to_unit(px: &Rgb<u8>) -> [f32; 3] {
    [
        px.0[0] as f32 / 255.0,
        px.0[1] as f32 / 255.0,
        px.0[2] as f32 / 255.0,
    ]
}

fn to_rgb8(c: [f32; 3]) -> Rgb<u8> {
    Rgb(c.map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8))
}
