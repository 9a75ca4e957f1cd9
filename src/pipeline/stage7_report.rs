use std::fs;
use std::path::{Path, PathBuf};

use image::RgbImage;

use crate::model::ClassList;
use crate::model::palette::Palette;
use crate::pipeline::stage2_dispatch::PatchResult;
use crate::pipeline::stage4_heatmap::ClassHeatmaps;
use crate::pipeline::stage5_classmap::ClassificationMap;
use crate::report::html::{HEATMAPS_PNG, OVERVIEW_PNG, render_report_html};
use crate::report::json::{render_predictions_json, render_summary_json};
use crate::report::render::{render_class_heatmaps, render_overview};
use crate::report::{AnalysisSummary, ReportError};

pub const PREDICTIONS_JSON: &str = "patch_predictions.json";
pub const SUMMARY_JSON: &str = "analysis_summary.json";
pub const REPORT_HTML: &str = "report.html";

#[derive(Debug)]
pub struct Stage7Input<'a> {
    pub results: &'a [PatchResult],
    pub summary: &'a AnalysisSummary,
    pub classes: &'a ClassList,
    pub palette: &'a Palette,
    pub thumbnail: &'a RgbImage,
    pub heatmaps: &'a ClassHeatmaps,
    pub classification_map: &'a ClassificationMap,
    pub generated_on: String,
}

#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub predictions: PathBuf,
    pub heatmaps: PathBuf,
    pub overview: PathBuf,
    pub summary: PathBuf,
    pub html: PathBuf,
}

pub fn write_reports(input: &Stage7Input<'_>, out_dir: &Path) -> Result<ReportPaths, ReportError> {
    fs::create_dir_all(out_dir).map_err(|source| ReportError::Io {
        path: out_dir.to_path_buf(),
        source,
    })?;

    let paths = ReportPaths {
        predictions: out_dir.join(PREDICTIONS_JSON),
        heatmaps: out_dir.join(HEATMAPS_PNG),
        overview: out_dir.join(OVERVIEW_PNG),
        summary: out_dir.join(SUMMARY_JSON),
        html: out_dir.join(REPORT_HTML),
    };

    write_text(&paths.predictions, &render_predictions_json(input.results)?)?;

    tracing::info!("rendering class heatmaps");
    let heatmap_png = render_class_heatmaps(
        input.thumbnail,
        input.heatmaps,
        input.classes,
        input.palette,
    );
    write_png(&paths.heatmaps, &heatmap_png)?;

    tracing::info!("rendering classification map");
    let overview_png = render_overview(input.thumbnail, input.classification_map);
    write_png(&paths.overview, &overview_png)?;

    write_text(&paths.summary, &render_summary_json(input.summary)?)?;

    let html = render_report_html(input.summary, input.palette, &input.generated_on);
    write_text(&paths.html, &html)?;

    Ok(paths)
}

fn write_text(path: &Path, contents: &str) -> Result<(), ReportError> {
    fs::write(path, contents).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_png(path: &Path, img: &RgbImage) -> Result<(), ReportError> {
    img.save_with_format(path, image::ImageFormat::Png)
        .map_err(|source| ReportError::Image {
            path: path.to_path_buf(),
            source,
        })
}
