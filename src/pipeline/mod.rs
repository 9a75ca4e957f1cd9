use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::input::{SlideError, SlideSource};
use crate::model::palette::{ModelType, Palette};
use crate::model::{ClassList, ModelLoader};
use crate::report::{
    AnalysisParameters, AnalysisSummary, Dimensions, ReportError, local_timestamp,
};

pub mod stage1_grid;
pub mod stage2_dispatch;
pub mod stage3_rescale;
pub mod stage4_heatmap;
pub mod stage5_classmap;
pub mod stage6_summary;
pub mod stage7_report;

use stage1_grid::{GridParams, run_stage1};
use stage2_dispatch::{DispatchParams, DispatchStats, run_stage2};
use stage3_rescale::ThumbnailGeometry;
use stage4_heatmap::run_stage4;
use stage5_classmap::{OverlapPolicy, run_stage5};
use stage6_summary::run_stage6;
use stage7_report::{ReportPaths, Stage7Input, write_reports};

#[derive(Debug, Clone)]
pub struct RunParams {
    pub patch_size: u32,
    pub stride: u32,
    pub max_patches: usize,
    pub num_workers: usize,
    pub thumbnail_width: u32,
    pub patch_timeout: Duration,
    pub max_retries: u32,
    pub overlap: OverlapPolicy,
}

/// Everything a run needs, passed explicitly to each stage.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub slide_path: PathBuf,
    pub model_type: ModelType,
    pub classes: ClassList,
    pub palette: Palette,
    pub params: RunParams,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("slide error: {0}")]
    Slide(#[from] SlideError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error("model class list changed during the run")]
    ClassListMismatch,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub dispatch: DispatchStats,
    pub summary: AnalysisSummary,
    pub paths: ReportPaths,
}

pub fn run_pipeline(
    ctx: &RunContext,
    slide: Arc<dyn SlideSource>,
    model: Arc<dyn ModelLoader>,
    out_dir: &Path,
) -> Result<RunOutcome, PipelineError> {
    if model.class_list() != &ctx.classes {
        return Err(PipelineError::ClassListMismatch);
    }
    let params = &ctx.params;

    let dims = slide.open()?.dimensions();
    info!(
        "slide {} dimensions: {} x {}",
        ctx.slide_path.display(),
        dims.width,
        dims.height
    );

    let patches = run_stage1(
        dims,
        &GridParams {
            patch_size: params.patch_size,
            stride: params.stride,
            max_patches: params.max_patches,
        },
    );
    info!(
        "processing {} patches with stride {}",
        patches.len(),
        params.stride
    );

    // The driver holds no slide handle while workers run; each worker opens its own.
    let dispatch = run_stage2(
        &patches,
        Arc::clone(&slide),
        Arc::clone(&model),
        &DispatchParams {
            num_workers: params.num_workers,
            patch_timeout: params.patch_timeout,
            max_retries: params.max_retries,
        },
    );
    let results = dispatch.results;

    let reader = slide.open()?;
    let geometry = ThumbnailGeometry::for_slide(dims, params.thumbnail_width);
    let thumbnail = reader.thumbnail(geometry.thumb_width, geometry.thumb_height)?;
    drop(reader);

    info!("generating heatmaps");
    let heatmaps = run_stage4(&results, &geometry, params.patch_size, ctx.classes.len());
    let classification_map = run_stage5(
        &results,
        &geometry,
        params.patch_size,
        &ctx.palette,
        params.overlap,
    );

    let now = chrono::Local::now();
    let summary = AnalysisSummary {
        analysis_type: ctx.model_type.analysis_name().to_string(),
        model_type: ctx.model_type.as_str().to_string(),
        slide_path: ctx.slide_path.display().to_string(),
        slide_dimensions: Dimensions {
            width: dims.width,
            height: dims.height,
        },
        analysis_parameters: AnalysisParameters {
            patch_size: params.patch_size,
            patch_stride: params.stride,
            total_patches: results.len(),
            max_patches: params.max_patches,
        },
        timestamp: local_timestamp(&now),
        summary: run_stage6(&results, &ctx.classes),
    };

    info!("writing reports to {}", out_dir.display());
    let paths = write_reports(
        &Stage7Input {
            results: &results,
            summary: &summary,
            classes: &ctx.classes,
            palette: &ctx.palette,
            thumbnail: &thumbnail,
            heatmaps: &heatmaps,
            classification_map: &classification_map,
            generated_on: now.format("%Y-%m-%d %H:%M:%S").to_string(),
        },
        out_dir,
    )?;

    Ok(RunOutcome {
        dispatch: dispatch.stats,
        summary,
        paths,
    })
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/mod.rs"]
mod tests;
