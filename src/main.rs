mod classify;
mod input;
mod logging;
mod model;
mod pipeline;
mod report;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};

use crate::classify::{CONTEXT_SIZE, ClassifyError, ClassifyParams, run_classify};
use crate::input::annotations::{AnnotationError, load_annotations};
use crate::input::{RasterSlideSource, SlideSource};
use crate::model::color_profile::ColorProfileModel;
use crate::model::config::ModelConfig;
use crate::model::palette::{ModelType, Palette};
use crate::model::{ModelError, ModelLoader};
use crate::pipeline::stage3_rescale::DEFAULT_THUMBNAIL_WIDTH;
use crate::pipeline::stage5_classmap::OverlapPolicy;
use crate::pipeline::{PipelineError, RunContext, RunParams, run_pipeline};

#[derive(Debug, Parser)]
#[command(name = "kira-tissuemap", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Classify a whole slide patch by patch and write heatmaps and reports.
    Run(RunArgs),
    /// Classify the region around each annotation in an annotations export.
    Classify(ClassifyArgs),
}

#[derive(Debug, Clone, Args)]
struct RunArgs {
    model_path: PathBuf,
    slide_path: PathBuf,
    output_folder: PathBuf,
    #[arg(default_value_t = 560)]
    patch_stride: u32,
    #[arg(default_value_t = 1000)]
    max_patches: usize,
    #[arg(default_value_t = 4)]
    num_workers: usize,
    #[arg(long, default_value_t = 1120)]
    patch_size: u32,
    #[arg(long, default_value_t = DEFAULT_THUMBNAIL_WIDTH)]
    thumbnail_width: u32,
    /// Seconds to wait for the next finished patch before giving up on the rest.
    #[arg(long, default_value_t = 120)]
    patch_timeout_secs: u64,
    #[arg(long, default_value_t = 0)]
    max_retries: u32,
    #[arg(long, value_enum, default_value_t = OverlapPolicy::HighestConfidence)]
    overlap: OverlapPolicy,
    /// Overrides detection from the model path.
    #[arg(long, value_enum)]
    model_type: Option<ModelType>,
}

#[derive(Debug, Clone, Args)]
struct ClassifyArgs {
    annotations_path: PathBuf,
    model_path: PathBuf,
    output_dir: PathBuf,
    /// Side of the square window read around each annotation centre.
    #[arg(long, default_value_t = CONTEXT_SIZE)]
    context_size: u32,
    #[arg(long, default_value_t = 0)]
    max_retries: u32,
    /// Overrides detection from the model path.
    #[arg(long, value_enum)]
    model_type: Option<ModelType>,
}

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("failed to load model: {0}")]
    Model(#[from] ModelError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Annotations(#[from] AnnotationError),
    #[error(transparent)]
    Classify(#[from] ClassifyError),
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        error!("{err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Command::Run(args) => run_analysis(&args),
        Command::Classify(args) => run_classification(&args),
    }
}

fn run_analysis(args: &RunArgs) -> Result<(), AppError> {
    let params = build_params(args)?;
    info!(
        "starting whole slide analysis for {}",
        args.slide_path.display()
    );

    let model_type = resolve_model_type(args.model_type, &args.model_path);
    info!("model type: {}", model_type.as_str());

    let model_config = ModelConfig::load(&args.model_path)?;
    let model = ColorProfileModel::from_config(&model_config)?;
    let classes = model.class_list().clone();
    info!("model has {} classes", classes.len());

    let ctx = RunContext {
        slide_path: args.slide_path.clone(),
        model_type,
        classes,
        palette: Palette::for_model(model_type).with_overrides(&model_config.class_colors),
        params,
    };
    let slide = Arc::new(RasterSlideSource::new(&args.slide_path));
    let outcome = run_pipeline(&ctx, slide, Arc::new(model), &args.output_folder)?;

    info!(
        "analysis complete: {} of {} patches classified",
        outcome.dispatch.succeeded, outcome.dispatch.requested
    );
    info!(
        "{} high-confidence regions",
        outcome.summary.summary.high_confidence_regions.len()
    );
    for path in [
        &outcome.paths.overview,
        &outcome.paths.heatmaps,
        &outcome.paths.summary,
        &outcome.paths.html,
        &outcome.paths.predictions,
    ] {
        info!("wrote {}", path.display());
    }
    Ok(())
}

fn run_classification(args: &ClassifyArgs) -> Result<(), AppError> {
    if args.context_size == 0 {
        return Err(AppError::InvalidArgument(
            "context size must be positive".to_string(),
        ));
    }
    let model_type = resolve_model_type(args.model_type, &args.model_path);
    info!("model type: {}", model_type.as_str());

    let model_config = ModelConfig::load(&args.model_path)?;
    let model = ColorProfileModel::from_config(&model_config)?;
    let palette = Palette::for_model(model_type).with_overrides(&model_config.class_colors);
    info!("model has {} classes", model.class_list().len());

    let annotations = load_annotations(&args.annotations_path)?;
    info!(
        "loaded {} annotations from {}",
        annotations.len(),
        args.annotations_path.display()
    );

    let outcome = run_classify(
        &annotations,
        |path: &Path| -> Arc<dyn SlideSource> { Arc::new(RasterSlideSource::new(path)) },
        &model,
        &palette,
        &ClassifyParams {
            model_type,
            context_size: args.context_size,
            max_retries: args.max_retries,
        },
        &args.output_dir,
    )?;
    if let Some(avg) = outcome.summary.average_confidence {
        info!("average confidence: {avg}");
    }
    for path in [
        &outcome.paths.model_info,
        &outcome.paths.classes,
        &outcome.paths.predictions,
        &outcome.paths.history,
        &outcome.paths.summary,
    ] {
        info!("wrote {}", path.display());
    }
    Ok(())
}

fn build_params(args: &RunArgs) -> Result<RunParams, AppError> {
    if args.patch_size == 0 {
        return Err(AppError::InvalidArgument(
            "patch size must be positive".to_string(),
        ));
    }
    if args.patch_stride == 0 || args.patch_stride > args.patch_size {
        return Err(AppError::InvalidArgument(format!(
            "patch stride must be in 1..={} (got {})",
            args.patch_size, args.patch_stride
        )));
    }
    if args.num_workers == 0 {
        return Err(AppError::InvalidArgument(
            "num_workers must be at least 1".to_string(),
        ));
    }
    if args.thumbnail_width == 0 {
        return Err(AppError::InvalidArgument(
            "thumbnail width must be positive".to_string(),
        ));
    }
    if args.patch_timeout_secs == 0 {
        return Err(AppError::InvalidArgument(
            "patch timeout must be positive".to_string(),
        ));
    }
    Ok(RunParams {
        patch_size: args.patch_size,
        stride: args.patch_stride,
        max_patches: args.max_patches,
        num_workers: args.num_workers,
        thumbnail_width: args.thumbnail_width,
        patch_timeout: Duration::from_secs(args.patch_timeout_secs),
        max_retries: args.max_retries,
        overlap: args.overlap,
    })
}

fn resolve_model_type(explicit: Option<ModelType>, model_path: &Path) -> ModelType {
    if let Some(model_type) = explicit {
        return model_type;
    }
    let (detected, matched) = ModelType::detect(model_path);
    if !matched {
        warn!(
            "could not detect model type from {}; using {} settings",
            model_path.display(),
            detected.as_str()
        );
    }
    detected
}

#[cfg(test)]
#[path = "../tests/src_inline/main_inline.rs"]
mod tests;
