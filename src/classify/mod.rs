use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::input::annotations::{Annotation, Roi};
use crate::input::{SlideDimensions, SlideSource};
use crate::model::palette::{ModelType, Palette};
use crate::model::{ClassList, ModelError, ModelLoader, PatchClassifier};
use crate::pipeline::stage1_grid::Patch;
use crate::pipeline::stage2_dispatch::{PatchError, PatchResult, classify_with_retries};
use crate::pipeline::stage6_summary::round_to;
use crate::report::annotations::{
    AnnotationPrediction, AnnotationReportPaths, ClassificationSummary, ModelInfo,
    OrderedEntries, PredictionDetails, PredictionHistory, TopPrediction, summarize_predictions,
    write_classes, write_classification_summary, write_model_info, write_predictions,
};
use crate::report::{ReportError, local_timestamp};

/// Side of the square window read around each annotation.
pub const CONTEXT_SIZE: u32 = 1120;
const TOP_K: usize = 3;
const MIN_TOP_PROBABILITY: f32 = 0.01;

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("failed to load model: {0}")]
    Model(#[from] ModelError),
    #[error(transparent)]
    Report(#[from] ReportError),
}

#[derive(Debug, Clone)]
pub struct ClassifyParams {
    pub model_type: ModelType,
    pub context_size: u32,
    pub max_retries: u32,
}

#[derive(Debug)]
pub struct ClassifyOutcome {
    pub summary: ClassificationSummary,
    pub paths: AnnotationReportPaths,
}

/// Top-left corner of a `size`-square window centred on the ROI and pushed
/// back inside the slide. On a slide smaller than the window the corner is 0
/// and the read fails.
pub fn context_window(roi: &Roi, dims: SlideDimensions, size: u32) -> (u32, u32) {
    let (cx, cy) = roi.center();
    let half = i64::from(size / 2);
    let place = |center: i64, extent: u32| -> u32 {
        let mut start = (center - half).max(0);
        if start + i64::from(size) > i64::from(extent) {
            start = (i64::from(extent) - i64::from(size)).max(0);
        }
        start as u32
    };
    (place(cx, dims.width), place(cy, dims.height))
}

/// Classifies every annotation in order with one classifier instance. A
/// region that cannot be read or classified yields a null record and the run
/// continues; slides are opened once per distinct path.
pub fn run_classify(
    annotations: &[Annotation],
    open_slide: impl Fn(&Path) -> Arc<dyn SlideSource>,
    model: &dyn ModelLoader,
    palette: &Palette,
    params: &ClassifyParams,
    out_dir: &Path,
) -> Result<ClassifyOutcome, ClassifyError> {
    fs::create_dir_all(out_dir).map_err(|source| ReportError::Io {
        path: out_dir.to_path_buf(),
        source,
    })?;
    let classes = model.class_list();
    let mut classifier = model.load_worker()?;
    let model_type = params.model_type.as_str();
    let paths = AnnotationReportPaths::new(out_dir, model_type);

    let color_scheme = classes
        .names()
        .iter()
        .map(|name| (name.clone(), palette.hex(name).to_string()))
        .collect();
    write_model_info(
        &paths.model_info,
        &ModelInfo {
            model_type: model_type.to_string(),
            class_names: classes.names().to_vec(),
            color_scheme: OrderedEntries::new(color_scheme),
            timestamp: local_timestamp(&chrono::Local::now()),
        },
    )?;
    write_classes(&paths.classes, classes)?;

    info!("classifying {} annotations", annotations.len());
    let mut history = PredictionHistory::open(&paths.history)?;
    let mut slides: HashMap<PathBuf, Arc<dyn SlideSource>> = HashMap::new();
    let mut predictions = Vec::with_capacity(annotations.len());
    for (idx, annotation) in annotations.iter().enumerate() {
        debug!("processing annotation {}/{}", idx + 1, annotations.len());
        let source = Arc::clone(
            slides
                .entry(annotation.slide_path.clone())
                .or_insert_with(|| open_slide(annotation.slide_path.as_path())),
        );
        let outcome = classify_annotation(
            source.as_ref(),
            classifier.as_mut(),
            classes,
            annotation,
            idx,
            params,
        );
        match outcome {
            Ok(result) => {
                info!(
                    "annotation {}: {} ({:.1}%)",
                    annotation.id,
                    result.prediction,
                    result.confidence * 100.0
                );
                let record = prediction_record(annotation, &result, classes, palette, model_type);
                history.append(&record)?;
                predictions.push(record);
            }
            Err(err) => {
                warn!(
                    "could not classify annotation {} on {}: {err}",
                    annotation.id,
                    source.path().display()
                );
                predictions.push(AnnotationPrediction::failed(annotation.id.clone()));
            }
        }
    }

    write_predictions(&paths.predictions, &predictions)?;
    let summary = summarize_predictions(
        &predictions,
        model_type,
        local_timestamp(&chrono::Local::now()),
    );
    write_classification_summary(&paths.summary, &summary)?;
    info!(
        "classified {}/{} annotations",
        summary.successful_classifications, summary.total_annotations
    );

    Ok(ClassifyOutcome {
        summary,
        paths,
    })
}

fn classify_annotation(
    source: &dyn SlideSource,
    classifier: &mut dyn PatchClassifier,
    classes: &ClassList,
    annotation: &Annotation,
    index: usize,
    params: &ClassifyParams,
) -> Result<PatchResult, PatchError> {
    let reader = source.open()?;
    let (x, y) = context_window(&annotation.roi, reader.dimensions(), params.context_size);
    let patch = Patch {
        index,
        x,
        y,
        size: params.context_size,
    };
    classify_with_retries(reader.as_ref(), classifier, classes, patch, params.max_retries)
}

fn prediction_record(
    annotation: &Annotation,
    result: &PatchResult,
    classes: &ClassList,
    palette: &Palette,
    model_type: &str,
) -> AnnotationPrediction {
    let probabilities = classes
        .names()
        .iter()
        .zip(&result.probabilities)
        .map(|(name, &p)| (name.clone(), round_to(p as f64, 3)))
        .collect();
    AnnotationPrediction {
        id: annotation.id.clone(),
        prediction: Some(result.prediction.clone()),
        probabilities: Some(OrderedEntries::new(probabilities)),
        top_predictions: Some(top_predictions(&result.probabilities, classes, palette)),
        details: Some(PredictionDetails {
            timestamp: local_timestamp(&chrono::Local::now()),
            image_name: annotation.image_name.clone(),
            model_type: model_type.to_string(),
            confidence: result.confidence as f64,
        }),
    }
}

/// The three most probable classes, dropping any at or below 1%. Equal
/// probabilities list the later class first.
pub fn top_predictions(
    probabilities: &[f32],
    classes: &ClassList,
    palette: &Palette,
) -> Vec<TopPrediction> {
    let mut order = (0..probabilities.len()).collect::<Vec<_>>();
    order.sort_by(|&a, &b| {
        probabilities[b]
            .total_cmp(&probabilities[a])
            .then(b.cmp(&a))
    });
    order
        .into_iter()
        .take(TOP_K)
        .filter(|&i| probabilities[i] > MIN_TOP_PROBABILITY)
        .filter_map(|i| {
            let name = classes.name(i)?;
            Some(TopPrediction {
                class_name: name.to_string(),
                probability: round_to(probabilities[i] as f64, 3),
                color: palette.hex(name).to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
#[path = "../../tests/src_inline/classify/mod.rs"]
mod tests;
