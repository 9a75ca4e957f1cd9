use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::model::ClassList;
use crate::pipeline::stage6_summary::round_to;
use crate::report::ReportError;

pub const MODEL_INFO_JSON: &str = "model_info.json";
pub const CLASSES_JSON: &str = "classes.json";
pub const ANNOTATION_PREDICTIONS_JSON: &str = "predictions.json";
pub const CLASSIFICATION_SUMMARY_JSON: &str = "classification_summary.json";

/// `prediction_history_<model type>.jsonl`, appended to across runs.
pub fn history_file_name(model_type: &str) -> String {
    format!("prediction_history_{model_type}.jsonl")
}

/// Name-keyed values serialised as a JSON object in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedEntries<V> {
    entries: Vec<(String, V)>,
}

impl<V> OrderedEntries<V> {
    pub fn new(entries: Vec<(String, V)>) -> Self {
        Self { entries }
    }
}

impl<V: Serialize> Serialize for OrderedEntries<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub model_type: String,
    pub class_names: Vec<String>,
    pub color_scheme: OrderedEntries<String>,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopPrediction {
    #[serde(rename = "class")]
    pub class_name: String,
    pub probability: f64,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionDetails {
    pub timestamp: String,
    pub image_name: String,
    pub model_type: String,
    pub confidence: f64,
}

/// One record of `predictions.json`. A failed annotation keeps its id and
/// serialises `prediction`, `probabilities` and `top_predictions` as null.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotationPrediction {
    pub id: serde_json::Value,
    pub prediction: Option<String>,
    pub probabilities: Option<OrderedEntries<f64>>,
    pub top_predictions: Option<Vec<TopPrediction>>,
    #[serde(flatten)]
    pub details: Option<PredictionDetails>,
}

impl AnnotationPrediction {
    pub fn failed(id: serde_json::Value) -> Self {
        Self {
            id,
            prediction: None,
            probabilities: None,
            top_predictions: None,
            details: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationSummary {
    pub total_annotations: usize,
    pub successful_classifications: usize,
    pub model_type: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_distribution: Option<OrderedEntries<usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_confidence: Option<f64>,
}

/// Counts predicted classes in order of first appearance. Distribution and
/// average confidence are only present when something was classified.
pub fn summarize_predictions(
    predictions: &[AnnotationPrediction],
    model_type: &str,
    timestamp: String,
) -> ClassificationSummary {
    let mut counts: Vec<(String, usize)> = Vec::new();
    let mut confidences = Vec::new();
    for record in predictions {
        let Some(class) = record.prediction.as_deref() else {
            continue;
        };
        match counts.iter_mut().find(|(name, _)| name == class) {
            Some((_, n)) => *n += 1,
            None => counts.push((class.to_string(), 1)),
        }
        if let Some(details) = &record.details {
            if details.confidence != 0.0 {
                confidences.push(details.confidence);
            }
        }
    }
    let successful = counts.iter().map(|(_, n)| n).sum::<usize>();
    // Zero confidences are left out of the average.
    let average_confidence = (!confidences.is_empty())
        .then(|| round_to(confidences.iter().sum::<f64>() / confidences.len() as f64, 3));
    ClassificationSummary {
        total_annotations: predictions.len(),
        successful_classifications: successful,
        model_type: model_type.to_string(),
        timestamp,
        class_distribution: (successful > 0).then(|| OrderedEntries::new(counts)),
        average_confidence,
    }
}

#[derive(Debug, Clone)]
pub struct AnnotationReportPaths {
    pub model_info: PathBuf,
    pub classes: PathBuf,
    pub predictions: PathBuf,
    pub history: PathBuf,
    pub summary: PathBuf,
}

impl AnnotationReportPaths {
    pub fn new(out_dir: &Path, model_type: &str) -> Self {
        Self {
            model_info: out_dir.join(MODEL_INFO_JSON),
            classes: out_dir.join(CLASSES_JSON),
            predictions: out_dir.join(ANNOTATION_PREDICTIONS_JSON),
            history: out_dir.join(history_file_name(model_type)),
            summary: out_dir.join(CLASSIFICATION_SUMMARY_JSON),
        }
    }
}

pub fn write_model_info(path: &Path, info: &ModelInfo) -> Result<(), ReportError> {
    write_json(path, info, "model info", true)
}

pub fn write_classes(path: &Path, classes: &ClassList) -> Result<(), ReportError> {
    write_json(path, classes.names(), "class names", false)
}

pub fn write_predictions(path: &Path, records: &[AnnotationPrediction]) -> Result<(), ReportError> {
    write_json(path, records, "annotation predictions", true)
}

pub fn write_classification_summary(
    path: &Path,
    summary: &ClassificationSummary,
) -> Result<(), ReportError> {
    write_json(path, summary, "classification summary", true)
}

/// Append-only JSON-lines log of successful predictions.
#[derive(Debug)]
pub struct PredictionHistory {
    path: PathBuf,
    file: File,
}

impl PredictionHistory {
    pub fn open(path: &Path) -> Result<Self, ReportError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| ReportError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn append(&mut self, record: &AnnotationPrediction) -> Result<(), ReportError> {
        let line = serde_json::to_string(record).map_err(|source| ReportError::Json {
            what: "prediction history entry",
            source,
        })?;
        writeln!(self.file, "{line}").map_err(|source| ReportError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

fn write_json<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
    what: &'static str,
    pretty: bool,
) -> Result<(), ReportError> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|source| ReportError::Json { what, source })?;
    fs::write(path, rendered).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })
}
