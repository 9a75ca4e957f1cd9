use std::path::PathBuf;

use serde::Serialize;

use crate::pipeline::stage6_summary::Summary;

pub mod annotations;
pub mod html;
pub mod json;
pub mod render;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialise {what}: {source}")]
    Json {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AnalysisParameters {
    pub patch_size: u32,
    pub patch_stride: u32,
    /// Successfully classified patches, not the number dispatched.
    pub total_patches: usize,
    pub max_patches: usize,
}

/// Contents of `analysis_summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisSummary {
    pub analysis_type: String,
    pub model_type: String,
    pub slide_path: String,
    pub slide_dimensions: Dimensions,
    pub analysis_parameters: AnalysisParameters,
    pub timestamp: String,
    #[serde(flatten)]
    pub summary: Summary,
}

/// Local wall-clock time with microseconds and no UTC offset.
pub fn local_timestamp(now: &chrono::DateTime<chrono::Local>) -> String {
    now.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

pub fn slide_file_name(slide_path: &str) -> String {
    std::path::Path::new(slide_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| slide_path.to_string())
}

#[cfg(test)]
#[path = "../../tests/src_inline/report/mod.rs"]
mod tests;
