use crate::pipeline::stage2_dispatch::PatchResult;
use crate::report::{AnalysisSummary, ReportError};

pub fn render_summary_json(summary: &AnalysisSummary) -> Result<String, ReportError> {
    serde_json::to_string_pretty(summary).map_err(|source| ReportError::Json {
        what: "analysis summary",
        source,
    })
}

pub fn render_predictions_json(results: &[PatchResult]) -> Result<String, ReportError> {
    serde_json::to_string(results).map_err(|source| ReportError::Json {
        what: "patch predictions",
        source,
    })
}
