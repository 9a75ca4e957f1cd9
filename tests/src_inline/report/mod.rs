use super::*;
use crate::model::ClassList;
use crate::model::palette::Palette;
use crate::pipeline::stage2_dispatch::PatchResult;
use crate::pipeline::stage6_summary::run_stage6;

fn result(x: u32, y: u32, prediction: &str, confidence: f32) -> PatchResult {
    PatchResult {
        index: 0,
        x,
        y,
        prediction: prediction.to_string(),
                probabilities: vec![confidence, 1.0 - confidence],
        confidence,
    }
}

fn summary() -> AnalysisSummary {
    let classes = ClassList::new(vec!["Fat".to_string(), "<Mucus>".to_string()]).unwrap();
    let results = vec![
        result(0, 0, "Fat", 0.9),
        result(100, 100, "Fat", 0.95),
        result(200, 0, "<Mucus>", 0.6),
    ];
    AnalysisSummary {
        analysis_type: "SPIDER Colorectal Analysis".to_string(),
        model_type: "colorectal".to_string(),
        slide_path: "/data/slides/case 1.svs".to_string(),
        slide_dimensions: Dimensions {
            width: 4000,
            height: 3000,
        },
        analysis_parameters: AnalysisParameters {
            patch_size: 1120,
            patch_stride: 560,
            total_patches: results.len(),
            max_patches: 1000,
        },
        timestamp: "2026-01-01T00:00:00+00:00".to_string(),
        summary: run_stage6(&results, &classes),
    }
}

#[test]
fn test_summary_json_contract() {
    let json = json::render_summary_json(&summary()).unwrap();
    let v: serde_json::Value = serde_json::from_str(&json).unwrap();
    for key in [
        "analysis_type",
        "model_type",
        "slide_path",
        "slide_dimensions",
        "analysis_parameters",
        "timestamp",
        "class_distribution",
        "high_confidence_regions",
    ] {
        assert!(v.get(key).is_some(), "missing key {key}");
    }
    assert_eq!(v["slide_dimensions"]["width"], 4000);
    assert_eq!(v["analysis_parameters"]["total_patches"], 3);
    assert_eq!(v["class_distribution"]["Fat"]["count"], 2);
    assert_eq!(v["high_confidence_regions"][0]["class"], "Fat");
    assert_eq!(v["high_confidence_regions"][0]["centroid"]["x"], 50);
}

#[test]
fn test_predictions_json_fields() {
    let json = json::render_predictions_json(&[result(5, 6, "Fat", 0.75)]).unwrap();
    let v: serde_json::Value = serde_json::from_str(&json).unwrap();
    let rec = &v[0];
    assert_eq!(rec["x"], 5);
    assert_eq!(rec["y"], 6);
    assert_eq!(rec["prediction"], "Fat");
    assert_eq!(rec["confidence"], 0.75);
    assert_eq!(rec["probabilities"].as_array().unwrap().len(), 2);
    assert!(rec.get("index").is_none());
}

#[test]
fn test_html_report_escapes_and_orders() {
    let palette = Palette::from_pairs([("Fat".to_string(), "#FFD700".to_string())]);
    let html = html::render_report_html(&summary(), &palette, "2026-01-01 00:00:00");
    assert!(html.contains("<title>SPIDER Colorectal Analysis Report</title>"));
    assert!(html.contains("File: case 1.svs"));
    assert!(html.contains("&lt;Mucus&gt;"));
    assert!(!html.contains("<Mucus>"));
    assert!(html.contains("background-color: #FFD700;"));
    assert!(html.contains("background-color: #808080;"));
    let fat = html.find("<td>Fat</td>").unwrap();
    let mucus = html.find("<td>&lt;Mucus&gt;</td>").unwrap();
    assert!(fat < mucus);
    assert!(html.contains("avg. confidence: 92.5%"));
    assert!(html.contains("centered around (50, 50)"));
}

#[test]
fn test_slide_file_name() {
    assert_eq!(slide_file_name("/a/b/slide.svs"), "slide.svs");
    assert_eq!(slide_file_name("slide.svs"), "slide.svs");
}
