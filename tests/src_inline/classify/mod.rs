use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::{Rgb, RgbImage};

use crate::input::RasterSlideSource;
use crate::model::color_profile::ColorProfileModel;
use crate::model::config::ModelConfig;
use crate::report::annotations::{AnnotationPrediction, summarize_predictions};

static DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn make_temp_dir() -> PathBuf {
    let mut dir = std::env::temp_dir();
    let id = DIR_COUNTER.fetch_add(1, Ordering::SeqCst);
    dir.push(format!("kira_tissuemap_classify_{}_{}", std::process::id(), id));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

fn roi(x: f64, y: f64, width: f64, height: f64) -> Roi {
    Roi {
        x,
        y,
        width,
        height,
    }
}

fn annotation(id: serde_json::Value, slide: &str, roi: Roi) -> Annotation {
    Annotation {
        id,
        slide_path: PathBuf::from(slide),
        roi,
        image_name: "slide".to_string(),
    }
}

fn model() -> ColorProfileModel {
    let mut profiles = std::collections::HashMap::new();
    profiles.insert("Fat".to_string(), [250.0, 245.0, 240.0]);
    profiles.insert("Muscle".to_string(), [190.0, 50.0, 90.0]);
    ColorProfileModel::from_config(&ModelConfig {
        class_names: vec!["Fat".to_string(), "Muscle".to_string()],
        color_profiles: profiles,
        temperature: 0.05,
        class_colors: std::collections::HashMap::new(),
    })
    .unwrap()
}

// Left half pale (fat-like), right half dark pink (muscle-like).
fn open_test_slide(path: &Path) -> Arc<dyn SlideSource> {
    if path == Path::new("two_tissue.png") {
        let img = RgbImage::from_fn(400, 200, |x, _| {
            if x < 200 {
                Rgb([250, 245, 240])
            } else {
                Rgb([190, 50, 90])
            }
        });
        Arc::new(RasterSlideSource::from_image(path, img))
    } else {
        Arc::new(RasterSlideSource::new(path))
    }
}

fn params() -> ClassifyParams {
    ClassifyParams {
        model_type: ModelType::Colorectal,
        context_size: 50,
        max_retries: 0,
    }
}

#[test]
fn test_context_window_centres_and_clamps() {
    let dims = SlideDimensions {
        width: 3000,
        height: 2000,
    };
    assert_eq!(context_window(&roi(1400.0, 900.0, 200.0, 200.0), dims, 1120), (940, 440));
    assert_eq!(context_window(&roi(10.0, 10.0, 20.0, 20.0), dims, 1120), (0, 0));
    assert_eq!(
        context_window(&roi(2890.0, 1940.0, 20.0, 20.0), dims, 1120),
        (1880, 880)
    );
    let small = SlideDimensions {
        width: 500,
        height: 500,
    };
    assert_eq!(context_window(&roi(200.0, 200.0, 10.0, 10.0), small, 1120), (0, 0));
}

#[test]
fn test_top_predictions_order_and_cutoff() {
    let classes = ClassList::new(
        ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect(),
    )
    .unwrap();
    let palette = Palette::from_pairs([("B".to_string(), "#00FF00".to_string())]);

    let top = top_predictions(&[0.005, 0.6, 0.3, 0.095], &classes, &palette);
    let names = top.iter().map(|t| t.class_name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["B", "C", "D"]);
    assert_eq!(top[0].color, "#00FF00");
    assert_eq!(top[1].color, "#808080");
    assert_eq!(top[2].probability, 0.095);

    // 0.01 itself is not above the cutoff.
    let top = top_predictions(&[0.98, 0.005, 0.01, 0.005], &classes, &palette);
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].class_name, "A");
}

#[test]
fn test_run_classify_writes_outputs_and_null_records() {
    let out = make_temp_dir();
    let model = model();
    let palette = Palette::for_model(ModelType::Colorectal);
    let annotations = vec![
        annotation(serde_json::json!("fat-1"), "two_tissue.png", roi(50.0, 50.0, 20.0, 20.0)),
        annotation(serde_json::json!(2), "two_tissue.png", roi(300.0, 100.0, 10.0, 10.0)),
        annotation(
            serde_json::json!("lost"),
            "missing_slide.tiff",
            roi(0.0, 0.0, 10.0, 10.0),
        ),
    ];

    let outcome =
        run_classify(&annotations, open_test_slide, &model, &palette, &params(), &out).unwrap();
    assert_eq!(outcome.summary.total_annotations, 3);
    assert_eq!(outcome.summary.successful_classifications, 2);

    let info = read_json(&outcome.paths.model_info);
    assert_eq!(info["model_type"], "colorectal");
    assert_eq!(info["color_scheme"]["Fat"], "#FFD700");
    assert_eq!(
        fs::read_to_string(&outcome.paths.classes).unwrap(),
        r#"["Fat","Muscle"]"#
    );

    let predictions = read_json(&outcome.paths.predictions);
    let records = predictions.as_array().unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0]["id"], "fat-1");
    assert_eq!(records[0]["prediction"], "Fat");
    assert_eq!(records[0]["probabilities"]["Fat"], 1.0);
    assert_eq!(records[0]["top_predictions"][0]["class"], "Fat");
    assert_eq!(records[0]["top_predictions"][0]["color"], "#FFD700");
    assert_eq!(records[0]["image_name"], "slide");
    assert_eq!(records[1]["id"], 2);
    assert_eq!(records[1]["prediction"], "Muscle");
    assert_eq!(records[2]["id"], "lost");
    assert!(records[2]["prediction"].is_null());
    assert!(records[2]["probabilities"].is_null());
    assert!(records[2]["top_predictions"].is_null());
    assert!(records[2].get("confidence").is_none());

    let summary = read_json(&outcome.paths.summary);
    assert_eq!(summary["class_distribution"]["Fat"], 1);
    assert_eq!(summary["class_distribution"]["Muscle"], 1);
    assert_eq!(summary["average_confidence"], 1.0);

    assert!(outcome.paths.history.ends_with("prediction_history_colorectal.jsonl"));
    let history = fs::read_to_string(&outcome.paths.history).unwrap();
    assert_eq!(history.lines().count(), 2);

    // The history log keeps earlier runs.
    let again =
        run_classify(&annotations, open_test_slide, &model, &palette, &params(), &out).unwrap();
    let history = fs::read_to_string(&again.paths.history).unwrap();
    assert_eq!(history.lines().count(), 4);
}

#[test]
fn test_window_larger_than_slide_fails_only_that_annotation() {
    let out = make_temp_dir();
    let model = model();
    let palette = Palette::for_model(ModelType::Colorectal);
    let annotations = vec![annotation(
        serde_json::json!(1),
        "two_tissue.png",
        roi(10.0, 10.0, 5.0, 5.0),
    )];
    let params = ClassifyParams {
        context_size: 1120,
        ..params()
    };
    let outcome =
        run_classify(&annotations, open_test_slide, &model, &palette, &params, &out).unwrap();
    assert_eq!(outcome.summary.successful_classifications, 0);
    let summary = read_json(&outcome.paths.summary);
    assert!(summary.get("class_distribution").is_none());
    assert!(summary.get("average_confidence").is_none());
}

struct BrokenLoader {
    classes: ClassList,
}

impl ModelLoader for BrokenLoader {
    fn class_list(&self) -> &ClassList {
        &self.classes
    }

    fn load_worker(&self) -> Result<Box<dyn PatchClassifier>, ModelError> {
        Err(ModelError::Invalid("weights missing".to_string()))
    }
}

#[test]
fn test_model_load_failure_is_fatal() {
    let out = make_temp_dir();
    let loader = BrokenLoader {
        classes: ClassList::new(vec!["A".to_string()]).unwrap(),
    };
    let palette = Palette::for_model(ModelType::Colorectal);
    let err = run_classify(&[], open_test_slide, &loader, &palette, &params(), &out).unwrap_err();
    assert!(matches!(err, ClassifyError::Model(_)));
    assert!(!out.join("predictions.json").exists());
}

#[test]
fn test_summary_counts_in_first_seen_order() {
    let ok = |id: i64, class: &str, confidence: f64| AnnotationPrediction {
        id: serde_json::json!(id),
        prediction: Some(class.to_string()),
        probabilities: None,
        top_predictions: None,
        details: Some(PredictionDetails {
            timestamp: String::new(),
            image_name: "unknown".to_string(),
            model_type: "skin".to_string(),
            confidence,
        }),
    };
    let records = vec![
        ok(1, "Dermis", 0.9),
        AnnotationPrediction::failed(serde_json::json!(2)),
        ok(3, "Epidermis", 0.6),
        ok(4, "Dermis", 0.75),
    ];
    let summary = summarize_predictions(&records, "skin", "t".to_string());
    let json = serde_json::to_string(&summary).unwrap();
    assert_eq!(
        json,
        r#"{"total_annotations":4,"successful_classifications":3,"model_type":"skin","timestamp":"t","class_distribution":{"Dermis":2,"Epidermis":1},"average_confidence":0.75}"#
    );
}
