use super::*;

fn classes(names: &[&str]) -> ClassList {
    ClassList::new(names.iter().map(|s| s.to_string()).collect()).unwrap()
}

fn result(x: u32, y: u32, prediction: &str, confidence: f32) -> PatchResult {
    PatchResult {
        index: 0,
        x,
        y,
        prediction: prediction.to_string(),
                probabilities: vec![confidence],
        confidence,
    }
}

#[test]
fn test_distribution_counts_and_percentages() {
    let list = classes(&["X", "W", "V"]);
    let mut results = Vec::new();
    for _ in 0..6 {
        results.push(result(0, 0, "X", 0.5));
    }
    for _ in 0..4 {
        results.push(result(0, 0, "W", 0.5));
    }
    let dist = class_distribution(&results, &list);
    assert_eq!(
        dist.get("X"),
        Some(&ClassCount {
            count: 6,
            percentage: 60.0
        })
    );
    assert_eq!(
        dist.get("V"),
        Some(&ClassCount {
            count: 0,
            percentage: 0.0
        })
    );
    assert_eq!(dist.len(), 3);
    let ranked = dist.ranked().iter().map(|(n, _)| *n).collect::<Vec<_>>();
    assert_eq!(ranked, vec!["X", "W"]);
}

#[test]
fn test_empty_results_are_zero() {
    let list = classes(&["X", "Y"]);
    let summary = run_stage6(&[], &list);
    for (_, c) in summary.class_distribution.iter() {
        assert_eq!(c.count, 0);
        assert_eq!(c.percentage, 0.0);
    }
    assert!(summary.high_confidence_regions.is_empty());
}

#[test]
fn test_high_confidence_centroid_and_threshold() {
    let list = classes(&["X", "Y", "Z"]);
    let mut results = vec![
        result(0, 0, "Y", 0.85),
        result(10, 10, "Y", 0.9),
        result(20, 20, "Y", 0.95),
        result(500, 500, "Z", 0.99),
        result(600, 600, "Z", 0.99),
    ];
    for _ in 0..45 {
        results.push(result(0, 0, "X", 0.5));
    }
    let summary = run_stage6(&results, &list);
    assert_eq!(summary.class_distribution.get("Y").unwrap().percentage, 6.0);
    assert_eq!(summary.class_distribution.get("Z").unwrap().percentage, 4.0);

    assert_eq!(summary.high_confidence_regions.len(), 1);
    let region = &summary.high_confidence_regions[0];
    assert_eq!(region.class_name, "Y");
    assert_eq!(region.patch_count, 3);
    assert_eq!(region.centroid, Centroid { x: 10, y: 10 });
    assert_eq!(region.average_confidence, 0.9);
}

#[test]
fn test_low_confidence_class_has_no_region() {
    let list = classes(&["X"]);
    let results = vec![result(0, 0, "X", 0.79), result(4, 4, "X", 0.2)];
    let summary = run_stage6(&results, &list);
    assert!(summary.high_confidence_regions.is_empty());
}

#[test]
fn test_confidence_of_exactly_point_eight_counts() {
    // 0.8f32 widens to 0.800000011920929, which is above the 0.8 threshold.
    let list = classes(&["X"]);
    let results = vec![result(0, 0, "X", 0.8), result(8, 8, "X", 0.8)];
    let summary = run_stage6(&results, &list);
    assert_eq!(summary.high_confidence_regions.len(), 1);
    let region = &summary.high_confidence_regions[0];
    assert_eq!(region.patch_count, 2);
    assert_eq!(region.centroid, Centroid { x: 4, y: 4 });
    assert_eq!(region.average_confidence, 0.8);
}

#[test]
fn test_centroid_truncates() {
    let list = classes(&["X"]);
    let results = vec![result(0, 0, "X", 0.9), result(1, 3, "X", 0.9)];
    let summary = run_stage6(&results, &list);
    assert_eq!(summary.high_confidence_regions[0].centroid, Centroid { x: 0, y: 1 });
}

#[test]
fn test_failed_patches_excluded_from_denominator() {
    // 90 surviving results of 100 dispatched: percentages are over 90.
    let list = classes(&["X", "Y"]);
    let mut results = Vec::new();
    for i in 0..90 {
        let class = if i < 45 { "X" } else { "Y" };
        results.push(result(0, 0, class, 0.5));
    }
    let dist = class_distribution(&results, &list);
    assert_eq!(dist.get("X").unwrap().percentage, 50.0);
}

#[test]
fn test_distribution_serialises_in_class_order() {
    let list = classes(&["Zeta", "Alpha"]);
    let dist = class_distribution(&[result(0, 0, "Alpha", 0.9)], &list);
    let json = serde_json::to_string(&dist).unwrap();
    assert_eq!(
        json,
        r#"{"Zeta":{"count":0,"percentage":0.0},"Alpha":{"count":1,"percentage":100.0}}"#
    );
}
