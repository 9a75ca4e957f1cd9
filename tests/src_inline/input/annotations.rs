use super::*;
use std::fs;

fn temp_file(name: &str, contents: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("kira_tissuemap_annotations_{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_parse_annotations_export() {
    let path = temp_file(
        "export.json",
        r#"[
            {"id": "a-1", "slide_path": "/slides/s1.tiff",
             "roi": {"x": 100, "y": 200.7, "width": 51, "height": 40},
             "image_name": "s1"},
            {"id": 7, "slide_path": "/slides/s2.tiff",
             "roi": {"x": 0, "y": 0, "width": 10, "height": 10}}
        ]"#,
    );
    let annotations = load_annotations(&path).unwrap();
    assert_eq!(annotations.len(), 2);
    assert_eq!(annotations[0].id, serde_json::json!("a-1"));
    assert_eq!(annotations[0].image_name, "s1");
    assert_eq!(annotations[0].roi.center(), (125, 220));
    assert_eq!(annotations[1].id, serde_json::json!(7));
    assert_eq!(annotations[1].image_name, "unknown");
    assert_eq!(annotations[1].slide_path, PathBuf::from("/slides/s2.tiff"));
}

#[test]
fn test_missing_roi_is_parse_error() {
    let path = temp_file("broken.json", r#"[{"id": 1, "slide_path": "s.tiff"}]"#);
    assert!(matches!(
        load_annotations(&path),
        Err(AnnotationError::Parse { .. })
    ));
}

#[test]
fn test_missing_file_is_io_error() {
    let path = std::env::temp_dir().join("kira_tissuemap_no_such_annotations.json");
    assert!(matches!(
        load_annotations(&path),
        Err(AnnotationError::Io { .. })
    ));
}
