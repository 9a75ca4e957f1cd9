use std::fmt::Write;

use crate::model::palette::Palette;
use crate::report::{AnalysisSummary, slide_file_name};

pub const OVERVIEW_PNG: &str = "classification_overview.png";
pub const HEATMAPS_PNG: &str = "class_heatmaps.png";

const STYLE: &str = "\
        body { font-family: Arial, sans-serif; margin: 20px; }
        h1, h2 { color: #2c3e50; }
        .overview { display: flex; gap: 20px; margin: 20px 0; }
        .stat-box { background: #f0f0f0; padding: 15px; border-radius: 5px; }
        .distribution-table { border-collapse: collapse; width: 100%; }
        .distribution-table th, .distribution-table td { border: 1px solid #ddd; padding: 8px; text-align: left; }
        .distribution-table th { background-color: #3498db; color: white; }
        .color-box { display: inline-block; width: 20px; height: 20px; margin-right: 5px; vertical-align: middle; }
        img { max-width: 100%; height: auto; }
";

pub fn render_report_html(data: &AnalysisSummary, palette: &Palette, generated_on: &str) -> String {
    let mut out = String::new();
    let title = escape(&data.analysis_type);
    let params = &data.analysis_parameters;

    out.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n");
    let _ = writeln!(out, "<title>{title} Report</title>");
    let _ = write!(out, "<style>\n{STYLE}</style>\n</head>\n<body>\n");
    let _ = writeln!(out, "<h1>{title} Report</h1>");
    let _ = writeln!(out, "<p>Generated on: {}</p>", escape(generated_on));

    out.push_str("<div class=\"overview\">\n<div class=\"stat-box\">\n<h3>Slide Information</h3>\n");
    let _ = writeln!(out, "<p>File: {}</p>", escape(&slide_file_name(&data.slide_path)));
    let _ = writeln!(
        out,
        "<p>Dimensions: {} &times; {} pixels</p>",
        data.slide_dimensions.width, data.slide_dimensions.height
    );
    out.push_str("</div>\n<div class=\"stat-box\">\n<h3>Analysis Parameters</h3>\n");
    let _ = writeln!(out, "<p>Model: {}</p>", escape(&data.model_type.to_uppercase()));
    let _ = writeln!(out, "<p>Patches analyzed: {}</p>", params.total_patches);
    let _ = writeln!(
        out,
        "<p>Patch size: {0} &times; {0} pixels</p>",
        params.patch_size
    );
    let _ = writeln!(out, "<p>Stride: {} pixels</p>", params.patch_stride);
    out.push_str("</div>\n</div>\n");

    out.push_str("<h2>Classification Overview</h2>\n");
    let _ = writeln!(out, "<img src=\"{OVERVIEW_PNG}\" alt=\"Classification Overview\">");

    out.push_str("<h2>Class Distribution</h2>\n<table class=\"distribution-table\">\n");
    out.push_str("<tr><th>Class</th><th>Color</th><th>Count</th><th>Percentage</th></tr>\n");
    for (name, stats) in data.summary.class_distribution.ranked() {
        let _ = writeln!(
            out,
            "<tr><td>{}</td><td><span class=\"color-box\" style=\"background-color: {};\"></span></td><td>{}</td><td>{:.1}%</td></tr>",
            escape(name),
            palette.hex(name),
            stats.count,
            stats.percentage
        );
    }
    out.push_str("</table>\n");

    out.push_str("<h2>Class-Specific Heatmaps</h2>\n");
    let _ = writeln!(out, "<img src=\"{HEATMAPS_PNG}\" alt=\"Class Heatmaps\">");

    out.push_str("<h2>High-Confidence Regions</h2>\n<ul>\n");
    for region in &data.summary.high_confidence_regions {
        let _ = writeln!(
            out,
            "<li><strong>{}</strong>: {} high-confidence patches (avg. confidence: {:.1}%) centered around ({}, {})</li>",
            escape(&region.class_name),
            region.patch_count,
            region.average_confidence * 100.0,
            region.centroid.x,
            region.centroid.y
        );
    }
    out.push_str("</ul>\n</body>\n</html>\n");
    out
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
