use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::model::ClassList;
use crate::pipeline::stage2_dispatch::PatchResult;

pub const PRESENCE_THRESHOLD_PCT: f64 = 5.0;
pub const HIGH_CONFIDENCE: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassCount {
    pub count: usize,
    pub percentage: f64,
}

/// Per-class counts in class-list order. Serialised as a JSON object whose
/// keys keep that order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClassDistribution {
    entries: Vec<(String, ClassCount)>,
}

impl ClassDistribution {
    #[cfg(test)]
    pub fn get(&self, class_name: &str) -> Option<&ClassCount> {
        self.entries
            .iter()
            .find(|(name, _)| name == class_name)
            .map(|(_, c)| c)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ClassCount)> {
        self.entries.iter().map(|(n, c)| (n.as_str(), c))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Classes with at least one patch, by percentage descending. Ties keep
    /// class-list order.
    pub fn ranked(&self) -> Vec<(&str, &ClassCount)> {
        let mut out = self.iter().filter(|(_, c)| c.count > 0).collect::<Vec<_>>();
        out.sort_by(|a, b| {
            b.1.percentage
                .partial_cmp(&a.1.percentage)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        out
    }
}

impl Serialize for ClassDistribution {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, count) in &self.entries {
            map.serialize_entry(name, count)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Centroid {
    pub x: i64,
    pub y: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HighConfidenceRegion {
    #[serde(rename = "class")]
    pub class_name: String,
    pub patch_count: usize,
    pub centroid: Centroid,
    pub average_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub class_distribution: ClassDistribution,
    pub high_confidence_regions: Vec<HighConfidenceRegion>,
}

pub fn run_stage6(results: &[PatchResult], classes: &ClassList) -> Summary {
    let class_distribution = class_distribution(results, classes);
    let high_confidence_regions = high_confidence_regions(results, &class_distribution);
    Summary {
        class_distribution,
        high_confidence_regions,
    }
}

pub fn class_distribution(results: &[PatchResult], classes: &ClassList) -> ClassDistribution {
    let total = results.len();
    let entries = classes
        .names()
        .iter()
        .map(|name| {
            let count = results.iter().filter(|r| &r.prediction == name).count();
            let percentage = if total > 0 {
                round_to(100.0 * count as f64 / total as f64, 2)
            } else {
                0.0
            };
            (name.clone(), ClassCount { count, percentage })
        })
        .collect();
    ClassDistribution { entries }
}

pub fn high_confidence_regions(
    results: &[PatchResult],
    distribution: &ClassDistribution,
) -> Vec<HighConfidenceRegion> {
    let mut out = Vec::new();
    for (name, stats) in distribution.iter() {
        if stats.percentage <= PRESENCE_THRESHOLD_PCT {
            continue;
        }
        let subset = results
            .iter()
            .filter(|r| r.prediction == name && r.confidence as f64 > HIGH_CONFIDENCE)
            .collect::<Vec<_>>();
        if subset.is_empty() {
            continue;
        }
        let n = subset.len() as f64;
        let mean_x = subset.iter().map(|r| r.x as f64).sum::<f64>() / n;
        let mean_y = subset.iter().map(|r| r.y as f64).sum::<f64>() / n;
        let mean_conf = subset.iter().map(|r| r.confidence as f64).sum::<f64>() / n;
        out.push(HighConfidenceRegion {
            class_name: name.to_string(),
            patch_count: subset.len(),
            centroid: Centroid {
                x: mean_x.trunc() as i64,
                y: mean_y.trunc() as i64,
            },
            average_confidence: round_to(mean_conf, 3),
        });
    }
    out
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage6_summary.rs"]
mod tests;
