use image::RgbImage;

use crate::model::config::ModelConfig;
use crate::model::{ClassList, ModelError, ModelLoader, PatchClassifier};

// Stand-in for the external network: each class carries a reference mean
// colour and a patch is scored by softmax over negative squared distances
// between its mean colour and every reference.
#[derive(Debug, Clone)]
pub struct ColorProfileModel {
    classes: ClassList,
    profiles: Vec<[f32; 3]>,
    temperature: f32,
}

impl ColorProfileModel {
    pub fn from_config(config: &ModelConfig) -> Result<Self, ModelError> {
        let classes = ClassList::new(config.class_names.clone())?;
        let mut profiles = Vec::with_capacity(classes.len());
        for name in classes.names() {
            let rgb = config.color_profiles.get(name).ok_or_else(|| {
                ModelError::Invalid(format!("no color profile for class '{name}'"))
            })?;
            profiles.push([rgb[0] / 255.0, rgb[1] / 255.0, rgb[2] / 255.0]);
        }
        if !(config.temperature > 0.0) {
            return Err(ModelError::Invalid(format!(
                "temperature must be positive, got {}",
                config.temperature
            )));
        }
        Ok(Self {
            classes,
            profiles,
            temperature: config.temperature,
        })
    }

    pub fn probabilities(&self, patch: &RgbImage) -> Result<Vec<f32>, ModelError> {
        let mean = mean_rgb(patch)
            .ok_or_else(|| ModelError::Inference("empty patch".to_string()))?;
        let logits = self
            .profiles
            .iter()
            .map(|p| {
                let d = (0..3).map(|c| (mean[c] - p[c]).powi(2)).sum::<f32>();
                -d / self.temperature
            })
            .collect::<Vec<_>>();
        Ok(softmax(&logits))
    }
}

impl ModelLoader for ColorProfileModel {
    fn class_list(&self) -> &ClassList {
        &self.classes
    }

    fn load_worker(&self) -> Result<Box<dyn PatchClassifier>, ModelError> {
        Ok(Box::new(self.clone()))
    }
}

impl PatchClassifier for ColorProfileModel {
    fn predict(&mut self, patch: &RgbImage) -> Result<Vec<f32>, ModelError> {
        self.probabilities(patch)
    }
}

fn mean_rgb(patch: &RgbImage) -> Option<[f32; 3]> {
    let n = patch.width() as u64 * patch.height() as u64;
    if n == 0 {
        return None;
    }
    let mut acc = [0u64; 3];
    for px in patch.pixels() {
        for c in 0..3 {
            acc[c] += px.0[c] as u64;
        }
    }
    Some(acc.map(|v| v as f32 / n as f32 / 255.0))
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps = logits.iter().map(|&l| (l - max).exp()).collect::<Vec<_>>();
    let total: f32 = exps.iter().sum();
    if total > 0.0 && total.is_finite() {
        exps.iter().map(|e| e / total).collect()
    } else {
        vec![1.0 / logits.len().max(1) as f32; logits.len()]
    }
}
