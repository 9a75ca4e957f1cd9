use std::path::PathBuf;
use std::sync::Arc;

use image::RgbImage;

pub mod color_profile;
pub mod config;
pub mod palette;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid model config {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("model declares no classes")]
    NoClasses,
    #[error("invalid model: {0}")]
    Invalid(String),
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Ordered class names, fixed for the whole run. Every probability vector is
/// positionally aligned to this list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassList {
    names: Arc<[String]>,
}

impl ClassList {
    pub fn new(names: Vec<String>) -> Result<Self, ModelError> {
        if names.is_empty() {
            return Err(ModelError::NoClasses);
        }
        Ok(Self {
            names: names.into(),
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn name(&self, idx: usize) -> Option<&str> {
        self.names.get(idx).map(String::as_str)
    }
}

pub trait PatchClassifier {
    /// Class probabilities for one patch, aligned to the loader's class list.
    fn predict(&mut self, patch: &RgbImage) -> Result<Vec<f32>, ModelError>;
}

pub trait ModelLoader: Send + Sync {
    fn class_list(&self) -> &ClassList;

    /// Per-worker initialisation hook: every worker thread gets its own
    /// classifier instance.
    fn load_worker(&self) -> Result<Box<dyn PatchClassifier>, ModelError>;
}
