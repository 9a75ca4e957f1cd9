use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::model::ModelError;

pub const CONFIG_FILE: &str = "config.json";

/// Subset of the model directory's `config.json` this tool reads. Unknown
/// keys are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub class_names: Vec<String>,
    /// Reference mean colour per class (`[r, g, b]`, 0..=255).
    #[serde(default)]
    pub color_profiles: HashMap<String, [f32; 3]>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Optional `#RRGGBB` overrides for the built-in palette.
    #[serde(default)]
    pub class_colors: HashMap<String, String>,
}

fn default_temperature() -> f32 {
    0.05
}

impl ModelConfig {
    pub fn load(model_dir: &Path) -> Result<Self, ModelError> {
        let path = config_path(model_dir);
        let file = File::open(&path).map_err(|source| ModelError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|source| ModelError::Config { path, source })
    }
}

pub fn config_path(model_dir: &Path) -> PathBuf {
    model_dir.join(CONFIG_FILE)
}
