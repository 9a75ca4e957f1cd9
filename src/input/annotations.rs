use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum AnnotationError {
    #[error("failed to read annotations {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid annotations file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Annotated rectangle in level-0 slide pixels. Fractional values are
/// truncated toward zero before use.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Roi {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Roi {
    pub fn center(&self) -> (i64, i64) {
        let x = self.x.trunc() as i64;
        let y = self.y.trunc() as i64;
        let w = self.width.trunc() as i64;
        let h = self.height.trunc() as i64;
        (x + w.div_euclid(2), y + h.div_euclid(2))
    }
}

/// One entry of the annotations export. `id` is echoed back verbatim, so it
/// may be a string or a number.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Annotation {
    pub id: serde_json::Value,
    pub slide_path: PathBuf,
    pub roi: Roi,
    #[serde(default = "unknown_image")]
    pub image_name: String,
}

fn unknown_image() -> String {
    "unknown".to_string()
}

pub fn load_annotations(path: &Path) -> Result<Vec<Annotation>, AnnotationError> {
    let file = File::open(path).map_err(|source| AnnotationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| AnnotationError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
#[path = "../../tests/src_inline/input/annotations.rs"]
mod tests;
