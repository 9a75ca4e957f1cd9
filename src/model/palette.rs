use std::collections::HashMap;
use std::path::Path;

pub const FALLBACK_COLOR: &str = "#808080";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ModelType {
    Colorectal,
    Skin,
    Thorax,
}

impl ModelType {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelType::Colorectal => "colorectal",
            ModelType::Skin => "skin",
            ModelType::Thorax => "thorax",
        }
    }

    pub fn analysis_name(self) -> &'static str {
        match self {
            ModelType::Colorectal => "SPIDER Colorectal Analysis",
            ModelType::Skin => "SPIDER Skin Analysis",
            ModelType::Thorax => "SPIDER Thorax Analysis",
        }
    }

    /// Detects the model family from the model directory name. Unknown paths
    /// fall back to colorectal.
    pub fn detect(model_path: &Path) -> (ModelType, bool) {
        let lower = model_path.to_string_lossy().to_ascii_lowercase();
        if lower.contains("colorectal") {
            (ModelType::Colorectal, true)
        } else if lower.contains("skin") {
            (ModelType::Skin, true)
        } else if lower.contains("thorax") {
            (ModelType::Thorax, true)
        } else {
            (ModelType::Colorectal, false)
        }
    }
}

#[derive(Debug, Clone)]
pub struct Palette {
    colors: HashMap<String, String>,
}

impl Palette {
    pub fn for_model(model_type: ModelType) -> Self {
        let entries: &[(&str, &str)] = match model_type {
            ModelType::Colorectal => &[
                ("Adenocarcinoma high grade", "#DC143C"),
                ("Adenocarcinoma low grade", "#FF4500"),
                ("Adenoma high grade", "#FF8C00"),
                ("Adenoma low grade", "#FFA500"),
                ("Fat", "#FFD700"),
                ("Hyperplastic polyp", "#008000"),
                ("Inflammation", "#FFFF00"),
                ("Mucus", "#00BFFF"),
                ("Muscle", "#8B008B"),
                ("Necrosis", "#800000"),
                ("Sessile serrated lesion", "#00FA9A"),
                ("Stroma healthy", "#32CD32"),
                ("Vessels", "#0000FF"),
            ],
            ModelType::Skin => &[
                ("Basal Cell Carcinoma", "#8B0000"),
                ("Melanoma invasive", "#000000"),
                ("Melanoma in situ", "#696969"),
                ("Squamous Cell Carcinoma", "#DC143C"),
                ("Epidermis", "#FFE4B5"),
                ("Dermis", "#DEB887"),
                ("Vessels", "#0000FF"),
                ("Hair follicle", "#8B4513"),
                ("Sebaceous gland", "#F0E68C"),
                ("Sweat gland", "#87CEEB"),
            ],
            ModelType::Thorax => &[
                ("Small cell carcinoma", "#800080"),
                ("Non-small cell carcinoma", "#4B0082"),
                ("Alveoli", "#87CEEB"),
                ("Vessels", "#0000FF"),
                ("Bronchus", "#8B4513"),
                ("Pleura", "#F0E68C"),
                ("Lymphoid tissue", "#9370DB"),
            ],
        };
        Self::from_pairs(entries.iter().map(|(k, v)| (k.to_string(), v.to_string())))
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            colors: pairs.into_iter().collect(),
        }
    }

    /// Entries from the model config replace the built-in colours.
    pub fn with_overrides(mut self, overrides: &HashMap<String, String>) -> Self {
        for (name, hex) in overrides {
            if parse_hex_rgb(hex).is_some() {
                self.colors.insert(name.clone(), hex.clone());
            } else {
                tracing::warn!("ignoring invalid colour {hex} for class {name}");
            }
        }
        self
    }

    /// Hex colour for a class, `#808080` when the class has no entry or its
    /// entry is not a valid `#RRGGBB` string.
    pub fn hex(&self, class_name: &str) -> &str {
        match self.colors.get(class_name) {
            Some(hex) if parse_hex_rgb(hex).is_some() => hex,
            _ => FALLBACK_COLOR,
        }
    }

    pub fn rgb(&self, class_name: &str) -> [f32; 3] {
        parse_hex_rgb(self.hex(class_name)).unwrap_or([0.5019608; 3])
    }
}

/// `#RRGGBB` to normalised `[0, 1]` components.
pub fn parse_hex_rgb(hex: &str) -> Option<[f32; 3]> {
    let digits = hex.strip_prefix('#')?;
    if digits.len() != 6 || !digits.is_ascii() {
        return None;
    }
    let mut out = [0.0f32; 3];
    for (i, slot) in out.iter_mut().enumerate() {
        let byte = u8::from_str_radix(&digits[i * 2..i * 2 + 2], 16).ok()?;
        *slot = byte as f32 / 255.0;
    }
    Some(out)
}
