use std::path::PathBuf;

/// CLI configuration, loaded from environment variables.
#[derive(Debug)]
pub struct Config {
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Directory of enrollment photos.
    pub gallery_dir: PathBuf,
    /// TrueType font for annotation captions; captions render as plain tabs without one.
    pub font_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `FACEGATE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facegate");

        Self {
            model_dir: env_path(&var, "FACEGATE_MODEL_DIR")
                .unwrap_or_else(|| data_dir.join("models")),
            gallery_dir: env_path(&var, "FACEGATE_GALLERY_DIR")
                .unwrap_or_else(|| data_dir.join("enrolled")),
            font_path: env_path(&var, "FACEGATE_FONT_PATH"),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> PathBuf {
        self.model_dir.join("det_10g.onnx")
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> PathBuf {
        self.model_dir.join("w600k_r50.onnx")
    }
}

/// Empty values count as unset.
fn env_path(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<PathBuf> {
    var(key).filter(|v| !v.trim().is_empty()).map(PathBuf::from)
}
