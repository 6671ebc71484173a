use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub models: ModelConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub face_detector: PathBuf,
    pub emotion_classifier: PathBuf,
    pub score_threshold: f32,
    pub iou_threshold: f32,
    // Square input edge of the classifier
    pub classifier_input: u32,
    pub classifier_grayscale: bool,
    /// Output order of the classifier logits.
    pub emotion_labels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub plot_size: u32,
    pub box_color_hex: String,
    pub text_color_hex: String,
    pub plot_color_hex: String,
    pub font_family: String,
    pub font_size_pt: f32,
    pub bitmap_scale: u32,
    pub key_poll_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            face_detector: PathBuf::from("models/face_detection.onnx"),
            emotion_classifier: PathBuf::from("models/emotion_ferplus.onnx"),
            score_threshold: 0.7,
            iou_threshold: 0.3,
            classifier_input: 64,
            classifier_grayscale: true,
            emotion_labels: [
                "neutral", "happiness", "surprise", "sadness", "anger", "disgust", "fear", "contempt",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            plot_size: 500,
            box_color_hex: "#00FF00".to_string(),
            text_color_hex: "#FFFF00".to_string(),
            plot_color_hex: "#1F77B4".to_string(),
            font_family: "DejaVuSans".to_string(),
            font_size_pt: 18.0,
            bitmap_scale: 3,
            key_poll_ms: 1,
        }
    }
}

impl AppConfig {
    pub const DEFAULT_PATH: &'static str = "config.json";

    /// Load `path`, falling back to defaults for missing fields or a malformed file.
    /// A missing or valid file is written back so newly added fields show up in it;
    /// a malformed one is left as it is.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("Configuration file not found. Creating default at {}", path.display());
            let config = Self::default();
            config.save(path)?;
            return Ok(config);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => {
                info!("Loaded configuration from {}", path.display());
                config.save(path)?;
                Ok(config)
            }
            Err(e) => {
                warn!("Error parsing {}: {}. Using defaults, file left unchanged.", path.display(), e);
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

/// "#RRGGBB" -> (r, g, b). Malformed input gives white.
pub fn parse_hex(hex: &str) -> (u8, u8, u8) {
    let hex = hex.trim_start_matches('#');
    if hex.len() == 6 {
        let r = u8::from_str_radix(&hex[0..2], 16).unwrap_or(255);
        let g = u8::from_str_radix(&hex[2..4], 16).unwrap_or(255);
        let b = u8::from_str_radix(&hex[4..6], 16).unwrap_or(255);
        (r, g, b)
    } else {
        (255, 255, 255)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("#FF0000"), (255, 0, 0));
        assert_eq!(parse_hex("1f77b4"), (31, 119, 180));
        assert_eq!(parse_hex("#FFF"), (255, 255, 255));
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let cfg: AppConfig = serde_json::from_str(r#"{"ui": {"plot_size": 300}}"#).unwrap();
        assert_eq!(cfg.ui.plot_size, 300);
        assert_eq!(cfg.ui.key_poll_ms, 1);
        assert_eq!(cfg.models.emotion_labels.len(), 8);
        assert_eq!(cfg.models.emotion_labels[0], "neutral");
    }

    #[test]
    fn test_load_writes_defaults_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let cfg = AppConfig::load(&path).unwrap();
        assert!(path.exists());
        assert_eq!(cfg.models.classifier_input, 64);

        let reloaded = AppConfig::load(&path).unwrap();
        assert_eq!(reloaded.models.emotion_labels, cfg.models.emotion_labels);
    }

    #[test]
    fn test_bad_json_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        let cfg = AppConfig::load(&path).unwrap();
        assert_eq!(cfg.ui.plot_size, 500);
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn test_load_fills_in_new_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"ui": {"plot_size": 300}}"#).unwrap();

        let cfg = AppConfig::load(&path).unwrap();
        assert_eq!(cfg.ui.plot_size, 300);
        let written: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["ui"]["plot_size"], 300);
        assert_eq!(written["models"]["classifier_input"], 64);
    }
}
