use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::features::FeatureLayout;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub models: ModelConfig,
    pub features: FeatureLayout,
    pub detection: DetectionConfig,
    pub storage: StorageConfig,
    pub defaults: Defaults,
    pub ui: UiConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub face_detection_path: String,
    pub face_mesh_path: String,
    /// Without a hand model both hands always read as absent.
    pub hand_landmark_path: Option<String>,
    pub emotion_model_path: String,
    pub labels_path: String,
    /// Use the built-in 7-label order when the label file can't be read.
    pub allow_default_labels: bool,
    pub intra_threads: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub face_score_threshold: f32,
    pub hand_presence_threshold: f32,
    /// Minimum top score for a classification to count. `None` accepts any arg-max.
    pub min_confidence: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub state_path: String,
    pub history_path: String,
    /// Saved language/artist per user.
    pub preferences_path: String,
    pub record_history: bool,
    /// Skip recording a detection identical to the previous one recorded.
    pub dedupe_history: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub show_mesh: bool,
    pub show_hands: bool,
    pub show_label: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub menu_scale: usize,
    pub font_size_pt: u32,
    pub font_family: String,
    pub mesh_dot_size: u32,
    pub mesh_color_hex: String,
    pub hand_color_hex: String,
    pub label_color_hex: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` wins when set.
    pub filter: String,
    pub json: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            face_detection_path: "models/face_detection.onnx".to_string(),
            face_mesh_path: "models/face_mesh.onnx".to_string(),
            hand_landmark_path: Some("models/hand_landmark.onnx".to_string()),
            emotion_model_path: "models/emotion.onnx".to_string(),
            labels_path: "models/labels.npy".to_string(),
            allow_default_labels: false,
            intra_threads: 4,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            face_score_threshold: 0.7,
            hand_presence_threshold: 0.5,
            min_confidence: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: "emotion_state.json".to_string(),
            history_path: "emotion_history.jsonl".to_string(),
            preferences_path: "user_prefs.json".to_string(),
            record_history: true,
            dedupe_history: true,
        }
    }
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            show_mesh: true,
            show_hands: true,
            show_label: true,
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            menu_scale: 2,
            font_size_pt: 28,
            font_family: "Monospace".to_string(),
            mesh_dot_size: 2,
            mesh_color_hex: "#FF0000".to_string(),
            hand_color_hex: "#00FF00".to_string(),
            label_color_hex: "#0000FF".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "emotune=info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    pub const PATH: &'static str = "config.json";

    pub fn load() -> Result<Self> {
        Self::load_from(Self::PATH)
    }

    /// Read `path`, filling missing fields with defaults, and write the merged config back so
    /// new fields show up in the file. An unparseable file is left untouched and defaults are
    /// used for this run.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "configuration file not found, creating default");
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => {
                info!(path = %path.display(), "loaded configuration");
                config.save_to(path)?;
                Ok(config)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "error parsing config, using defaults (file left unchanged)");
                Ok(Self::default())
            }
        }
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), content)
            .with_context(|| format!("writing {}", path.as_ref().display()))?;
        Ok(())
    }
}
