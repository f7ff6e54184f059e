use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

/// Tunables for the per-frame analysis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisSettings {
    /// A chain is used only when hip, knee and ankle all exceed this.
    pub visibility_threshold: f64,
    /// Used when a request omits the frame rate.
    pub default_fps: f64,
    pub frame_prefix: String,
    pub frame_extension: String,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            visibility_threshold: 0.5,
            default_fps: 24.0,
            frame_prefix: "Frame_".into(),
            frame_extension: "png".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageSettings {
    /// Parent of every per-session directory.
    pub storage_root: PathBuf,
    /// Leave session directories on disk when the service shuts down.
    pub keep_sessions_on_shutdown: bool,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            storage_root: std::env::temp_dir().join("gaitscope"),
            keep_sessions_on_shutdown: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelSettings {
    pub model_path: PathBuf,
    pub scaler_path: PathBuf,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/phase_model.json"),
            scaler_path: PathBuf::from("models/scaler.json"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UserSettings {
    pub analysis: AnalysisSettings,
    pub storage: StorageSettings,
    pub model: ModelSettings,
}

/// Settings read once at startup. Components copy what they need when the
/// service is built, so there is no runtime update path.
pub struct SettingsStore {
    data: UserSettings,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Malformed settings in {}", path.display()))?
        } else {
            UserSettings::default()
        };

        Ok(Self { data })
    }

    pub fn snapshot(&self) -> UserSettings {
        self.data.clone()
    }

    pub fn analysis(&self) -> AnalysisSettings {
        self.snapshot().analysis
    }

    pub fn storage(&self) -> StorageSettings {
        self.snapshot().storage
    }

    pub fn model(&self) -> ModelSettings {
        self.snapshot().model
    }
}
