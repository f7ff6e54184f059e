pub mod error;
pub mod gait;
pub mod models;
pub mod pipeline;
pub mod pose;
pub mod render;
pub mod session;
pub mod settings;
pub mod utils;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use gait::{BilateralExtractor, FeatureScaler, LinearPhaseModel, PhaseAnnotator, PhaseClassifier};
use pipeline::FrameProcessor;
use pose::SidecarPoseEstimator;
use session::{CleanupReport, SessionManager};
use settings::SettingsStore;

/// Shared service state handed to every command.
pub struct AppState {
    pub(crate) sessions: SessionManager,
    pub(crate) settings: SettingsStore,
}

impl AppState {
    /// Load settings and the phase model, then build the session service.
    pub fn init(settings_path: PathBuf) -> anyhow::Result<Self> {
        utils::init_logging();
        log::info!("GaitScope starting up...");

        let settings = SettingsStore::new(settings_path)?;
        let model_settings = settings.model();

        let scaler = FeatureScaler::load(&model_settings.scaler_path)
            .with_context(|| format!("failed to load scaler {}", model_settings.scaler_path.display()))?;
        let model = LinearPhaseModel::load(&model_settings.model_path)
            .with_context(|| format!("failed to load model {}", model_settings.model_path.display()))?;
        log::info!(
            "phase model loaded: {} classes from {}",
            model.classes.len(),
            model_settings.model_path.display()
        );

        Ok(Self::with_classifier(settings, scaler, Arc::new(model)))
    }

    pub fn with_classifier(
        settings: SettingsStore,
        scaler: FeatureScaler,
        classifier: Arc<dyn PhaseClassifier>,
    ) -> Self {
        let analysis = settings.analysis();
        let storage = settings.storage();

        let processor = FrameProcessor::new(
            Arc::new(SidecarPoseEstimator::new()),
            BilateralExtractor::new(analysis.visibility_threshold),
            PhaseAnnotator::new(scaler, classifier),
        );
        let sessions = SessionManager::new(processor, analysis, storage.storage_root);

        Self { sessions, settings }
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Cancel running analyses and remove session artifacts unless the
    /// settings ask to keep them.
    pub async fn shutdown(&self) -> Vec<CleanupReport> {
        let keep = self.settings.storage().keep_sessions_on_shutdown;
        log::info!("GaitScope shutting down (keep sessions: {keep})");
        self.sessions.shutdown(keep).await
    }
}
