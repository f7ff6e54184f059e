use std::path::PathBuf;

use anyhow::anyhow;

use crate::{
    error::{CommandError, SessionError},
    models::{SessionInfo, SessionSummary},
    pose::{FixedPoseEstimator, PoseEstimator},
    AppState,
};

use super::{ArtifactStream, CleanupReport, SessionManager};

const ENABLE_LOGS: bool = true;

use crate::log_info;

fn manager_from_state(state: &AppState) -> SessionManager {
    state.sessions.clone()
}

pub async fn create_session(
    state: &AppState,
    frames_dir: String,
    fps: Option<f64>,
) -> Result<SessionSummary, CommandError> {
    log_info!("create_session: {} (fps {:?})", frames_dir, fps);
    let manager = manager_from_state(state);
    manager
        .create_session(&PathBuf::from(frames_dir), fps)
        .await
        .map_err(CommandError::from)
}

pub async fn download_video(state: &AppState, session_id: String) -> Result<ArtifactStream, CommandError> {
    let manager = manager_from_state(state);
    Ok(manager.get_video(&session_id).await?)
}

pub async fn download_csv(state: &AppState, session_id: String) -> Result<ArtifactStream, CommandError> {
    let manager = manager_from_state(state);
    Ok(manager.get_csv(&session_id).await?)
}

pub async fn cleanup_session(state: &AppState, session_id: String) -> Result<CleanupReport, CommandError> {
    let manager = manager_from_state(state);
    Ok(manager.cleanup(&session_id).await?)
}

pub async fn list_sessions(state: &AppState) -> Result<Vec<SessionInfo>, CommandError> {
    let manager = manager_from_state(state);
    Ok(manager.list_sessions().await)
}

pub async fn session_info(state: &AppState, session_id: String) -> Result<SessionInfo, CommandError> {
    let manager = manager_from_state(state);
    Ok(manager.session_info(&session_id).await?)
}

/// Annotate one uploaded image; returns JPEG bytes.
///
/// `landmarks` is a `{ "pose": ... }` document in the sidecar format. It is
/// required unless the configured estimator works from pixels alone.
pub async fn analyze_image(
    state: &AppState,
    image: Vec<u8>,
    landmarks: Option<String>,
) -> Result<Vec<u8>, CommandError> {
    if image.is_empty() {
        return Err(SessionError::InvalidInput("image is empty".into()).into());
    }
    let supplied = landmarks
        .map(|json| FixedPoseEstimator::from_json(&json))
        .transpose()
        .map_err(|err| SessionError::InvalidInput(format!("malformed landmarks: {err:#}")))?;

    let processor = manager_from_state(state).processor().clone();
    let outcome = tokio::task::spawn_blocking(move || {
        processor.analyze_image(&image, supplied.as_ref().map(|e| e as &dyn PoseEstimator))
    })
    .await
    .map_err(|err| SessionError::Internal(anyhow!("image worker failed: {err}")))?;

    match outcome {
        Ok((result, jpeg)) => {
            log_info!("analyze_image: {} ({} bytes)", result.phase, jpeg.len());
            Ok(jpeg)
        }
        Err(err) => Err(SessionError::InvalidInput(format!("{err:#}")).into()),
    }
}
