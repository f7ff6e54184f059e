use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    /// Accepted, waiting for a worker.
    Created,
    Processing,
    Ready,
    /// Artifacts removed and the id forgotten.
    Cleaned,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Created => "Created",
            SessionStatus::Processing => "Processing",
            SessionStatus::Ready => "Ready",
            SessionStatus::Cleaned => "Cleaned",
        }
    }
}

/// A finished analysis and the artifacts it owns on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub source: PathBuf,
    pub storage_dir: PathBuf,
    pub video_path: PathBuf,
    pub csv_path: PathBuf,
    pub fps: f64,
    /// Input frames, including ones that failed to decode.
    pub frames_total: usize,
    pub frames_processed: usize,
}

impl Session {
    pub fn duration_seconds(&self) -> f64 {
        self.frames_total as f64 / self.fps
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id.clone(),
            frames_processed: self.frames_processed,
            duration_seconds: self.duration_seconds(),
        }
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.id.clone(),
            status: self.status,
            created_at: self.created_at,
            completed_at: self.completed_at,
            fps: self.fps,
            frames_total: self.frames_total,
            frames_processed: self.frames_processed,
            duration_seconds: self.duration_seconds(),
        }
    }
}

/// Response to a successful session creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    pub session_id: String,
    pub frames_processed: usize,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub fps: f64,
    pub frames_total: usize,
    pub frames_processed: usize,
    pub duration_seconds: f64,
}
