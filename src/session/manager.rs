use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{fs::File, sync::Mutex, task::JoinError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    error::{SessionError, SessionResult},
    models::{Session, SessionInfo, SessionStatus, SessionSummary},
    pipeline::{CsvReportWriter, FrameProcessor, FrameSource, CSV_MEDIA_TYPE},
    render::{GifVideoWriter, VideoSink, VIDEO_EXTENSION, VIDEO_MEDIA_TYPE},
    settings::AnalysisSettings,
};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

const VIDEO_FILE: &str = "annotated";
const CSV_FILE: &str = "angles.csv";

/// An opened artifact ready to be streamed to a client.
#[derive(Debug)]
pub struct ArtifactStream {
    pub file: File,
    pub path: PathBuf,
    /// Suggested download name.
    pub file_name: String,
    pub media_type: &'static str,
    pub len: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub session_id: String,
    pub status: SessionStatus,
    pub removed_entries: usize,
    pub failed_entries: usize,
    pub directory_removed: bool,
}

/// An analysis still running on a blocking worker.
#[derive(Debug, Clone)]
struct Job {
    token: CancellationToken,
    created_at: DateTime<Utc>,
    fps: f64,
    started: Arc<AtomicBool>,
}

impl Job {
    fn info(&self, session_id: &str) -> SessionInfo {
        let status = if self.started.load(Ordering::SeqCst) {
            SessionStatus::Processing
        } else {
            SessionStatus::Created
        };
        SessionInfo {
            session_id: session_id.to_string(),
            status,
            created_at: self.created_at,
            completed_at: None,
            fps: self.fps,
            frames_total: 0,
            frames_processed: 0,
            duration_seconds: 0.0,
        }
    }
}

#[derive(Clone, Copy)]
enum Artifact {
    Video,
    Csv,
}

/// Owns every session: runs new analyses, serves their artifacts and
/// removes them again.
#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<Mutex<HashMap<String, Session>>>,
    jobs: Arc<Mutex<HashMap<String, Job>>>,
    processor: FrameProcessor,
    analysis: AnalysisSettings,
    storage_root: PathBuf,
    shutdown: CancellationToken,
}

impl SessionManager {
    pub fn new(processor: FrameProcessor, analysis: AnalysisSettings, storage_root: PathBuf) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            jobs: Arc::new(Mutex::new(HashMap::new())),
            processor,
            analysis,
            storage_root,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    pub fn processor(&self) -> &FrameProcessor {
        &self.processor
    }

    /// Analyze every frame of `source` and register the result. Returns once
    /// both artifacts are complete.
    ///
    /// The analysis runs on its own task and finalizes there, so a caller
    /// that stops waiting leaves no half-registered session behind.
    pub async fn create_session(&self, source: &Path, fps: Option<f64>) -> SessionResult<SessionSummary> {
        let fps = fps.unwrap_or(self.analysis.default_fps);
        if !fps.is_finite() || fps <= 0.0 {
            return Err(SessionError::InvalidInput(format!("fps must be positive, got {fps}")));
        }
        if self.shutdown.is_cancelled() {
            return Err(SessionError::Cancelled("service is shutting down".into()));
        }

        let session_id = Uuid::new_v4().to_string();
        let token = self.shutdown.child_token();
        let created_at = Utc::now();
        let started = Arc::new(AtomicBool::new(false));
        self.jobs.lock().await.insert(
            session_id.clone(),
            Job {
                token: token.clone(),
                created_at,
                fps,
                started: started.clone(),
            },
        );
        log_info!("session {} created for {}", session_id, source.display());

        let job = JobRequest {
            session_id: session_id.clone(),
            created_at,
            source: source.to_path_buf(),
            fps,
            storage_dir: self.storage_root.join(format!("session-{session_id}")),
            prefix: self.analysis.frame_prefix.clone(),
            extension: self.analysis.frame_extension.clone(),
        };
        let manager = self.clone();
        let job_id = session_id.clone();
        let finalizer = tokio::spawn(async move {
            let processor = manager.processor.clone();
            let outcome = tokio::task::spawn_blocking(move || {
                started.store(true, Ordering::SeqCst);
                run_job(&processor, job, &token)
            })
            .await;
            manager.finish_job(&job_id, outcome).await
        });

        match finalizer.await {
            Ok(result) => result,
            Err(err) => {
                log_error!("finalizer for session {} failed: {err}", session_id);
                Err(SessionError::Internal(anyhow!("analysis task failed: {err}")))
            }
        }
    }

    /// Register a finished job, or delete its directory when shutdown got
    /// there first. The job entry is dropped either way.
    async fn finish_job(
        &self,
        session_id: &str,
        outcome: Result<SessionResult<Session>, JoinError>,
    ) -> SessionResult<SessionSummary> {
        let result = match outcome {
            Ok(result) => result,
            Err(err) => {
                log_error!("analysis worker for session {} panicked: {err}", session_id);
                Err(SessionError::Internal(anyhow!("analysis worker failed: {err}")))
            }
        };

        // Lock order: sessions, then jobs.
        let mut sessions = self.sessions.lock().await;
        let registered = match result {
            Ok(session) if self.shutdown.is_cancelled() => {
                remove_session_dir(session_id, &session.storage_dir).await;
                Err(SessionError::Cancelled(session_id.to_string()))
            }
            Ok(session) => {
                let summary = session.summary();
                sessions.insert(session_id.to_string(), session);
                log_info!(
                    "session {} ready: {} frames, {:.2}s",
                    session_id,
                    summary.frames_processed,
                    summary.duration_seconds
                );
                Ok(summary)
            }
            Err(err) => Err(err),
        };
        self.jobs.lock().await.remove(session_id);
        drop(sessions);
        registered
    }

    pub async fn get_video(&self, session_id: &str) -> SessionResult<ArtifactStream> {
        self.open_artifact(session_id, Artifact::Video).await
    }

    pub async fn get_csv(&self, session_id: &str) -> SessionResult<ArtifactStream> {
        self.open_artifact(session_id, Artifact::Csv).await
    }

    async fn open_artifact(&self, session_id: &str, artifact: Artifact) -> SessionResult<ArtifactStream> {
        let path = {
            let sessions = self.sessions.lock().await;
            let session = sessions
                .get(session_id)
                .ok_or_else(|| SessionError::NotFound(format!("session {session_id}")))?;
            match artifact {
                Artifact::Video => session.video_path.clone(),
                Artifact::Csv => session.csv_path.clone(),
            }
        };

        let (file_name, media_type) = match artifact {
            Artifact::Video => (format!("gait-{session_id}.{VIDEO_EXTENSION}"), VIDEO_MEDIA_TYPE),
            Artifact::Csv => (format!("gait-{session_id}.csv"), CSV_MEDIA_TYPE),
        };

        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(SessionError::NotFound(format!("{} is missing", path.display())));
            }
            Err(err) => {
                return Err(SessionError::Internal(
                    anyhow::Error::new(err).context(format!("failed to open {}", path.display())),
                ));
            }
        };
        let len = file
            .metadata()
            .await
            .with_context(|| format!("failed to stat {}", path.display()))?
            .len();

        Ok(ArtifactStream {
            file,
            path,
            file_name,
            media_type,
            len,
        })
    }

    /// Delete the session's artifacts and forget it. File removal is best
    /// effort; the registry entry is always dropped.
    pub async fn cleanup(&self, session_id: &str) -> SessionResult<CleanupReport> {
        let session = self
            .sessions
            .lock()
            .await
            .remove(session_id)
            .ok_or_else(|| SessionError::NotFound(format!("session {session_id}")))?;

        let report = remove_session_dir(session_id, &session.storage_dir).await;
        log_info!(
            "session {} cleaned: {} removed, {} failed",
            session_id,
            report.removed_entries,
            report.failed_entries
        );
        Ok(report)
    }

    /// Ready sessions followed by analyses still running, oldest first.
    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self
            .sessions
            .lock()
            .await
            .values()
            .map(Session::info)
            .collect();

        infos.extend(self.jobs.lock().await.iter().map(|(id, job)| job.info(id)));

        infos.sort_by_key(|info| info.created_at);
        infos
    }

    pub async fn session_info(&self, session_id: &str) -> SessionResult<SessionInfo> {
        if let Some(session) = self.sessions.lock().await.get(session_id) {
            return Ok(session.info());
        }
        if let Some(job) = self.jobs.lock().await.get(session_id) {
            return Ok(job.info(session_id));
        }
        Err(SessionError::NotFound(format!("session {session_id}")))
    }

    /// Stop running analyses and, unless `keep_sessions`, remove every
    /// registered session. New requests are refused afterwards.
    pub async fn shutdown(&self, keep_sessions: bool) -> Vec<CleanupReport> {
        self.shutdown.cancel();
        {
            let jobs = self.jobs.lock().await;
            for (id, job) in jobs.iter() {
                log_info!("cancelling analysis {}", id);
                job.token.cancel();
            }
        }

        if keep_sessions {
            return Vec::new();
        }

        let sessions: Vec<Session> = self.sessions.lock().await.drain().map(|(_, s)| s).collect();
        let mut reports = Vec::with_capacity(sessions.len());
        for session in sessions {
            reports.push(remove_session_dir(&session.id, &session.storage_dir).await);
        }
        log_info!("shutdown removed {} sessions", reports.len());
        reports
    }
}

struct JobRequest {
    session_id: String,
    created_at: DateTime<Utc>,
    source: PathBuf,
    fps: f64,
    storage_dir: PathBuf,
    prefix: String,
    extension: String,
}

/// Blocking body of `create_session`. The storage directory is removed again
/// on any failure or cancellation.
fn run_job(processor: &FrameProcessor, job: JobRequest, cancel: &CancellationToken) -> SessionResult<Session> {
    let started = Instant::now();
    let source = FrameSource::open(&job.source, &job.prefix, &job.extension)?;
    let first = source.first_frame()?;

    std::fs::create_dir_all(&job.storage_dir)
        .with_context(|| format!("failed to create {}", job.storage_dir.display()))?;

    let result = write_artifacts(processor, &job, &source, first.width(), first.height(), cancel);
    let (video_path, csv_path, summary) = match result {
        Ok(done) => done,
        Err(err) => {
            if let Err(rm_err) = std::fs::remove_dir_all(&job.storage_dir) {
                log_warn!("failed to remove {}: {rm_err}", job.storage_dir.display());
            }
            return Err(err);
        }
    };

    log_info!(
        "session {} processed {}/{} frames in {:?} ({} no person, {} partial, {} errors)",
        job.session_id,
        summary.frames_processed,
        summary.frames_total,
        started.elapsed(),
        summary.no_detection,
        summary.partial,
        summary.errors
    );

    Ok(Session {
        id: job.session_id,
        created_at: job.created_at,
        completed_at: Some(Utc::now()),
        status: SessionStatus::Ready,
        source: job.source,
        storage_dir: job.storage_dir,
        video_path,
        csv_path,
        fps: job.fps,
        frames_total: summary.frames_total,
        frames_processed: summary.frames_processed,
    })
}

fn write_artifacts(
    processor: &FrameProcessor,
    job: &JobRequest,
    source: &FrameSource,
    width: u32,
    height: u32,
    cancel: &CancellationToken,
) -> SessionResult<(PathBuf, PathBuf, crate::pipeline::RunSummary)> {
    let video_path = job.storage_dir.join(format!("{VIDEO_FILE}.{VIDEO_EXTENSION}"));
    let csv_path = job.storage_dir.join(CSV_FILE);

    let mut video = GifVideoWriter::create(&video_path, width, height, job.fps)?;
    let mut report = CsvReportWriter::create(&csv_path)?;
    let summary = processor.run(source, job.fps, &mut video, &mut report, cancel)?;
    Box::new(video).finish()?;
    report.finish()?;

    if summary.cancelled {
        return Err(SessionError::Cancelled(job.session_id.clone()));
    }
    Ok((video_path, csv_path, summary))
}

/// Remove each entry of `dir`, then `dir` itself, logging every failure.
async fn remove_session_dir(session_id: &str, dir: &Path) -> CleanupReport {
    let mut report = CleanupReport {
        session_id: session_id.to_string(),
        status: SessionStatus::Cleaned,
        removed_entries: 0,
        failed_entries: 0,
        directory_removed: false,
    };

    match tokio::fs::read_dir(dir).await {
        Ok(mut entries) => loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    log_warn!("failed to list {}: {err}", dir.display());
                    report.failed_entries += 1;
                    break;
                }
            };
            let path = entry.path();
            let removed = match entry.file_type().await {
                Ok(kind) if kind.is_dir() => tokio::fs::remove_dir_all(&path).await,
                _ => tokio::fs::remove_file(&path).await,
            };
            match removed {
                Ok(()) => report.removed_entries += 1,
                Err(err) => {
                    log_error!("failed to remove {}: {err}", path.display());
                    report.failed_entries += 1;
                }
            }
        },
        Err(err) => log_warn!("failed to read {}: {err}", dir.display()),
    }

    match tokio::fs::remove_dir(dir).await {
        Ok(()) => report.directory_removed = true,
        Err(err) => log_warn!("failed to remove {}: {err}", dir.display()),
    }
    report
}
