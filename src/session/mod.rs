pub mod commands;
pub mod manager;

pub use manager::{ArtifactStream, CleanupReport, SessionManager};
