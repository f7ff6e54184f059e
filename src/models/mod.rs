pub mod session;

pub use session::{Session, SessionInfo, SessionStatus, SessionSummary};
