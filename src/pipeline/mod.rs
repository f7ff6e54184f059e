pub mod frames;
pub mod processor;
pub mod report;

pub use frames::{Frame, FrameSource};
pub use processor::{FrameOutcome, FrameProcessor, FrameResult, RunSummary};
pub use report::{CsvReportWriter, FrameRecord, CSV_MEDIA_TYPE};
