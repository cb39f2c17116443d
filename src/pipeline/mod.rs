//! Recording pipeline.
//!
//! The streaming loop runs on the caller's thread; the marker scheduler and
//! the rate monitor run on their own threads. They share one
//! [`SessionState`] where every field has a single writer.

pub mod error;
pub mod orchestrator;
pub mod rate_monitor;
pub mod session;
pub mod sink;
pub mod streaming;
pub mod types;

pub use error::{CollectingReporter, ErrorReporter, LogReporter, eprintln_clear, format_report};
pub use orchestrator::{Recorder, RecorderConfig, RecordingControl};
pub use rate_monitor::{RateMonitor, RateWindow};
pub use session::{SessionState, StreamPhase};
pub use sink::{CollectedRecords, CollectorSink, CsvSink, RecordSink, default_output_path};
pub use streaming::{StreamingLoop, assemble_record, format_timestamp, stream_once};
pub use types::{OutputRecord, RateReport, SessionEvent, SessionSummary, output_header};
