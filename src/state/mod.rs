//! State module for tracking crawl job progress
//!
//! # Components
//!
//! - `JobStatus`: The job state machine (queued, running, completed, failed, cancelled)
//! - `LogLevel`: Severity of the per-job audit log entries

mod job_status;
mod log_level;

// Re-export main types
pub use job_status::JobStatus;
pub use log_level::LogLevel;
