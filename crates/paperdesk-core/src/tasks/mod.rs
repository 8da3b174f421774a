//! Tracking of asynchronous backend jobs.
//!
//! This module provides the generic `TaskPoller`, the `TaskStatus` vocabulary
//! it understands, and `EmailScanJob`, the mailbox scan task source.

pub mod poller;
pub mod scan;
pub mod status;

pub use poller::{PollTicket, Sleeper, TaskPoller, TaskSource, TokioSleeper, DEFAULT_POLL_INTERVAL};
pub use scan::{EmailScanJob, ScanRequest, EMAIL_SCAN_JOB};
pub use status::{Progress, TaskFailure, TaskHandle, TaskOutcome, TaskStatus, WireTaskStatus};
