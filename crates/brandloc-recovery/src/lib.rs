//! brandloc Recovery - Resumable campaign state and the error log
//!
//! `RecoveryStore` writes immutable per-campaign snapshots that record which
//! regions were processed and which are still pending, so an interrupted or
//! partially failed campaign can be resumed. `ErrorLog` keeps a
//! day-partitioned, append-only JSONL record of every error.

pub mod error_log;
pub mod state;

pub use error_log::{ErrorEntry, ErrorLog, Severity};
pub use state::{ErrorInfo, ProgressSnapshot, RecoveryState, RecoveryStore, StateHandle};
