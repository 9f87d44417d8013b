//! brandloc Batch - Job execution and generation providers
//!
//! Runs region requests as isolated jobs, sequentially or on a bounded
//! worker pool, against a pluggable generation provider (mock, Bria) with
//! layered configuration.

pub mod config;
pub mod engine;
pub mod job;
mod pool;
pub mod provider;
pub mod providers;

pub use config::LocalizerConfig;
pub use engine::{BatchEngine, BatchResult, JobProgress, ProgressCallback};
pub use job::{BatchJob, JobStatus};
pub use provider::{
    AnalysisSource, GeneratedAsset, GenerationParams, GenerationProvider, ProviderStatus,
};
