//! Batch execution engine
//!
//! Executes region requests as [`BatchJob`]s. Every job runs in isolation:
//! an error or a panic in one job marks that job FAILED and the batch moves
//! on. Each call returns a full accounting where
//! `total_jobs == completed + failed == requests.len()`.

use crate::job::{BatchJob, JobStatus};
use crate::pool::run_pool;
use brandloc_core::{now_utc, Result, Timestamp};
use brandloc_localize::RegionRequest;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Snapshot handed to progress observers on every job transition
#[derive(Debug, Clone, PartialEq)]
pub struct JobProgress {
    pub job_id: String,
    pub region_id: String,
    pub status: JobStatus,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

/// Observer of job transitions. A panicking observer is ignored.
pub type ProgressCallback = Arc<dyn Fn(&JobProgress) + Send + Sync>;

/// Outcome of a batch run
#[derive(Debug, Clone)]
pub struct BatchResult<T> {
    pub total_jobs: usize,
    pub completed: usize,
    pub failed: usize,
    pub jobs: Vec<BatchJob<T>>,
    pub started_at: Timestamp,
    pub completed_at: Timestamp,
}

impl<T> BatchResult<T> {
    /// Fraction of jobs that completed (0.0 for an empty batch)
    pub fn success_rate(&self) -> f64 {
        if self.total_jobs == 0 {
            0.0
        } else {
            self.completed as f64 / self.total_jobs as f64
        }
    }

    /// Fraction of jobs that failed (0.0 for an empty batch)
    pub fn failure_ratio(&self) -> f64 {
        if self.total_jobs == 0 {
            0.0
        } else {
            self.failed as f64 / self.total_jobs as f64
        }
    }

    pub fn completed_region_ids(&self) -> Vec<String> {
        self.region_ids_with(JobStatus::Completed)
    }

    pub fn failed_region_ids(&self) -> Vec<String> {
        self.region_ids_with(JobStatus::Failed)
    }

    /// `(region_id, error)` for every failed job
    pub fn failures(&self) -> Vec<(String, String)> {
        self.jobs
            .iter()
            .filter(|j| j.status() == JobStatus::Failed)
            .map(|j| (j.region_id.clone(), j.error.clone().unwrap_or_default()))
            .collect()
    }

    pub fn is_fully_accounted(&self) -> bool {
        self.total_jobs == self.completed + self.failed && self.total_jobs == self.jobs.len()
    }

    /// One-line human summary
    pub fn summary(&self) -> String {
        let secs = (self.completed_at - self.started_at).num_milliseconds() as f64 / 1000.0;
        format!(
            "{}/{} completed, {} failed ({:.1}% success) in {:.1}s",
            self.completed,
            self.total_jobs,
            self.failed,
            self.success_rate() * 100.0,
            secs
        )
    }

    fn region_ids_with(&self, status: JobStatus) -> Vec<String> {
        self.jobs
            .iter()
            .filter(|j| j.status() == status)
            .map(|j| j.region_id.clone())
            .collect()
    }
}

#[derive(Default)]
struct Counters {
    completed: AtomicUsize,
    failed: AtomicUsize,
}

/// Runs batches of region requests
#[derive(Clone)]
pub struct BatchEngine {
    max_concurrency: usize,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for BatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchEngine")
            .field("max_concurrency", &self.max_concurrency)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl Default for BatchEngine {
    fn default() -> Self {
        Self::new(1)
    }
}

impl BatchEngine {
    /// Create an engine; a concurrency of 0 is treated as 1
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            progress: None,
        }
    }

    /// Attach a progress observer
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Run sequentially or in parallel according to the configured concurrency
    pub fn run<T, F>(&self, requests: Vec<RegionRequest>, execute: F) -> BatchResult<T>
    where
        T: Send,
        F: Fn(&RegionRequest) -> Result<T> + Sync,
    {
        if self.max_concurrency <= 1 {
            self.run_sequential(requests, execute)
        } else {
            self.run_parallel(requests, execute, self.max_concurrency)
        }
    }

    /// Run every request on the calling thread, in input order
    pub fn run_sequential<T, F>(&self, requests: Vec<RegionRequest>, execute: F) -> BatchResult<T>
    where
        F: Fn(&RegionRequest) -> Result<T>,
    {
        let started_at = now_utc();
        let total = requests.len();
        tracing::info!(jobs = total, mode = "sequential", "Starting batch");

        let counters = Counters::default();
        let mut jobs: Vec<BatchJob<T>> = requests.into_iter().map(BatchJob::new).collect();
        for job in &mut jobs {
            self.run_job(job, &execute, &counters, total);
        }

        self.finish(jobs, counters, started_at)
    }

    /// Run with up to `max_concurrency` jobs in flight.
    ///
    /// Completion order is unspecified; `jobs` in the result keep input order.
    pub fn run_parallel<T, F>(
        &self,
        requests: Vec<RegionRequest>,
        execute: F,
        max_concurrency: usize,
    ) -> BatchResult<T>
    where
        T: Send,
        F: Fn(&RegionRequest) -> Result<T> + Sync,
    {
        let started_at = now_utc();
        let total = requests.len();
        let workers = max_concurrency.max(1).min(total.max(1));
        tracing::info!(jobs = total, workers, mode = "parallel", "Starting batch");

        let counters = Counters::default();
        let jobs: Vec<BatchJob<T>> = requests.into_iter().map(BatchJob::new).collect();
        let jobs = run_pool(jobs, workers, |job| {
            self.run_job(job, &execute, &counters, total)
        });

        self.finish(jobs, counters, started_at)
    }

    fn run_job<T, F>(&self, job: &mut BatchJob<T>, execute: &F, counters: &Counters, total: usize)
    where
        F: Fn(&RegionRequest) -> Result<T>,
    {
        if let Err(e) = job.start() {
            // only reachable if a job is handed to the engine twice
            tracing::error!(job = %job.job_id, error = %e, "Job could not start");
            job.error = Some(e.to_string());
            counters.failed.fetch_add(1, Ordering::SeqCst);
            return;
        }
        tracing::debug!(job = %job.job_id, region = %job.region_id, "Job started");
        self.notify(job, counters, total);

        let outcome = match catch_unwind(AssertUnwindSafe(|| execute(&job.request))) {
            Ok(outcome) => outcome.map_err(|e| e.to_string()),
            Err(payload) => Err(format!("job panicked: {}", panic_message(&*payload))),
        };

        let transition = match outcome {
            Ok(value) => {
                counters.completed.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(job = %job.job_id, region = %job.region_id, "Job completed");
                job.complete(value)
            }
            Err(message) => {
                counters.failed.fetch_add(1, Ordering::SeqCst);
                tracing::warn!(
                    job = %job.job_id,
                    region = %job.region_id,
                    error = %message,
                    "Job failed"
                );
                job.fail(message)
            }
        };
        if let Err(e) = transition {
            tracing::error!(job = %job.job_id, error = %e, "Job transition rejected");
        }
        self.notify(job, counters, total);
    }

    fn notify<T>(&self, job: &BatchJob<T>, counters: &Counters, total: usize) {
        let Some(callback) = &self.progress else {
            return;
        };
        let progress = JobProgress {
            job_id: job.job_id.clone(),
            region_id: job.region_id.clone(),
            status: job.status(),
            completed: counters.completed.load(Ordering::SeqCst),
            failed: counters.failed.load(Ordering::SeqCst),
            total,
        };
        if catch_unwind(AssertUnwindSafe(|| callback(&progress))).is_err() {
            tracing::warn!(job = %job.job_id, "Progress callback panicked; ignoring");
        }
    }

    fn finish<T>(
        &self,
        jobs: Vec<BatchJob<T>>,
        counters: Counters,
        started_at: Timestamp,
    ) -> BatchResult<T> {
        let result = BatchResult {
            total_jobs: jobs.len(),
            completed: counters.completed.into_inner(),
            failed: counters.failed.into_inner(),
            jobs,
            started_at,
            completed_at: now_utc(),
        };
        tracing::info!(
            total = result.total_jobs,
            completed = result.completed,
            failed = result.failed,
            "Batch finished"
        );
        result
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brandloc_core::{AttributeMap, LocalizerError};
    use brandloc_localize::{ConfigMerger, MasterConfig, RegionProfile};
    use parking_lot::Mutex;

    fn requests(n: usize) -> Vec<RegionRequest> {
        let master = MasterConfig::new("c", AttributeMap::new(), AttributeMap::new());
        let regions: Vec<RegionProfile> = (0..n)
            .map(|i| RegionProfile::new(&format!("region_{}", i), "R", "en-US"))
            .collect();
        ConfigMerger::new().merge_all(&master, &regions, None).requests
    }

    fn fail_on(ids: &'static [&'static str]) -> impl Fn(&RegionRequest) -> Result<usize> + Sync {
        move |req| {
            if ids.iter().any(|id| *id == req.region_id()) {
                Err(LocalizerError::ExternalService(format!("boom {}", req.region_id())))
            } else {
                Ok(req.region_id().len())
            }
        }
    }

    #[test]
    fn test_sequential_isolation_scenario() {
        let engine = BatchEngine::new(1);
        let result = engine.run_sequential(requests(5), fail_on(&["region_2"]));

        assert_eq!(result.total_jobs, 5);
        assert_eq!(result.completed, 4);
        assert_eq!(result.failed, 1);
        assert!(result.is_fully_accounted());
        assert_eq!(result.failed_region_ids(), vec!["region_2"]);
        assert_eq!(result.failures()[0].1, "External service error: boom region_2");
        // input order is kept
        let order: Vec<&str> = result.jobs.iter().map(|j| j.region_id.as_str()).collect();
        assert_eq!(order, ["region_0", "region_1", "region_2", "region_3", "region_4"]);
        assert!(result.jobs.iter().all(|j| j.status().is_terminal()));
    }

    #[test]
    fn test_parallel_isolation() {
        let engine = BatchEngine::new(3);
        let result = engine.run(requests(10), fail_on(&["region_1", "region_7"]));
        assert_eq!(result.total_jobs, 10);
        assert_eq!(result.completed, 8);
        assert_eq!(result.failed, 2);
        assert!(result.is_fully_accounted());
        let mut failed = result.failed_region_ids();
        failed.sort();
        assert_eq!(failed, vec!["region_1", "region_7"]);
        assert!((result.failure_ratio() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_panic_is_recorded_as_failure() {
        let engine = BatchEngine::new(2);
        let result = engine.run(requests(3), |req| {
            if req.region_id() == "region_1" {
                panic!("generator exploded");
            }
            Ok(())
        });
        assert_eq!(result.completed, 2);
        assert_eq!(result.failed, 1);
        let (_, error) = &result.failures()[0];
        assert!(error.contains("generator exploded"));
    }

    #[test]
    fn test_progress_fires_on_every_transition() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let engine = BatchEngine::new(1).with_progress(Arc::new(move |p: &JobProgress| {
            sink.lock().push((p.region_id.clone(), p.status));
        }));
        engine.run(requests(2), fail_on(&["region_1"]));

        let seen = seen.lock();
        assert_eq!(
            *seen,
            vec![
                ("region_0".to_string(), JobStatus::InProgress),
                ("region_0".to_string(), JobStatus::Completed),
                ("region_1".to_string(), JobStatus::InProgress),
                ("region_1".to_string(), JobStatus::Failed),
            ]
        );
    }

    #[test]
    fn test_panicking_progress_callback_is_ignored() {
        let engine = BatchEngine::new(2).with_progress(Arc::new(|_: &JobProgress| {
            panic!("observer bug");
        }));
        let result = engine.run(requests(4), fail_on(&[]));
        assert_eq!(result.completed, 4);
        assert_eq!(result.failed, 0);
    }

    #[test]
    fn test_empty_batch() {
        let engine = BatchEngine::new(4);
        let result: BatchResult<()> = engine.run(Vec::new(), |_| Ok(()));
        assert_eq!(result.total_jobs, 0);
        assert!(result.is_fully_accounted());
        assert_eq!(result.success_rate(), 0.0);
        assert_eq!(result.failure_ratio(), 0.0);
    }

    #[test]
    fn test_zero_concurrency_treated_as_one() {
        assert_eq!(BatchEngine::new(0).max_concurrency(), 1);
        let result = BatchEngine::new(1).run_parallel(requests(3), fail_on(&[]), 0);
        assert_eq!(result.completed, 3);
    }

    #[test]
    fn test_summary() {
        let result = BatchEngine::new(1).run(requests(4), fail_on(&["region_3"]));
        assert!(result.summary().starts_with("3/4 completed, 1 failed (75.0% success)"));
    }
}
