//! Campaign runs and resumption

use brandloc_batch::providers::create_provider;
use brandloc_batch::{
    BatchEngine, BatchResult, GenerationParams, GenerationProvider, LocalizerConfig,
    ProgressCallback,
};
use brandloc_core::{now_utc, ErrorKind, Result};
use brandloc_localize::{
    BrandGuardrails, ConfigMerger, MasterConfig, RegionCatalog, RegionProfile, SkippedRegion,
};
use brandloc_output::{build_manifest, fingerprint, AuthenticityTool, OutputRecord, OutputStore};
use brandloc_recovery::{ErrorEntry, ErrorInfo, ErrorLog, RecoveryStore, Severity, StateHandle};
use image::DynamicImage;
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of one campaign run
#[derive(Debug, Clone)]
pub struct CampaignReport {
    pub campaign_id: String,
    pub config_fingerprint: String,
    pub batch: BatchResult<OutputRecord>,
    /// Regions rejected before generation. They are never retried.
    pub skipped: Vec<SkippedRegion>,
    /// Regions completed by earlier runs of a resumed campaign
    pub carried_over: Vec<String>,
    /// Snapshot written for the unfinished regions, if any
    pub recovery_handle: Option<StateHandle>,
}

impl CampaignReport {
    /// Regions completed so far, earlier runs included
    pub fn processed_region_ids(&self) -> Vec<String> {
        let mut processed = self.carried_over.clone();
        for id in self.batch.completed_region_ids() {
            if !processed.contains(&id) {
                processed.push(id);
            }
        }
        processed
    }

    /// Regions whose generation failed and can be retried
    pub fn pending_region_ids(&self) -> Vec<String> {
        self.batch.failed_region_ids()
    }

    pub fn skipped_region_ids(&self) -> Vec<String> {
        self.skipped.iter().map(|s| s.region_id.clone()).collect()
    }

    pub fn records(&self) -> impl Iterator<Item = &OutputRecord> {
        self.batch.jobs.iter().filter_map(|job| job.result.as_ref())
    }

    /// Every region generated and nothing skipped
    pub fn is_clean(&self) -> bool {
        self.batch.failed == 0 && self.skipped.is_empty()
    }

    /// Share of generated regions that failed
    pub fn failure_ratio(&self) -> f64 {
        self.batch.failure_ratio()
    }
}

/// Runs a campaign end to end
pub struct CampaignRunner {
    provider: Arc<dyn GenerationProvider>,
    params: GenerationParams,
    merger: ConfigMerger,
    engine: BatchEngine,
    output: OutputStore,
    recovery: RecoveryStore,
    error_log: ErrorLog,
    failure_ratio_threshold: f64,
}

impl CampaignRunner {
    /// Build a runner around an explicit provider
    pub fn new(provider: Arc<dyn GenerationProvider>, config: &LocalizerConfig) -> Self {
        Self {
            provider,
            params: config.generation_params(),
            merger: ConfigMerger::new(),
            engine: BatchEngine::new(config.batch.max_concurrency),
            output: OutputStore::from_config(config),
            recovery: RecoveryStore::new(&config.recovery.state_dir),
            error_log: ErrorLog::new(&config.recovery.error_dir),
            failure_ratio_threshold: config.recovery.failure_ratio_threshold,
        }
    }

    /// Build a runner with the provider named in the configuration
    pub fn from_config(config: &LocalizerConfig) -> Result<Self> {
        let provider: Arc<dyn GenerationProvider> =
            Arc::from(create_provider(&config.generation.provider, config)?);
        Ok(Self::new(provider, config))
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.engine = self.engine.with_progress(callback);
        self
    }

    pub fn with_authenticity(mut self, tool: Arc<dyn AuthenticityTool>) -> Self {
        self.output = self.output.with_authenticity(tool);
        self
    }

    pub fn recovery(&self) -> &RecoveryStore {
        &self.recovery
    }

    pub fn error_log(&self) -> &ErrorLog {
        &self.error_log
    }

    pub fn output(&self) -> &OutputStore {
        &self.output
    }

    /// Merge, generate and persist every region.
    ///
    /// Only an invalid master fails the run. Per-region problems end up in
    /// the report, the error log, and (past the failure threshold) a
    /// recovery snapshot.
    pub fn run(
        &self,
        master: &MasterConfig,
        regions: &[RegionProfile],
        guardrails: Option<&BrandGuardrails>,
        reference: Option<&DynamicImage>,
    ) -> Result<CampaignReport> {
        self.run_with_carry_over(master, regions, guardrails, reference, Vec::new())
    }

    fn run_with_carry_over(
        &self,
        master: &MasterConfig,
        regions: &[RegionProfile],
        guardrails: Option<&BrandGuardrails>,
        reference: Option<&DynamicImage>,
        carried_over: Vec<String>,
    ) -> Result<CampaignReport> {
        master.validate()?;
        let campaign_id = master.campaign_id();
        let config_fingerprint = fingerprint(master)?;
        tracing::info!(
            campaign = campaign_id,
            regions = regions.len(),
            provider = self.provider.name(),
            fingerprint = %config_fingerprint,
            "Starting campaign"
        );

        let merged = self.merger.merge_all(master, regions, guardrails);
        for skipped in &merged.skipped {
            self.log(
                ErrorEntry::new(ErrorKind::ValidationError, "config_merger", &skipped.reason)
                    .with_context("campaign_id", campaign_id)
                    .with_context("region_id", skipped.region_id.as_str())
                    .with_severity(Severity::Warning),
            );
        }

        let profiles: HashMap<&str, &RegionProfile> = regions
            .iter()
            .map(|r| (r.region_id.as_str(), r))
            .collect();
        let provider = &self.provider;
        let params = &self.params;
        let output = &self.output;

        let batch = self.engine.run(merged.requests, |request| {
            let asset = provider.generate(request, params)?;
            let manifest = match profiles.get(request.region_id()) {
                Some(profile) => Some(build_manifest(master, profile, params.seed, now_utc())?),
                None => None,
            };
            Ok(output.persist(&asset, request, params.seed, reference, manifest.as_ref()))
        });

        for (region_id, error) in batch.failures() {
            self.log(
                ErrorEntry::new(ErrorKind::ExternalServiceError, "batch_engine", error)
                    .with_context("campaign_id", campaign_id)
                    .with_context("region_id", region_id),
            );
        }
        for record in batch.jobs.iter().filter_map(|j| j.result.as_ref()) {
            if !record.all_saved() {
                self.log(
                    ErrorEntry::new(
                        ErrorKind::TransientIoError,
                        "output_store",
                        "some artifacts could not be saved",
                    )
                    .with_context("region_id", record.region_id.as_str())
                    .with_context("primary_saved", record.primary_path.is_some())
                    .with_context("preview_saved", record.preview_path.is_some())
                    .with_context("audit_saved", record.audit_path.is_some()),
                );
            }
        }

        let mut report = CampaignReport {
            campaign_id: campaign_id.to_string(),
            config_fingerprint,
            batch,
            skipped: merged.skipped,
            carried_over,
            recovery_handle: None,
        };

        if report.batch.failed > 0 && report.failure_ratio() > self.failure_ratio_threshold {
            report.recovery_handle = Some(self.snapshot(master, &report)?);
        }

        tracing::info!(
            campaign = campaign_id,
            skipped = report.skipped.len(),
            snapshot = report.recovery_handle.is_some(),
            "Campaign finished: {}",
            report.batch.summary()
        );
        Ok(report)
    }

    /// Re-run the pending regions of a snapshot.
    ///
    /// The snapshot is deleted once no resumed region fails. A run that
    /// fails again leaves it in place and writes a fresh one that still
    /// lists the regions processed before.
    pub fn resume(
        &self,
        handle: &StateHandle,
        catalog: &RegionCatalog,
        guardrails: Option<&BrandGuardrails>,
        reference: Option<&DynamicImage>,
    ) -> Result<CampaignReport> {
        let state = self.recovery.load_state(handle)?;
        let regions = catalog.select(&state.progress.pending_region_ids)?;
        tracing::info!(
            campaign = %state.campaign_id,
            pending = regions.len(),
            snapshot = %handle,
            "Resuming campaign"
        );

        let report = self.run_with_carry_over(
            &state.master_config,
            &regions,
            guardrails,
            reference,
            state.progress.processed_region_ids.clone(),
        )?;
        if report.batch.failed == 0 {
            self.recovery.delete_state(handle)?;
        }
        Ok(report)
    }

    fn snapshot(&self, master: &MasterConfig, report: &CampaignReport) -> Result<StateHandle> {
        let processed = report.processed_region_ids();
        let pending = report.pending_region_ids();
        let info = ErrorInfo::new(ErrorKind::PartialBatchFailure, report.batch.summary())
            .with_context("failed_regions", pending.join(","))
            .with_context("skipped_regions", report.skipped_region_ids().join(","))
            .with_context("failure_ratio", format!("{:.3}", report.failure_ratio()));

        let handle = self.recovery.save_state(
            master.campaign_id(),
            master,
            &processed,
            &pending,
            Some(&info),
        )?;
        self.log(
            ErrorEntry::new(
                ErrorKind::PartialBatchFailure,
                "campaign_runner",
                format!("{} of {} regions pending", pending.len(), processed.len() + pending.len()),
            )
            .with_context("campaign_id", master.campaign_id())
            .with_context("snapshot", handle.to_string())
            .with_recovery_action(format!("resume from {}", handle)),
        );
        Ok(handle)
    }

    fn log(&self, entry: ErrorEntry) {
        if let Err(e) = self.error_log.append(&entry) {
            tracing::warn!(error = %e, "Could not write error log entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brandloc_batch::providers::mock::MockProvider;
    use brandloc_core::{AttributeMap, AttributeValue};

    fn config(root: &std::path::Path) -> LocalizerConfig {
        let mut config = LocalizerConfig::default();
        config.output.dir = root.join("output");
        config.output.max_attempts = 1;
        config.output.retry_base_ms = 1;
        config.recovery.state_dir = root.join("state");
        config.recovery.error_dir = root.join("errors");
        config.batch.max_concurrency = 2;
        config
    }

    fn master() -> MasterConfig {
        let mut locked = AttributeMap::new();
        locked.insert("camera_angle".into(), AttributeValue::text("eye_level"));
        let mut variable = AttributeMap::new();
        variable.insert("background".into(), AttributeValue::text("neutral"));
        MasterConfig::new("spring", locked, variable)
    }

    fn scratch() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("brandloc_campaign_test_{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_report_ratios() {
        let root = scratch();
        let runner = CampaignRunner::new(
            Arc::new(MockProvider::new().with_base_size(32).failing_for(["b"])),
            &config(&root),
        );
        let regions = vec![
            RegionProfile::new("a", "A", "en-US"),
            RegionProfile::new("b", "B", "en-GB"),
            RegionProfile::new("c", "C", ""),
        ];
        let report = runner.run(&master(), &regions, None, None).unwrap();
        assert_eq!(report.processed_region_ids(), vec!["a"]);
        assert_eq!(report.pending_region_ids(), vec!["b"]);
        assert_eq!(report.skipped_region_ids(), vec!["c"]);
        assert!((report.failure_ratio() - 0.5).abs() < 1e-9);
        assert!(!report.is_clean());
        assert!(report.recovery_handle.is_some());
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_skipped_region_stays_out_of_snapshot() {
        let root = scratch();
        let cfg = config(&root);
        let regions = vec![
            RegionProfile::new("a", "A", "en-US"),
            RegionProfile::new("b", "B", "en-GB"),
            RegionProfile::new("c", "C", ""),
        ];
        let flaky = CampaignRunner::new(
            Arc::new(MockProvider::new().with_base_size(32).failing_for(["b"])),
            &cfg,
        );
        let report = flaky.run(&master(), &regions, None, None).unwrap();
        let handle = report.recovery_handle.clone().unwrap();

        let state = flaky.recovery().load_state(&handle).unwrap();
        assert_eq!(state.progress.pending_region_ids, vec!["b"]);
        let info = state.error_info.unwrap();
        assert_eq!(info.context.get("skipped_regions").map(String::as_str), Some("c"));

        // The catalog only knows valid regions; resuming must not ask for "c".
        let catalog = RegionCatalog::from_profiles(regions[..2].to_vec()).unwrap();
        let healthy =
            CampaignRunner::new(Arc::new(MockProvider::new().with_base_size(32)), &cfg);
        let resumed = healthy.resume(&handle, &catalog, None, None).unwrap();
        assert_eq!(resumed.batch.completed, 1);
        assert!(resumed.is_clean());
        assert!(healthy.recovery().load_state(&handle).is_err());
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_second_failure_keeps_earlier_progress() {
        let root = scratch();
        let cfg = config(&root);
        let regions = vec![
            RegionProfile::new("a", "A", "en-US"),
            RegionProfile::new("b", "B", "en-GB"),
        ];
        let catalog = RegionCatalog::from_profiles(regions.clone()).unwrap();
        let flaky = CampaignRunner::new(
            Arc::new(MockProvider::new().with_base_size(32).failing_for(["b"])),
            &cfg,
        );
        let first = flaky.run(&master(), &regions, None, None).unwrap();
        let handle = first.recovery_handle.clone().unwrap();

        let again = flaky.resume(&handle, &catalog, None, None).unwrap();
        assert_eq!(again.batch.failed, 1);
        assert_eq!(again.processed_region_ids(), vec!["a"]);

        let latest = flaky.recovery().get_latest_state("spring").unwrap().unwrap();
        let latest = flaky.recovery().load_state(&latest).unwrap();
        assert_eq!(latest.progress.processed_region_ids, vec!["a"]);
        assert_eq!(latest.progress.pending_region_ids, vec!["b"]);
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_threshold_suppresses_snapshot() {
        let root = scratch();
        let mut cfg = config(&root);
        cfg.recovery.failure_ratio_threshold = 0.5;
        let runner = CampaignRunner::new(
            Arc::new(MockProvider::new().with_base_size(32).failing_for(["b"])),
            &cfg,
        );
        let regions: Vec<RegionProfile> = ["a", "b", "c"]
            .iter()
            .map(|id| RegionProfile::new(id, id, "en-US"))
            .collect();
        let report = runner.run(&master(), &regions, None, None).unwrap();
        assert_eq!(report.batch.failed, 1);
        assert!(report.recovery_handle.is_none());
        assert!(runner.recovery().list_states(None).unwrap().is_empty());
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_invalid_master_is_rejected() {
        let root = scratch();
        let runner = CampaignRunner::new(Arc::new(MockProvider::new()), &config(&root));
        let bad = MasterConfig::new("../x", AttributeMap::new(), AttributeMap::new());
        let regions = vec![RegionProfile::new("a", "A", "en-US")];
        assert!(runner.run(&bad, &regions, None, None).is_err());
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_from_config_uses_mock_by_default() {
        let root = scratch();
        assert!(CampaignRunner::from_config(&config(&root)).is_ok());
        let mut cfg = config(&root);
        cfg.generation.provider = "nonexistent".into();
        assert!(CampaignRunner::from_config(&cfg).is_err());
    }
}
