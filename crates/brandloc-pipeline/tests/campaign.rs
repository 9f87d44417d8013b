use brandloc_batch::providers::mock::MockProvider;
use brandloc_batch::{AnalysisSource, GenerationProvider, JobStatus, LocalizerConfig};
use brandloc_core::ErrorKind;
use brandloc_localize::{AttributeSanitizer, BrandGuardrails, MasterConfig, RegionCatalog};
use brandloc_pipeline::CampaignRunner;
use image::{DynamicImage, Rgb, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn scratch() -> PathBuf {
    std::env::temp_dir().join(format!("brandloc_e2e_test_{}", uuid::Uuid::new_v4()))
}

fn config(root: &Path) -> LocalizerConfig {
    let mut config = LocalizerConfig::default();
    config.output.dir = root.join("output");
    config.output.max_attempts = 2;
    config.output.retry_base_ms = 1;
    config.output.preview_max_dimension = 48;
    config.recovery.state_dir = root.join("state");
    config.recovery.error_dir = root.join("errors");
    config.batch.max_concurrency = 3;
    config
}

fn master() -> MasterConfig {
    let raw = MockProvider::new()
        .analyze(&AnalysisSource::Text("luxury watch on a plinth".into()))
        .unwrap();
    MasterConfig::from_attributes("spring_launch", Some("brief.txt"), &raw, &AttributeSanitizer::builtin())
}

fn guardrails() -> BrandGuardrails {
    BrandGuardrails {
        negative_prompts: vec!["competitor logos".into(), "blurry".into()],
        forbidden_elements: vec!["alcohol".into()],
        required_elements: vec!["brand logo".into()],
    }
}

#[test]
fn test_campaign_run_snapshot_and_resume() {
    let root = scratch();
    let cfg = config(&root);
    let catalog = RegionCatalog::builtin().unwrap();
    let regions = catalog.all().to_vec();
    let master = master();
    let reference = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 64, Rgb([120, 120, 120])));

    let flaky = CampaignRunner::new(
        Arc::new(
            MockProvider::new()
                .with_base_size(64)
                .failing_for(["paris_metro", "dubai_mall"]),
        ),
        &cfg,
    );
    let report = flaky
        .run(&master, &regions, Some(&guardrails()), Some(&reference))
        .unwrap();

    assert_eq!(report.batch.total_jobs, 7);
    assert_eq!(report.batch.completed, 5);
    assert_eq!(report.batch.failed, 2);
    assert!(report.batch.is_fully_accounted());
    assert!(report.skipped.is_empty());

    let mut pending = report.pending_region_ids();
    pending.sort();
    assert_eq!(pending, vec!["dubai_mall", "paris_metro"]);

    for job in &report.batch.jobs {
        if job.status() == JobStatus::Completed {
            let record = job.result.as_ref().unwrap();
            assert!(record.all_saved());
            assert!(record.consistency_score.is_some());
        } else {
            assert!(job.error.as_deref().unwrap().contains("mock provider configured to fail"));
        }
    }

    // every completed region carries the master's locked attributes
    for record in report.records() {
        let audit: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(record.audit_path.as_ref().unwrap()).unwrap(),
        )
        .unwrap();
        assert_eq!(
            audit["locked_attributes"],
            serde_json::to_value(master.locked_attributes()).unwrap()
        );
        assert_eq!(audit["negative_prompts"][0], "competitor logos");
        assert_eq!(audit["provenance"]["status"], "not_available");
        assert_eq!(
            audit["provenance"]["manifest"]["config_fingerprint"],
            report.config_fingerprint.as_str()
        );
    }

    let summary = flaky.output().summary(None).unwrap();
    assert_eq!(summary.regions, 5);
    assert_eq!(summary.primary, 5);
    assert_eq!(summary.preview, 5);
    assert_eq!(summary.heatmap, 5);
    assert_eq!(summary.audit, 5);

    let handle = report.recovery_handle.clone().expect("snapshot written");
    let state = flaky.recovery().load_state(&handle).unwrap();
    assert_eq!(state.campaign_id, "spring_launch");
    assert_eq!(state.master_config, master);
    assert_eq!(state.progress.processed_count, 5);
    assert_eq!(state.progress.pending_count, 2);
    assert_eq!(
        state.error_info.as_ref().map(|e| e.kind),
        Some(ErrorKind::PartialBatchFailure)
    );

    let logged = flaky.error_log().recent(10).unwrap();
    assert_eq!(
        logged
            .iter()
            .filter(|e| e.kind == ErrorKind::ExternalServiceError)
            .count(),
        2
    );
    assert!(logged.iter().any(|e| e.kind == ErrorKind::PartialBatchFailure));

    // the outage is over: resume only the pending regions
    let healthy = CampaignRunner::new(Arc::new(MockProvider::new().with_base_size(64)), &cfg);
    let resumed = healthy
        .resume(&handle, &catalog, Some(&guardrails()), Some(&reference))
        .unwrap();
    assert_eq!(resumed.batch.total_jobs, 2);
    assert_eq!(resumed.batch.completed, 2);
    assert!(resumed.is_clean());
    assert!(resumed.recovery_handle.is_none());
    assert!(healthy
        .recovery()
        .get_latest_state("spring_launch")
        .unwrap()
        .is_none());
    assert_eq!(healthy.output().summary(None).unwrap().regions, 7);

    std::fs::remove_dir_all(&root).ok();
}

#[test]
fn test_sequential_clean_run_writes_no_snapshot() {
    let root = scratch();
    let mut cfg = config(&root);
    cfg.batch.max_concurrency = 1;
    let catalog = RegionCatalog::builtin().unwrap();
    let regions = catalog.select(&["tokyo_subway", "berlin_billboard"]).unwrap();

    let runner = CampaignRunner::new(Arc::new(MockProvider::new().with_base_size(32)), &cfg);
    let report = runner.run(&master(), &regions, None, None).unwrap();

    assert!(report.is_clean());
    assert_eq!(report.processed_region_ids(), vec!["tokyo_subway", "berlin_billboard"]);
    assert!(report.recovery_handle.is_none());
    for record in report.records() {
        assert!(record.consistency_score.is_none());
        assert!(record.heatmap_path.is_none());
    }
    assert!(runner.recovery().list_states(None).unwrap().is_empty());
    assert!(runner.error_log().recent(5).unwrap().is_empty());

    std::fs::remove_dir_all(&root).ok();
}
