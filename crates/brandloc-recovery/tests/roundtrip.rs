use brandloc_core::{AttributeMap, AttributeValue, ErrorKind};
use brandloc_localize::MasterConfig;
use brandloc_recovery::{ErrorInfo, RecoveryStore};
use proptest::prelude::*;

fn region_ids() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z]{1,8}(_[a-z]{1,8})?", 0..6)
}

fn error_info() -> impl Strategy<Value = Option<ErrorInfo>> {
    prop::option::of(
        (
            prop_oneof![
                Just(ErrorKind::PartialBatchFailure),
                Just(ErrorKind::ExternalServiceError),
                Just(ErrorKind::InternalError),
            ],
            "[ -~]{0,40}",
            prop::collection::btree_map("[a-z]{1,6}", "[ -~]{0,12}", 0..3),
        )
            .prop_map(|(kind, message, context)| ErrorInfo {
                kind,
                message,
                context,
            }),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_recovery_round_trip(
        campaign in "[a-z][a-z0-9_-]{0,12}",
        locked in prop::collection::btree_map("[a-z_]{1,10}", "[a-z0-9 ]{0,10}", 0..5),
        processed in region_ids(),
        pending in region_ids(),
        error in error_info(),
    ) {
        let dir = std::env::temp_dir()
            .join(format!("brandloc_recovery_prop_{}", uuid::Uuid::new_v4()));
        let store = RecoveryStore::new(&dir);
        let locked: AttributeMap = locked
            .into_iter()
            .map(|(k, v)| (k, AttributeValue::text(v)))
            .collect();
        let master = MasterConfig::new(&campaign, locked, AttributeMap::new());

        let handle = store
            .save_state(&campaign, &master, &processed, &pending, error.as_ref())
            .unwrap();
        let state = store.load_state(&handle).unwrap();
        std::fs::remove_dir_all(&dir).ok();

        prop_assert_eq!(&state.campaign_id, &campaign);
        prop_assert_eq!(&state.master_config, &master);
        prop_assert_eq!(state.progress.processed_count, processed.len());
        prop_assert_eq!(state.progress.pending_count, pending.len());
        prop_assert_eq!(&state.progress.processed_region_ids, &processed);
        prop_assert_eq!(&state.progress.pending_region_ids, &pending);
        prop_assert_eq!(&state.error_info, &error);
        prop_assert_eq!(handle.campaign_id(), Some(campaign.as_str()));
    }
}
