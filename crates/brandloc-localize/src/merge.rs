//! Master + region merging
//!
//! `ConfigMerger` is the only place a [`RegionRequest`] is built. The locked
//! attributes are cloned once from the master and never referenced again by
//! the override loop, so every request carries the master's locked set
//! unchanged.

use crate::guardrails::BrandGuardrails;
use crate::model::{MasterConfig, RegionProfile, RegionRequest, RequestMetadata};
use brandloc_core::{maps_identical, now_utc, AttributeMap, Result};
use std::collections::HashSet;

/// A region that could not be merged, and why
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRegion {
    pub region_id: String,
    pub reason: String,
}

/// Outcome of merging a master against many regions
#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    pub requests: Vec<RegionRequest>,
    pub skipped: Vec<SkippedRegion>,
}

impl MergeReport {
    pub fn skipped_region_ids(&self) -> Vec<String> {
        self.skipped.iter().map(|s| s.region_id.clone()).collect()
    }
}

/// Produces region-specific requests from a master configuration
#[derive(Debug, Clone, Default)]
pub struct ConfigMerger;

impl ConfigMerger {
    pub fn new() -> Self {
        Self
    }

    /// Merge one region into the master
    pub fn merge(
        &self,
        master: &MasterConfig,
        region: &RegionProfile,
        guardrails: Option<&BrandGuardrails>,
    ) -> Result<RegionRequest> {
        master.validate()?;
        region.validate()?;

        let locked = master.locked_attributes().clone();

        let mut variable = master.variable_attributes().clone();
        apply_overrides(&mut variable, &region.attribute_overrides);

        let master_meta = master.metadata();
        let mut metadata = RequestMetadata {
            campaign_id: master_meta.campaign_id.clone(),
            source_ref: master_meta.source_ref.clone(),
            region_id: region.region_id.clone(),
            display_name: region.display_name.clone(),
            locale: region.locale.clone(),
            localized_at: now_utc(),
            cultural_context: region.cultural_context.clone(),
            forbidden_elements: Vec::new(),
            required_elements: Vec::new(),
            extra: master_meta.extra.clone(),
        };

        let mut negative_prompts = Vec::new();
        if let Some(guardrails) = guardrails {
            negative_prompts = guardrails.negative_prompts.clone();
            metadata.forbidden_elements = guardrails.forbidden_elements.clone();
            metadata.required_elements = guardrails.required_elements.clone();
        }

        tracing::debug!(
            campaign = %metadata.campaign_id,
            region = %metadata.region_id,
            overrides = region.attribute_overrides.len(),
            "Merged region"
        );

        Ok(RegionRequest::from_parts(
            master.version().to_string(),
            metadata,
            locked,
            variable,
            negative_prompts,
        ))
    }

    /// Merge every region independently.
    ///
    /// A region that fails to merge is logged and listed in
    /// [`MergeReport::skipped`]; the rest are still processed. Repeated
    /// region ids after the first occurrence are skipped.
    pub fn merge_all(
        &self,
        master: &MasterConfig,
        regions: &[RegionProfile],
        guardrails: Option<&BrandGuardrails>,
    ) -> MergeReport {
        let mut seen = HashSet::new();
        let outcomes: Vec<(String, Result<RegionRequest>)> = regions
            .iter()
            .map(|region| {
                let outcome = if seen.insert(region.region_id.clone()) {
                    self.merge(master, region, guardrails)
                } else {
                    Err(brandloc_core::LocalizerError::Validation(format!(
                        "duplicate region id '{}'",
                        region.region_id
                    )))
                };
                (region.region_id.clone(), outcome)
            })
            .collect();

        let mut report = MergeReport::default();
        for (region_id, outcome) in outcomes {
            match outcome {
                Ok(request) => report.requests.push(request),
                Err(e) => {
                    tracing::warn!(region = %region_id, error = %e, "Skipping region");
                    report.skipped.push(SkippedRegion {
                        region_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            campaign = %master.campaign_id(),
            merged = report.requests.len(),
            skipped = report.skipped.len(),
            "Merged regions"
        );
        report
    }
}

fn apply_overrides(variable: &mut AttributeMap, overrides: &AttributeMap) {
    for (key, value) in overrides {
        match variable.get_mut(key) {
            Some(existing) => existing.apply_override(value.clone()),
            None => {
                variable.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Deep-equality check of the locked attributes of a request and its master.
/// Floats compare bitwise, so a locked NaN still counts as preserved.
pub fn validate_lock_preservation(master: &MasterConfig, request: &RegionRequest) -> bool {
    maps_identical(master.locked_attributes(), request.locked_attributes())
}
