//! Audit records written next to every persisted asset

use crate::authenticity::ProvenanceStatus;
use crate::provenance::ProvenanceManifest;
use brandloc_core::{AttributeMap, Timestamp};
use serde::{Deserialize, Serialize};

/// Result of the reference comparison, always present in the record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConsistencyCheck {
    Passed { score: f64, threshold: f64 },
    Flagged { score: f64, threshold: f64 },
    NotComputed { reason: String },
}

impl ConsistencyCheck {
    pub fn from_score(score: f64, threshold: f64) -> Self {
        if score > threshold {
            ConsistencyCheck::Flagged { score, threshold }
        } else {
            ConsistencyCheck::Passed { score, threshold }
        }
    }

    pub fn score(&self) -> Option<f64> {
        match self {
            ConsistencyCheck::Passed { score, .. } | ConsistencyCheck::Flagged { score, .. } => {
                Some(*score)
            }
            ConsistencyCheck::NotComputed { .. } => None,
        }
    }

    pub fn is_flagged(&self) -> bool {
        matches!(self, ConsistencyCheck::Flagged { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationInfo {
    pub campaign_id: String,
    pub region_id: String,
    pub region_name: String,
    pub locale: String,
    pub seed: u64,
    pub timestamp: Timestamp,
    pub provider: String,
    pub duration_secs: f64,
}

/// File names of the artifacts; `None` when an artifact was not saved
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditFiles {
    pub primary: Option<String>,
    pub preview: Option<String>,
    pub heatmap: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceSection {
    #[serde(flatten)]
    pub status: ProvenanceStatus,
    pub manifest: Option<ProvenanceManifest>,
}

/// The JSON audit trail for one persisted asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub generation: GenerationInfo,
    pub files: AuditFiles,
    pub consistency: ConsistencyCheck,
    pub flagged_for_review: bool,
    pub locked_attributes: AttributeMap,
    pub variable_attributes: AttributeMap,
    pub negative_prompts: Vec<String>,
    pub cultural_context: AttributeMap,
    pub forbidden_elements: Vec<String>,
    pub required_elements: Vec<String>,
    pub prompt: serde_json::Value,
    pub provenance: ProvenanceSection,
}

impl AuditRecord {
    pub fn to_json(&self) -> brandloc_core::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
