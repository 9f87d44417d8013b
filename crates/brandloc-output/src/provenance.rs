//! Provenance manifests
//!
//! A manifest binds a generated asset to the master configuration, region,
//! seed, and time that produced it. Everything here is deterministic: the
//! same inputs always yield the same manifest.

use brandloc_core::{ContentHash, Result, Timestamp};
use brandloc_localize::{MasterConfig, RegionProfile};
use serde::{Deserialize, Serialize};

/// Name recorded as the claim generator in signed manifests
pub const CLAIM_GENERATOR: &str = concat!("brandloc/", env!("CARGO_PKG_VERSION"));

/// Deterministic record of where an asset came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceManifest {
    pub claim_generator: String,
    pub title: String,
    /// Stable instance id derived from the fingerprint, region and seed
    pub instance_id: String,
    /// SHA-256 hex of the canonical master configuration
    pub config_fingerprint: String,
    pub campaign_id: String,
    #[serde(default)]
    pub source_ref: Option<String>,
    pub region_id: String,
    pub region_name: String,
    pub locale: String,
    pub seed: u64,
    pub generation_timestamp: Timestamp,
}

/// SHA-256 hex over the canonical (key-sorted, compact) JSON of `master`
pub fn fingerprint(master: &MasterConfig) -> Result<String> {
    Ok(ContentHash::of_canonical(master)?.to_hex())
}

/// Build the manifest for one region's asset
pub fn build_manifest(
    master: &MasterConfig,
    region: &RegionProfile,
    seed: u64,
    timestamp: Timestamp,
) -> Result<ProvenanceManifest> {
    let config_fingerprint = fingerprint(master)?;
    let instance = ContentHash::from_text(&format!(
        "{}:{}:{}",
        config_fingerprint, region.region_id, seed
    ));
    Ok(ProvenanceManifest {
        claim_generator: CLAIM_GENERATOR.to_string(),
        title: format!("{} - {}", master.campaign_id(), region.display_name),
        instance_id: format!("xmp.iid:{}", &instance.to_hex()[..32]),
        config_fingerprint,
        campaign_id: master.campaign_id().to_string(),
        source_ref: master.metadata().source_ref.clone(),
        region_id: region.region_id.clone(),
        region_name: region.display_name.clone(),
        locale: region.locale.clone(),
        seed,
        generation_timestamp: timestamp,
    })
}

impl ProvenanceManifest {
    /// C2PA-style manifest definition handed to the signing tool
    pub fn to_claim_document(&self) -> serde_json::Value {
        serde_json::json!({
            "claim_generator": self.claim_generator,
            "title": self.title,
            "format": "image/tiff",
            "instance_id": self.instance_id,
            "assertions": [
                {
                    "label": "c2pa.actions",
                    "data": {
                        "actions": [{
                            "action": "c2pa.created",
                            "softwareAgent": self.claim_generator,
                            "when": self.generation_timestamp.to_rfc3339(),
                        }]
                    }
                },
                {
                    "label": "brandloc.provenance",
                    "data": {
                        "master_config_fingerprint": self.config_fingerprint,
                        "campaign_id": self.campaign_id,
                        "source_ref": self.source_ref,
                        "region_id": self.region_id,
                        "region_name": self.region_name,
                        "locale": self.locale,
                        "generation_seed": self.seed,
                        "generation_timestamp": self.generation_timestamp.to_rfc3339(),
                    }
                }
            ]
        })
    }
}
