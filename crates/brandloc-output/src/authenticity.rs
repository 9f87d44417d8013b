//! Authenticity signing and verification through an external tool
//!
//! Signing is best-effort. A missing tool or a failed signature is recorded
//! as a `ProvenanceStatus`, never raised past `attest`. Verification reads
//! the embedded manifest back, summarizes it and checks the signer and the
//! master configuration fingerprint.

use crate::provenance::ProvenanceManifest;
use brandloc_core::{LocalizerError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Outcome of attaching provenance to a primary artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProvenanceStatus {
    Signed,
    Failed { reason: String },
    NotAvailable,
}

impl fmt::Display for ProvenanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvenanceStatus::Signed => write!(f, "signed"),
            ProvenanceStatus::Failed { reason } => write!(f, "failed ({})", reason),
            ProvenanceStatus::NotAvailable => write!(f, "not_available"),
        }
    }
}

/// An external collaborator that signs and verifies artifacts
pub trait AuthenticityTool: Send + Sync {
    /// Tool name for logs
    fn name(&self) -> &str;

    /// Whether the tool can be used right now
    fn is_available(&self) -> bool;

    /// Embed `manifest` into the artifact at `asset`
    fn sign(&self, asset: &Path, manifest: &ProvenanceManifest) -> Result<()>;

    /// Read back an embedded manifest, `None` when the artifact has none
    fn verify(&self, asset: &Path) -> Result<Option<Value>>;
}

/// Sign `asset` if a tool and a manifest are both at hand
pub fn attest(
    tool: Option<&dyn AuthenticityTool>,
    asset: &Path,
    manifest: Option<&ProvenanceManifest>,
) -> ProvenanceStatus {
    let (tool, manifest) = match (tool, manifest) {
        (Some(tool), Some(manifest)) => (tool, manifest),
        _ => return ProvenanceStatus::NotAvailable,
    };
    if !tool.is_available() {
        tracing::debug!(tool = tool.name(), "Authenticity tool not available");
        return ProvenanceStatus::NotAvailable;
    }
    match tool.sign(asset, manifest) {
        Ok(()) => {
            tracing::info!(tool = tool.name(), asset = %asset.display(), "Provenance signed");
            ProvenanceStatus::Signed
        }
        Err(e) => {
            tracing::warn!(tool = tool.name(), asset = %asset.display(), error = %e, "Signing failed");
            ProvenanceStatus::Failed {
                reason: e.to_string(),
            }
        }
    }
}

/// Signers trusted when no other list is given, matched case-insensitively
/// against the claim generator and the signature issuer
pub const DEFAULT_TRUSTED_SIGNERS: &[&str] = &["bria", "brandloc"];

const PROVENANCE_LABEL: &str = "brandloc.provenance";

/// Key facts of an embedded manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceSummary {
    pub claim_generator: Option<String>,
    pub title: Option<String>,
    pub signature_issuer: Option<String>,
    pub signed_at: Option<String>,
    pub config_fingerprint: Option<String>,
    pub campaign_id: Option<String>,
    pub region_id: Option<String>,
    pub locale: Option<String>,
    pub seed: Option<u64>,
}

impl ProvenanceSummary {
    /// Summarize a manifest as reported by the tool.
    ///
    /// Accepts the tool's store layout (`active_manifest` label plus a
    /// `manifests` map), an inlined `active_manifest` object, or a bare
    /// claim document.
    pub fn from_manifest(report: &Value) -> Self {
        let manifest = active_manifest(report);
        let text = |v: &Value, key: &str| v.get(key).and_then(Value::as_str).map(str::to_string);

        let signature = manifest.get("signature_info").unwrap_or(&Value::Null);
        let provenance = manifest
            .get("assertions")
            .and_then(Value::as_array)
            .and_then(|assertions| {
                assertions
                    .iter()
                    .find(|a| a.get("label").and_then(Value::as_str) == Some(PROVENANCE_LABEL))
            })
            .and_then(|a| a.get("data"))
            .unwrap_or(&Value::Null);

        Self {
            claim_generator: text(manifest, "claim_generator"),
            title: text(manifest, "title"),
            signature_issuer: text(signature, "issuer"),
            signed_at: text(signature, "time"),
            config_fingerprint: text(provenance, "master_config_fingerprint"),
            campaign_id: text(provenance, "campaign_id"),
            region_id: text(provenance, "region_id"),
            locale: text(provenance, "locale"),
            seed: provenance.get("generation_seed").and_then(Value::as_u64),
        }
    }

    /// Whether the claim generator or the issuer names a trusted signer
    pub fn signed_by_any(&self, trusted: &[&str]) -> bool {
        [&self.claim_generator, &self.signature_issuer]
            .into_iter()
            .flatten()
            .map(|s| s.to_lowercase())
            .any(|s| trusted.iter().any(|t| s.contains(&t.to_lowercase())))
    }
}

fn active_manifest(report: &Value) -> &Value {
    match report.get("active_manifest") {
        Some(Value::String(label)) => report
            .get("manifests")
            .and_then(|m| m.get(label))
            .unwrap_or(&Value::Null),
        Some(inline @ Value::Object(_)) => inline,
        _ => report,
    }
}

/// Outcome of checking an artifact's embedded provenance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerificationStatus {
    Verified,
    UntrustedSigner,
    FingerprintMismatch {
        expected: String,
        found: Option<String>,
    },
    NoCredentials,
    NotAvailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    #[serde(flatten)]
    pub status: VerificationStatus,
    pub summary: Option<ProvenanceSummary>,
}

impl VerificationReport {
    fn bare(status: VerificationStatus) -> Self {
        Self {
            status,
            summary: None,
        }
    }

    pub fn is_verified(&self) -> bool {
        self.status == VerificationStatus::Verified
    }
}

/// Read back and check the provenance embedded in `asset`.
///
/// With `expected`, the embedded master fingerprint must match it. Tool
/// failures other than "no manifest" are returned as errors.
pub fn verify_provenance(
    tool: Option<&dyn AuthenticityTool>,
    asset: &Path,
    trusted_signers: &[&str],
    expected: Option<&ProvenanceManifest>,
) -> Result<VerificationReport> {
    let tool = match tool {
        Some(tool) if tool.is_available() => tool,
        _ => return Ok(VerificationReport::bare(VerificationStatus::NotAvailable)),
    };
    let report = match tool.verify(asset)? {
        Some(report) => report,
        None => {
            tracing::warn!(tool = tool.name(), asset = %asset.display(), "No provenance found");
            return Ok(VerificationReport::bare(VerificationStatus::NoCredentials));
        }
    };

    let summary = ProvenanceSummary::from_manifest(&report);
    let status = match expected {
        Some(m) if summary.config_fingerprint.as_deref() != Some(m.config_fingerprint.as_str()) => {
            VerificationStatus::FingerprintMismatch {
                expected: m.config_fingerprint.clone(),
                found: summary.config_fingerprint.clone(),
            }
        }
        _ if !summary.signed_by_any(trusted_signers) => VerificationStatus::UntrustedSigner,
        _ => VerificationStatus::Verified,
    };
    if status == VerificationStatus::Verified {
        tracing::info!(tool = tool.name(), asset = %asset.display(), "Provenance verified");
    } else {
        tracing::warn!(tool = tool.name(), asset = %asset.display(), ?status, "Provenance not verified");
    }
    Ok(VerificationReport {
        status,
        summary: Some(summary),
    })
}

/// Adapter for a `c2patool`-compatible command line tool
#[derive(Debug, Clone)]
pub struct C2paTool {
    program: PathBuf,
}

impl Default for C2paTool {
    fn default() -> Self {
        Self::new("c2patool")
    }
}

impl C2paTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, args: &[&OsStr]) -> Result<std::process::Output> {
        Command::new(&self.program).args(args).output().map_err(|e| {
            LocalizerError::ExternalService(format!(
                "failed to run {}: {}",
                self.program.display(),
                e
            ))
        })
    }
}

impl AuthenticityTool for C2paTool {
    fn name(&self) -> &str {
        "c2patool"
    }

    fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    fn sign(&self, asset: &Path, manifest: &ProvenanceManifest) -> Result<()> {
        let stem = asset
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "asset".to_string());
        let ext = asset
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();
        let manifest_path = asset.with_file_name(format!("{}_manifest.json", stem));
        let signed_path = asset.with_file_name(format!("{}_signed.{}", stem, ext));

        std::fs::write(
            &manifest_path,
            serde_json::to_string_pretty(&manifest.to_claim_document())?,
        )?;
        let output = self.run(&[
            asset.as_os_str(),
            OsStr::new("-m"),
            manifest_path.as_os_str(),
            OsStr::new("-o"),
            signed_path.as_os_str(),
            OsStr::new("-f"),
        ]);
        std::fs::remove_file(&manifest_path).ok();
        let output = output?;

        if !output.status.success() {
            std::fs::remove_file(&signed_path).ok();
            return Err(LocalizerError::ExternalService(format!(
                "c2patool exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        std::fs::rename(&signed_path, asset)?;
        Ok(())
    }

    fn verify(&self, asset: &Path) -> Result<Option<Value>> {
        let output = self.run(&[asset.as_os_str(), OsStr::new("--detailed")])?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("No claim found") || stderr.contains("no JUMBF") {
                return Ok(None);
            }
            return Err(LocalizerError::ExternalService(format!(
                "c2patool verify failed: {}",
                stderr.trim()
            )));
        }
        match serde_json::from_str(&stdout) {
            Ok(value) => Ok(Some(value)),
            Err(_) => Ok(Some(serde_json::json!({ "raw_output": stdout.trim() }))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provenance::build_manifest;
    use brandloc_core::AttributeMap;
    use brandloc_localize::{MasterConfig, RegionProfile};

    struct FakeTool {
        available: bool,
        fail: bool,
    }

    struct EmbeddedTool {
        report: Option<Value>,
    }

    impl AuthenticityTool for EmbeddedTool {
        fn name(&self) -> &str {
            "embedded"
        }
        fn is_available(&self) -> bool {
            true
        }
        fn sign(&self, _asset: &Path, _manifest: &ProvenanceManifest) -> Result<()> {
            Ok(())
        }
        fn verify(&self, _asset: &Path) -> Result<Option<Value>> {
            Ok(self.report.clone())
        }
    }

    impl AuthenticityTool for FakeTool {
        fn name(&self) -> &str {
            "fake"
        }
        fn is_available(&self) -> bool {
            self.available
        }
        fn sign(&self, _asset: &Path, _manifest: &ProvenanceManifest) -> Result<()> {
            if self.fail {
                Err(LocalizerError::ExternalService("no signing key".into()))
            } else {
                Ok(())
            }
        }
        fn verify(&self, _asset: &Path) -> Result<Option<Value>> {
            Ok(None)
        }
    }

    fn manifest() -> ProvenanceManifest {
        let master = MasterConfig::new("c", AttributeMap::new(), AttributeMap::new());
        let region = RegionProfile::new("r", "R", "en-US");
        build_manifest(&master, &region, 1, brandloc_core::now_utc()).unwrap()
    }

    #[test]
    fn test_attest_without_tool_or_manifest() {
        let asset = Path::new("a.tif");
        assert_eq!(attest(None, asset, Some(&manifest())), ProvenanceStatus::NotAvailable);
        let tool = FakeTool { available: true, fail: false };
        assert_eq!(attest(Some(&tool), asset, None), ProvenanceStatus::NotAvailable);
    }

    #[test]
    fn test_attest_outcomes() {
        let asset = Path::new("a.tif");
        let m = manifest();
        let offline = FakeTool { available: false, fail: false };
        assert_eq!(attest(Some(&offline), asset, Some(&m)), ProvenanceStatus::NotAvailable);
        let ok = FakeTool { available: true, fail: false };
        assert_eq!(attest(Some(&ok), asset, Some(&m)), ProvenanceStatus::Signed);
        let broken = FakeTool { available: true, fail: true };
        match attest(Some(&broken), asset, Some(&m)) {
            ProvenanceStatus::Failed { reason } => assert!(reason.contains("no signing key")),
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[test]
    fn test_summary_from_tool_store_layout() {
        let m = manifest();
        let mut claim = m.to_claim_document();
        claim["signature_info"] = serde_json::json!({"issuer": "Bria AI", "time": "2025-05-01T10:00:00Z"});
        let report = serde_json::json!({
            "active_manifest": "urn:uuid:1",
            "manifests": {"urn:uuid:1": claim},
        });

        let summary = ProvenanceSummary::from_manifest(&report);
        assert_eq!(summary.config_fingerprint.as_deref(), Some(m.config_fingerprint.as_str()));
        assert_eq!(summary.region_id.as_deref(), Some("r"));
        assert_eq!(summary.locale.as_deref(), Some("en-US"));
        assert_eq!(summary.seed, Some(1));
        assert_eq!(summary.signed_at.as_deref(), Some("2025-05-01T10:00:00Z"));
        assert!(summary.signed_by_any(&["bria"]));
        assert!(!summary.signed_by_any(&["someone-else"]));

        assert_eq!(ProvenanceSummary::from_manifest(&Value::Null), ProvenanceSummary::default());
    }

    #[test]
    fn test_verify_provenance_outcomes() {
        let asset = Path::new("a.tif");
        let m = manifest();
        let signed = EmbeddedTool {
            report: Some(m.to_claim_document()),
        };

        let report = verify_provenance(Some(&signed), asset, DEFAULT_TRUSTED_SIGNERS, Some(&m)).unwrap();
        assert!(report.is_verified());
        assert_eq!(report.summary.unwrap().campaign_id.as_deref(), Some("c"));

        let report = verify_provenance(Some(&signed), asset, &["bria"], None).unwrap();
        assert_eq!(report.status, VerificationStatus::UntrustedSigner);

        let other = build_manifest(
            &MasterConfig::new("other", AttributeMap::new(), AttributeMap::new()),
            &RegionProfile::new("r", "R", "en-US"),
            1,
            brandloc_core::now_utc(),
        )
        .unwrap();
        let report = verify_provenance(Some(&signed), asset, DEFAULT_TRUSTED_SIGNERS, Some(&other)).unwrap();
        assert!(matches!(report.status, VerificationStatus::FingerprintMismatch { .. }));

        let unsigned = EmbeddedTool { report: None };
        let report = verify_provenance(Some(&unsigned), asset, DEFAULT_TRUSTED_SIGNERS, None).unwrap();
        assert_eq!(report.status, VerificationStatus::NoCredentials);
        let report = verify_provenance(None, asset, DEFAULT_TRUSTED_SIGNERS, None).unwrap();
        assert_eq!(report.status, VerificationStatus::NotAvailable);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "not_available");
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let tool = C2paTool::new("/nonexistent/bin/c2patool");
        assert!(!tool.is_available());
        assert!(tool.verify(Path::new("a.tif")).is_err());
    }

    #[test]
    fn test_status_serializes_tagged() {
        let json = serde_json::to_value(ProvenanceStatus::Failed { reason: "x".into() }).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "x");
        let json = serde_json::to_value(ProvenanceStatus::NotAvailable).unwrap();
        assert_eq!(json["status"], "not_available");
    }
}
