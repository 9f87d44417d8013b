//! brandloc Output - Persistence, consistency scoring and provenance
//!
//! Writes each generated asset as a 16-bit TIFF master plus an 8-bit PNG
//! preview, scores it against a reference image, records a JSON audit
//! trail, attaches best-effort authenticity status and verifies it on read.

pub mod audit;
pub mod authenticity;
pub mod consistency;
pub mod dual;
pub mod provenance;
pub mod retry;
pub mod store;

pub use audit::{AuditRecord, ConsistencyCheck};
pub use authenticity::{
    verify_provenance, AuthenticityTool, C2paTool, ProvenanceStatus, ProvenanceSummary,
    VerificationReport, VerificationStatus, DEFAULT_TRUSTED_SIGNERS,
};
pub use consistency::{consistency_score, render_heatmap, ConsistencyReport};
pub use dual::{verify_dual_output_consistency, CheckStatus, DualOutputReport, OutputCheck};
pub use provenance::{build_manifest, fingerprint, ProvenanceManifest};
pub use retry::{save_with_retry, RetryPolicy};
pub use store::{OutputOptions, OutputRecord, OutputStore, OutputSummary};
