//! brandloc Localize - Master configurations and region merging
//!
//! Turns one canonical product description into region-specific generation
//! requests. Locked attributes (product geometry, framing, the product
//! itself) are carried through untouched; variable attributes (background,
//! lighting, mood) take region overrides. Brand guardrails ride along as
//! negative prompts and advisory review flags.

pub mod guardrails;
pub mod merge;
pub mod model;
pub mod regions;
pub mod sanitizer;

pub use guardrails::BrandGuardrails;
pub use merge::{validate_lock_preservation, ConfigMerger, MergeReport, SkippedRegion};
pub use model::{MasterConfig, MasterMetadata, RegionProfile, RegionRequest, RequestMetadata};
pub use regions::RegionCatalog;
pub use sanitizer::{AttributeCategory, AttributeSanitizer, MappingTable, PartitionPolicy};
