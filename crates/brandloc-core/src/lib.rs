//! brandloc Core - Foundational types for the localization pipeline
//!
//! This crate provides the types every other brandloc crate depends on:
//! - `AttributeValue` - Tagged attribute values used by configurations
//! - `ContentHash` - SHA-256 based content hashing and canonical JSON
//! - Timestamp helpers shared by file naming and audit records
//! - Error types and Result alias

mod error;
mod hash;
mod time;
mod value;

pub use error::{ErrorKind, LocalizerError, Result};
pub use hash::{canonical_json, ContentHash};
pub use time::{is_safe_segment, now_utc, precise_file_stamp, Timestamp};
pub use value::{get_path, get_path_mut, maps_identical, AttributeMap, AttributeValue, Scalar};
