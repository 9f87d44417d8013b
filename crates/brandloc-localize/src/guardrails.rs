//! Brand guardrails
//!
//! Campaign-scoped constraints that ride along with every region request.
//! Negative prompts are handed to the generator verbatim; forbidden and
//! required elements are advisory flags for a downstream review step and
//! are never enforced here.

use brandloc_core::{LocalizerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Campaign-level brand constraints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrandGuardrails {
    /// Things the generator should avoid
    #[serde(default)]
    pub negative_prompts: Vec<String>,
    /// Elements a reviewer should check are absent
    #[serde(default)]
    pub forbidden_elements: Vec<String>,
    /// Elements a reviewer should check are present
    #[serde(default)]
    pub required_elements: Vec<String>,
}

/// TOML file wrapper
#[derive(Debug, Deserialize)]
struct GuardrailsFile {
    guardrails: BrandGuardrails,
}

impl BrandGuardrails {
    /// Load guardrails from the `[guardrails]` table of a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let file: GuardrailsFile = toml::from_str(&content).map_err(|e| {
            LocalizerError::Validation(format!(
                "Failed to parse guardrails {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(file.guardrails)
    }

    pub fn is_empty(&self) -> bool {
        self.negative_prompts.is_empty()
            && self.forbidden_elements.is_empty()
            && self.required_elements.is_empty()
    }
}
