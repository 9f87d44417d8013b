//! Layered configuration system
//!
//! Config is loaded with three layers of precedence (highest wins):
//! 1. Environment variables: `BRANDLOC_{PROVIDER}_API_KEY`, `BRANDLOC_OUTPUT_DIR`
//! 2. Project-local: `.brandloc/config.toml`
//! 3. Global: `~/.brandloc/config.toml`
//!
//! File layers are merged table by table before deserializing, so a project
//! file only needs the keys it changes.

use crate::provider::GenerationParams;
use brandloc_core::{LocalizerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Providers that get an env var override even when no file mentions them
const KNOWN_PROVIDERS: &[&str] = &["bria", "mock"];

/// Provider-specific configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Generation defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub provider: String,
    pub seed: u64,
    pub steps: u32,
    pub guidance: f64,
    pub aspect_ratio: String,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        let params = GenerationParams::default();
        Self {
            provider: "mock".to_string(),
            seed: params.seed,
            steps: params.steps,
            guidance: params.guidance,
            aspect_ratio: params.aspect_ratio,
        }
    }
}

/// Batch execution settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Jobs in flight at once; 1 means sequential
    pub max_concurrency: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self { max_concurrency: 3 }
    }
}

/// Output persistence settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub dir: PathBuf,
    pub max_attempts: u32,
    pub retry_base_ms: u64,
    /// Scores above this flag the output for review
    pub consistency_threshold: f64,
    pub preview_max_dimension: u32,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            max_attempts: 3,
            retry_base_ms: 1000,
            consistency_threshold: 0.05,
            preview_max_dimension: 1024,
        }
    }
}

/// Recovery and error log settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    pub state_dir: PathBuf,
    pub error_dir: PathBuf,
    /// A batch whose failure ratio exceeds this is snapshotted
    pub failure_ratio_threshold: f64,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("state"),
            error_dir: PathBuf::from("errors"),
            failure_ratio_threshold: 0.0,
        }
    }
}

/// Resolved configuration with environment variable overrides applied
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalizerConfig {
    pub providers: HashMap<String, ProviderConfig>,
    pub generation: GenerationSettings,
    pub batch: BatchSettings,
    pub output: OutputSettings,
    pub recovery: RecoverySettings,
}

impl LocalizerConfig {
    /// Load config with layered precedence: global < project < env vars
    pub fn load() -> Result<Self> {
        let mut layers = Vec::new();
        if let Some(global_path) = Self::global_config_path() {
            layers.push(global_path);
        }
        layers.push(PathBuf::from(".brandloc/config.toml"));
        Self::load_layers(&layers)
    }

    /// Load from explicit file layers, lowest precedence first.
    ///
    /// Missing files are skipped. Environment overrides are applied last.
    pub fn load_layers(paths: &[PathBuf]) -> Result<Self> {
        let mut merged = toml::Table::new();
        for path in paths {
            if path.exists() {
                merge_tables(&mut merged, Self::load_table(path)?);
            }
        }
        let mut config: LocalizerConfig = toml::Value::Table(merged)
            .try_into()
            .map_err(|e| LocalizerError::Config(format!("Invalid config: {}", e)))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load config from a specific file path only (plus env overrides)
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let table = Self::load_table(path)?;
        let mut config: LocalizerConfig = toml::Value::Table(table).try_into().map_err(|e| {
            LocalizerError::Config(format!("Invalid config {}: {}", path.display(), e))
        })?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Get API key for a provider
    pub fn api_key(&self, provider_name: &str) -> Option<&str> {
        self.providers
            .get(provider_name)
            .and_then(|p| p.api_key.as_deref())
    }

    /// Get API URL for a provider (or `None` for the provider default)
    pub fn api_url(&self, provider_name: &str) -> Option<&str> {
        self.providers
            .get(provider_name)
            .and_then(|p| p.api_url.as_deref())
    }

    /// Check if a provider is enabled
    pub fn is_enabled(&self, provider_name: &str) -> bool {
        self.providers
            .get(provider_name)
            .map(|p| p.enabled)
            .unwrap_or(true)
    }

    /// Default sampling parameters for generation calls
    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            seed: self.generation.seed,
            steps: self.generation.steps,
            guidance: self.generation.guidance,
            aspect_ratio: self.generation.aspect_ratio.clone(),
        }
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".brandloc").join("config.toml"))
    }

    fn load_table(path: &Path) -> Result<toml::Table> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            LocalizerError::Config(format!("Failed to parse config {}: {}", path.display(), e))
        })
    }

    fn apply_env_overrides(&mut self) {
        let mut names: Vec<String> = KNOWN_PROVIDERS.iter().map(|s| s.to_string()).collect();
        for name in self.providers.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        for name in names {
            let env_key = format!("BRANDLOC_{}_API_KEY", name.to_uppercase());
            if let Ok(key) = std::env::var(&env_key) {
                let entry = self.providers.entry(name).or_default();
                entry.api_key = Some(key);
            }
        }
        if let Ok(dir) = std::env::var("BRANDLOC_OUTPUT_DIR") {
            self.output.dir = PathBuf::from(dir);
        }
    }
}

/// Overlay `overlay` onto `base`; nested tables merge, everything else replaces
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match value {
            toml::Value::Table(patch) => {
                if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                    merge_tables(existing, patch);
                    continue;
                }
                base.insert(key, toml::Value::Table(patch));
            }
            other => {
                base.insert(key, other);
            }
        }
    }
}
