//! Provider registry
//!
//! Maps provider names to concrete implementations.

pub mod bria;
pub mod mock;

use crate::config::LocalizerConfig;
use crate::provider::GenerationProvider;
use brandloc_core::{LocalizerError, Result};

/// Create a provider by name with configuration
pub fn create_provider(
    name: &str,
    config: &LocalizerConfig,
) -> Result<Box<dyn GenerationProvider>> {
    if !config.is_enabled(name) {
        return Err(LocalizerError::Config(format!(
            "Provider '{}' is disabled in configuration",
            name
        )));
    }
    match name {
        "mock" => Ok(Box::new(mock::MockProvider::new())),
        "bria" => Ok(Box::new(bria::BriaProvider::from_config(config)?)),
        _ => Err(LocalizerError::Config(format!(
            "Unknown provider '{}'. Available: {}",
            name,
            available_providers().join(", ")
        ))),
    }
}

/// List all available provider names
pub fn available_providers() -> Vec<&'static str> {
    vec!["mock", "bria"]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_mock() {
        let provider = create_provider("mock", &LocalizerConfig::default()).unwrap();
        assert_eq!(provider.name(), "mock");
    }

    #[test]
    fn test_unknown_provider() {
        let err = create_provider("dalle", &LocalizerConfig::default())
            .err()
            .unwrap()
            .to_string();
        assert!(err.contains("mock, bria"));
    }

    #[test]
    fn test_disabled_provider() {
        let mut config = LocalizerConfig::default();
        config.providers.insert(
            "mock".to_string(),
            crate::config::ProviderConfig {
                api_key: None,
                api_url: None,
                enabled: false,
            },
        );
        assert!(create_provider("mock", &config).is_err());
    }
}
