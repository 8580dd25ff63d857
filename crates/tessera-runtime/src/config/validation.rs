//! Configuration validation utilities.

use std::collections::HashSet;

use super::error::{ConfigError, ConfigResult};
use super::schema::{LogOutput, LoggingConfig, RegistrySettings, TesseraConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &TesseraConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_registry_settings(&config.registry)?;
    Ok(())
}

/// Validates logging settings.
///
/// Levels themselves are checked when the configuration is extracted.
fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if let Some(target) = logging.filters.keys().find(|target| target.trim().is_empty()) {
        return Err(ConfigError::validation(format!(
            "Log filter target must not be empty (got {target:?})"
        )));
    }

    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "File log output requires logging.file_path",
        ));
    }

    if logging.max_files == Some(0) {
        return Err(ConfigError::validation(
            "logging.max_files must be greater than 0",
        ));
    }

    Ok(())
}

/// Validates the registry manifest.
fn validate_registry_settings(registry: &RegistrySettings) -> ConfigResult<()> {
    let mut seen = HashSet::new();
    for (index, entry) in registry.manifest.iter().enumerate() {
        if entry.name.trim().is_empty() {
            return Err(ConfigError::validation(format!(
                "Manifest entry #{index} has an empty name"
            )));
        }
        if !seen.insert((entry.name.as_str(), entry.priority, entry.value.to_string())) {
            return Err(ConfigError::validation(format!(
                "Manifest entry '{}' is declared twice with the same priority and value",
                entry.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ManifestEntry;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&TesseraConfig::default()).is_ok());
    }

    #[test]
    fn empty_manifest_name_is_rejected() {
        let mut config = TesseraConfig::default();
        config.registry.manifest.push(ManifestEntry::new("  ", 1));
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("empty name"));
    }

    #[test]
    fn duplicate_manifest_entry_is_rejected() {
        let mut config = TesseraConfig::default();
        config.registry.manifest.push(ManifestEntry::new("greeting", "hi"));
        config.registry.manifest.push(ManifestEntry::new("greeting", "hi"));
        assert!(validate_config(&config).is_err());

        config.registry.manifest[1] = ManifestEntry::new("greeting", "hi").with_priority(1);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn file_output_needs_a_path() {
        let mut config = TesseraConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());

        config.logging.file_path = Some("tessera.log".into());
        assert!(validate_config(&config).is_ok());
    }
}
