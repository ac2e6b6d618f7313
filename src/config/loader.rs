//! Configuration Loader
//!
//! Finds the YAML file, detects the environment, merges the environment section
//! over the base document and validates the result.

use super::error::{ConfigResult, ConfigurationError};
use super::ClearanceConfig;
use serde_yaml::Value as YamlValue;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const CONFIG_FILE_NAMES: [&str; 2] = ["clearance-config.yaml", "clearance-config.yml"];
const ENVIRONMENT_SECTIONS: [&str; 3] = ["development", "test", "production"];

pub struct ConfigManager {
    config: ClearanceConfig,
    environment: String,
    config_file: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection from `./config`
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        let directory = env::var("CLEARANCE_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"));
        Self::load_from_directory_with_env(&directory, &Self::detect_environment())
    }

    /// Load configuration from a directory with an explicit environment.
    /// Tests use this to avoid touching process environment variables.
    pub fn load_from_directory_with_env(
        config_directory: &Path,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_file = Self::find_config_file(config_directory)?;
        Self::load_from_file(&config_file, environment)
    }

    pub fn load_from_file(config_file: &Path, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        debug!(
            environment = %environment,
            config_file = %config_file.display(),
            "Loading configuration"
        );

        let yaml_content = Self::read_config_file_safely(config_file)?;
        let config = Self::parse_and_merge(&yaml_content, environment, config_file)?;
        config.validate()?;

        let sanitized = Self::sanitize_config_for_logging(&config);
        debug!(
            "Configuration loaded: {}",
            serde_json::to_string_pretty(&sanitized)
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );
        info!(
            environment = %environment,
            providers = config.providers.len(),
            endpoints = config.endpoints.len(),
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_file: config_file.to_path_buf(),
        }))
    }

    pub fn config(&self) -> &ClearanceConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// Sanitized JSON view with credentials masked
    pub fn debug_config(&self) -> serde_json::Value {
        Self::sanitize_config_for_logging(&self.config)
    }

    /// CLEARANCE_ENV || APP_ENV || 'development'
    pub fn detect_environment() -> String {
        env::var("CLEARANCE_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn find_config_file(config_directory: &Path) -> ConfigResult<PathBuf> {
        let mut searched_paths = Vec::new();
        for name in CONFIG_FILE_NAMES {
            let candidate = config_directory.join(name);
            if candidate.exists() {
                debug!("Found configuration file: {}", candidate.display());
                return Ok(candidate);
            }
            searched_paths.push(candidate);
        }
        Err(ConfigurationError::config_file_not_found(searched_paths))
    }

    fn read_config_file_safely(path: &Path) -> ConfigResult<String> {
        const MAX_CONFIG_FILE_SIZE: u64 = 10 * 1024 * 1024;

        let metadata = std::fs::metadata(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))?;

        if !metadata.is_file() {
            return Err(ConfigurationError::invalid_value(
                "file_type",
                "directory or special file",
                "Configuration path must point to a regular file",
            ));
        }
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigurationError::invalid_value(
                "file_size",
                metadata.len().to_string(),
                "Configuration file larger than 10MB",
            ));
        }

        std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))
    }

    fn parse_and_merge(
        yaml_content: &str,
        environment: &str,
        source: &Path,
    ) -> ConfigResult<ClearanceConfig> {
        let mut yaml_data: YamlValue = serde_yaml::from_str(yaml_content)
            .map_err(|e| ConfigurationError::invalid_yaml(source.display().to_string(), e))?;

        if let Some(overrides) = yaml_data
            .get(YamlValue::String(environment.to_string()))
            .cloned()
        {
            debug!("Applying environment-specific overrides for: {}", environment);
            Self::merge_yaml_values(&mut yaml_data, overrides);
        }

        if let YamlValue::Mapping(ref mut map) = yaml_data {
            for section in ENVIRONMENT_SECTIONS {
                map.remove(YamlValue::String(section.to_string()));
            }
        }

        let mut config: ClearanceConfig = serde_yaml::from_value(yaml_data).map_err(|e| {
            ConfigurationError::invalid_yaml(
                source.display().to_string(),
                format!("Failed to deserialize configuration: {e}"),
            )
        })?;
        config.environment = environment.to_string();
        Ok(config)
    }

    /// Deep merge; mappings merge key by key, everything else is replaced
    fn merge_yaml_values(base: &mut YamlValue, override_value: YamlValue) {
        match (&mut *base, override_value) {
            (YamlValue::Mapping(base_map), YamlValue::Mapping(override_map)) => {
                for (key, value) in override_map {
                    match base_map.get_mut(&key) {
                        Some(existing) => Self::merge_yaml_values(existing, value),
                        None => {
                            base_map.insert(key, value);
                        }
                    }
                }
            }
            (base_ref, override_val) => *base_ref = override_val,
        }
    }

    fn sanitize_config_for_logging(config: &ClearanceConfig) -> serde_json::Value {
        let mut config_json = serde_json::json!(config);
        let sensitive_patterns = ["password", "secret", "token", "credential"];
        Self::sanitize_json_recursive(&mut config_json, &sensitive_patterns);
        if let Some(url) = config_json.pointer_mut("/database/url") {
            *url = serde_json::Value::String("[MASKED]".to_string());
        }
        config_json
    }

    fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let key_lower = key.to_lowercase();
                    let is_sensitive = sensitive_patterns
                        .iter()
                        .any(|pattern| key_lower.contains(pattern))
                        && !key_lower.ends_with("_url");

                    if is_sensitive && !val.is_object() && !val.is_array() {
                        *val = match val {
                            serde_json::Value::String(s) if s.is_empty() => {
                                serde_json::Value::String("[EMPTY]".to_string())
                            }
                            _ => serde_json::Value::String("[MASKED]".to_string()),
                        };
                    } else {
                        Self::sanitize_json_recursive(val, sensitive_patterns);
                    }
                }
            }
            serde_json::Value::Array(items) => {
                for item in items.iter_mut() {
                    Self::sanitize_json_recursive(item, sensitive_patterns);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn sample_yaml() -> &'static str {
        r#"
database:
  url: "postgresql://clearance:pw@localhost/clearance_dev"
  max_connections: 5

scheduler:
  status_poll_interval_seconds: 120

providers:
  - code: SECURE
    protocol: acknowledged
    auth:
      requires_authentication: true
      token_url: "https://auth.secure.test/token"
      client_id: "bridge"
      client_secret: "super-secret-value"
  - code: MEDX
    protocol: batched

endpoints:
  - provider_code: MEDX
    operation_code: GET_CLEARANCE_STATUS
    base_url: "https://medx.test/api/"
    path_template: "/clearances/status"
    http_method: GET
    retrigger: true
    retrigger_count: 4
    retrigger_interval_minutes: 10

test:
  database:
    url: "postgresql://localhost/clearance_test"
  scheduler:
    status_poll_interval_seconds: 5
"#
    }

    fn write_config(dir: &TempDir) {
        fs::write(dir.path().join("clearance-config.yaml"), sample_yaml()).unwrap();
    }

    #[test]
    fn test_loads_base_configuration() {
        let dir = TempDir::new().unwrap();
        write_config(&dir);

        let manager = ConfigManager::load_from_directory_with_env(dir.path(), "development").unwrap();
        let config = manager.config();

        assert_eq!(manager.environment(), "development");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.scheduler.status_poll_interval_seconds, 120);
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.endpoints[0].retrigger_count, 4);
    }

    #[test]
    fn test_environment_section_overrides_base() {
        let dir = TempDir::new().unwrap();
        write_config(&dir);

        let manager = ConfigManager::load_from_directory_with_env(dir.path(), "test").unwrap();
        let config = manager.config();

        assert_eq!(config.database.url, "postgresql://localhost/clearance_test");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.scheduler.status_poll_interval_seconds, 5);
        assert_eq!(config.scheduler.retry_interval_seconds, 300);
        assert_eq!(config.environment, "test");
    }

    #[test]
    fn test_missing_file_reports_searched_paths() {
        let dir = TempDir::new().unwrap();
        match ConfigManager::load_from_directory_with_env(dir.path(), "test") {
            Err(ConfigurationError::ConfigFileNotFound { searched_paths }) => {
                assert_eq!(searched_paths.len(), 2);
            }
            other => panic!("expected ConfigFileNotFound, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_invalid_yaml_is_reported() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("clearance-config.yml"), "database: [unclosed").unwrap();
        assert!(matches!(
            ConfigManager::load_from_directory_with_env(dir.path(), "test"),
            Err(ConfigurationError::InvalidYaml { .. })
        ));
    }

    #[test]
    fn test_debug_config_masks_secrets() {
        let dir = TempDir::new().unwrap();
        write_config(&dir);
        let manager = ConfigManager::load_from_directory_with_env(dir.path(), "development").unwrap();

        let rendered = manager.debug_config().to_string();
        assert!(!rendered.contains("super-secret-value"));
        assert!(!rendered.contains("clearance:pw"));
        assert!(rendered.contains("https://auth.secure.test/token"));
    }
}
