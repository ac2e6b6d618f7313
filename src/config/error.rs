//! Errors raised while loading or validating clearance configuration.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("No clearance configuration file found (searched: {searched_paths:?})")]
    ConfigFileNotFound { searched_paths: Vec<PathBuf> },

    #[error("Configuration file '{file_path}' is not valid YAML: {error}")]
    InvalidYaml { file_path: String, error: String },

    #[error("Cannot read configuration file '{file_path}': {error}")]
    FileReadError { file_path: String, error: String },

    #[error("'{field}' is required in {section}")]
    MissingRequiredField { field: String, section: String },

    #[error("Provider code '{code}' is configured more than once")]
    DuplicateProvider { code: String },

    /// An endpoint row names a provider with no `providers` entry
    #[error("Endpoint {operation} refers to unknown provider '{provider_code}'")]
    UnknownProvider {
        provider_code: String,
        operation: String,
    },

    #[error("'{field}' = '{value}' is invalid: {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

impl ConfigurationError {
    pub fn config_file_not_found(searched_paths: Vec<PathBuf>) -> Self {
        Self::ConfigFileNotFound { searched_paths }
    }

    pub fn invalid_yaml(file_path: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self::InvalidYaml {
            file_path: file_path.into(),
            error: error.to_string(),
        }
    }

    pub fn file_read_error(file_path: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self::FileReadError {
            file_path: file_path.into(),
            error: error.to_string(),
        }
    }

    pub fn missing_required_field(field: impl Into<String>, section: impl Into<String>) -> Self {
        Self::MissingRequiredField {
            field: field.into(),
            section: section.into(),
        }
    }

    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigurationError>;
