use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigFormat;
use crate::pipeline::{ResourceProfile, DEFAULT_HEALTH_CHECK_PIPELINE_PORT};

/// Default settings file location: ~/.fleetconf/config
pub fn default_settings_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".fleetconf")
        .join("config")
}

/// Errors that can occur while loading or saving settings
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to parse settings: {0}")]
    ParseError(String),

    #[error("Failed to write settings: {0}")]
    WriteError(String),

    #[error("Invalid settings: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// User settings shared by the CLI and the pipeline service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Settings {
    /// Format assumed for files whose extension says nothing
    #[serde(default)]
    pub default_format: ConfigFormat,

    /// Resource profile given to pipelines created without one
    #[serde(default = "default_resource_profile")]
    pub default_resource_profile: String,

    /// HTTP port of the health-check pipeline
    #[serde(default = "default_health_check_port")]
    pub health_check_port: u16,

    /// Page size for config history queries without `last`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_page_limit: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_format: ConfigFormat::default(),
            default_resource_profile: default_resource_profile(),
            health_check_port: DEFAULT_HEALTH_CHECK_PIPELINE_PORT,
            history_page_limit: None,
        }
    }
}

fn default_resource_profile() -> String {
    ResourceProfile::BEST_EFFORT_LOW_RESOURCE.to_string()
}

fn default_health_check_port() -> u16 {
    DEFAULT_HEALTH_CHECK_PIPELINE_PORT
}

// ============================================================================
// SBIO: Pure business logic (no I/O)
// ============================================================================

/// Parse settings from YAML string
pub fn parse_settings(content: &str) -> Result<Settings, SettingsError> {
    if content.trim().is_empty() {
        return Ok(Settings::default());
    }
    let settings: Settings =
        serde_yaml::from_str(content).map_err(|e| SettingsError::ParseError(e.to_string()))?;
    validate_settings(&settings)?;
    Ok(settings)
}

/// Serialize settings to YAML string
pub fn serialize_settings(settings: &Settings) -> Result<String, SettingsError> {
    serde_yaml::to_string(settings).map_err(|e| SettingsError::WriteError(e.to_string()))
}

pub fn validate_settings(settings: &Settings) -> Result<(), SettingsError> {
    if settings.health_check_port == 0 {
        return Err(SettingsError::Invalid(
            "health-check-port must be greater than zero".to_string(),
        ));
    }
    if settings.history_page_limit == Some(0) {
        return Err(SettingsError::Invalid(
            "history-page-limit must be greater than zero".to_string(),
        ));
    }
    if settings.default_resource_profile.trim().is_empty() {
        return Err(SettingsError::Invalid(
            "default-resource-profile cannot be empty".to_string(),
        ));
    }
    Ok(())
}

// ============================================================================
// I/O boundary functions
// ============================================================================

/// Load settings from the default location
pub fn load_settings() -> Result<Settings, SettingsError> {
    load_settings_from(&default_settings_path())
}

/// Load settings from a specific path; a missing file yields the defaults
pub fn load_settings_from(path: &Path) -> Result<Settings, SettingsError> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let content = std::fs::read_to_string(path)?;
    parse_settings(&content)
}

/// Save settings to a specific path
pub fn save_settings_to(settings: &Settings, path: &Path) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serialize_settings(settings)?;
    std::fs::write(path, content)?;
    Ok(())
}
