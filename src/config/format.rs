use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Serialization format of a pipeline's raw configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfigFormat {
    /// Section-bracket, line-oriented `Key value` format
    #[default]
    #[serde(rename = "ini", alias = "classic", alias = "conf")]
    Classic,
    #[serde(rename = "yaml", alias = "yml")]
    Yaml,
    #[serde(rename = "json")]
    Json,
}

impl ConfigFormat {
    /// Every recognized format, in declaration order
    pub const ALL: [ConfigFormat; 3] = [
        ConfigFormat::Classic,
        ConfigFormat::Yaml,
        ConfigFormat::Json,
    ];

    /// Wire name used in API payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigFormat::Classic => "ini",
            ConfigFormat::Yaml => "yaml",
            ConfigFormat::Json => "json",
        }
    }

    /// Infer the format from a file extension.
    /// Returns `None` for unknown or missing extensions.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "conf" | "ini" => Some(ConfigFormat::Classic),
            "yaml" | "yml" => Some(ConfigFormat::Yaml),
            "json" => Some(ConfigFormat::Json),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ini" | "classic" | "conf" => Ok(ConfigFormat::Classic),
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            "json" => Ok(ConfigFormat::Json),
            other => Err(ConfigError::UnknownFormat(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format_names() {
        assert_eq!("ini".parse::<ConfigFormat>().unwrap(), ConfigFormat::Classic);
        assert_eq!("Classic".parse::<ConfigFormat>().unwrap(), ConfigFormat::Classic);
        assert_eq!("yml".parse::<ConfigFormat>().unwrap(), ConfigFormat::Yaml);
        assert_eq!("json".parse::<ConfigFormat>().unwrap(), ConfigFormat::Json);
    }

    #[test]
    fn test_unknown_format_is_an_error() {
        let result = "toml".parse::<ConfigFormat>();
        assert!(matches!(result, Err(ConfigError::UnknownFormat(name)) if name == "toml"));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("fluent-bit.conf")),
            Some(ConfigFormat::Classic)
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("pipeline.YML")),
            Some(ConfigFormat::Yaml)
        );
        assert_eq!(ConfigFormat::from_path(Path::new("config")), None);
    }

    #[test]
    fn test_serde_wire_names() {
        let json = serde_json::to_string(&ConfigFormat::Classic).unwrap();
        assert_eq!(json, "\"ini\"");

        let parsed: ConfigFormat = serde_json::from_str("\"classic\"").unwrap();
        assert_eq!(parsed, ConfigFormat::Classic);
    }
}
