//! Configuration loader supporting YAML, TOML and JSON.

use crate::error::ConfigError;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigFormat {
    /// YAML format (.yaml, .yml)
    #[default]
    Yaml,
    /// TOML format (.toml)
    Toml,
    /// JSON format (.json)
    Json,
}

impl ConfigFormat {
    /// Detects the format from a file extension.
    ///
    /// Returns `None` if the extension is not recognized.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| match ext.to_lowercase().as_str() {
                "yaml" | "yml" => Some(Self::Yaml),
                "toml" => Some(Self::Toml),
                "json" => Some(Self::Json),
                _ => None,
            })
    }
}

/// Configuration loader with support for multiple formats.
///
/// The loader only parses; environment overrides are applied by the
/// configuration type itself (see [`EnvOverride`](super::EnvOverride)) using
/// the prefix recorded here.
///
/// # Example
///
/// ```rust,ignore
/// use pulse_core::config::ConfigLoader;
///
/// let loader = ConfigLoader::new().with_env_prefix("PULSE");
/// let mut config: ServerConfig = loader.load_file("pulse.yaml")?;
/// config.apply_env_overrides(loader.env_prefix().unwrap_or("PULSE"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    env_prefix: Option<String>,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self { env_prefix: None }
    }

    /// Sets the environment variable prefix for overrides (e.g. "PULSE").
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Returns the environment variable prefix, if set.
    #[must_use]
    pub fn env_prefix(&self) -> Option<&str> {
        self.env_prefix.as_deref()
    }

    /// Loads configuration from a file.
    ///
    /// The format is detected from the file extension.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file format is not recognized
    /// - The file cannot be read
    /// - The content cannot be parsed
    pub fn load_file<T, P>(&self, path: P) -> Result<T, ConfigError>
    where
        T: DeserializeOwned,
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path).ok_or_else(|| ConfigError::InvalidFormat {
            path: path.display().to_string(),
            reason: "Unrecognized file extension. Supported: .yaml, .yml, .toml, .json".to_string(),
        })?;

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        self.load_str(&content, format).map_err(|e| match e {
            ConfigError::InvalidFormat { reason, .. } => ConfigError::InvalidFormat {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    /// Loads configuration from a string with the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if the content cannot be parsed.
    pub fn load_str<T>(&self, content: &str, format: ConfigFormat) -> Result<T, ConfigError>
    where
        T: DeserializeOwned,
    {
        let invalid = |reason: String| ConfigError::InvalidFormat {
            path: "<string>".to_string(),
            reason,
        };

        match format {
            ConfigFormat::Yaml => {
                serde_yaml::from_str(content).map_err(|e| invalid(format!("YAML parse error: {e}")))
            }
            ConfigFormat::Toml => {
                toml::from_str(content).map_err(|e| invalid(format!("TOML parse error: {e}")))
            }
            ConfigFormat::Json => {
                serde_json::from_str(content).map_err(|e| invalid(format!("JSON parse error: {e}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Deserialize)]
    struct HubSection {
        host: String,
        port: u16,
        #[serde(default)]
        allow_anonymous: bool,
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("pulse.yml")),
            Some(ConfigFormat::Yaml)
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("pulse.TOML")),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("pulse.json")),
            Some(ConfigFormat::Json)
        );
        assert_eq!(ConfigFormat::from_path(Path::new("pulse.ini")), None);
        assert_eq!(ConfigFormat::from_path(Path::new("pulse")), None);
    }

    #[test]
    fn test_load_yaml_and_toml_agree() {
        let loader = ConfigLoader::new();
        let yaml: HubSection = loader
            .load_str("host: 127.0.0.1\nport: 9001\nallow_anonymous: true\n", ConfigFormat::Yaml)
            .unwrap();
        let toml: HubSection = loader
            .load_str(
                "host = \"127.0.0.1\"\nport = 9001\nallow_anonymous = true\n",
                ConfigFormat::Toml,
            )
            .unwrap();

        assert_eq!(yaml.host, toml.host);
        assert_eq!(yaml.port, toml.port);
        assert!(yaml.allow_anonymous && toml.allow_anonymous);
    }

    #[test]
    fn test_load_str_reports_parse_errors() {
        let loader = ConfigLoader::new();
        let result: Result<HubSection, _> = loader.load_str("{not json", ConfigFormat::Json);
        assert!(matches!(result, Err(ConfigError::InvalidFormat { .. })));
    }

    #[test]
    fn test_load_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hub.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, r#"{{"host": "0.0.0.0", "port": 8080}}"#).unwrap();

        let config: HubSection = ConfigLoader::new().load_file(&path).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert!(!config.allow_anonymous);
    }

    #[test]
    fn test_load_file_missing_and_unknown_extension() {
        let loader = ConfigLoader::new();

        let missing: Result<HubSection, _> = loader.load_file("/nonexistent/pulse.yaml");
        assert!(matches!(missing, Err(ConfigError::FileReadError { .. })));

        let unknown: Result<HubSection, _> = loader.load_file("pulse.conf");
        assert!(matches!(unknown, Err(ConfigError::InvalidFormat { .. })));
    }

    #[test]
    fn test_env_prefix() {
        assert_eq!(ConfigLoader::new().env_prefix(), None);
        assert_eq!(
            ConfigLoader::new().with_env_prefix("PULSE").env_prefix(),
            Some("PULSE")
        );
    }
}
