//! Format-agnostic loading and saving of settings files and record snapshots

use crate::{Error, NormalizedPath, Result, io};
use serde::{Serialize, de::DeserializeOwned};

/// Serialization formats understood by [`ConfigStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
    Yaml,
}

impl ConfigFormat {
    /// Detect the format from a file extension.
    pub fn from_path(path: &NormalizedPath) -> Result<Self> {
        let extension = path.extension().unwrap_or("");
        match extension.to_lowercase().as_str() {
            "toml" => Ok(Self::Toml),
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            _ => Err(Error::UnsupportedFormat {
                extension: extension.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Toml => "TOML",
            Self::Json => "JSON",
            Self::Yaml => "YAML",
        }
    }
}

/// Format-agnostic configuration store.
///
/// The format is picked from the file extension; writes go through
/// [`io::write_atomic`] so a crash never leaves a half-written file behind.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigStore;

impl ConfigStore {
    pub fn new() -> Self {
        Self
    }

    /// Load a value from a `.toml`, `.json`, `.yaml` or `.yml` file.
    pub fn load<T: DeserializeOwned>(&self, path: &NormalizedPath) -> Result<T> {
        let format = ConfigFormat::from_path(path)?;
        let content = io::read_text(path)?;
        self.parse(&content, format).map_err(|message| Error::ConfigParse {
            path: path.to_native(),
            format: format.as_str().into(),
            message,
        })
    }

    /// Save a value, picking the format from the file extension.
    pub fn save<T: Serialize>(&self, path: &NormalizedPath, value: &T) -> Result<()> {
        let format = ConfigFormat::from_path(path)?;
        let content = self
            .render(value, format)
            .map_err(|message| Error::ConfigSerialize {
                path: path.to_native(),
                format: format.as_str().into(),
                message,
            })?;
        io::write_atomic(path, content.as_bytes())
    }

    /// Parse in-memory content of a known format.
    pub fn parse<T: DeserializeOwned>(
        &self,
        content: &str,
        format: ConfigFormat,
    ) -> std::result::Result<T, String> {
        match format {
            ConfigFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
            ConfigFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
            ConfigFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
        }
    }

    /// Render a value in the given format.
    pub fn render<T: Serialize>(
        &self,
        value: &T,
        format: ConfigFormat,
    ) -> std::result::Result<String, String> {
        match format {
            ConfigFormat::Toml => toml::to_string_pretty(value).map_err(|e| e.to_string()),
            ConfigFormat::Json => serde_json::to_string_pretty(value).map_err(|e| e.to_string()),
            ConfigFormat::Yaml => serde_yaml::to_string(value).map_err(|e| e.to_string()),
        }
    }
}
