// Configuration file loaders

use crate::{ConfigError, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Toml,
}

impl FileFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "json" => Some(FileFormat::Json),
            "toml" => Some(FileFormat::Toml),
            _ => None,
        }
    }
}

/// Configuration file loader
pub struct ConfigLoader {
    format: FileFormat,
}

impl ConfigLoader {
    pub fn new(format: FileFormat) -> Self {
        Self { format }
    }

    /// Auto-detect format from file extension
    pub fn auto(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                ConfigError::LoadError(format!("No file extension on {}", path.display()))
            })?;

        let format = FileFormat::from_extension(ext)
            .ok_or_else(|| ConfigError::LoadError(format!("Unsupported format: {}", ext)))?;

        Ok(Self::new(format))
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    /// Load configuration from file
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Value> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::LoadError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        self.parse(&content)
    }

    /// Parse configuration from string
    ///
    /// The document root must be a table/object.
    pub fn parse(&self, content: &str) -> Result<Value> {
        let value = match self.format {
            FileFormat::Json => serde_json::from_str(content)
                .map_err(|e| ConfigError::ParseError(format!("JSON parse error: {}", e)))?,
            FileFormat::Toml => {
                let toml_value: toml::Table = toml::from_str(content)
                    .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;
                serde_json::to_value(toml_value)
                    .map_err(|e| ConfigError::SerializationError(e.to_string()))?
            }
        };

        if !value.is_object() {
            return Err(ConfigError::ParseError(
                "Configuration root must be a table".to_string(),
            ));
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json() {
        let loader = ConfigLoader::new(FileFormat::Json);
        let result = loader
            .parse(r#"{"cache": {"idle_ttl_secs": 60}}"#)
            .unwrap();
        assert_eq!(result["cache"]["idle_ttl_secs"], 60);
    }

    #[test]
    fn test_parse_toml() {
        let loader = ConfigLoader::new(FileFormat::Toml);
        let toml = r#"
            environment = "development"

            [resolver]
            reserved_subdomains = ["www", "api", "admin"]
        "#;

        let result = loader.parse(toml).unwrap();
        assert_eq!(result["environment"], "development");
        assert_eq!(result["resolver"]["reserved_subdomains"][2], "admin");
    }

    #[test]
    fn test_non_table_root_rejected() {
        let loader = ConfigLoader::new(FileFormat::Json);
        assert!(matches!(
            loader.parse("[1, 2, 3]"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(FileFormat::from_extension("json"), Some(FileFormat::Json));
        assert_eq!(FileFormat::from_extension("TOML"), Some(FileFormat::Toml));
        assert_eq!(FileFormat::from_extension("yaml"), None);

        assert_eq!(
            ConfigLoader::auto("config/orgspace.toml").unwrap().format(),
            FileFormat::Toml
        );
        assert!(ConfigLoader::auto("config/orgspace").is_err());
    }

    #[test]
    fn test_missing_file() {
        let loader = ConfigLoader::new(FileFormat::Toml);
        assert!(matches!(
            loader.load_file("/nonexistent/orgspace.toml"),
            Err(ConfigError::LoadError(_))
        ));
    }
}
