use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PublicizerError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Output location defaults
    pub output: OutputConfig,

    /// Visibility rewrite settings
    pub rewrite: RewriteConfig,

    /// Batch input expansion
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory used when the output argument names no directory
    pub directory: PathBuf,

    /// Appended to the input file stem when the output argument names no file
    pub suffix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Replace every method body with an empty stub
    pub strip_bodies: bool,

    /// Leave fields named like an event untouched
    pub exclude_event_backing_fields: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Extensions picked up when an input is a directory
    pub extensions: Vec<String>,

    /// Descend into subdirectories of directory inputs
    pub recursive: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("publicized_assemblies"),
            suffix: "_publicized".to_string(),
        }
    }
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            strip_bodies: false,
            exclude_event_backing_fields: true,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["dll".to_string(), "exe".to_string()],
            recursive: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output: OutputConfig::default(),
            rewrite: RewriteConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| PublicizerError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| PublicizerError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration with fallback to default
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(p) => {
                if p.as_ref().exists() {
                    Self::load(p)
                } else {
                    Err(PublicizerError::Config(format!(
                        "configuration file {} not found",
                        p.as_ref().display()
                    )))
                }
            }
            None => {
                // Try common config file locations
                let candidates = [
                    "Publicizer.toml",
                    "publicizer.toml",
                    ".publicizer.toml",
                ];

                for candidate in &candidates {
                    if Path::new(candidate).exists() {
                        return Self::load(candidate);
                    }
                }

                Ok(Self::default())
            }
        }
    }
}
