// src/core/output.rs
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::OutputConfig;
use crate::error::{PublicizerError, Result};

/// What the user asked for with the output argument
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutputSpec {
    pub directory: Option<PathBuf>,
    pub file_name: Option<OsString>,
}

impl OutputSpec {
    /// Split an output argument into its directory and file name halves.
    ///
    /// A trailing separator or an existing directory means "directory only";
    /// otherwise the last component is the file name.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PublicizerError::InvalidOutput(
                "output argument is empty".to_string(),
            ));
        }
        if trimmed.contains('\0') {
            return Err(PublicizerError::InvalidOutput(format!(
                "output argument {:?} contains a NUL byte",
                trimmed
            )));
        }

        if trimmed.ends_with('/') || trimmed.ends_with('\\') {
            let dir = trimmed.trim_end_matches(['/', '\\']);
            let dir = if dir.is_empty() { &trimmed[..1] } else { dir };
            return Ok(Self::directory_only(dir));
        }

        let path = Path::new(trimmed);
        if path.is_dir() {
            return Ok(Self::directory_only(path));
        }

        let file_name = path.file_name().ok_or_else(|| {
            PublicizerError::InvalidOutput(format!("{} does not name a file", trimmed))
        })?;
        let directory = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf);

        Ok(Self {
            directory,
            file_name: Some(file_name.to_os_string()),
        })
    }

    pub fn directory_only(dir: impl Into<PathBuf>) -> Self {
        Self {
            directory: Some(dir.into()),
            file_name: None,
        }
    }

    /// Reinterpret the whole argument as a directory, used when several inputs share it
    pub fn into_directory(self) -> Self {
        match (self.directory, self.file_name) {
            (Some(dir), Some(name)) => Self::directory_only(dir.join(name)),
            (None, Some(name)) => Self::directory_only(PathBuf::from(name)),
            (dir, None) => Self {
                directory: dir,
                file_name: None,
            },
        }
    }
}

/// Fully resolved location of one output module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    pub directory: PathBuf,
    pub file_name: OsString,
}

impl OutputTarget {
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }

    /// Create the output directory and its parents if missing
    pub fn ensure_dir(&self) -> Result<()> {
        if self.directory.as_os_str().is_empty() || self.directory.is_dir() {
            return Ok(());
        }
        debug!("Creating output directory {}", self.directory.display());
        std::fs::create_dir_all(&self.directory).map_err(|source| {
            PublicizerError::DirectoryCreate {
                path: self.directory.clone(),
                source,
            }
        })
    }
}

/// Fills the missing halves of an output argument with defaults
#[derive(Debug, Clone)]
pub struct OutputResolver {
    default_dir: PathBuf,
    suffix: String,
}

impl OutputResolver {
    pub fn new(default_dir: impl Into<PathBuf>, suffix: impl Into<String>) -> Self {
        Self {
            default_dir: default_dir.into(),
            suffix: suffix.into(),
        }
    }

    pub fn from_config(config: &OutputConfig) -> Self {
        Self::new(config.directory.clone(), config.suffix.clone())
    }

    pub fn resolve(&self, input: &Path, spec: Option<&OutputSpec>) -> Result<OutputTarget> {
        let file_name = match spec.and_then(|s| s.file_name.clone()) {
            Some(name) => name,
            None => {
                debug!("Using default output name");
                self.default_file_name(input)?
            }
        };

        let directory = spec
            .and_then(|s| s.directory.clone())
            .unwrap_or_else(|| self.default_dir.clone());

        Ok(OutputTarget {
            directory,
            file_name,
        })
    }

    /// `<stem><suffix><.extension>` of the input
    fn default_file_name(&self, input: &Path) -> Result<OsString> {
        let stem = input.file_stem().ok_or_else(|| {
            PublicizerError::Argument(format!("{} does not name a file", input.display()))
        })?;

        let mut name = stem.to_os_string();
        name.push(&self.suffix);
        if let Some(extension) = input.extension() {
            name.push(".");
            name.push(extension);
        }
        Ok(name)
    }
}

impl Default for OutputResolver {
    fn default() -> Self {
        Self::from_config(&OutputConfig::default())
    }
}
