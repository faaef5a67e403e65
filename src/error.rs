use std::path::PathBuf;

use thiserror::Error;

/// Main error type for publicizer operations
#[derive(Error, Debug)]
pub enum PublicizerError {
    #[error("No input given. Provide the path to the assembly to publicize.")]
    MissingInput,

    #[error("Invalid output argument: {0}")]
    InvalidOutput(String),

    #[error("Invalid argument: {0}")]
    Argument(String),

    #[error("File {path} doesn't exist or you don't have sufficient permissions")]
    NotFound { path: PathBuf },

    #[error("Cannot read the assembly {path}: {reason}")]
    CodecRead { path: PathBuf, reason: String },

    #[error("Cannot create output directory {path}: {source}")]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot create/overwrite {path}: {reason}")]
    CodecWrite { path: PathBuf, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PublicizerError {
    pub fn read(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::CodecRead {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn write(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::CodecWrite {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Process exit code for the stage that failed in single-input mode
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MissingInput | Self::Argument(_) | Self::Config(_) => 10,
            Self::InvalidOutput(_) => 20,
            Self::NotFound { .. } => 30,
            Self::CodecRead { .. } => 40,
            Self::DirectoryCreate { .. } | Self::CodecWrite { .. } => 50,
            Self::Io(_) | Self::Serialization(_) => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, PublicizerError>;
