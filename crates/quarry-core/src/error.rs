//! Error types for quarry

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using QuarryError
pub type Result<T> = std::result::Result<T, QuarryError>;

/// Error type alias for convenience
pub type Error = QuarryError;

/// Exit codes for CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const NOT_FOUND: i32 = 2;
    pub const INVALID_INPUT: i32 = 3;
}

/// Main error type for quarry
#[derive(Debug, Error)]
pub enum QuarryError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("Unsupported file type '{extension}': {}", path.display())]
    UnsupportedFileType { path: PathBuf, extension: String },

    #[error("Extraction failed for {}: {message}", path.display())]
    Extraction { path: PathBuf, message: String },

    #[error("Not indexed: {0}")]
    NotIndexed(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Corrupt snapshot '{artifact}': {message}")]
    CorruptSnapshot { artifact: String, message: String },

    #[error("Remote mirror error: {0}")]
    Mirror(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Glob pattern error: {0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("External service error: {0}")]
    ExternalError(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl QuarryError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotIndexed(_) => exit_codes::NOT_FOUND,
            Self::UnsupportedFileType { .. } | Self::InvalidInput(_) | Self::Config(_) => {
                exit_codes::INVALID_INPUT
            }
            _ => exit_codes::GENERAL_ERROR,
        }
    }

    pub(crate) fn extraction(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Self::Extraction {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
