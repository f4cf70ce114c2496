//! Error types for the driver generator

use std::path::PathBuf;

use thiserror::Error;

/// Result type for generator operations
pub type Result<T> = std::result::Result<T, GeneratorError>;

/// Driver generator errors.
///
/// Only fatal input errors live here: an unreadable configuration, a
/// missing schema corpus, an I/O failure while writing output. Resolution
/// gaps (an unreachable reference, a failed fetch, a schema missing the
/// expected structure) are not errors — they degrade to `None` and the
/// traversal continues.
#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("config file {}: {message}", .path.display())]
    InvalidConfig { path: PathBuf, message: String },

    #[error("{} not found, or contains no .json files", .0.display())]
    NoInputFiles(PathBuf),

    #[error("no template matching \"{token}\" under {}", .dir.display())]
    TemplateNotFound { token: String, dir: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
