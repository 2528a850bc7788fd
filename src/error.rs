//! Error types for the filing agent

use crate::models::Year;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pipeline and agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {

    // =============================
    // Configuration
    // =============================

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // =============================
    // Corpus Pipeline Errors
    // =============================

    #[error("Corpus download from {url} failed with status {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("Corrupt corpus archive {path}: {reason}")]
    CorruptArchive { path: PathBuf, reason: String },

    #[error("Filing for {year} could not be read at {path}: {reason}")]
    MissingFiling {
        year: Year,
        path: PathBuf,
        reason: String,
    },

    #[error("Filing for {year} contains no text")]
    EmptyFiling { year: Year },

    #[error("Index unavailable for year {year}: {reason}")]
    IndexUnavailable { year: Year, reason: String },

    #[error("Unknown year: {0}")]
    UnknownYear(Year),

    // =============================
    // Tools & Query Engines
    // =============================

    #[error("Duplicate tool name: {0}")]
    DuplicateTool(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    #[error("Tool error: {0}")]
    ToolError(String),

    #[error("Invalid sub-question plan: {0}")]
    InvalidPlan(String),

    // =============================
    // External Capabilities
    // =============================

    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Archive error: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
