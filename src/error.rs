//! Fatal errors. Anything recoverable is a [`crate::diagnostics::Diagnostic`] instead.

use std::path::PathBuf;
use thiserror::Error;

use crate::diagnostics::Diagnostic;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Agent pool is empty")]
    EmptyAgentPool,

    #[error("Unsupported file format for {}: expected delimited text", path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("File has no header row: {}", path.display())]
    MissingHeader { path: PathBuf },

    #[error("Upload via `{command}` failed: {status}")]
    UploadFailed { command: String, status: String },

    #[error("Run aborted: {0}")]
    Aborted(Diagnostic),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
