use std::path::PathBuf;
use thiserror::Error;

use crate::models::PollKey;

// Plain discriminant for reporting and matching without the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidRecord,
    DuplicateRecord,
    ExtractionFailure,
    FetchFailure,
    PersistenceFailure,
    Config,
    Io,
}

#[derive(Debug, Error)]
pub enum PollError {
    /// Raw record failed validation and was kept out of the store
    #[error("invalid record {pollster} ({date}, {state}): {reason}")]
    InvalidRecord {
        pollster: String,
        date: String,
        state: String,
        reason: String,
    },

    /// Record collides with an existing store key
    #[error("duplicate record: {0}")]
    DuplicateRecord(PollKey),

    /// Collaborator returned unusable or no data
    #[error("extraction failed: {0}")]
    ExtractionFailure(String),

    /// Document could not be retrieved or read
    #[error("fetch failed for {url}: {reason}")]
    FetchFailure { url: String, reason: String },

    /// Final store write failed; the previous file is untouched
    #[error("could not persist store to {}: {reason}", path.display())]
    PersistenceFailure { path: PathBuf, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PollError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PollError::InvalidRecord { .. } => ErrorKind::InvalidRecord,
            PollError::DuplicateRecord(_) => ErrorKind::DuplicateRecord,
            PollError::ExtractionFailure(_) => ErrorKind::ExtractionFailure,
            PollError::FetchFailure { .. } => ErrorKind::FetchFailure,
            PollError::PersistenceFailure { .. } => ErrorKind::PersistenceFailure,
            PollError::Config(_) => ErrorKind::Config,
            PollError::Io(_) => ErrorKind::Io,
        }
    }

    // Only these stop a run; everything else goes into the run report
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::PersistenceFailure | ErrorKind::Config | ErrorKind::Io
        )
    }

    pub fn fetch(url: &str, reason: impl Into<String>) -> Self {
        PollError::FetchFailure {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    pub fn extraction(reason: impl Into<String>) -> Self {
        PollError::ExtractionFailure(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, PollError>;
