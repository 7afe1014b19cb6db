// src/error.rs
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Teacher,
    Session,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Teacher => f.write_str("teacher"),
            Entity::Session => f.write_str("session"),
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: u64 },

    #[error("Write rejected: {0}")]
    Rejected(String),

    #[error("File I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    #[error("JSON processing error")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: u64 },

    #[error("Invalid input: {0}")]
    Invalid(String),

    #[error("Storage error: {0}")]
    Store(StoreError),
}

impl ServiceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound { .. })
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        // Keep not-found distinguishable no matter which layer noticed it.
        match err {
            StoreError::NotFound { entity, id } => ServiceError::NotFound { entity, id },
            other => ServiceError::Store(other),
        }
    }
}

/// Failures that abort a whole import. Row-level problems are reported in
/// the import report instead.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("File I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    #[error("Spreadsheet could not be read: {0}")]
    Csv(#[from] csv::Error),

    #[error("Column mapping is not valid JSON: {0}")]
    MalformedMapping(#[source] serde_json::Error),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

pub(crate) fn io_context(source: std::io::Error, context: impl Into<String>) -> StoreError {
    StoreError::Io {
        source,
        context: context.into(),
    }
}

pub(crate) fn import_io_context(source: std::io::Error, context: impl Into<String>) -> ImportError {
    ImportError::Io {
        source,
        context: context.into(),
    }
}
