// src/errors.rs

//! Crate-wide error kinds and the `Result` alias.
//!
//! Expected "not found" conditions (a job id that matches no row, a file
//! token that resolves to nothing) are ordinary error kinds here, not
//! panics; panicking is reserved for genuinely unexpected faults.

use thiserror::Error;

use crate::store::JobId;

#[derive(Error, Debug)]
pub enum GridError {
    #[error("missing input file: {0}")]
    MissingInputFile(String),

    #[error("invalid input parameter: {0}")]
    InvalidInputParameter(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("invalid command-line argument: {0}")]
    InvalidCliArgument(String),

    /// The store returned more than one row for a job id. The id column is
    /// the primary key, so this means the store invariant itself is broken.
    #[error("job id {0} is not unique in the store")]
    MultipleRows(JobId),

    #[error("no such job: {0}")]
    NotAProcess(JobId),

    #[error("invalid application id: {0}")]
    InvalidAppId(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("compute backend error: {0}")]
    Backend(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("insufficient permission: {0}")]
    InsufficientPermission(String),

    /// The bounds of grid resources (compute units per work unit, staging
    /// limits) would be exceeded.
    #[error("exceeded resource limit: {0}")]
    ExceededResourceLimit(String),

    #[error("null reference: {0}")]
    NullReference(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, GridError>;
