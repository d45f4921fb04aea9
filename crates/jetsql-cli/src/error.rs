//! CLI error types.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to read job file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid job file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid job: {0}")]
    Job(String),

    #[error(transparent)]
    Join(#[from] jetsql_core::Error),

    #[error(transparent)]
    Protocol(#[from] jetsql_proto::Error),
}
