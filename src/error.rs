use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::input_loader::JobPair;

/// Failures while discovering input files. All of them stop the run before
/// any submission happens.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("path does not exist or is not a directory: {}", path.display())]
    InvalidPath { path: PathBuf },
    #[error(
        "{} exceeds the 500MB submission limit ({size} bytes). Please remove this file and try again",
        path.display()
    )]
    Oversized { path: PathBuf, size: u64 },
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("server at {url} answered with HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("could not attach {} to the form: {source}", path.display())]
    Upload {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("expected two result tables in the response, found {found}")]
    MissingTables { found: usize },
    #[error("the server unexpectedly returned no results")]
    EmptyResult,
    #[error("{table} table has unexpected shape: {detail}")]
    Cardinality { table: &'static str, detail: String },
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("results file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("results file {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("result columns changed: expected {expected:?}, got {found:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
}

/// Anything that can go wrong while processing a single job.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("submission failed: {index}/{total} {pair}: {source}")]
    Job {
        index: usize,
        total: usize,
        pair: JobPair,
        #[source]
        source: JobError,
    },
}

impl RunError {
    /// Job index an operator should pass to `--start` to pick up where the run stopped.
    pub fn restart_index(&self) -> usize {
        match self {
            RunError::Job { index, .. } => *index,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid submission url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported url scheme {0:?}, expected http or https")]
    UnsupportedScheme(String),
}

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("failed to open log file {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("a logger is already installed")]
    AlreadyInstalled(#[from] log::SetLoggerError),
}
