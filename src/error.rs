use std::path::PathBuf;
use thiserror::Error;

/// Failures retrieving the feed body.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("feed endpoint answered with status {status} for {url}")]
    Status { url: String, status: u16 },
}

/// Failures talking to the destination store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("table {0} does not exist")]
    NoSuchTable(String),

    #[error("table {0} already exists")]
    TableExists(String),

    #[error("store error: {message}")]
    Other { message: String },
}

/// One variant per pipeline stage failure, so callers can tell them apart.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parsing failed: {0}")]
    Parse(#[from] roxmltree::Error),

    #[error("source file does not exist: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("truncating {table} failed: {source}")]
    Truncate {
        table: String,
        #[source]
        source: StoreError,
    },

    #[error("appending to {table} failed after {appended} records: {source}")]
    Append {
        table: String,
        appended: usize,
        #[source]
        source: StoreError,
    },

    #[error("creating table {table} failed: {source}")]
    TableCreation {
        table: String,
        #[source]
        source: StoreError,
    },

    #[error("could not parse destination '{0}'")]
    PathParsing(String),

    #[error("another run holds the lock at {} (token {token})", .path.display())]
    AlreadyRunning { path: PathBuf, token: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, StageError>;
