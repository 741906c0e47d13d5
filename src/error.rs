use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("The selector you are trying to scrape for is invalid. Selector: {0}")]
    ParseInvalidSelector(String),

    #[error("Io Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tokio Join Error, couldn't await a task! {0}")]
    RuntimeJoin(#[from] tokio::task::JoinError),

    #[error("Reqwest Error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Csv Error: {0}")]
    Csv(#[from] csv::Error),

    /// Transport failure that is not worth retrying.
    #[error("Transport Error: {0}")]
    Transport(String),

    #[error("Request to {url} failed with HTTP status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Gave up on {url} after {attempts} attempts")]
    RetriesExhausted { url: String, attempts: u32 },

    #[error("Checkpoint file {path:?} is corrupt, found: {content:?}")]
    CorruptCheckpoint { path: PathBuf, content: String },

    #[error("Sink {path:?} has header {found:?}, expected {expected:?}")]
    SchemaMismatch {
        path: PathBuf,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Checkpoint is {checkpoint} but sink {path:?} does not exist")]
    MissingSink { path: PathBuf, checkpoint: u64 },

    #[error("Invalid range: begin {begin}, end {end}, entity count {len}")]
    InvalidRange { begin: usize, end: usize, len: usize },

    #[error("Config Error: {0}")]
    Config(String),

    #[error("Unknown data source: {0}")]
    UnknownSource(String),

    #[error("Couldn't fetch record for app {id}: {reason}")]
    Fetch { id: u64, reason: String },
}
