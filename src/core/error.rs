use notify_debouncer_full::notify;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Watcher for {} stopped before it was initialized", .0.display())]
    WatcherClosed(PathBuf),
}

impl Error {
    /// True for failures caused by the caller passing a bad path.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Error::InvalidArgument(_))
    }

    /// True for calls rejected by the indexer lifecycle.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Error::InvalidState(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
