// Core functionality
pub mod core {
    pub mod config;
    pub mod error;
    pub mod state;
}

// Index storage
pub mod storage {
    pub mod index;
}

// Indexing pipeline
pub mod indexing {
    pub mod discovery;
    pub mod tokenizer;
    pub mod walker;
}

// File system watching
pub mod watch {
    pub mod event;
    pub mod registry;
    pub mod watcher;
}

pub mod indexer;

// User interfaces
pub mod ui {
    pub mod cli;
}

// Re-export commonly used types
pub use crate::core::config::Config;
pub use crate::core::error::{Error, Result};
pub use crate::core::state::IndexerState;
pub use crate::indexer::{FileIndexer, FileIndexerBuilder};
pub use crate::indexing::tokenizer::{Token, Tokenizer, WordTokenizer};
pub use crate::storage::index::{IndexStore, SearchResult, WordLocation};
pub use crate::watch::event::{FileChangeEvent, FileChangeKind, FileChangeStream};
pub use crate::watch::registry::{WatchRegistry, WatchService};
pub use crate::watch::watcher::PathWatcher;
