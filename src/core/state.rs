use std::fmt;

/// Lifecycle state of a [`FileIndexer`](crate::FileIndexer).
///
/// `Created` is initial and `Canceled` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexerState {
    /// Built but not started. Paths may be added and removed.
    Created,
    /// Seeded and watching. Searches are allowed.
    Ready,
    /// Shut down. Every operation except reading the state fails.
    Canceled,
}

impl fmt::Display for IndexerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IndexerState::Created => "created",
            IndexerState::Ready => "ready",
            IndexerState::Canceled => "canceled",
        };
        f.write_str(name)
    }
}
