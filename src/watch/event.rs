use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Type of change reported by a watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileChangeKind {
    /// The watcher is registered and watching. Always the first event.
    Initialized,
    /// A file or directory appeared.
    Created,
    /// A file or directory changed in place.
    Modified,
    /// A file or directory disappeared.
    Deleted,
}

/// A change notification for a single path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileChangeEvent {
    pub path: PathBuf,
    pub kind: FileChangeKind,
}

impl FileChangeEvent {
    pub fn new(path: impl Into<PathBuf>, kind: FileChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn initialized(path: &Path) -> Self {
        Self::new(path, FileChangeKind::Initialized)
    }
}

/// Ordered stream of notifications from one watcher.
///
/// The stream ends when the watcher stops.
pub type FileChangeStream = mpsc::Receiver<FileChangeEvent>;
