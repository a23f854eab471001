use crate::core::error::Result;
use crate::indexing::tokenizer::Tokenizer;
use crate::storage::index::{word_map, IndexStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Totals of one tree walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub directories: usize,
    pub files: usize,
    pub skipped: usize,
}

enum Visit {
    Directory(Vec<PathBuf>),
    File(bool),
}

/// Seeds the index store from the file system.
///
/// Subdirectories are listed concurrently and files are tokenized on the
/// blocking pool, many at a time.
#[derive(Clone)]
pub struct TreeWalker {
    tokenizer: Arc<dyn Tokenizer>,
    store: Arc<IndexStore>,
    follow_links: bool,
}

impl TreeWalker {
    pub fn new(tokenizer: Arc<dyn Tokenizer>, store: Arc<IndexStore>, follow_links: bool) -> Self {
        Self {
            tokenizer,
            store,
            follow_links,
        }
    }

    pub fn tokenizer(&self) -> &Arc<dyn Tokenizer> {
        &self.tokenizer
    }

    pub fn store(&self) -> &Arc<IndexStore> {
        &self.store
    }

    /// Index a directory tree or a single file.
    ///
    /// Paths that are neither directories nor supported files are skipped.
    pub async fn index_path(&self, path: &Path) -> Result<WalkStats> {
        if path.is_dir() {
            self.index_tree(path).await
        } else {
            let indexed = self.index_file(path.to_path_buf()).await?;
            Ok(WalkStats {
                files: usize::from(indexed),
                skipped: usize::from(!indexed),
                ..WalkStats::default()
            })
        }
    }

    /// Walk `root` and index every supported file below it.
    ///
    /// Resolves once the whole tree has been indexed.
    pub async fn index_tree(&self, root: &Path) -> Result<WalkStats> {
        let started = Instant::now();
        let mut stats = WalkStats::default();
        let mut pending = JoinSet::new();
        pending.spawn(list_directory(root.to_path_buf(), self.follow_links));

        while let Some(joined) = pending.join_next().await {
            match joined?? {
                Visit::Directory(entries) => {
                    stats.directories += 1;
                    for entry in entries {
                        if is_directory(&entry, self.follow_links).await {
                            pending.spawn(list_directory(entry, self.follow_links));
                        } else {
                            let walker = self.clone();
                            pending.spawn(async move { walker.index_file(entry).await.map(Visit::File) });
                        }
                    }
                }
                Visit::File(true) => stats.files += 1,
                Visit::File(false) => stats.skipped += 1,
            }
        }

        info!(
            "Indexed {} files in {} directories under {} ({} skipped) in {:.2?}",
            stats.files,
            stats.directories,
            root.display(),
            stats.skipped,
            started.elapsed()
        );
        Ok(stats)
    }

    /// Tokenize one file and replace its entries in the store.
    ///
    /// Returns false if the file was skipped: unsupported, or gone before it
    /// could be read.
    pub async fn index_file(&self, path: PathBuf) -> Result<bool> {
        let tokenizer = self.tokenizer.clone();
        let store = self.store.clone();

        tokio::task::spawn_blocking(move || {
            if !tokenizer.supports(&path) {
                return false;
            }
            match tokenizer.tokenize(&path) {
                Ok(tokens) => {
                    store.upsert_file(&path, word_map(tokens));
                    debug!("Indexed {}", path.display());
                    true
                }
                Err(err) => {
                    debug!("Skipping {}: {}", path.display(), err);
                    false
                }
            }
        })
        .await
        .map_err(Into::into)
    }
}

async fn list_directory(dir: PathBuf, follow_links: bool) -> Result<Visit> {
    let mut entries = Vec::new();
    let mut reader = match tokio::fs::read_dir(&dir).await {
        Ok(reader) => reader,
        Err(err) => {
            // Directories can disappear between listing and visiting
            warn!("Failed to read directory {}: {}", dir.display(), err);
            return Ok(Visit::Directory(entries));
        }
    };

    while let Some(entry) = reader.next_entry().await? {
        let Ok(file_type) = entry.file_type().await else {
            continue;
        };
        // Linked files are read through the link; linked directories only
        // when following links
        if file_type.is_symlink() && !follow_links && is_directory(&entry.path(), true).await {
            continue;
        }
        entries.push(entry.path());
    }
    Ok(Visit::Directory(entries))
}

async fn is_directory(path: &Path, follow_links: bool) -> bool {
    let metadata = if follow_links {
        tokio::fs::metadata(path).await
    } else {
        tokio::fs::symlink_metadata(path).await
    };
    metadata.map(|m| m.is_dir()).unwrap_or(false)
}
