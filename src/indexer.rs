//! Indexer orchestration.
//!
//! [`FileIndexer`] owns the lifecycle state, the set of managed roots and the
//! listener tasks that turn watcher notifications into index updates.

use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::core::state::IndexerState;
use crate::indexing::discovery::{absolute_path, validate_path};
use crate::indexing::tokenizer::{Tokenizer, WordTokenizer};
use crate::indexing::walker::TreeWalker;
use crate::storage::index::{IndexStore, SearchResult};
use crate::watch::event::{FileChangeEvent, FileChangeKind, FileChangeStream};
use crate::watch::registry::{WatchRegistry, WatchService};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Builder for [`FileIndexer`]
#[derive(Default)]
pub struct FileIndexerBuilder {
    tokenizer: Option<Arc<dyn Tokenizer>>,
    watch_service: Option<Arc<dyn WatchService>>,
    config: Config,
}

impl FileIndexerBuilder {
    /// Use a custom tokenizer instead of [`WordTokenizer`]
    pub fn tokenizer(mut self, tokenizer: impl Tokenizer + 'static) -> Self {
        self.tokenizer = Some(Arc::new(tokenizer));
        self
    }

    /// Use a custom watch service instead of [`WatchRegistry`]
    pub fn watch_service(mut self, watch_service: impl WatchService + 'static) -> Self {
        self.watch_service = Some(Arc::new(watch_service));
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> FileIndexer {
        let tokenizer = self
            .tokenizer
            .unwrap_or_else(|| Arc::new(WordTokenizer::default()));
        let watches = self
            .watch_service
            .unwrap_or_else(|| Arc::new(WatchRegistry::new(self.config.clone())));
        let store = Arc::new(IndexStore::new());
        let walker = TreeWalker::new(tokenizer, store.clone(), self.config.follow_links);

        FileIndexer {
            inner: Arc::new(Shared {
                state: RwLock::new(IndexerState::Created),
                roots: Mutex::new(Vec::new()),
                store,
                walker,
                watches,
                shutdown: CancellationToken::new(),
                listeners: TaskTracker::new(),
            }),
        }
    }
}

struct Shared {
    state: RwLock<IndexerState>,
    roots: Mutex<Vec<PathBuf>>,
    store: Arc<IndexStore>,
    walker: TreeWalker,
    watches: Arc<dyn WatchService>,
    shutdown: CancellationToken,
    listeners: TaskTracker,
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.shutdown.cancel();
        let watches = self.watches.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(move || watches.clear());
            }
            Err(_) => watches.clear(),
        }
    }
}

/// Incremental word index over a set of watched roots.
///
/// Lifecycle: `Created -> Ready -> Canceled`. Roots may be added before
/// [`start`](Self::start); searching requires `Ready`. The handle is cheap to
/// clone and every operation may be called concurrently.
#[derive(Clone)]
pub struct FileIndexer {
    inner: Arc<Shared>,
}

impl Default for FileIndexer {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl FileIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> FileIndexerBuilder {
        FileIndexerBuilder::default()
    }

    /// Seed and watch every registered root plus `paths`, then become ready.
    ///
    /// Fails with [`Error::InvalidState`] unless the indexer was just created,
    /// and with [`Error::InvalidArgument`] for a missing or unsupported path.
    /// If seeding fails the indexer stays in `Created`.
    pub async fn start<I, P>(&self, paths: I) -> Result<()>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut state = self.inner.state.write().await;
        if *state != IndexerState::Created {
            return Err(Error::InvalidState(format!(
                "Cannot start an indexer that is {}",
                *state
            )));
        }

        let mut initial = Vec::new();
        for path in paths {
            initial.push(validate_path(path.as_ref(), self.inner.walker.tokenizer().as_ref())?);
        }

        let roots = {
            let mut roots = self.lock_roots();
            roots.retain(|root| {
                let exists = root.exists();
                if !exists {
                    warn!("Dropping {} which no longer exists", root.display());
                }
                exists
            });
            for path in initial {
                if !roots.contains(&path) {
                    roots.push(path);
                }
            }
            roots.clone()
        };

        match self.seed_all(&roots).await {
            Ok(streams) => {
                for (root, stream) in streams {
                    self.track(root, stream);
                }
                *state = IndexerState::Ready;
                info!(
                    "Indexer ready: {} roots, {} files, {} words",
                    roots.len(),
                    self.inner.store.file_count(),
                    self.inner.store.word_count()
                );
                Ok(())
            }
            Err(err) => {
                warn!("Seeding failed, rolling back: {}", err);
                self.clear_watchers().await;
                self.inner.store.clear();
                Err(err)
            }
        }
    }

    /// Register another root.
    ///
    /// Before [`start`](Self::start) the path is only recorded; once ready it
    /// is seeded and watched before this returns.
    pub async fn add_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let state = self.inner.state.read().await;
        if *state == IndexerState::Canceled {
            return Err(Error::InvalidState(
                "Cannot add a path to a canceled indexer".to_string(),
            ));
        }

        let path = validate_path(path.as_ref(), self.inner.walker.tokenizer().as_ref())?;
        {
            let mut roots = self.lock_roots();
            if !roots.contains(&path) {
                roots.push(path.clone());
            }
        }

        if *state == IndexerState::Ready {
            match self.seed(&path).await {
                Ok(stream) => self.track(path, stream),
                Err(err) => {
                    self.stop_watchers(vec![path.clone()]).await;
                    self.lock_roots().retain(|root| root != &path);
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Stop managing `path` and everything below it.
    ///
    /// The path does not need to exist anymore.
    pub async fn remove_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let state = self.inner.state.read().await;
        if *state == IndexerState::Canceled {
            return Err(Error::InvalidState(
                "Cannot remove a path from a canceled indexer".to_string(),
            ));
        }

        let path = absolute_path(path.as_ref())?;
        self.forget(&path).await;
        Ok(())
    }

    /// Files containing `word`, most occurrences first.
    pub async fn search_word(&self, word: &str) -> Result<Vec<SearchResult>> {
        let state = self.inner.state.read().await;
        if *state != IndexerState::Ready {
            return Err(Error::InvalidState(format!(
                "Cannot search while the indexer is {}",
                *state
            )));
        }
        Ok(self.inner.store.query(word))
    }

    pub async fn get_current_state(&self) -> IndexerState {
        *self.inner.state.read().await
    }

    /// Stop all watchers and listeners and drop the index. Terminal.
    pub async fn cancel(&self) -> Result<()> {
        let mut state = self.inner.state.write().await;
        if *state != IndexerState::Ready {
            return Err(Error::InvalidState(format!(
                "Cannot cancel an indexer that is {}",
                *state
            )));
        }

        *state = IndexerState::Canceled;
        self.inner.shutdown.cancel();
        self.inner.listeners.close();
        self.clear_watchers().await;
        self.inner.listeners.wait().await;

        self.inner.store.clear();
        self.lock_roots().clear();
        info!("Indexer canceled");
        Ok(())
    }

    /// The roots currently managed, in registration order
    pub fn roots(&self) -> Vec<PathBuf> {
        self.lock_roots().clone()
    }

    fn lock_roots(&self) -> MutexGuard<'_, Vec<PathBuf>> {
        self.inner
            .roots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn seed_all(&self, roots: &[PathBuf]) -> Result<Vec<(PathBuf, FileChangeStream)>> {
        let mut seeding = JoinSet::new();
        for root in roots {
            let indexer = self.clone();
            let root = root.clone();
            seeding.spawn(async move {
                let stream = indexer.seed(&root).await?;
                Ok::<_, Error>((root, stream))
            });
        }

        let mut streams = Vec::with_capacity(roots.len());
        while let Some(joined) = seeding.join_next().await {
            match joined.map_err(Error::from).and_then(|seeded| seeded) {
                Ok(seeded) => streams.push(seeded),
                Err(err) => {
                    seeding.shutdown().await;
                    return Err(err);
                }
            }
        }
        Ok(streams)
    }

    /// Start watching `root`, then index it.
    ///
    /// The watcher is up before the walk begins, so changes made during the
    /// walk are buffered in the returned stream.
    async fn seed(&self, root: &Path) -> Result<FileChangeStream> {
        let watches = self.inner.watches.clone();
        let watched = root.to_path_buf();
        let mut stream =
            tokio::task::spawn_blocking(move || watches.start_watching(&watched)).await??;

        loop {
            match stream.recv().await {
                Some(event) if event.kind == FileChangeKind::Initialized => break,
                Some(_) => continue,
                None => return Err(Error::WatcherClosed(root.to_path_buf())),
            }
        }

        self.inner.walker.index_path(root).await?;
        Ok(stream)
    }

    fn track(&self, root: PathBuf, stream: FileChangeStream) {
        let shared = Arc::downgrade(&self.inner);
        let shutdown = self.inner.shutdown.clone();
        self.inner
            .listeners
            .spawn(listen(shared, shutdown, root, stream));
    }

    async fn apply(&self, event: FileChangeEvent) {
        let FileChangeEvent { path, kind } = event;
        debug!("Applying {:?} for {}", kind, path.display());

        let result = match kind {
            FileChangeKind::Initialized => Ok(()),
            FileChangeKind::Created => self.inner.walker.index_path(&path).await.map(|_| ()),
            FileChangeKind::Modified if path.is_dir() => Ok(()),
            FileChangeKind::Modified => self
                .inner
                .walker
                .index_file(path.clone())
                .await
                .map(|_| ()),
            FileChangeKind::Deleted => {
                self.forget(&path).await;
                Ok(())
            }
        };

        if let Err(err) = result {
            warn!("Failed to apply {:?} for {}: {}", kind, path.display(), err);
        }
    }

    /// Drop `path` from the roots and the index, along with every root below
    /// it.
    async fn forget(&self, path: &Path) {
        let nested: Vec<PathBuf> = {
            let mut roots = self.lock_roots();
            let (nested, kept) = roots.drain(..).partition(|root| root.starts_with(path));
            *roots = kept;
            nested
        };
        self.stop_watchers(nested).await;

        let purged = self.inner.store.remove_by_prefix(path);
        debug!("Removed {} files under {}", purged, path.display());
    }

    // Stopping a watcher joins its OS thread, so it runs on the blocking pool
    async fn stop_watchers(&self, roots: Vec<PathBuf>) {
        if roots.is_empty() {
            return;
        }
        let watches = self.inner.watches.clone();
        let stopped = tokio::task::spawn_blocking(move || {
            for root in &roots {
                watches.stop_watching(root);
            }
        })
        .await;
        if let Err(err) = stopped {
            warn!("Failed to stop watchers: {}", err);
        }
    }

    async fn clear_watchers(&self) {
        let watches = self.inner.watches.clone();
        if let Err(err) = tokio::task::spawn_blocking(move || watches.clear()).await {
            warn!("Failed to stop watchers: {}", err);
        }
    }
}

async fn listen(
    shared: Weak<Shared>,
    shutdown: CancellationToken,
    root: PathBuf,
    mut stream: FileChangeStream,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = stream.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let Some(inner) = shared.upgrade() else {
            break;
        };
        FileIndexer { inner }.apply(event).await;
    }

    debug!("Stopped listening for changes under {}", root.display());
}
