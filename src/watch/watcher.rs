//! Path watchers.
//!
//! A [`PathWatcher`] turns OS notifications for one root path into an ordered
//! stream of [`FileChangeEvent`]s:
//! - a file root is observed through its parent directory, and only events
//!   for the file itself are forwarded
//! - a directory root registers every directory of its subtree
//!   individually and re-derives that set from a fresh walk whenever a batch
//!   adds or removes a directory
//!
//! Every watcher emits [`FileChangeKind::Initialized`] first and ends its
//! stream after reporting the deletion of its own root.

use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::indexing::discovery::{absolute_path, discover_directories};
use crate::watch::event::{FileChangeEvent, FileChangeKind, FileChangeStream};
use notify_debouncer_full::notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify_debouncer_full::notify::{self, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, DebouncedEvent, Debouncer, FileIdMap};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

type OsWatcher = Debouncer<RecommendedWatcher, FileIdMap>;

/// OS watcher shared by the handle and its task; `None` once released.
type SharedWatcher = Arc<Mutex<Option<OsWatcher>>>;

/// What a watcher observes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchTarget {
    File,
    Directory,
}

/// Handle to a running watcher.
///
/// Dropping the handle stops the watcher: the OS registrations are released
/// before `drop` returns and the notification stream closes.
pub struct PathWatcher {
    root: PathBuf,
    target: WatchTarget,
    os_watcher: SharedWatcher,
    task: JoinHandle<()>,
}

impl PathWatcher {
    /// Start watching `path`.
    ///
    /// Must be called from within a tokio runtime. Fails with
    /// [`Error::InvalidArgument`] if the path does not exist.
    pub fn spawn(path: &Path, config: &Config) -> Result<(Self, FileChangeStream)> {
        if !path.exists() {
            return Err(Error::InvalidArgument(format!(
                "Path does not exist: '{}'",
                path.display()
            )));
        }

        let root = absolute_path(path)?;
        let target = if root.is_dir() {
            WatchTarget::Directory
        } else {
            WatchTarget::File
        };

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let mut os_watcher = new_debouncer(
            config.debounce,
            None,
            move |result: DebounceEventResult| {
                // Fails only once the watch loop is gone
                let _ = raw_tx.send(result);
            },
        )?;

        let wanted: HashSet<PathBuf> = match target {
            WatchTarget::File => {
                let parent = root.parent().ok_or_else(|| {
                    Error::InvalidArgument(format!("Cannot watch '{}'", root.display()))
                })?;
                HashSet::from([parent.to_path_buf()])
            }
            WatchTarget::Directory => discover_directories(&root, config.follow_links)
                .into_iter()
                .collect(),
        };
        let registered = reconcile(&mut os_watcher, HashSet::new(), wanted)?;

        let os_watcher = Arc::new(Mutex::new(Some(os_watcher)));
        let (events_tx, events_rx) = mpsc::channel(config.channel_capacity.max(1));

        let watch_loop = WatchLoop {
            root: root.clone(),
            target,
            follow_links: config.follow_links,
            registered,
            os_watcher: os_watcher.clone(),
            events: events_tx,
        };
        let task = tokio::spawn(watch_loop.run(raw_rx));

        info!("Watching {} for changes", root.display());

        Ok((
            Self {
                root,
                target,
                os_watcher,
                task,
            },
            events_rx,
        ))
    }

    /// The absolute path being watched
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn target(&self) -> WatchTarget {
        self.target
    }

    /// Whether the watcher ended on its own (root deleted or fatal error)
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop watching and release the OS registrations
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for PathWatcher {
    fn drop(&mut self) {
        self.task.abort();
        release(&self.os_watcher);
        debug!("Stopped watching {}", self.root.display());
    }
}

fn release(slot: &SharedWatcher) {
    let taken = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
    if let Some(os_watcher) = taken {
        os_watcher.stop();
    }
}

enum Flow {
    Continue,
    Stop,
}

struct WatchLoop {
    root: PathBuf,
    target: WatchTarget,
    follow_links: bool,
    registered: HashSet<PathBuf>,
    os_watcher: SharedWatcher,
    events: mpsc::Sender<FileChangeEvent>,
}

impl WatchLoop {
    async fn run(mut self, mut raw: mpsc::UnboundedReceiver<DebounceEventResult>) {
        match self.pump(&mut raw).await {
            Ok(()) => debug!("Watcher for {} finished", self.root.display()),
            Err(err) => error!("Watcher for {} failed: {}", self.root.display(), err),
        }

        drop(raw);
        let slot = self.os_watcher.clone();
        if let Err(err) = tokio::task::spawn_blocking(move || release(&slot)).await {
            error!("Failed to release watcher for {}: {}", self.root.display(), err);
        }
    }

    async fn pump(&mut self, raw: &mut mpsc::UnboundedReceiver<DebounceEventResult>) -> Result<()> {
        if !self.emit(FileChangeEvent::initialized(&self.root)).await {
            return Ok(());
        }

        while let Some(batch) = raw.recv().await {
            let events = match batch {
                Ok(events) => events,
                Err(errors) => match self.triage(errors)? {
                    Flow::Continue => continue,
                    Flow::Stop => return Ok(()),
                },
            };

            let changes = self.collect_changes(&events);
            let reshaped = self.target == WatchTarget::Directory
                && changes.iter().any(|change| self.is_tree_change(change));

            for change in changes {
                let root_deleted = change.kind == FileChangeKind::Deleted && change.path == self.root;
                if !self.emit(change).await {
                    return Ok(());
                }
                if root_deleted {
                    debug!("Watched root {} was deleted", self.root.display());
                    return Ok(());
                }
            }

            // Only after the batch is out, so registration never hides the
            // events that caused it
            if reshaped {
                self.reregister().await?;
            }
        }

        Ok(())
    }

    /// Returns false once nobody listens anymore
    async fn emit(&self, event: FileChangeEvent) -> bool {
        debug!("{:?} {}", event.kind, event.path.display());
        self.events.send(event).await.is_ok()
    }

    fn collect_changes(&self, events: &[DebouncedEvent]) -> Vec<FileChangeEvent> {
        let mut changes: Vec<FileChangeEvent> = events
            .iter()
            .flat_map(|event| classify(&event.event))
            .filter_map(|change| self.concerning_root(change))
            .collect();
        changes.dedup();
        changes
    }

    /// Narrow a change to what a file watcher reports.
    ///
    /// Removing a directory is reported once for the directory, never for
    /// its content, so a deleted ancestor means the file is gone too.
    fn concerning_root(&self, change: FileChangeEvent) -> Option<FileChangeEvent> {
        match self.target {
            WatchTarget::Directory => Some(change),
            WatchTarget::File if change.path == self.root => Some(change),
            WatchTarget::File
                if change.kind == FileChangeKind::Deleted && self.root.starts_with(&change.path) =>
            {
                Some(FileChangeEvent::new(self.root.clone(), FileChangeKind::Deleted))
            }
            WatchTarget::File => None,
        }
    }

    fn is_tree_change(&self, change: &FileChangeEvent) -> bool {
        match change.kind {
            FileChangeKind::Created => change.path.is_dir(),
            // A deleted path can't be inspected anymore
            FileChangeKind::Deleted => self.registered.contains(&change.path),
            _ => false,
        }
    }

    fn triage(&self, errors: Vec<notify::Error>) -> Result<Flow> {
        for err in errors {
            if is_vanished(&err) {
                debug!("Ignoring watch error under {}: {}", self.root.display(), err);
            } else if is_interrupted(&err) {
                debug!("Watch for {} was interrupted", self.root.display());
                return Ok(Flow::Stop);
            } else {
                return Err(err.into());
            }
        }
        Ok(Flow::Continue)
    }

    async fn reregister(&mut self) -> Result<()> {
        let root = self.root.clone();
        let follow_links = self.follow_links;
        let slot = self.os_watcher.clone();
        let current = std::mem::take(&mut self.registered);

        self.registered = tokio::task::spawn_blocking(move || {
            let wanted = discover_directories(&root, follow_links).into_iter().collect();
            let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
            match guard.as_mut() {
                Some(os_watcher) => reconcile(os_watcher, current, wanted),
                None => Ok(HashSet::new()),
            }
        })
        .await??;

        debug!(
            "Watching {} directories under {}",
            self.registered.len(),
            self.root.display()
        );
        Ok(())
    }
}

/// Bring the OS registrations from `current` to `wanted`.
///
/// Returns the directories actually registered; directories that vanish
/// before they can be registered are skipped.
fn reconcile(
    os_watcher: &mut OsWatcher,
    current: HashSet<PathBuf>,
    wanted: HashSet<PathBuf>,
) -> Result<HashSet<PathBuf>> {
    for stale in current.difference(&wanted) {
        if let Err(err) = os_watcher.watcher().unwatch(stale) {
            debug!("Could not unwatch {}: {}", stale.display(), err);
        }
        os_watcher.cache().remove_root(stale);
    }

    let mut registered: HashSet<PathBuf> = current.intersection(&wanted).cloned().collect();
    for dir in wanted.difference(&current) {
        match os_watcher.watcher().watch(dir, RecursiveMode::NonRecursive) {
            Ok(()) => {
                os_watcher
                    .cache()
                    .add_root(dir.clone(), RecursiveMode::NonRecursive);
                registered.insert(dir.clone());
            }
            Err(err) if is_vanished(&err) => {
                debug!("{} vanished before it could be watched", dir.display());
            }
            Err(err) => return Err(err.into()),
        }
    }

    Ok(registered)
}

/// Map one OS event to change notifications.
pub fn classify(event: &notify::Event) -> Vec<FileChangeEvent> {
    let paths = event.paths.as_slice();
    match event.kind {
        EventKind::Create(_) => tag(paths, FileChangeKind::Created),
        EventKind::Remove(_) => tag(paths, FileChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => tag(paths, FileChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => tag(paths, FileChangeKind::Created),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match paths {
            [from, to] => vec![
                FileChangeEvent::new(from.clone(), FileChangeKind::Deleted),
                FileChangeEvent::new(to.clone(), FileChangeKind::Created),
            ],
            _ => by_existence(paths, FileChangeKind::Created),
        },
        EventKind::Modify(ModifyKind::Name(_)) => by_existence(paths, FileChangeKind::Created),
        EventKind::Modify(_) => tag(paths, FileChangeKind::Modified),
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
            tag(paths, FileChangeKind::Modified)
        }
        EventKind::Any => by_existence(paths, FileChangeKind::Modified),
        _ => Vec::new(),
    }
}

fn tag(paths: &[PathBuf], kind: FileChangeKind) -> Vec<FileChangeEvent> {
    paths
        .iter()
        .map(|path| FileChangeEvent::new(path.clone(), kind))
        .collect()
}

/// `present` for paths that still exist, DELETED for the rest
fn by_existence(paths: &[PathBuf], present: FileChangeKind) -> Vec<FileChangeEvent> {
    paths
        .iter()
        .map(|path| {
            let kind = if path.exists() {
                present
            } else {
                FileChangeKind::Deleted
            };
            FileChangeEvent::new(path.clone(), kind)
        })
        .collect()
}

fn is_vanished(err: &notify::Error) -> bool {
    match &err.kind {
        notify::ErrorKind::PathNotFound | notify::ErrorKind::WatchNotFound => true,
        notify::ErrorKind::Io(io) => io.kind() == std::io::ErrorKind::NotFound,
        _ => false,
    }
}

fn is_interrupted(err: &notify::Error) -> bool {
    matches!(&err.kind, notify::ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::Interrupted)
}
