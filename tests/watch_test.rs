use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::timeout;
use wordwatch::{
    Config, FileChangeKind, FileChangeStream, Result, WatchRegistry, WatchService,
};

const WAIT: Duration = Duration::from_secs(10);

fn registry() -> WatchRegistry {
    WatchRegistry::new(Config::default().with_debounce(Duration::from_millis(100)))
}

/// Wait for `kind` on `path`, skipping unrelated notifications
async fn expect_event(stream: &mut FileChangeStream, path: &Path, kind: FileChangeKind) {
    let found = timeout(WAIT, async {
        while let Some(event) = stream.recv().await {
            if event.path == path && event.kind == kind {
                return true;
            }
        }
        false
    })
    .await;
    assert_eq!(found, Ok(true), "no {:?} for {}", kind, path.display());
}

async fn expect_closed(stream: &mut FileChangeStream) {
    let closed = timeout(WAIT, async { while stream.recv().await.is_some() {} }).await;
    assert!(closed.is_ok(), "stream was not closed");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_watch_missing_path() {
    let registry = registry();
    let err = registry
        .start_watching(Path::new("/definitely/not/here"))
        .unwrap_err();
    assert!(err.is_invalid_argument());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_initialized_comes_first() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let registry = registry();

    let mut stream = registry.start_watching(temp_dir.path())?;
    let first = timeout(WAIT, stream.recv()).await.unwrap().unwrap();
    assert_eq!(first.kind, FileChangeKind::Initialized);
    assert_eq!(first.path, temp_dir.path());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_file_watcher_reports_only_its_file() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let file = temp_dir.path().join("watched.txt");
    let sibling = temp_dir.path().join("sibling.txt");
    fs::write(&file, "before")?;

    let registry = registry();
    let mut stream = registry.start_watching(&file)?;
    expect_event(&mut stream, &file, FileChangeKind::Initialized).await;

    fs::write(&sibling, "noise")?;
    fs::write(&file, "after")?;

    let event = timeout(WAIT, stream.recv()).await.unwrap().unwrap();
    assert_eq!(event.path, file);
    assert_eq!(event.kind, FileChangeKind::Modified);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_file_watcher_ends_after_delete() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let file = temp_dir.path().join("watched.txt");
    fs::write(&file, "content")?;

    let registry = registry();
    let mut stream = registry.start_watching(&file)?;
    expect_event(&mut stream, &file, FileChangeKind::Initialized).await;

    fs::remove_file(&file)?;
    expect_event(&mut stream, &file, FileChangeKind::Deleted).await;
    expect_closed(&mut stream).await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_file_watcher_ends_when_parent_is_removed() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let parent = temp_dir.path().join("parent");
    fs::create_dir(&parent)?;
    let file = parent.join("watched.txt");
    fs::write(&file, "content")?;

    let registry = registry();
    let mut stream = registry.start_watching(&file)?;
    expect_event(&mut stream, &file, FileChangeKind::Initialized).await;

    fs::remove_dir_all(&parent)?;
    expect_event(&mut stream, &file, FileChangeKind::Deleted).await;
    expect_closed(&mut stream).await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_directory_watcher_reports_files() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let registry = registry();
    let mut stream = registry.start_watching(temp_dir.path())?;
    expect_event(&mut stream, temp_dir.path(), FileChangeKind::Initialized).await;

    let file = temp_dir.path().join("new.txt");
    fs::write(&file, "hello")?;
    expect_event(&mut stream, &file, FileChangeKind::Created).await;

    fs::remove_file(&file)?;
    expect_event(&mut stream, &file, FileChangeKind::Deleted).await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_directory_watcher_follows_new_directories() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let registry = registry();
    let mut stream = registry.start_watching(temp_dir.path())?;
    expect_event(&mut stream, temp_dir.path(), FileChangeKind::Initialized).await;

    let folder = temp_dir.path().join("folder");
    fs::create_dir(&folder)?;
    expect_event(&mut stream, &folder, FileChangeKind::Created).await;

    // Registration of the new directory happens after its batch is out
    tokio::time::sleep(Duration::from_millis(300)).await;

    let nested = folder.join("nested.txt");
    fs::write(&nested, "deep")?;
    expect_event(&mut stream, &nested, FileChangeKind::Created).await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_directory_watcher_sees_existing_subdirectories() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let deep = temp_dir.path().join("a").join("b");
    fs::create_dir_all(&deep)?;

    let registry = registry();
    let mut stream = registry.start_watching(temp_dir.path())?;
    expect_event(&mut stream, temp_dir.path(), FileChangeKind::Initialized).await;

    let file = deep.join("file.txt");
    fs::write(&file, "content")?;
    expect_event(&mut stream, &file, FileChangeKind::Created).await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stop_closes_stream() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let registry = registry();
    let mut stream = registry.start_watching(temp_dir.path())?;
    expect_event(&mut stream, temp_dir.path(), FileChangeKind::Initialized).await;

    registry.stop_watching(temp_dir.path());
    assert!(!registry.is_watching(temp_dir.path()));
    expect_closed(&mut stream).await;

    // Changes after stop are not delivered
    fs::write(temp_dir.path().join("late.txt"), "late")?;
    assert!(stream.recv().await.is_none());
    Ok(())
}
