use crate::core::error::{Error, Result};
use crate::indexing::tokenizer::Tokenizer;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Make a path absolute without resolving symlinks.
///
/// Index keys and watcher notifications both use this form, so a path is
/// never compared against its canonicalized twin.
pub fn absolute_path(path: &Path) -> Result<PathBuf> {
    Ok(std::path::absolute(path)?)
}

/// Check that a path can be registered for indexing and return it absolute.
///
/// The path must exist and be either a directory or a file the tokenizer
/// supports.
pub fn validate_path(path: &Path, tokenizer: &dyn Tokenizer) -> Result<PathBuf> {
    let absolute = absolute_path(path)?;

    if !absolute.exists() {
        return Err(Error::InvalidArgument(format!(
            "Path not found: '{}'",
            absolute.display()
        )));
    }

    if !absolute.is_dir() && !tokenizer.supports(&absolute) {
        return Err(Error::InvalidArgument(format!(
            "Indexing is not supported for the content of the file located at '{}'",
            absolute.display()
        )));
    }

    Ok(absolute)
}

/// Discover every directory of a subtree, the root included.
///
/// Unreadable entries are logged and skipped; a vanished root yields an
/// empty list.
pub fn discover_directories(root: &Path, follow_links: bool) -> Vec<PathBuf> {
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(follow_links)
        .build();

    let mut directories = Vec::new();
    for result in walker {
        match result {
            Ok(entry) => {
                if entry.file_type().is_some_and(|t| t.is_dir())
                    || (follow_links && entry.path().is_dir())
                {
                    directories.push(entry.into_path());
                }
            }
            Err(err) => {
                // Directories can disappear while we walk them
                warn!("Failed to access directory entry: {}", err);
            }
        }
    }

    directories
}

/// Check if a file is plain text based on its extension
pub fn is_plain_text_file(path: &Path) -> bool {
    path.is_file() && has_plain_text_extension(path)
}

fn has_plain_text_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            matches!(
                ext.to_lowercase().as_str(),
                "txt" | "text" | "log" | "conf" | "def" | "list" | "in" | "ini"
            )
        })
        .unwrap_or(false)
}
