//! Current local state: the engine-owned files in the output directory.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;

use super::error::SyncError;
use super::file::PART_SUFFIX;
use super::plan::FILE_EXTENSION;

const LOCK_FILE_NAME: &str = ".gphotos-sync.lock";

/// List regular files directly inside `directory` whose names end with
/// the engine's extension. Symlinks count when they resolve to a regular
/// file. Read once per run; any failure to read the directory is fatal.
pub async fn scan(directory: &Path) -> Result<BTreeSet<String>, SyncError> {
    let inventory_err = |source| SyncError::Inventory {
        path: directory.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(directory)
        .await
        .map_err(inventory_err)?;
    let mut names = BTreeSet::new();

    while let Some(entry) = entries.next_entry().await.map_err(inventory_err)? {
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            tracing::debug!("Ignoring non UTF-8 filename {:?}", entry.file_name());
            continue;
        };
        if !name.ends_with(FILE_EXTENSION) {
            continue;
        }
        match tokio::fs::metadata(entry.path()).await {
            Ok(meta) if meta.is_file() => {
                names.insert(name);
            }
            Ok(_) => tracing::debug!("Ignoring non-file entry {}", name),
            // Dangling symlink or entry removed since listing.
            Err(e) => tracing::debug!("Ignoring unreadable entry {}: {}", name, e),
        }
    }

    Ok(names)
}

/// Remove `*.jpg.part` files left behind by a run that died mid-download.
///
/// Call with the directory lock held. Returns how many were removed;
/// individual removal failures are logged and skipped.
pub async fn sweep_partials(directory: &Path) -> Result<usize, SyncError> {
    let inventory_err = |source| SyncError::Inventory {
        path: directory.to_path_buf(),
        source,
    };
    let suffix = format!("{}{}", FILE_EXTENSION, PART_SUFFIX);

    let mut entries = tokio::fs::read_dir(directory)
        .await
        .map_err(inventory_err)?;
    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await.map_err(inventory_err)? {
        let is_part = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.ends_with(&suffix));
        if !is_part {
            continue;
        }
        match entry.file_type().await {
            Ok(t) if t.is_file() => {}
            _ => continue,
        }
        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => {
                tracing::info!("Removed interrupted download {}", entry.path().display());
                removed += 1;
            }
            Err(e) => tracing::warn!("Could not remove {}: {}", entry.path().display(), e),
        }
    }
    Ok(removed)
}

/// Exclusive advisory lock on the output directory, held until dropped.
#[derive(Debug)]
pub struct DirectoryLock {
    path: PathBuf,
    _file: std::fs::File,
}

impl DirectoryLock {
    /// Take the lock or fail immediately if another run holds it.
    pub async fn acquire(directory: &Path) -> Result<Self, SyncError> {
        let path = directory.join(LOCK_FILE_NAME);
        tokio::task::spawn_blocking(move || {
            let lock_err = |reason: String| SyncError::Lock {
                path: path.clone(),
                reason,
            };
            let file = std::fs::File::create(&path).map_err(|e| lock_err(e.to_string()))?;
            FileExt::try_lock_exclusive(&file)
                .map_err(|_| lock_err("another sync is running on this directory".into()))?;
            Ok(Self { path, _file: file })
        })
        .await
        .map_err(|e| SyncError::Lock {
            path: directory.join(LOCK_FILE_NAME),
            reason: e.to_string(),
        })?
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
