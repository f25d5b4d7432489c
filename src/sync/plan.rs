//! Reconciliation of the remote item set against the local file set.

use std::collections::{BTreeMap, BTreeSet};

/// Extension of every file the engine owns in the output directory.
pub const FILE_EXTENSION: &str = ".jpg";

/// A media item to mirror, as handed over by the listing collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteItem {
    pub id: String,
    pub download_url: String,
}

/// Local filename owned by a remote id. One id, one name.
pub fn local_file_name(id: &str) -> String {
    format!("{}{}", id, FILE_EXTENSION)
}

/// Ids become filenames verbatim, so they must be a single plain path
/// component.
fn is_safe_id(id: &str) -> bool {
    !id.is_empty() && id != "." && id != ".." && !id.contains(['/', '\\', '\0'])
}

/// Work for one run. Built once by [`plan`] and only read afterwards.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SyncPlan {
    /// Remote items with no local file, ordered by id.
    pub to_download: Vec<RemoteItem>,
    /// Local filenames with no remote item.
    pub to_delete: BTreeSet<String>,
    /// Distinct remote items after de-duplication.
    pub remote_total: usize,
    /// Remote items already present locally.
    pub already_present: usize,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.to_download.is_empty() && self.to_delete.is_empty()
    }
}

/// Compute the download and deletion sets.
///
/// Duplicate ids collapse to one item; the last occurrence's URL wins.
/// Items whose id cannot be used as a filename are skipped.
pub fn plan(remote: &[RemoteItem], local: &BTreeSet<String>) -> SyncPlan {
    let mut by_id: BTreeMap<&str, &RemoteItem> = BTreeMap::new();
    for item in remote {
        if !is_safe_id(&item.id) {
            tracing::warn!(id = %item.id, "Skipping remote item with unusable id");
            continue;
        }
        if by_id.insert(item.id.as_str(), item).is_some() {
            tracing::debug!(id = %item.id, "Duplicate remote id, keeping last occurrence");
        }
    }

    let expected: BTreeSet<String> = by_id.keys().map(|id| local_file_name(id)).collect();

    let to_download: Vec<RemoteItem> = by_id
        .values()
        .filter(|item| !local.contains(&local_file_name(&item.id)))
        .map(|item| (*item).clone())
        .collect();

    let to_delete: BTreeSet<String> = local.difference(&expected).cloned().collect();

    SyncPlan {
        remote_total: by_id.len(),
        already_present: by_id.len() - to_download.len(),
        to_download,
        to_delete,
    }
}
