use std::collections::BTreeSet;
use std::path::Path;

use futures_util::future::join_all;

/// Outcome of the best-effort cleanup pass.
#[derive(Debug, Default)]
pub struct DeletionReport {
    pub deleted: Vec<String>,
    pub failed: Vec<(String, std::io::Error)>,
}

/// Remove every named file from `directory`, concurrently.
///
/// Each removal stands alone: a failure is logged and the rest carry on.
pub async fn delete_stale(directory: &Path, names: &BTreeSet<String>) -> DeletionReport {
    let removals = names.iter().map(|name| async move {
        let result = tokio::fs::remove_file(directory.join(name)).await;
        (name.clone(), result)
    });

    let mut report = DeletionReport::default();
    for (name, result) in join_all(removals).await {
        match result {
            Ok(()) => {
                tracing::debug!("Deleted {}", name);
                report.deleted.push(name);
            }
            Err(e) => {
                tracing::warn!("Failed to delete {}: {}", name, e);
                report.failed.push((name, e));
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_deletes_named_files_only() {
        let dir = tempdir().unwrap();
        for n in ["X.jpg", "Y.jpg", "Z.jpg"] {
            fs::write(dir.path().join(n), b"x").unwrap();
        }

        let report = delete_stale(dir.path(), &names(&["Z.jpg"])).await;

        assert_eq!(report.deleted, vec!["Z.jpg"]);
        assert!(report.failed.is_empty());
        assert!(dir.path().join("X.jpg").exists());
        assert!(dir.path().join("Y.jpg").exists());
        assert!(!dir.path().join("Z.jpg").exists());
    }

    #[tokio::test]
    async fn test_missing_file_is_reported_and_others_still_deleted() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("B.jpg"), b"x").unwrap();

        let report = delete_stale(dir.path(), &names(&["A.jpg", "B.jpg"])).await;

        assert_eq!(report.deleted, vec!["B.jpg"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "A.jpg");
        assert_eq!(report.failed[0].1.kind(), std::io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_nothing_to_delete() {
        let dir = tempdir().unwrap();
        let report = delete_stale(dir.path(), &BTreeSet::new()).await;
        assert!(report.deleted.is_empty());
        assert!(report.failed.is_empty());
    }
}
