use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{error, info};

#[derive(Debug, Serialize, Deserialize)]
struct FlagFile {
    active: bool,
}

/// The single "is a sorting run active" flag, persisted as `{"active": bool}`.
///
/// Writes overwrite the file in place; last writer wins. Reads fail safe: a missing or
/// unreadable file means inactive.
#[derive(Debug, Clone)]
pub struct SortingFlagStore {
    path: PathBuf,
}

impl SortingFlagStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Failures are logged and swallowed, leaving whatever state was on disk.
    pub async fn set(&self, active: bool) {
        let contents = match serde_json::to_vec(&FlagFile { active }) {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to encode sorting flag: {e}");
                return;
            }
        };
        match tokio::fs::write(&self.path, contents).await {
            Ok(()) => info!("Sorting run {}", if active { "started" } else { "stopped" }),
            Err(e) => error!(
                "Failed to write sorting flag to {}: {e}",
                self.path.display()
            ),
        }
    }

    pub async fn get(&self) -> bool {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(_) => return false,
        };
        serde_json::from_slice::<FlagFile>(&raw)
            .map(|f| f.active)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_is_inactive() {
        let dir = tempfile::tempdir().unwrap();
        let store = SortingFlagStore::new(dir.path().join("sorting_state.json"));
        assert!(!store.get().await);
    }

    #[tokio::test]
    async fn test_set_survives_new_store_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sorting_state.json");

        SortingFlagStore::new(&path).set(true).await;
        // a fresh instance stands in for a process restart
        assert!(SortingFlagStore::new(&path).get().await);

        let on_disk: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk, serde_json::json!({ "active": true }));
    }

    #[tokio::test]
    async fn test_deleted_file_reads_inactive() {
        let dir = tempfile::tempdir().unwrap();
        let store = SortingFlagStore::new(dir.path().join("sorting_state.json"));
        store.set(true).await;
        std::fs::remove_file(store.path()).unwrap();
        assert!(!store.get().await);
    }

    #[tokio::test]
    async fn test_corrupt_file_reads_inactive() {
        let dir = tempfile::tempdir().unwrap();
        let store = SortingFlagStore::new(dir.path().join("sorting_state.json"));
        std::fs::write(store.path(), b"{active: yes").unwrap();
        assert!(!store.get().await);
    }

    #[tokio::test]
    async fn test_write_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let store = SortingFlagStore::new(dir.path().join("missing-dir").join("state.json"));
        store.set(true).await;
        assert!(!store.get().await);
    }
}
