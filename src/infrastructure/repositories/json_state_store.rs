use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::domain::repositories::StateStore;
use crate::domain::state::SystemState;
use crate::errors::{CoordinatorError, CoordinatorResult};

/// JSON snapshot file implementation of StateStore
///
/// The whole state is one pretty-printed document. Saves go to a
/// uniquely named temp file next to the target and are renamed over it,
/// so readers see either the old or the new document.
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    /// Creates a store backed by the file at `path`
    ///
    /// The file and its parent directory are created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "shared_state.json".to_string());
        self.path
            .with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()))
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn load(&self) -> CoordinatorResult<Option<SystemState>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CoordinatorError::persistence(format!(
                    "Failed to read snapshot {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let state = serde_json::from_str(&content).map_err(|e| {
            CoordinatorError::persistence(format!(
                "Corrupt snapshot {}: {}",
                self.path.display(),
                e
            ))
        })?;

        Ok(Some(state))
    }

    async fn save(&self, state: &SystemState) -> CoordinatorResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let bytes = serde_json::to_vec_pretty(state)?;
        let temp_path = self.temp_path();

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        // rename() replaces the target atomically on POSIX
        if let Err(e) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(CoordinatorError::persistence(format!(
                "Failed to replace snapshot {}: {}",
                self.path.display(),
                e
            )));
        }

        tracing::debug!(path = %self.path.display(), bytes = bytes.len(), "Snapshot saved");
        Ok(())
    }

    fn name(&self) -> &str {
        "json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> JsonStateStore {
        let dir = std::env::temp_dir().join(format!("coordinator_json_{}", Uuid::new_v4()));
        JsonStateStore::new(dir.join("shared_state.json"))
    }

    #[tokio::test]
    async fn load_missing_file_returns_none() {
        let store = temp_store();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_creates_parent_and_leaves_no_temp_files() {
        let store = temp_store();
        store.save(&SystemState::new()).await.unwrap();

        let parent = store.path().parent().unwrap();
        let mut entries = fs::read_dir(parent).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["shared_state.json".to_string()]);
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_a_persistence_failure() {
        let store = temp_store();
        fs::create_dir_all(store.path().parent().unwrap()).await.unwrap();
        fs::write(store.path(), b"{ not json").await.unwrap();

        let result = store.load().await;
        assert!(matches!(result, Err(CoordinatorError::Persistence(_))));
    }
}
