// Key-value cache store.
// File-backed store with atomic single-key writes and journaled multi-key transactions.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::{Result, StreakError};

use super::paths::{journal_path, key_path};

/// Durable string key-value store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write all entries as one transaction: either every entry lands or none does.
    async fn set_all(&self, entries: &[(String, String)]) -> Result<()>;
}

/// One pending write in the transaction journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct JournalEntry {
    key: String,
    value: String,
    /// Value before the transaction, `None` if the key did not exist.
    #[serde(default)]
    previous: Option<String>,
}

/// Store keeping one JSON file per key under a cache directory.
///
/// A multi-key write first commits a journal holding the new and previous
/// values, then applies each key and finally removes the journal. If a key
/// fails to apply, the keys already written are restored from the journal
/// before the error is returned. A journal left behind by a crash is replayed
/// on open.
pub struct FileStore {
    root: PathBuf,
    /// Set while a failed transaction could not be rolled back; reads are refused.
    dirty: RwLock<bool>,
}

impl FileStore {
    /// Open (or create) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("keys")).await.map_err(|e| {
            StreakError::Cache(format!(
                "cannot create cache directory {}: {}",
                root.display(),
                e
            ))
        })?;

        let store = Self {
            root,
            dirty: RwLock::new(false),
        };
        store.replay_journal().await?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn read_journal(&self) -> Result<Option<Vec<JournalEntry>>> {
        let Some(contents) = read_text(&journal_path(&self.root)).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&contents) {
            Ok(entries) => Ok(Some(entries)),
            Err(e) => {
                warn!("discarding unreadable cache journal: {}", e);
                Ok(Some(Vec::new()))
            }
        }
    }

    /// Finish a transaction interrupted by a crash.
    async fn replay_journal(&self) -> Result<()> {
        let Some(entries) = self.read_journal().await? else {
            return Ok(());
        };
        if !entries.is_empty() {
            warn!(
                entries = entries.len(),
                "replaying interrupted cache transaction"
            );
            for entry in &entries {
                write_atomic(&key_path(&self.root, &entry.key), &entry.value).await?;
            }
        }
        fs::remove_file(journal_path(&self.root)).await?;
        Ok(())
    }

    /// Undo a transaction that failed while the process kept running.
    async fn roll_back_journal(&self) -> Result<()> {
        if let Some(entries) = self.read_journal().await? {
            self.roll_back(&entries).await?;
            fs::remove_file(journal_path(&self.root)).await?;
        }
        Ok(())
    }

    async fn roll_back(&self, entries: &[JournalEntry]) -> Result<()> {
        for entry in entries.iter().rev() {
            let path = key_path(&self.root, &entry.key);
            match &entry.previous {
                Some(value) => write_atomic(&path, value).await?,
                None => remove_if_exists(&path).await?,
            }
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let dirty = self.dirty.read().await;
        if *dirty {
            return Err(StreakError::Cache(
                "store is recovering from a failed transaction".to_string(),
            ));
        }
        read_text(&key_path(&self.root, key)).await
    }

    async fn set_all(&self, entries: &[(String, String)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut dirty = self.dirty.write().await;
        if *dirty {
            self.roll_back_journal().await?;
            *dirty = false;
        }

        let mut journal = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            journal.push(JournalEntry {
                key: key.clone(),
                value: value.clone(),
                previous: read_text(&key_path(&self.root, key)).await?,
            });
        }

        let journal_file = journal_path(&self.root);
        write_atomic(&journal_file, &serde_json::to_string(&journal)?).await?;

        for (applied, entry) in journal.iter().enumerate() {
            if let Err(e) = write_atomic(&key_path(&self.root, &entry.key), &entry.value).await {
                warn!(key = %entry.key, error = %e, "cache transaction failed, rolling back");
                let restored = match self.roll_back(&journal[..applied]).await {
                    Ok(()) => fs::remove_file(&journal_file).await.map_err(StreakError::from),
                    Err(rollback) => Err(rollback),
                };
                if let Err(rollback) = restored {
                    warn!(
                        error = %rollback,
                        "cache rollback failed, refusing reads until recovered"
                    );
                    *dirty = true;
                }
                return Err(e);
            }
        }

        fs::remove_file(&journal_file).await?;
        Ok(())
    }
}

/// Write text atomically via a synced temp file and rename.
async fn write_atomic(path: &Path, text: &str) -> Result<()> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path).await?;
    file.write_all(text.as_bytes()).await?;
    file.sync_all().await?;
    fs::rename(&temp_path, path).await?;

    Ok(())
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

/// Read a whole file, returning None if it does not exist.
async fn read_text(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(key: &str, value: &str) -> (String, String) {
        (key.to_string(), value.to_string())
    }

    #[tokio::test]
    async fn test_set_all_and_get() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path()).await.unwrap();

        store
            .set_all(&[
                entry("octocat", "{\"years\":[]}"),
                entry("octocat_lastFetchTime", "\"t\""),
            ])
            .await
            .unwrap();

        assert_eq!(
            store.get("octocat").await.unwrap().as_deref(),
            Some("{\"years\":[]}")
        );
        assert_eq!(
            store.get("octocat_lastFetchTime").await.unwrap().as_deref(),
            Some("\"t\"")
        );
        assert!(!journal_path(temp_dir.path()).exists());
    }

    #[tokio::test]
    async fn test_read_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path()).await.unwrap();
        assert!(store.get("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path()).await.unwrap();

        store.set_all(&[entry("k", "1")]).await.unwrap();
        store.set_all(&[entry("k", "2")]).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_journal_replayed_on_open() {
        let temp_dir = TempDir::new().unwrap();
        let journal = vec![
            JournalEntry {
                key: "octocat".to_string(),
                value: "history".to_string(),
                previous: None,
            },
            JournalEntry {
                key: "octocat_lastFetchTime".to_string(),
                value: "stamp".to_string(),
                previous: Some("old stamp".to_string()),
            },
        ];
        std::fs::write(
            journal_path(temp_dir.path()),
            serde_json::to_string(&journal).unwrap(),
        )
        .unwrap();

        let store = FileStore::open(temp_dir.path()).await.unwrap();
        assert_eq!(
            store.get("octocat").await.unwrap().as_deref(),
            Some("history")
        );
        assert_eq!(
            store.get("octocat_lastFetchTime").await.unwrap().as_deref(),
            Some("stamp")
        );
        assert!(!journal_path(temp_dir.path()).exists());
    }

    #[tokio::test]
    async fn test_unreadable_journal_discarded() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(journal_path(temp_dir.path()), "not json").unwrap();

        let store = FileStore::open(temp_dir.path()).await.unwrap();
        assert!(store.get("octocat").await.unwrap().is_none());
        assert!(!journal_path(temp_dir.path()).exists());
    }

    #[tokio::test]
    async fn test_failed_write_rolls_back_applied_keys() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path()).await.unwrap();
        store
            .set_all(&[entry("a", "old"), entry("b", "old")])
            .await
            .unwrap();

        // A directory in place of b's temp file makes the second write fail.
        let blocker = temp_dir.path().join("keys").join("b.tmp");
        std::fs::create_dir(&blocker).unwrap();
        std::fs::write(blocker.join("inner"), "x").unwrap();

        let result = store.set_all(&[entry("a", "new"), entry("b", "new")]).await;
        assert!(result.is_err());
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("old"));
        assert_eq!(store.get("b").await.unwrap().as_deref(), Some("old"));
        assert!(!journal_path(temp_dir.path()).exists());

        std::fs::remove_dir_all(&blocker).unwrap();
        store
            .set_all(&[entry("a", "new"), entry("b", "new")])
            .await
            .unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("new"));
        assert_eq!(store.get("b").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_failed_write_removes_new_keys() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path()).await.unwrap();

        let blocker = temp_dir.path().join("keys").join("b.tmp");
        std::fs::create_dir_all(blocker.join("inner")).unwrap();

        let result = store.set_all(&[entry("a", "new"), entry("b", "new")]).await;
        assert!(result.is_err());
        assert!(store.get("a").await.unwrap().is_none());
        assert!(store.get("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreadable_key_leaves_others_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path()).await.unwrap();
        store
            .set_all(&[entry("a", "old"), entry("b", "old")])
            .await
            .unwrap();

        let b_path = key_path(temp_dir.path(), "b");
        std::fs::remove_file(&b_path).unwrap();
        std::fs::create_dir_all(b_path.join("inner")).unwrap();

        let result = store.set_all(&[entry("a", "new"), entry("b", "new")]).await;
        assert!(result.is_err());
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("old"));
    }
}
