//! Local file-based stack storage.
//!
//! All stacks live in one JSON file. Every save is a locked
//! read-modify-write: the lock file is created exclusively, the stacks file is
//! rewritten through a temporary file and an atomic rename, then the lock is
//! removed.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{Result, StackplateError, StateError};
use crate::id::PlatformId;

use super::lock::{LockInfo, generate_holder_id};
use super::store::StackStore;
use super::types::Stack;

/// Default state directory name.
pub const STATE_DIR: &str = ".stackplate";

/// Stacks file name.
const STACKS_FILE: &str = "stacks.json";

/// Lock file name.
const LOCK_FILE: &str = "stacks.lock";

/// Attempts made to take a held lock before giving up.
const DEFAULT_LOCK_ATTEMPTS: u32 = 20;

/// Delay between lock attempts.
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Local file-based stack store.
#[derive(Debug)]
pub struct LocalStackStore {
    base_dir: PathBuf,
    stacks_path: PathBuf,
    lock_path: PathBuf,
    lock_attempts: u32,
}

impl LocalStackStore {
    /// Creates a store under `./.stackplate`.
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be determined.
    pub fn new() -> Result<Self> {
        let base_dir = std::env::current_dir()
            .map_err(|e| StackplateError::internal(format!("Cannot determine current directory: {e}")))?
            .join(STATE_DIR);

        Ok(Self::with_base_dir(base_dir))
    }

    /// Creates a store in a custom directory.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let stacks_path = base_dir.join(STACKS_FILE);
        let lock_path = base_dir.join(LOCK_FILE);

        Self {
            base_dir,
            stacks_path,
            lock_path,
            lock_attempts: DEFAULT_LOCK_ATTEMPTS,
        }
    }

    /// Sets how many times a held lock is retried.
    #[must_use]
    pub const fn with_lock_attempts(mut self, attempts: u32) -> Self {
        self.lock_attempts = attempts;
        self
    }

    /// Ensures the state directory exists.
    async fn ensure_dir(&self) -> Result<()> {
        if !self.base_dir.exists() {
            debug!("Creating state directory: {}", self.base_dir.display());
            fs::create_dir_all(&self.base_dir).await.map_err(|e| {
                StackplateError::State(StateError::LockFailed {
                    message: format!("Failed to create state directory: {e}"),
                })
            })?;
        }
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<Stack>> {
        if !self.stacks_path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.stacks_path).await.map_err(|e| {
            StackplateError::State(StateError::Corrupted {
                message: format!("Failed to read stacks file: {e}"),
            })
        })?;

        serde_json::from_str(&content).map_err(|e| {
            StackplateError::State(StateError::Corrupted {
                message: format!("Failed to parse stacks file: {e}"),
            })
        })
    }

    async fn write_all(&self, stacks: &[Stack]) -> Result<()> {
        let content = serde_json::to_string_pretty(stacks)
            .map_err(|e| StateError::serialization(format!("Failed to serialize stacks: {e}")))?;

        let temp_path = self.stacks_path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        fs::rename(&temp_path, &self.stacks_path).await?;

        debug!(stacks = stacks.len(), "Stacks saved to {}", self.stacks_path.display());
        Ok(())
    }

    async fn read_lock_file(&self) -> Result<Option<LockInfo>> {
        if !self.lock_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.lock_path).await.map_err(|e| {
            StackplateError::State(StateError::Corrupted {
                message: format!("Failed to read lock file: {e}"),
            })
        })?;

        serde_json::from_str(&content).map(Some).map_err(|e| {
            StackplateError::State(StateError::Corrupted {
                message: format!("Failed to parse lock file: {e}"),
            })
        })
    }

    /// Creates the lock file exclusively.
    ///
    /// Returns `Ok(None)` if another holder's live lock is present.
    async fn try_lock(&self, holder: &str) -> Result<Option<LockInfo>> {
        let lock_info = LockInfo::new(holder);
        let content = serde_json::to_string_pretty(&lock_info)
            .map_err(|e| StateError::serialization(format!("Failed to serialize lock: {e}")))?;

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock_path)
            .await
        {
            Ok(mut file) => {
                file.write_all(content.as_bytes()).await.map_err(|e| {
                    StackplateError::State(StateError::LockFailed {
                        message: format!("Failed to write lock file: {e}"),
                    })
                })?;
                file.sync_all().await.map_err(|e| {
                    StackplateError::State(StateError::LockFailed {
                        message: format!("Failed to sync lock file: {e}"),
                    })
                })?;
                Ok(Some(lock_info))
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if let Some(existing) = self.read_lock_file().await?
                    && existing.is_expired()
                {
                    warn!(holder = %existing.holder, "Expired stack lock found, taking over");
                    self.remove_lock_file().await?;
                }
                Ok(None)
            }
            Err(e) => Err(StackplateError::State(StateError::LockFailed {
                message: format!("Failed to create lock file: {e}"),
            })),
        }
    }

    async fn remove_lock_file(&self) -> Result<()> {
        match fs::remove_file(&self.lock_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StackplateError::State(StateError::LockFailed {
                message: format!("Failed to delete lock file: {e}"),
            })),
        }
    }

    /// Acquires the store lock, retrying while another holder has it.
    ///
    /// # Errors
    ///
    /// Returns `StateError::LockedByOther` if the lock stays held.
    pub async fn acquire_lock(&self, holder: &str) -> Result<LockInfo> {
        self.ensure_dir().await?;

        let holder_id = if holder.is_empty() {
            generate_holder_id()
        } else {
            holder.to_string()
        };

        for attempt in 0..self.lock_attempts.max(1) {
            if attempt > 0 {
                tokio::time::sleep(LOCK_RETRY_DELAY).await;
            }
            if let Some(lock) = self.try_lock(&holder_id).await? {
                debug!(lock_id = %lock.lock_id, "Acquired stack lock");
                return Ok(lock);
            }
        }

        let existing = self.read_lock_file().await?;
        Err(StackplateError::State(StateError::LockedByOther {
            holder: existing
                .as_ref()
                .map_or_else(|| String::from("unknown"), |l| l.holder.clone()),
            since: existing.map_or_else(String::new, |l| l.acquired_at.to_rfc3339()),
        }))
    }

    /// Releases the lock if `lock_id` still holds it.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be read or removed.
    pub async fn release_lock(&self, lock_id: &str) -> Result<()> {
        if let Some(existing) = self.read_lock_file().await? {
            if existing.lock_id == lock_id {
                self.remove_lock_file().await?;
                debug!("Released stack lock: {lock_id}");
            } else {
                debug!(
                    "Lock ID mismatch: expected {lock_id}, found {}",
                    existing.lock_id
                );
            }
        }
        Ok(())
    }

    /// Runs `change` on the full stack list under the lock and writes the result.
    async fn modify<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<Stack>) + Send,
    {
        let lock = self.acquire_lock("").await?;
        let result = async {
            let mut stacks = self.read_all().await?;
            change(&mut stacks);
            self.write_all(&stacks).await
        }
        .await;
        self.release_lock(&lock.lock_id).await?;
        result
    }
}

#[async_trait]
impl StackStore for LocalStackStore {
    async fn load(&self, org_id: PlatformId, stack_id: PlatformId) -> Result<Option<Stack>> {
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .find(|s| s.id == stack_id && s.org_id == org_id))
    }

    async fn list(&self, org_id: PlatformId) -> Result<Vec<Stack>> {
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .filter(|s| s.org_id == org_id)
            .collect())
    }

    async fn save(&self, stack: &Stack) -> Result<()> {
        info!(stack_id = %stack.id, "Saving stack to: {}", self.stacks_path.display());
        let stack = stack.clone();
        let stack_id = stack.id;
        self.modify(move |stacks| {
            if let Some(existing) = stacks.iter_mut().find(|s| s.id == stack_id) {
                *existing = stack;
            } else {
                stacks.push(stack);
            }
        })
        .await
    }

    async fn delete(&self, org_id: PlatformId, stack_id: PlatformId) -> Result<()> {
        info!(%stack_id, "Deleting stack");
        self.modify(move |stacks| {
            stacks.retain(|s| !(s.id == stack_id && s.org_id == org_id));
        })
        .await
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (LocalStackStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = LocalStackStore::with_base_dir(temp_dir.path().join("state"));
        (store, temp_dir)
    }

    fn org() -> PlatformId {
        PlatformId::new(9000).expect("valid id")
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (store, _temp) = create_test_store();

        let stack = Stack::new(org()).with_name("monitoring");
        store.save(&stack).await.expect("Failed to save stack");

        let loaded = store
            .load(org(), stack.id)
            .await
            .expect("Failed to load stack")
            .expect("Stack should exist");
        assert_eq!(loaded, stack);
        assert!(!store.lock_path.exists());
    }

    #[tokio::test]
    async fn test_save_replaces() {
        let (store, _temp) = create_test_store();

        let mut stack = Stack::new(org());
        store.save(&stack).await.expect("first save");
        stack.description = String::from("updated");
        store.save(&stack).await.expect("second save");

        let all = store.list(org()).await.expect("list");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].description, "updated");
    }

    #[tokio::test]
    async fn test_load_nonexistent() {
        let (store, _temp) = create_test_store();
        let result = store
            .load(org(), PlatformId::new(1).expect("valid id"))
            .await
            .expect("Load should not fail");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_lock_conflict() {
        let (store, _temp) = create_test_store();
        let store = store.with_lock_attempts(2);

        let lock = store
            .acquire_lock("holder-1")
            .await
            .expect("Failed to acquire first lock");

        let err = store.save(&Stack::new(org())).await.unwrap_err();
        assert!(matches!(
            err,
            StackplateError::State(StateError::LockedByOther { ref holder, .. }) if holder == "holder-1"
        ));

        store.release_lock(&lock.lock_id).await.expect("release");
        store.save(&Stack::new(org())).await.expect("save after release");
    }

    #[tokio::test]
    async fn test_expired_lock_is_taken_over() {
        let (store, _temp) = create_test_store();
        store.ensure_dir().await.expect("dir");

        let mut stale = LockInfo::new("crashed");
        stale.expires_at = chrono::Utc::now() - chrono::Duration::seconds(5);
        std::fs::write(&store.lock_path, serde_json::to_string(&stale).expect("json"))
            .expect("write stale lock");

        store.save(&Stack::new(org())).await.expect("save over stale lock");
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, _temp) = create_test_store();
        let stack = Stack::new(org());
        store.save(&stack).await.expect("save");
        store.delete(org(), stack.id).await.expect("delete");
        assert!(store.list(org()).await.expect("list").is_empty());
    }
}
