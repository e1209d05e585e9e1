//! In-memory backend with optional JSON snapshot persistence.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{BackendError, Result, StackplateError};
use crate::id::PlatformId;
use crate::template::Kind;

use super::{BackendResource, LabelLink, NewResource, ResourceWriter, StateReader};

/// Persisted form of the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    next_id: u64,
    resources: Vec<BackendResource>,
    links: Vec<StoredLink>,
    /// Keyed by `<org>/<key>`.
    secrets: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredLink {
    #[serde(rename = "orgID")]
    org_id: PlatformId,
    #[serde(flatten)]
    link: LabelLink,
}

fn secret_key(org_id: PlatformId, key: &str) -> String {
    format!("{org_id}/{key}")
}

/// Backend holding all state in memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    inner: RwLock<Snapshot>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a backend snapshot, or returns an empty backend if `path` does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("Backend snapshot does not exist: {}", path.display());
            return Ok(Self::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            BackendError::unavailable(format!("Failed to read backend snapshot: {e}"))
        })?;
        let snapshot: Snapshot = serde_json::from_str(&content).map_err(|e| {
            BackendError::unavailable(format!("Failed to parse backend snapshot: {e}"))
        })?;

        info!(
            resources = snapshot.resources.len(),
            "Loaded backend snapshot from {}",
            path.display()
        );
        Ok(Self {
            inner: RwLock::new(snapshot),
        })
    }

    /// Writes the snapshot to `path` through a temporary file and rename.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content = {
            let snapshot = self.read()?;
            serde_json::to_string_pretty(&*snapshot).map_err(|e| {
                BackendError::unavailable(format!("Failed to serialize backend snapshot: {e}"))
            })?
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        fs::rename(&temp_path, path).await?;

        debug!("Backend snapshot saved to {}", path.display());
        Ok(())
    }

    /// Inserts a resource directly, bypassing the writer. Used to seed state.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub fn insert(
        &self,
        org_id: PlatformId,
        resource: NewResource,
    ) -> Result<BackendResource> {
        let mut snapshot = self.write()?;
        Ok(Self::insert_locked(&mut snapshot, org_id, org_id, resource))
    }

    /// Returns the number of stored resources.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub fn resource_count(&self) -> Result<usize> {
        Ok(self.read()?.resources.len())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Snapshot>> {
        self.inner
            .read()
            .map_err(|_| StackplateError::from(BackendError::unavailable("backend lock poisoned")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Snapshot>> {
        self.inner
            .write()
            .map_err(|_| StackplateError::from(BackendError::unavailable("backend lock poisoned")))
    }

    fn allocate_id(snapshot: &mut Snapshot) -> PlatformId {
        loop {
            snapshot.next_id = snapshot.next_id.wrapping_add(1);
            if let Ok(id) = PlatformId::new(snapshot.next_id) {
                return id;
            }
        }
    }

    fn insert_locked(
        snapshot: &mut Snapshot,
        org_id: PlatformId,
        user_id: PlatformId,
        resource: NewResource,
    ) -> BackendResource {
        let now = Utc::now();
        let stored = BackendResource {
            id: Self::allocate_id(snapshot),
            org_id,
            kind: resource.kind,
            name: resource.name,
            spec: resource.spec,
            created_by: user_id,
            created_at: now,
            updated_at: now,
        };
        snapshot.resources.push(stored.clone());
        stored
    }
}

#[async_trait]
impl StateReader for MemoryBackend {
    async fn get(&self, kind: Kind, id: PlatformId) -> Result<Option<BackendResource>> {
        Ok(self
            .read()?
            .resources
            .iter()
            .find(|r| r.kind == kind && r.id == id)
            .cloned())
    }

    async fn find_by_name(
        &self,
        org_id: PlatformId,
        kind: Kind,
        name: &str,
    ) -> Result<Option<BackendResource>> {
        Ok(self
            .read()?
            .resources
            .iter()
            .find(|r| r.org_id == org_id && r.kind == kind && r.name == name)
            .cloned())
    }

    async fn list(&self, org_id: PlatformId, kind: Kind) -> Result<Vec<BackendResource>> {
        Ok(self
            .read()?
            .resources
            .iter()
            .filter(|r| r.org_id == org_id && r.kind == kind)
            .cloned()
            .collect())
    }

    async fn label_links(
        &self,
        org_id: PlatformId,
        resource_id: PlatformId,
    ) -> Result<Vec<LabelLink>> {
        Ok(self
            .read()?
            .links
            .iter()
            .filter(|l| l.org_id == org_id && l.link.resource_id == resource_id)
            .map(|l| l.link)
            .collect())
    }

    async fn has_secret(&self, org_id: PlatformId, key: &str) -> Result<bool> {
        Ok(self.read()?.secrets.contains_key(&secret_key(org_id, key)))
    }
}

#[async_trait]
impl ResourceWriter for MemoryBackend {
    async fn create(
        &self,
        org_id: PlatformId,
        user_id: PlatformId,
        resource: NewResource,
    ) -> Result<BackendResource> {
        let mut snapshot = self.write()?;
        if snapshot
            .resources
            .iter()
            .any(|r| r.org_id == org_id && r.kind == resource.kind && r.name == resource.name)
        {
            return Err(BackendError::Resource {
                kind: resource.kind,
                meta_name: resource.name.clone(),
                message: String::from("a resource with this name already exists"),
            }
            .into());
        }
        let stored = Self::insert_locked(&mut snapshot, org_id, user_id, resource);
        debug!(kind = %stored.kind, id = %stored.id, "created resource");
        Ok(stored)
    }

    async fn update(
        &self,
        org_id: PlatformId,
        id: PlatformId,
        resource: NewResource,
    ) -> Result<BackendResource> {
        let mut snapshot = self.write()?;
        let stored = snapshot
            .resources
            .iter_mut()
            .find(|r| r.org_id == org_id && r.kind == resource.kind && r.id == id)
            .ok_or(BackendError::NotFound {
                kind: resource.kind,
                id,
            })?;
        stored.name = resource.name;
        stored.spec = resource.spec;
        stored.updated_at = Utc::now();
        debug!(kind = %stored.kind, id = %stored.id, "updated resource");
        Ok(stored.clone())
    }

    async fn delete(&self, org_id: PlatformId, kind: Kind, id: PlatformId) -> Result<()> {
        let mut snapshot = self.write()?;
        let before = snapshot.resources.len();
        snapshot
            .resources
            .retain(|r| !(r.org_id == org_id && r.kind == kind && r.id == id));
        if snapshot.resources.len() == before {
            return Err(BackendError::NotFound { kind, id }.into());
        }
        snapshot.links.retain(|l| {
            l.org_id != org_id || (l.link.resource_id != id && l.link.label_id != id)
        });
        debug!(%kind, %id, "deleted resource");
        Ok(())
    }

    async fn create_label_link(&self, org_id: PlatformId, link: LabelLink) -> Result<()> {
        let mut snapshot = self.write()?;
        let stored = StoredLink { org_id, link };
        if !snapshot.links.contains(&stored) {
            snapshot.links.push(stored);
        }
        Ok(())
    }

    async fn put_secret(&self, org_id: PlatformId, key: &str, value: &str) -> Result<()> {
        self.write()?
            .secrets
            .insert(secret_key(org_id, key), value.to_string());
        Ok(())
    }
}
