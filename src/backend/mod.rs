//! Backend resource store contract.
//!
//! The engine reads current org state through [`StateReader`] and mutates it
//! through [`ResourceWriter`]. [`MemoryBackend`] is the bundled
//! implementation, optionally persisted to a JSON snapshot.

mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::id::PlatformId;
use crate::template::Kind;

pub use memory::MemoryBackend;

/// A resource as stored in the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendResource {
    /// Backend ID.
    pub id: PlatformId,
    /// Owning org.
    #[serde(rename = "orgID")]
    pub org_id: PlatformId,
    /// Resource kind.
    pub kind: Kind,
    /// Display name, unique per (org, kind).
    pub name: String,
    /// Spec in canonical JSON form, associations excluded.
    pub spec: Value,
    /// User that created the resource.
    #[serde(rename = "createdBy")]
    pub created_by: PlatformId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// Content of a resource to create or update.
#[derive(Debug, Clone, PartialEq)]
pub struct NewResource {
    /// Resource kind.
    pub kind: Kind,
    /// Display name.
    pub name: String,
    /// Spec in canonical JSON form, associations excluded.
    pub spec: Value,
}

/// A label attached to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelLink {
    /// Label backend ID.
    #[serde(rename = "labelID")]
    pub label_id: PlatformId,
    /// Kind of the labeled resource.
    pub resource_kind: Kind,
    /// Backend ID of the labeled resource.
    #[serde(rename = "resourceID")]
    pub resource_id: PlatformId,
}

/// Read access to current org state.
#[async_trait]
pub trait StateReader: Send + Sync {
    /// Gets a resource by ID.
    async fn get(&self, kind: Kind, id: PlatformId) -> Result<Option<BackendResource>>;

    /// Finds a resource by display name within an org.
    async fn find_by_name(
        &self,
        org_id: PlatformId,
        kind: Kind,
        name: &str,
    ) -> Result<Option<BackendResource>>;

    /// Lists every resource of a kind in an org.
    async fn list(&self, org_id: PlatformId, kind: Kind) -> Result<Vec<BackendResource>>;

    /// Lists the labels attached to a resource.
    async fn label_links(&self, org_id: PlatformId, resource_id: PlatformId)
    -> Result<Vec<LabelLink>>;

    /// Returns true if the org's secret store holds `key`.
    async fn has_secret(&self, org_id: PlatformId, key: &str) -> Result<bool>;
}

/// Write access to org state.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceWriter: Send + Sync {
    /// Creates a resource.
    async fn create(
        &self,
        org_id: PlatformId,
        user_id: PlatformId,
        resource: NewResource,
    ) -> Result<BackendResource>;

    /// Replaces the name and spec of an existing resource.
    async fn update(
        &self,
        org_id: PlatformId,
        id: PlatformId,
        resource: NewResource,
    ) -> Result<BackendResource>;

    /// Deletes a resource and every label link touching it.
    async fn delete(&self, org_id: PlatformId, kind: Kind, id: PlatformId) -> Result<()>;

    /// Attaches a label to a resource. Attaching twice is a no-op.
    async fn create_label_link(&self, org_id: PlatformId, link: LabelLink) -> Result<()>;

    /// Stores a secret value under `key`.
    async fn put_secret(&self, org_id: PlatformId, key: &str, value: &str) -> Result<()>;
}

/// A store offering both read and write access.
pub trait Backend: StateReader + ResourceWriter {
    /// Returns the read half.
    fn as_reader(&self) -> &dyn StateReader;

    /// Returns the write half.
    fn as_writer(&self) -> &dyn ResourceWriter;
}

impl<T: StateReader + ResourceWriter> Backend for T {
    fn as_reader(&self) -> &dyn StateReader {
        self
    }

    fn as_writer(&self) -> &dyn ResourceWriter {
        self
    }
}
