//! Stack types.
//!
//! A stack records which backend resources an apply realized, keyed by
//! (kind, metaName), so that later applies update the same resources in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::PlatformId;
use crate::template::Kind;

/// Maximum number of events kept per stack.
pub const MAX_STACK_EVENTS: usize = 100;

/// A managed group of resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stack {
    /// Stack ID.
    pub id: PlatformId,
    /// Owning org.
    #[serde(rename = "orgID")]
    pub org_id: PlatformId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Provenance of the last applied templates.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Remote URLs of the last applied templates.
    #[serde(default)]
    pub urls: Vec<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
    /// Realized resources.
    #[serde(default)]
    pub resources: Vec<StackResource>,
    /// Apply history, oldest first.
    #[serde(default)]
    pub events: Vec<StackEvent>,
}

/// A resource realized by a stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackResource {
    /// Resource kind.
    pub kind: Kind,
    /// metaName within the template.
    pub meta_name: String,
    /// Backend ID.
    pub id: PlatformId,
    /// Hash of the spec that was applied.
    pub spec_hash: String,
    /// metaNames of associated labels.
    #[serde(default)]
    pub associations: Vec<String>,
}

/// Kind of change recorded in a stack event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StackOperation {
    /// First apply under the stack.
    Create,
    /// Subsequent apply.
    Update,
}

/// A single entry in the stack history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackEvent {
    /// When the apply finished.
    pub timestamp: DateTime<Utc>,
    /// Type of operation.
    pub operation: StackOperation,
    /// User that applied.
    #[serde(rename = "userID")]
    pub user_id: PlatformId,
    /// Template provenance.
    pub sources: Vec<String>,
    /// Number of resources realized.
    pub resources: usize,
    /// Objects that failed, as `Kind/metaName`.
    #[serde(default)]
    pub failed: Vec<String>,
}

impl Stack {
    /// Creates an empty stack with a fresh ID.
    #[must_use]
    pub fn new(org_id: PlatformId) -> Self {
        let now = Utc::now();
        Self {
            id: PlatformId::generate(),
            org_id,
            name: String::new(),
            description: String::new(),
            sources: Vec::new(),
            urls: Vec::new(),
            created_at: now,
            updated_at: now,
            resources: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Gets a realized resource by identity.
    #[must_use]
    pub fn resource(&self, kind: Kind, meta_name: &str) -> Option<&StackResource> {
        self.resources
            .iter()
            .find(|r| r.kind == kind && r.meta_name == meta_name)
    }

    /// Replaces the realized resources.
    pub fn set_resources(&mut self, resources: Vec<StackResource>) {
        self.resources = resources;
        self.updated_at = Utc::now();
    }

    /// Adds a history entry, dropping the oldest past the limit.
    pub fn add_event(&mut self, event: StackEvent) {
        if self.events.len() >= MAX_STACK_EVENTS {
            self.events.remove(0);
        }
        self.events.push(event);
    }

    /// Returns the most recent event.
    #[must_use]
    pub fn last_event(&self) -> Option<&StackEvent> {
        self.events.last()
    }
}

impl StackEvent {
    /// Creates a new event stamped now.
    #[must_use]
    pub fn new(
        operation: StackOperation,
        user_id: PlatformId,
        sources: Vec<String>,
        resources: usize,
        failed: Vec<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            user_id,
            sources,
            resources,
            failed,
        }
    }

    /// Returns true if every object was realized.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

impl std::fmt::Display for StackOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Self::Create => "create",
            Self::Update => "update",
        };
        write!(f, "{op}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn org() -> PlatformId {
        PlatformId::new(9000).expect("valid id")
    }

    #[test]
    fn test_event_history_bounded() {
        let mut stack = Stack::new(org());
        for i in 0..(MAX_STACK_EVENTS + 5) {
            stack.add_event(StackEvent::new(StackOperation::Update, org(), Vec::new(), i, Vec::new()));
        }
        assert_eq!(stack.events.len(), MAX_STACK_EVENTS);
        assert_eq!(stack.events[0].resources, 5);
        assert_eq!(stack.last_event().map(|e| e.resources), Some(MAX_STACK_EVENTS + 4));
    }

    #[test]
    fn test_resource_lookup() {
        let mut stack = Stack::new(org()).with_name("monitoring");
        stack.set_resources(vec![StackResource {
            kind: Kind::Bucket,
            meta_name: String::from("bkt"),
            id: PlatformId::new(5).expect("valid id"),
            spec_hash: String::from("abc"),
            associations: Vec::new(),
        }]);

        assert!(stack.resource(Kind::Bucket, "bkt").is_some());
        assert!(stack.resource(Kind::Label, "bkt").is_none());
        assert_eq!(stack.name, "monitoring");
    }

    #[test]
    fn test_serde_field_names() {
        let stack = Stack::new(org());
        let value = serde_json::to_value(&stack).expect("serialize");
        assert_eq!(value["orgID"], "0000000000002328");
        assert!(value.get("createdAt").is_some());
    }
}
