//! Diff engine for comparing a package with current org state.
//!
//! Each object is matched to a backend resource through the stack (by ID)
//! or, failing that, by display name within the org. Matches are classified
//! by spec hash. Reads only; the result is a point-in-time snapshot.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::backend::{BackendResource, LabelLink, StateReader};
use crate::error::{BackendError, Result, StackplateError};
use crate::id::PlatformId;
use crate::state::Stack;
use crate::template::{Kind, Object, Package, SpecHasher, StateStatus, Summary};

/// How an object changes when applied.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// Not in the backend yet.
    Create,
    /// In the backend with different content.
    Update,
    /// In the backend with identical content.
    Unchanged,
    /// Managed by the stack but no longer declared.
    Remove,
}

/// Identity of a diffed object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DiffIdentifier {
    /// metaName.
    pub meta_name: String,
    /// Backend ID of the matched resource.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "id")]
    pub id: Option<PlatformId>,
    /// Whether the resource exists.
    pub state_status: StateStatus,
    /// Resource kind.
    pub kind: Kind,
}

/// Name and spec on one side of a diff.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiffValues {
    /// Display name.
    pub name: String,
    /// Spec, associations excluded.
    pub spec: Value,
}

/// A diffed resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiffEntry {
    /// Identity.
    #[serde(flatten)]
    pub identifier: DiffIdentifier,
    /// Classification.
    pub change: ChangeType,
    /// Declared content; absent for removals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<DiffValues>,
    /// Backend content; absent for creations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<DiffValues>,
}

/// A diffed label to resource link.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DiffLabelMapping {
    /// Whether the link exists.
    pub state_status: StateStatus,
    /// Classification: create or unchanged.
    pub change: ChangeType,
    /// Kind of the labeled resource.
    pub resource_type: Kind,
    /// metaName of the labeled resource.
    pub resource_meta_name: String,
    /// Display name of the labeled resource.
    pub resource_name: String,
    /// Backend ID of the labeled resource.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "resourceID")]
    pub resource_id: Option<PlatformId>,
    /// Label metaName.
    pub label_meta_name: String,
    /// Label display name.
    pub label_name: String,
    /// Backend ID of the label.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "labelID")]
    pub label_id: Option<PlatformId>,
}

/// Per-kind diff. Every collection serializes as an array.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Diff {
    /// Buckets.
    pub buckets: Vec<DiffEntry>,
    /// Checks.
    pub checks: Vec<DiffEntry>,
    /// Dashboards.
    pub dashboards: Vec<DiffEntry>,
    /// Labels.
    pub labels: Vec<DiffEntry>,
    /// Label mappings.
    pub label_mappings: Vec<DiffLabelMapping>,
    /// Notification endpoints.
    pub notification_endpoints: Vec<DiffEntry>,
    /// Notification rules.
    pub notification_rules: Vec<DiffEntry>,
    /// Tasks.
    pub tasks: Vec<DiffEntry>,
    /// Telegraf configurations.
    pub telegraf_configs: Vec<DiffEntry>,
    /// Variables.
    pub variables: Vec<DiffEntry>,
}

/// Counts of diff classifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffCounts {
    /// Creations, mappings included.
    pub creates: usize,
    /// Updates.
    pub updates: usize,
    /// Unchanged, mappings included.
    pub unchanged: usize,
    /// Removals.
    pub removes: usize,
}

impl Diff {
    /// Returns the entries for a resource kind.
    #[must_use]
    pub fn entries(&self, kind: Kind) -> &[DiffEntry] {
        match kind {
            Kind::Bucket => &self.buckets,
            Kind::Check => &self.checks,
            Kind::Dashboard => &self.dashboards,
            Kind::Label => &self.labels,
            Kind::LabelMapping => &[],
            Kind::NotificationEndpoint => &self.notification_endpoints,
            Kind::NotificationRule => &self.notification_rules,
            Kind::Task => &self.tasks,
            Kind::Telegraf => &self.telegraf_configs,
            Kind::Variable => &self.variables,
        }
    }

    fn push(&mut self, entry: DiffEntry) {
        let collection = match entry.identifier.kind {
            Kind::Bucket => &mut self.buckets,
            Kind::Check => &mut self.checks,
            Kind::Dashboard => &mut self.dashboards,
            Kind::Label => &mut self.labels,
            Kind::LabelMapping => return,
            Kind::NotificationEndpoint => &mut self.notification_endpoints,
            Kind::NotificationRule => &mut self.notification_rules,
            Kind::Task => &mut self.tasks,
            Kind::Telegraf => &mut self.telegraf_configs,
            Kind::Variable => &mut self.variables,
        };
        collection.push(entry);
    }

    /// Iterates over every resource entry in canonical kind order.
    pub fn resource_entries(&self) -> impl Iterator<Item = &DiffEntry> {
        Kind::ALL.into_iter().flat_map(|k| self.entries(k).iter())
    }

    /// Looks up a resource entry by identity.
    #[must_use]
    pub fn entry(&self, kind: Kind, meta_name: &str) -> Option<&DiffEntry> {
        self.entries(kind)
            .iter()
            .find(|e| e.identifier.meta_name == meta_name)
    }

    /// Counts entries by classification.
    #[must_use]
    pub fn counts(&self) -> DiffCounts {
        let mut counts = DiffCounts::default();
        let changes = self
            .resource_entries()
            .map(|e| e.change)
            .chain(self.label_mappings.iter().map(|m| m.change));
        for change in changes {
            match change {
                ChangeType::Create => counts.creates += 1,
                ChangeType::Update => counts.updates += 1,
                ChangeType::Unchanged => counts.unchanged += 1,
                ChangeType::Remove => counts.removes += 1,
            }
        }
        counts
    }

    /// Returns true if applying would change anything.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        let counts = self.counts();
        counts.creates + counts.updates + counts.removes > 0
    }

    /// Copies matched backend IDs into `summary`.
    pub fn fill_ids(&self, summary: &mut Summary) {
        for entry in self.resource_entries() {
            if entry.change != ChangeType::Remove
                && let Some(id) = entry.identifier.id
            {
                summary.set_id(entry.identifier.kind, &entry.identifier.meta_name, id);
            }
        }
        for (summary_mapping, diff_mapping) in summary.label_mappings.iter_mut().zip(&self.label_mappings) {
            summary_mapping.status = diff_mapping.state_status;
        }
    }
}

/// Engine for computing diffs.
#[derive(Debug, Default)]
pub struct DiffEngine {
    hasher: SpecHasher,
}

impl DiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hasher: SpecHasher::new(),
        }
    }

    /// Computes the diff of `package` against the org's current state.
    ///
    /// # Errors
    ///
    /// Returns a `BackendError::Resource` naming the object whose read failed.
    pub async fn diff(
        &self,
        package: &Package,
        summary: &Summary,
        org_id: PlatformId,
        stack: Option<&Stack>,
        reader: &dyn StateReader,
    ) -> Result<Diff> {
        let mut diff = Diff::default();
        let mut resolved: HashMap<(Kind, String), PlatformId> = HashMap::new();

        for obj in package.objects().iter().filter(|o| o.kind.is_resource()) {
            let existing = Self::find_existing(obj, org_id, stack, reader)
                .await
                .map_err(|e| wrap(obj.kind, obj.meta_name(), e))?
                .filter(|current| {
                    let owner = resolved
                        .iter()
                        .find(|((kind, _), id)| *kind == obj.kind && **id == current.id)
                        .map(|((_, meta_name), _)| meta_name.as_str())
                        .or_else(|| {
                            stack
                                .and_then(|s| {
                                    s.resources
                                        .iter()
                                        .find(|r| r.kind == obj.kind && r.id == current.id)
                                })
                                .map(|r| r.meta_name.as_str())
                        });
                    match owner {
                        Some(owner) if owner != obj.meta_name() => {
                            debug!(
                                kind = %obj.kind,
                                meta_name = %obj.meta_name(),
                                owner,
                                id = %current.id,
                                "backend resource already bound to another metaName"
                            );
                            false
                        }
                        _ => true,
                    }
                });

            let new = DiffValues {
                name: obj.display_name().to_string(),
                spec: obj.spec.without_associations().to_value(),
            };

            let entry = match existing {
                None => DiffEntry {
                    identifier: DiffIdentifier {
                        meta_name: obj.metadata.name.clone(),
                        id: None,
                        state_status: StateStatus::New,
                        kind: obj.kind,
                    },
                    change: ChangeType::Create,
                    new: Some(new),
                    old: None,
                },
                Some(current) => {
                    resolved.insert((obj.kind, obj.metadata.name.clone()), current.id);
                    let same = current.name == new.name
                        && SpecHasher::hashes_match(
                            &self.hasher.hash_value(obj.kind, &current.spec),
                            &self.hasher.hash_value(obj.kind, &new.spec),
                        );
                    DiffEntry {
                        identifier: DiffIdentifier {
                            meta_name: obj.metadata.name.clone(),
                            id: Some(current.id),
                            state_status: StateStatus::Exists,
                            kind: obj.kind,
                        },
                        change: if same {
                            ChangeType::Unchanged
                        } else {
                            ChangeType::Update
                        },
                        new: Some(new),
                        old: Some(DiffValues {
                            name: current.name,
                            spec: current.spec,
                        }),
                    }
                }
            };
            diff.push(entry);
        }

        if let Some(stack) = stack {
            for managed in &stack.resources {
                if package.index().contains(managed.kind, &managed.meta_name) {
                    continue;
                }
                let current = reader
                    .get(managed.kind, managed.id)
                    .await
                    .map_err(|e| wrap(managed.kind, &managed.meta_name, e))?;
                let Some(current) = current else {
                    debug!(kind = %managed.kind, meta_name = %managed.meta_name, "stack resource already gone");
                    continue;
                };
                diff.push(DiffEntry {
                    identifier: DiffIdentifier {
                        meta_name: managed.meta_name.clone(),
                        id: Some(managed.id),
                        state_status: StateStatus::Remove,
                        kind: managed.kind,
                    },
                    change: ChangeType::Remove,
                    new: None,
                    old: Some(DiffValues {
                        name: current.name,
                        spec: current.spec,
                    }),
                });
            }
        }

        let mut links: HashMap<PlatformId, Vec<LabelLink>> = HashMap::new();
        for mapping in &summary.label_mappings {
            let resource_id = resolved
                .get(&(mapping.resource_type, mapping.resource_meta_name.clone()))
                .copied();
            let label_id = mapping.label_id.or_else(|| {
                resolved
                    .get(&(Kind::Label, mapping.label_meta_name.clone()))
                    .copied()
            });

            let exists = match (resource_id, label_id) {
                (Some(resource_id), Some(label_id)) => {
                    if !links.contains_key(&resource_id) {
                        let found = reader
                            .label_links(org_id, resource_id)
                            .await
                            .map_err(|e| {
                                wrap(mapping.resource_type, &mapping.resource_meta_name, e)
                            })?;
                        links.insert(resource_id, found);
                    }
                    links
                        .get(&resource_id)
                        .is_some_and(|l| l.iter().any(|link| link.label_id == label_id))
                }
                _ => false,
            };

            diff.label_mappings.push(DiffLabelMapping {
                state_status: if exists {
                    StateStatus::Exists
                } else {
                    StateStatus::New
                },
                change: if exists {
                    ChangeType::Unchanged
                } else {
                    ChangeType::Create
                },
                resource_type: mapping.resource_type,
                resource_meta_name: mapping.resource_meta_name.clone(),
                resource_name: mapping.resource_name.clone(),
                resource_id,
                label_meta_name: mapping.label_meta_name.clone(),
                label_name: mapping.label_name.clone(),
                label_id,
            });
        }

        let counts = diff.counts();
        debug!(
            creates = counts.creates,
            updates = counts.updates,
            unchanged = counts.unchanged,
            removes = counts.removes,
            "computed diff"
        );
        Ok(diff)
    }

    async fn find_existing(
        obj: &Object,
        org_id: PlatformId,
        stack: Option<&Stack>,
        reader: &dyn StateReader,
    ) -> Result<Option<BackendResource>> {
        if let Some(managed) = stack.and_then(|s| s.resource(obj.kind, obj.meta_name()))
            && let Some(current) = reader.get(obj.kind, managed.id).await?
            && current.org_id == org_id
        {
            return Ok(Some(current));
        }
        reader
            .find_by_name(org_id, obj.kind, obj.display_name())
            .await
    }
}

fn wrap(kind: Kind, meta_name: &str, err: StackplateError) -> StackplateError {
    match err {
        StackplateError::Backend(BackendError::Resource { .. }) | StackplateError::Cancelled => err,
        other => BackendError::resource(kind, meta_name, other).into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, NewResource, ResourceWriter};
    use crate::state::StackResource;
    use crate::template::{Association, BucketSpec, LabelSpec, ResourceSpec};
    use serde_json::json;

    fn org() -> PlatformId {
        PlatformId::new(9000).unwrap()
    }

    fn bucket(name: &str, description: Option<&str>) -> Object {
        Object::new(
            name,
            ResourceSpec::Bucket(BucketSpec {
                description: description.map(ToString::to_string),
                ..BucketSpec::default()
            }),
        )
    }

    async fn run(package: &Package, stack: Option<&Stack>, backend: &MemoryBackend) -> Diff {
        DiffEngine::new()
            .diff(package, &package.summary(), org(), stack, backend)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_empty_backend_is_all_create() {
        let package = Package::new(vec![bucket("b1", None), bucket("b2", None)], Vec::new());
        let diff = run(&package, None, &MemoryBackend::new()).await;

        assert_eq!(diff.buckets.len(), 2);
        assert!(diff.buckets.iter().all(|e| e.change == ChangeType::Create));
        assert!(diff.buckets.iter().all(|e| e.identifier.state_status == StateStatus::New));
        assert_eq!(diff.counts().creates, 2);
    }

    #[tokio::test]
    async fn test_match_by_name_classifies_by_hash() {
        let backend = MemoryBackend::new();
        backend
            .insert(
                org(),
                NewResource {
                    kind: Kind::Bucket,
                    name: String::from("same"),
                    spec: json!({}),
                },
            )
            .unwrap();
        backend
            .insert(
                org(),
                NewResource {
                    kind: Kind::Bucket,
                    name: String::from("changed"),
                    spec: json!({"description": "old"}),
                },
            )
            .unwrap();

        let package = Package::new(
            vec![bucket("same", None), bucket("changed", Some("new"))],
            Vec::new(),
        );
        let diff = run(&package, None, &backend).await;

        assert_eq!(diff.entry(Kind::Bucket, "same").unwrap().change, ChangeType::Unchanged);
        let changed = diff.entry(Kind::Bucket, "changed").unwrap();
        assert_eq!(changed.change, ChangeType::Update);
        assert_eq!(changed.old.as_ref().unwrap().spec, json!({"description": "old"}));
    }

    #[tokio::test]
    async fn test_backend_resource_bound_to_one_meta_name() {
        let backend = MemoryBackend::new();
        let shared = backend
            .insert(
                org(),
                NewResource {
                    kind: Kind::Bucket,
                    name: String::from("shared"),
                    spec: json!({}),
                },
            )
            .unwrap();
        let named = |meta_name: &str| {
            Object::new(
                meta_name,
                ResourceSpec::Bucket(BucketSpec {
                    name: Some(String::from("shared")),
                    ..BucketSpec::default()
                }),
            )
        };

        let package = Package::new(vec![named("a"), named("b")], Vec::new());
        let diff = run(&package, None, &backend).await;

        assert_eq!(diff.entry(Kind::Bucket, "a").unwrap().identifier.id, Some(shared.id));
        let b = diff.entry(Kind::Bucket, "b").unwrap();
        assert_eq!(b.change, ChangeType::Create);
        assert_eq!(b.identifier.id, None);
    }

    #[tokio::test]
    async fn test_name_match_owned_by_other_stack_entry() {
        let backend = MemoryBackend::new();
        let owned = backend
            .insert(
                org(),
                NewResource {
                    kind: Kind::Bucket,
                    name: String::from("old-display"),
                    spec: json!({}),
                },
            )
            .unwrap();

        let mut stack = Stack::new(org());
        stack.set_resources(vec![StackResource {
            kind: Kind::Bucket,
            meta_name: String::from("owner"),
            id: owned.id,
            spec_hash: String::new(),
            associations: Vec::new(),
        }]);

        // "newcomer" takes the display name still held by "owner"'s resource.
        let newcomer = Object::new(
            "newcomer",
            ResourceSpec::Bucket(BucketSpec {
                name: Some(String::from("old-display")),
                ..BucketSpec::default()
            }),
        );
        let package = Package::new(vec![newcomer, bucket("owner", None)], Vec::new());
        let diff = run(&package, Some(&stack), &backend).await;

        assert_eq!(diff.entry(Kind::Bucket, "newcomer").unwrap().change, ChangeType::Create);
        let owner = diff.entry(Kind::Bucket, "owner").unwrap();
        assert_eq!(owner.identifier.id, Some(owned.id));
        assert_eq!(owner.change, ChangeType::Update);
    }

    #[tokio::test]
    async fn test_stack_lookup_and_removal() {
        let backend = MemoryBackend::new();
        let renamed = backend
            .create(
                org(),
                org(),
                NewResource {
                    kind: Kind::Bucket,
                    name: String::from("old-display"),
                    spec: json!({}),
                },
            )
            .await
            .unwrap();
        let dropped = backend
            .create(
                org(),
                org(),
                NewResource {
                    kind: Kind::Bucket,
                    name: String::from("dropped"),
                    spec: json!({}),
                },
            )
            .await
            .unwrap();

        let mut stack = Stack::new(org());
        stack.set_resources(vec![
            StackResource {
                kind: Kind::Bucket,
                meta_name: String::from("bkt"),
                id: renamed.id,
                spec_hash: String::new(),
                associations: Vec::new(),
            },
            StackResource {
                kind: Kind::Bucket,
                meta_name: String::from("dropped"),
                id: dropped.id,
                spec_hash: String::new(),
                associations: Vec::new(),
            },
        ]);

        let package = Package::new(vec![bucket("bkt", None)], Vec::new());
        let diff = run(&package, Some(&stack), &backend).await;

        let entry = diff.entry(Kind::Bucket, "bkt").unwrap();
        assert_eq!(entry.identifier.id, Some(renamed.id));
        assert_eq!(entry.change, ChangeType::Update);

        let removal = diff.entry(Kind::Bucket, "dropped").unwrap();
        assert_eq!(removal.change, ChangeType::Remove);
        assert_eq!(removal.identifier.state_status, StateStatus::Remove);
    }

    #[tokio::test]
    async fn test_existing_label_mapping_is_unchanged() {
        let backend = MemoryBackend::new();
        let label = backend
            .create(
                org(),
                org(),
                NewResource {
                    kind: Kind::Label,
                    name: String::from("env"),
                    spec: json!({}),
                },
            )
            .await
            .unwrap();
        let bkt = backend
            .create(
                org(),
                org(),
                NewResource {
                    kind: Kind::Bucket,
                    name: String::from("bkt"),
                    spec: json!({}),
                },
            )
            .await
            .unwrap();
        backend
            .create_label_link(
                org(),
                LabelLink {
                    label_id: label.id,
                    resource_kind: Kind::Bucket,
                    resource_id: bkt.id,
                },
            )
            .await
            .unwrap();

        let labeled = Object::new(
            "bkt",
            ResourceSpec::Bucket(BucketSpec {
                associations: vec![Association {
                    kind: Kind::Label,
                    name: String::from("env"),
                    id: None,
                }],
                ..BucketSpec::default()
            }),
        );
        let package = Package::new(
            vec![Object::new("env", ResourceSpec::Label(LabelSpec::default())), labeled],
            Vec::new(),
        );
        let diff = run(&package, None, &backend).await;

        assert_eq!(diff.label_mappings.len(), 1);
        assert_eq!(diff.label_mappings[0].change, ChangeType::Unchanged);
        assert_eq!(diff.label_mappings[0].label_id, Some(label.id));
        assert!(!diff.has_changes());
    }

    #[test]
    fn test_empty_diff_serializes_arrays() {
        let value = serde_json::to_value(Diff::default()).unwrap();
        assert_eq!(value["labelMappings"], json!([]));
        assert_eq!(value["telegrafConfigs"], json!([]));
    }
}
