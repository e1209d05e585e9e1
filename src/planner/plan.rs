//! Apply plan types and construction.
//!
//! This module defines the kind dependency order and converts diffs into
//! phased, executable plans.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::TemplateError;
use crate::id::PlatformId;
use crate::state::StackResource;
use crate::template::{Kind, Package, ResourceSpec, SpecHasher};

use super::diff::{ChangeType, Diff, DiffEntry};

/// Ordered phases of kinds. All kinds of one phase may be applied concurrently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindOrder {
    phases: Vec<Vec<Kind>>,
}

impl KindOrder {
    /// Creates a kind order from explicit phases.
    ///
    /// Every kind must appear exactly once, notification endpoints must come
    /// before notification rules, and label mappings must be in the last phase
    /// on their own.
    ///
    /// # Errors
    ///
    /// Returns `TemplateError::InvalidKindOrder` describing the first problem.
    pub fn new(phases: Vec<Vec<Kind>>) -> Result<Self, TemplateError> {
        let invalid = |message: String| TemplateError::InvalidKindOrder { message };

        let mut position: HashMap<Kind, usize> = HashMap::new();
        for (i, phase) in phases.iter().enumerate() {
            if phase.is_empty() {
                return Err(invalid(format!("phase {i} is empty")));
            }
            for kind in phase {
                if position.insert(*kind, i).is_some() {
                    return Err(invalid(format!("kind {kind} appears more than once")));
                }
            }
        }
        if let Some(missing) = Kind::ALL.into_iter().find(|k| !position.contains_key(k)) {
            return Err(invalid(format!("kind {missing} is missing")));
        }

        if position[&Kind::NotificationEndpoint] >= position[&Kind::NotificationRule] {
            return Err(invalid(String::from(
                "NotificationEndpoint must come before NotificationRule",
            )));
        }
        let last = phases.len() - 1;
        if position[&Kind::LabelMapping] != last || phases[last].len() != 1 {
            return Err(invalid(String::from(
                "LabelMapping must be alone in the last phase",
            )));
        }

        Ok(Self { phases })
    }

    /// Returns the phases.
    #[must_use]
    pub fn phases(&self) -> &[Vec<Kind>] {
        &self.phases
    }

    /// Returns the phase index of a kind.
    #[must_use]
    pub fn phase_of(&self, kind: Kind) -> usize {
        self.phases
            .iter()
            .position(|p| p.contains(&kind))
            .unwrap_or(self.phases.len())
    }
}

impl Default for KindOrder {
    fn default() -> Self {
        Self {
            phases: vec![
                vec![Kind::Label],
                vec![
                    Kind::Bucket,
                    Kind::Check,
                    Kind::Dashboard,
                    Kind::NotificationEndpoint,
                    Kind::Task,
                    Kind::Telegraf,
                    Kind::Variable,
                ],
                vec![Kind::NotificationRule],
                vec![Kind::LabelMapping],
            ],
        }
    }
}

/// Types of actions in a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    /// Create a resource.
    Create,
    /// Update a resource in place.
    Update,
    /// Delete a resource no longer declared.
    Remove,
    /// Link a label to a resource.
    Link,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Remove => write!(f, "remove"),
            Self::Link => write!(f, "link"),
        }
    }
}

/// Endpoints of a label link action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTarget {
    /// Kind of the labeled resource.
    pub resource_kind: Kind,
    /// metaName of the labeled resource.
    pub resource_meta_name: String,
    /// Backend ID of the labeled resource, if it already exists.
    pub resource_id: Option<PlatformId>,
    /// Label metaName.
    pub label_meta_name: String,
    /// Backend ID of the label, if it already exists.
    pub label_id: Option<PlatformId>,
}

/// A single planned action.
#[derive(Debug, Clone)]
pub struct PlannedAction {
    /// Action type.
    pub action_type: ActionType,
    /// Kind of the affected resource.
    pub kind: Kind,
    /// metaName of the affected resource.
    pub meta_name: String,
    /// Display name written to the backend.
    pub name: String,
    /// Backend ID for updates and removals.
    pub id: Option<PlatformId>,
    /// Spec written to the backend.
    pub spec: Value,
    /// Hash of `spec`.
    pub spec_hash: String,
    /// Associated label metaNames.
    pub associations: Vec<String>,
    /// Link endpoints, for link actions.
    pub link: Option<LinkTarget>,
    /// Dependencies (action indices that must succeed first).
    pub dependencies: Vec<usize>,
}

impl PlannedAction {
    /// Returns the stack record this action realizes.
    #[must_use]
    pub fn stack_resource(&self, id: PlatformId) -> StackResource {
        StackResource {
            kind: self.kind,
            meta_name: self.meta_name.clone(),
            id,
            spec_hash: self.spec_hash.clone(),
            associations: self.associations.clone(),
        }
    }
}

/// A complete apply plan.
#[derive(Debug)]
pub struct ApplyPlan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Planned actions.
    pub actions: Vec<PlannedAction>,
    /// Action indices grouped by phase, in execution order.
    pub phases: Vec<Vec<usize>>,
    /// Resources already in the desired state.
    pub unchanged: Vec<StackResource>,
}

impl ApplyPlan {
    /// Creates a new plan from a diff.
    ///
    /// Creates and updates follow `order`. Label links are created for every
    /// mapping not yet present. Removals run last, in reverse phase order.
    #[must_use]
    pub fn from_diff(diff: &Diff, package: &Package, order: &KindOrder) -> Self {
        let hasher = SpecHasher::new();
        let mut actions: Vec<PlannedAction> = Vec::new();
        let mut phases: Vec<Vec<usize>> = Vec::new();
        let mut unchanged = Vec::new();
        let mut by_identity: HashMap<(Kind, String), usize> = HashMap::new();

        let associations_of = |kind: Kind, meta_name: &str| -> Vec<String> {
            package
                .get(kind, meta_name)
                .map(|o| o.spec.associations().iter().map(|a| a.name.clone()).collect())
                .unwrap_or_default()
        };

        for phase in order.phases() {
            let mut indices = Vec::new();
            for kind in phase {
                if *kind == Kind::LabelMapping {
                    for mapping in diff
                        .label_mappings
                        .iter()
                        .filter(|m| m.change == ChangeType::Create)
                    {
                        let mut dependencies = Vec::new();
                        if let Some(i) = by_identity
                            .get(&(mapping.resource_type, mapping.resource_meta_name.clone()))
                        {
                            dependencies.push(*i);
                        }
                        if mapping.label_id.is_none()
                            && let Some(i) =
                                by_identity.get(&(Kind::Label, mapping.label_meta_name.clone()))
                        {
                            dependencies.push(*i);
                        }
                        indices.push(actions.len());
                        actions.push(PlannedAction {
                            action_type: ActionType::Link,
                            kind: Kind::LabelMapping,
                            meta_name: format!(
                                "{}/{}",
                                mapping.label_meta_name, mapping.resource_meta_name
                            ),
                            name: mapping.label_name.clone(),
                            id: None,
                            spec: Value::Null,
                            spec_hash: String::new(),
                            associations: Vec::new(),
                            link: Some(LinkTarget {
                                resource_kind: mapping.resource_type,
                                resource_meta_name: mapping.resource_meta_name.clone(),
                                resource_id: mapping.resource_id,
                                label_meta_name: mapping.label_meta_name.clone(),
                                label_id: mapping.label_id,
                            }),
                            dependencies,
                        });
                    }
                    continue;
                }

                for entry in diff.entries(*kind) {
                    let action_type = match entry.change {
                        ChangeType::Create => ActionType::Create,
                        ChangeType::Update => ActionType::Update,
                        ChangeType::Unchanged => {
                            if let (Some(id), Some(new)) = (entry.identifier.id, &entry.new) {
                                unchanged.push(StackResource {
                                    kind: *kind,
                                    meta_name: entry.identifier.meta_name.clone(),
                                    id,
                                    spec_hash: hasher.hash_value(*kind, &new.spec),
                                    associations: associations_of(*kind, &entry.identifier.meta_name),
                                });
                            }
                            continue;
                        }
                        ChangeType::Remove => continue,
                    };
                    let Some(new) = &entry.new else { continue };

                    let dependencies = Self::spec_dependencies(entry, package, &by_identity);
                    let index = actions.len();
                    by_identity.insert((*kind, entry.identifier.meta_name.clone()), index);
                    indices.push(index);
                    actions.push(PlannedAction {
                        action_type,
                        kind: *kind,
                        meta_name: entry.identifier.meta_name.clone(),
                        name: new.name.clone(),
                        id: entry.identifier.id,
                        spec: new.spec.clone(),
                        spec_hash: hasher.hash_value(*kind, &new.spec),
                        associations: associations_of(*kind, &entry.identifier.meta_name),
                        link: None,
                        dependencies,
                    });
                }
            }
            if !indices.is_empty() {
                phases.push(indices);
            }
        }

        for phase in order.phases().iter().rev() {
            let mut indices = Vec::new();
            for kind in phase {
                for entry in diff
                    .entries(*kind)
                    .iter()
                    .filter(|e| e.change == ChangeType::Remove)
                {
                    let Some(old) = &entry.old else { continue };
                    indices.push(actions.len());
                    actions.push(PlannedAction {
                        action_type: ActionType::Remove,
                        kind: *kind,
                        meta_name: entry.identifier.meta_name.clone(),
                        name: old.name.clone(),
                        id: entry.identifier.id,
                        spec: old.spec.clone(),
                        spec_hash: hasher.hash_value(*kind, &old.spec),
                        associations: Vec::new(),
                        link: None,
                        dependencies: Vec::new(),
                    });
                }
            }
            if !indices.is_empty() {
                phases.push(indices);
            }
        }

        Self {
            created_at: Utc::now(),
            actions,
            phases,
            unchanged,
        }
    }

    fn spec_dependencies(
        entry: &DiffEntry,
        package: &Package,
        by_identity: &HashMap<(Kind, String), usize>,
    ) -> Vec<usize> {
        let Some(obj) = package.get(entry.identifier.kind, &entry.identifier.meta_name) else {
            return Vec::new();
        };
        match &obj.spec {
            ResourceSpec::NotificationRule(rule) => rule
                .endpoint_name
                .as_ref()
                .and_then(|name| by_identity.get(&(Kind::NotificationEndpoint, name.clone())))
                .copied()
                .into_iter()
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Checks if the plan has no actions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Returns a short summary of the plan.
    #[must_use]
    pub fn summary(&self) -> String {
        let count = |t: ActionType| self.actions.iter().filter(|a| a.action_type == t).count();
        format!(
            "{} to create, {} to update, {} to remove, {} to link, {} unchanged",
            count(ActionType::Create),
            count(ActionType::Update),
            count(ActionType::Remove),
            count(ActionType::Link),
            self.unchanged.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::planner::DiffEngine;
    use crate::template::{
        Association, BucketSpec, EndpointSpec, EndpointType, LabelSpec, Object, RuleSpec,
    };

    fn org() -> PlatformId {
        PlatformId::new(9000).unwrap()
    }

    async fn plan_for(package: &Package) -> ApplyPlan {
        let diff = DiffEngine::new()
            .diff(package, &package.summary(), org(), None, &MemoryBackend::new())
            .await
            .unwrap();
        ApplyPlan::from_diff(&diff, package, &KindOrder::default())
    }

    #[test]
    fn test_default_order_is_valid() {
        let order = KindOrder::default();
        assert_eq!(KindOrder::new(order.phases().to_vec()).unwrap(), order);
        assert_eq!(order.phase_of(Kind::Label), 0);
        assert_eq!(order.phase_of(Kind::NotificationRule), 2);
    }

    #[test]
    fn test_invalid_orders() {
        let mut phases = KindOrder::default().phases().to_vec();
        phases[0].push(Kind::Bucket);
        assert!(KindOrder::new(phases).is_err());

        let mut phases = KindOrder::default().phases().to_vec();
        phases.swap(1, 2);
        let err = KindOrder::new(phases).unwrap_err();
        assert!(err.to_string().contains("NotificationRule"));

        let mut phases = KindOrder::default().phases().to_vec();
        phases[1].retain(|k| *k != Kind::Task);
        let err = KindOrder::new(phases).unwrap_err();
        assert!(err.to_string().contains("Task"));

        let mut phases = KindOrder::default().phases().to_vec();
        phases.swap(0, 3);
        assert!(KindOrder::new(phases).is_err());
    }

    #[tokio::test]
    async fn test_phases_and_dependencies() {
        let env = Association {
            kind: Kind::Label,
            name: String::from("env"),
            id: None,
        };
        let package = Package::new(
            vec![
                Object::new(
                    "rule",
                    ResourceSpec::NotificationRule(RuleSpec {
                        endpoint_name: Some(String::from("hook")),
                        every: Some(String::from("1m")),
                        ..RuleSpec::default()
                    }),
                ),
                Object::new(
                    "hook",
                    ResourceSpec::NotificationEndpoint(EndpointSpec {
                        endpoint_type: Some(EndpointType::Http),
                        url: Some(String::from("https://example.com")),
                        ..EndpointSpec::default()
                    }),
                ),
                Object::new(
                    "bkt",
                    ResourceSpec::Bucket(BucketSpec {
                        associations: vec![env],
                        ..BucketSpec::default()
                    }),
                ),
                Object::new("env", ResourceSpec::Label(LabelSpec::default())),
            ],
            Vec::new(),
        );
        let plan = plan_for(&package).await;

        assert_eq!(plan.phases.len(), 4);
        let first = &plan.actions[plan.phases[0][0]];
        assert_eq!((first.kind, first.meta_name.as_str()), (Kind::Label, "env"));

        let rule = plan
            .actions
            .iter()
            .find(|a| a.kind == Kind::NotificationRule)
            .unwrap();
        assert_eq!(plan.actions[rule.dependencies[0]].meta_name, "hook");

        let link = plan
            .actions
            .iter()
            .find(|a| a.action_type == ActionType::Link)
            .unwrap();
        assert_eq!(link.dependencies.len(), 2);
        let bkt = plan.actions.iter().find(|a| a.meta_name == "bkt").unwrap();
        assert_eq!(bkt.associations, vec![String::from("env")]);
        assert!(plan.summary().starts_with("4 to create"));
    }

    #[tokio::test]
    async fn test_empty_package_plan() {
        let plan = plan_for(&Package::empty()).await;
        assert!(plan.is_empty());
        assert!(plan.phases.is_empty());
    }
}
