//! Flat per-kind summary of a package.
//!
//! Every collection serializes as an array, empty or not.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::PlatformId;

use super::kind::Kind;
use super::object::Object;
use super::package::Package;
use super::spec::ResourceSpec;

/// Whether a resource or mapping exists in the backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum StateStatus {
    /// Declared, not yet present.
    #[default]
    New,
    /// Present in the backend.
    Exists,
    /// Present in the stack but no longer declared.
    Remove,
}

/// A label attached to a summarized resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SummaryAssociation {
    /// Label metaName.
    pub meta_name: String,
    /// Label display name.
    pub name: String,
    /// Backend ID, when known.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "id")]
    pub id: Option<PlatformId>,
}

/// One summarized resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResource {
    /// Resource kind.
    pub kind: Kind,
    /// metaName.
    pub meta_name: String,
    /// Display name.
    pub name: String,
    /// Backend ID, once matched or created.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "id")]
    pub id: Option<PlatformId>,
    /// Spec without associations.
    pub spec: Value,
    /// Associated labels.
    #[serde(default)]
    pub label_associations: Vec<SummaryAssociation>,
}

/// A concrete label to resource pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SummaryLabelMapping {
    /// Whether the mapping already exists.
    pub status: StateStatus,
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

/// Per-kind summary of a package.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Summary {
    /// Buckets.
    pub buckets: Vec<SummaryResource>,
    /// Checks.
    pub checks: Vec<SummaryResource>,
    /// Dashboards.
    pub dashboards: Vec<SummaryResource>,
    /// Labels.
    pub labels: Vec<SummaryResource>,
    /// Label mappings, expanded from associations and explicit mappings.
    pub label_mappings: Vec<SummaryLabelMapping>,
    /// Notification endpoints.
    pub notification_endpoints: Vec<SummaryResource>,
    /// Notification rules.
    pub notification_rules: Vec<SummaryResource>,
    /// Tasks.
    pub tasks: Vec<SummaryResource>,
    /// Telegraf configurations.
    pub telegraf_configs: Vec<SummaryResource>,
    /// Variables.
    pub variables: Vec<SummaryResource>,
    /// Referenced secret keys that have no value, sorted.
    pub missing_secrets: Vec<String>,
}

impl Summary {
    /// Builds the summary of `package`.
    #[must_use]
    pub fn from_package(package: &Package) -> Self {
        let mut summary = Self::default();
        let mut seen_mappings = HashSet::new();
        let mut secrets = BTreeSet::new();

        for obj in package.objects() {
            secrets.extend(obj.spec.secret_refs().into_iter().map(ToString::to_string));

            if let ResourceSpec::LabelMapping(mapping) = &obj.spec {
                let (Some(label), Some(kind), Some(name)) = (
                    mapping.label.as_deref(),
                    mapping.resource_kind,
                    mapping.resource_name.as_deref(),
                ) else {
                    continue;
                };
                let resource_name = package
                    .get(kind, name)
                    .map_or(name, Object::display_name);
                if seen_mappings.insert((kind, name.to_string(), label.to_string())) {
                    summary.label_mappings.push(SummaryLabelMapping {
                        status: StateStatus::New,
                        resource_type: kind,
                        resource_meta_name: name.to_string(),
                        resource_name: resource_name.to_string(),
                        resource_id: None,
                        label_meta_name: label.to_string(),
                        label_name: label_display_name(package, label),
                        label_id: None,
                    });
                }
                continue;
            }

            let mut associations = Vec::new();
            for assoc in obj.spec.associations() {
                if associations
                    .iter()
                    .any(|a: &SummaryAssociation| a.meta_name == assoc.name)
                {
                    continue;
                }
                let label_name = label_display_name(package, &assoc.name);
                associations.push(SummaryAssociation {
                    meta_name: assoc.name.clone(),
                    name: label_name.clone(),
                    id: assoc.id,
                });

                if seen_mappings.insert((obj.kind, obj.metadata.name.clone(), assoc.name.clone())) {
                    summary.label_mappings.push(SummaryLabelMapping {
                        status: StateStatus::New,
                        resource_type: obj.kind,
                        resource_meta_name: obj.metadata.name.clone(),
                        resource_name: obj.display_name().to_string(),
                        resource_id: None,
                        label_meta_name: assoc.name.clone(),
                        label_name,
                        label_id: assoc.id,
                    });
                }
            }

            summary.push(SummaryResource {
                kind: obj.kind,
                meta_name: obj.metadata.name.clone(),
                name: obj.display_name().to_string(),
                id: None,
                spec: obj.spec.without_associations().to_value(),
                label_associations: associations,
            });
        }

        summary.missing_secrets = secrets.into_iter().collect();
        summary
    }

    /// Returns the collection for a resource kind.
    #[must_use]
    pub fn resources(&self, kind: Kind) -> &[SummaryResource] {
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

    fn resources_mut(&mut self, kind: Kind) -> Option<&mut Vec<SummaryResource>> {
        match kind {
            Kind::Bucket => Some(&mut self.buckets),
            Kind::Check => Some(&mut self.checks),
            Kind::Dashboard => Some(&mut self.dashboards),
            Kind::Label => Some(&mut self.labels),
            Kind::LabelMapping => None,
            Kind::NotificationEndpoint => Some(&mut self.notification_endpoints),
            Kind::NotificationRule => Some(&mut self.notification_rules),
            Kind::Task => Some(&mut self.tasks),
            Kind::Telegraf => Some(&mut self.telegraf_configs),
            Kind::Variable => Some(&mut self.variables),
        }
    }

    fn push(&mut self, resource: SummaryResource) {
        if let Some(collection) = self.resources_mut(resource.kind) {
            collection.push(resource);
        }
    }

    /// Records the backend ID of a resource and of every mapping that touches it.
    pub fn set_id(&mut self, kind: Kind, meta_name: &str, id: PlatformId) {
        if let Some(resource) = self
            .resources_mut(kind)
            .and_then(|c| c.iter_mut().find(|r| r.meta_name == meta_name))
        {
            resource.id = Some(id);
        }

        if kind == Kind::Label {
            for resources in [
                &mut self.buckets,
                &mut self.checks,
                &mut self.dashboards,
                &mut self.labels,
                &mut self.notification_endpoints,
                &mut self.notification_rules,
                &mut self.tasks,
                &mut self.telegraf_configs,
                &mut self.variables,
            ] {
                for assoc in resources
                    .iter_mut()
                    .flat_map(|r| r.label_associations.iter_mut())
                    .filter(|a| a.meta_name == meta_name)
                {
                    assoc.id = Some(id);
                }
            }
        }

        for mapping in &mut self.label_mappings {
            if kind == Kind::Label && mapping.label_meta_name == meta_name {
                mapping.label_id = Some(id);
            }
            if mapping.resource_type == kind && mapping.resource_meta_name == meta_name {
                mapping.resource_id = Some(id);
            }
        }
    }

    /// Returns the number of summarized resources, mappings excluded.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        Kind::ALL.iter().map(|k| self.resources(*k).len()).sum()
    }

    /// Returns true if nothing is summarized.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resource_count() == 0 && self.label_mappings.is_empty()
    }
}

fn label_display_name(package: &Package, meta_name: &str) -> String {
    package
        .get(Kind::Label, meta_name)
        .map_or(meta_name, Object::display_name)
        .to_string()
}
