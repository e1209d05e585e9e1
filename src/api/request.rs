//! Request payloads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RequestError;
use crate::id::PlatformId;
use crate::service::{ApplyOptions, OrgExport, ResourceRef, TemplateSource};
use crate::template::Kind;

pub(crate) fn parse_id(field: &'static str, value: &str) -> Result<PlatformId, RequestError> {
    value.parse().map_err(|source| RequestError::InvalidId {
        field,
        value: value.to_string(),
        source,
    })
}

/// A template fetched by URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReqTemplateRemote {
    /// Location.
    pub url: String,
    /// Encoding hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// A template carried in the request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReqRawTemplate {
    /// Encoding of `contents`.
    #[serde(default)]
    pub content_type: String,
    /// Provenance of the template.
    #[serde(default)]
    pub sources: Vec<String>,
    /// The template: a JSON document, or a string holding any encoding.
    #[serde(default)]
    pub contents: Value,
}

impl ReqRawTemplate {
    /// Converts into a template source.
    #[must_use]
    pub fn to_source(&self) -> TemplateSource {
        let contents = match &self.contents {
            Value::String(text) => text.clone().into_bytes(),
            other => other.to_string().into_bytes(),
        };
        TemplateSource::Inline {
            contents,
            content_type: Some(self.content_type.clone()).filter(|c| !c.is_empty()),
            sources: self.sources.clone(),
        }
    }
}

/// Body of an apply request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReqApply {
    /// Target org.
    #[serde(rename = "orgID")]
    pub org_id: String,
    /// Stack to reconcile against.
    #[serde(rename = "stackID", default, skip_serializing_if = "Option::is_none")]
    pub stack_id: Option<String>,
    /// Report the impact without applying.
    #[serde(default)]
    pub dry_run: bool,
    /// Secret values keyed by secret key.
    #[serde(default)]
    pub secrets: BTreeMap<String, String>,
    /// Templates to fetch.
    #[serde(default)]
    pub remotes: Vec<ReqTemplateRemote>,
    /// A single inline template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<ReqRawTemplate>,
    /// Inline templates.
    #[serde(default)]
    pub templates: Vec<ReqRawTemplate>,
}

impl ReqApply {
    /// Parses the org ID.
    ///
    /// # Errors
    ///
    /// Returns `RequestError::InvalidId` if it is not a platform ID.
    pub fn org_id(&self) -> Result<PlatformId, RequestError> {
        parse_id("orgID", &self.org_id)
    }

    /// Parses the stack ID, if one was given.
    ///
    /// # Errors
    ///
    /// Returns `RequestError::InvalidId` if it is not a platform ID.
    pub fn stack_id(&self) -> Result<Option<PlatformId>, RequestError> {
        self.stack_id
            .as_deref()
            .map(|id| parse_id("stackID", id))
            .transpose()
    }

    /// Returns every template source: the template list, then the single
    /// template, then remotes.
    #[must_use]
    pub fn template_sources(&self) -> Vec<TemplateSource> {
        self.templates
            .iter()
            .chain(self.template.as_ref())
            .map(ReqRawTemplate::to_source)
            .chain(self.remotes.iter().map(|r| TemplateSource::Remote {
                url: r.url.clone(),
                content_type: r.content_type.clone(),
            }))
            .collect()
    }

    /// Builds apply options.
    ///
    /// # Errors
    ///
    /// Returns `RequestError::InvalidId` for a malformed stack ID.
    pub fn options(&self) -> Result<ApplyOptions, RequestError> {
        Ok(ApplyOptions {
            dry_run: self.dry_run,
            stack_id: self.stack_id()?,
            secrets: self.secrets.clone(),
            ..ApplyOptions::default()
        })
    }
}

/// Filters of an org-wide export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReqResourceFilters {
    /// Label names.
    #[serde(default)]
    pub by_label: Vec<String>,
    /// Kinds.
    #[serde(default)]
    pub by_resource_kind: Vec<Kind>,
}

/// An org to export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReqExportOrg {
    /// Org ID.
    #[serde(rename = "orgID")]
    pub org_id: String,
    /// Filters.
    #[serde(default)]
    pub resource_filters: ReqResourceFilters,
}

/// A resource to export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReqExportResource {
    /// Kind.
    pub kind: Kind,
    /// Backend ID.
    pub id: String,
    /// Display name override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// metaName override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_name: Option<String>,
}

/// Body of an export request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReqExport {
    /// Orgs to export wholesale.
    #[serde(rename = "orgIDs", default)]
    pub org_ids: Vec<ReqExportOrg>,
    /// Individual resources.
    #[serde(default)]
    pub resources: Vec<ReqExportResource>,
}

impl ReqExport {
    /// Parses the org selections.
    ///
    /// # Errors
    ///
    /// Returns `RequestError::InvalidId` for a malformed org ID.
    pub fn orgs(&self) -> Result<Vec<OrgExport>, RequestError> {
        self.org_ids
            .iter()
            .map(|org| {
                Ok(OrgExport {
                    org_id: parse_id("orgID", &org.org_id)?,
                    by_label: org.resource_filters.by_label.clone(),
                    by_resource_kind: org.resource_filters.by_resource_kind.clone(),
                })
            })
            .collect()
    }

    /// Parses the resource references.
    ///
    /// # Errors
    ///
    /// Returns `RequestError::InvalidId` for a malformed resource ID.
    pub fn resource_refs(&self) -> Result<Vec<ResourceRef>, RequestError> {
        self.resources
            .iter()
            .map(|r| {
                Ok(ResourceRef {
                    kind: r.kind,
                    id: parse_id("id", &r.id)?,
                    name: r.name.clone(),
                    meta_name: r.meta_name.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_source_order() {
        let raw = |name: &str| ReqRawTemplate {
            content_type: String::from("json"),
            sources: vec![name.to_string()],
            contents: json!([]),
        };
        let req = ReqApply {
            org_id: String::from("0000000000002328"),
            remotes: vec![ReqTemplateRemote {
                url: String::from("https://example.com/r.json"),
                content_type: None,
            }],
            template: Some(raw("single")),
            templates: vec![raw("a"), raw("b")],
            ..ReqApply::default()
        };

        let names: Vec<String> = req
            .template_sources()
            .into_iter()
            .map(|s| match s {
                TemplateSource::Inline { sources, .. } => sources[0].clone(),
                TemplateSource::Remote { url, .. } => url,
                TemplateSource::File(path) => path.display().to_string(),
            })
            .collect();
        assert_eq!(names, vec!["a", "b", "single", "https://example.com/r.json"]);
    }

    #[test]
    fn test_ids() {
        let mut req = ReqApply {
            org_id: String::from("0000000000002328"),
            ..ReqApply::default()
        };
        assert_eq!(req.org_id().unwrap().get(), 9000);
        assert_eq!(req.stack_id().unwrap(), None);

        req.stack_id = Some(String::from("invalid stack id"));
        assert!(matches!(
            req.stack_id(),
            Err(RequestError::InvalidId { field: "stackID", .. })
        ));

        req.org_id = String::from("bad org id");
        assert!(req.org_id().is_err());
    }

    #[test]
    fn test_string_contents_are_raw_bytes() {
        let raw = ReqRawTemplate {
            content_type: String::from("application/x-yaml"),
            sources: Vec::new(),
            contents: Value::String(String::from("kind: Bucket")),
        };
        let TemplateSource::Inline {
            contents,
            content_type,
            ..
        } = raw.to_source()
        else {
            panic!("expected inline source");
        };
        assert_eq!(contents, b"kind: Bucket");
        assert_eq!(content_type.as_deref(), Some("application/x-yaml"));
    }

    #[test]
    fn test_export_payload_shape() {
        let req: ReqExport = serde_json::from_value(json!({
            "orgIDs": [{"orgID": "0000000000002328", "resourceFilters": {"byResourceKind": ["Bucket"]}}],
            "resources": [{"kind": "Label", "id": "0000000000000001", "name": "new name"}]
        }))
        .unwrap();
        assert_eq!(req.orgs().unwrap()[0].by_resource_kind, vec![Kind::Bucket]);
        assert_eq!(req.resource_refs().unwrap()[0].name.as_deref(), Some("new name"));
    }
}
