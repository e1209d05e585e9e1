//! Resource kinds and template encodings.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The only accepted `apiVersion` for template objects.
pub const API_VERSION: &str = "stackplate.dev/v1alpha1";

/// Kinds of resource a template may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    /// Time-series storage bucket.
    Bucket,
    /// Deadman or threshold check.
    Check,
    /// Dashboard with opaque chart definitions.
    Dashboard,
    /// Label attachable to other resources.
    Label,
    /// Explicit label to resource mapping.
    LabelMapping,
    /// Notification endpoint (http, slack, pagerduty).
    NotificationEndpoint,
    /// Notification rule routing check statuses to an endpoint.
    NotificationRule,
    /// Scheduled task.
    Task,
    /// Telegraf agent configuration.
    Telegraf,
    /// Dashboard variable.
    Variable,
}

/// A kind name resolved from template text, with the subtype an alias implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedKind {
    /// Canonical kind.
    pub kind: Kind,
    /// Subtype implied by an alias such as `CheckDeadman`.
    pub subtype: Option<&'static str>,
}

impl Kind {
    /// Every kind, in canonical order.
    pub const ALL: [Self; 10] = [
        Self::Bucket,
        Self::Check,
        Self::Dashboard,
        Self::Label,
        Self::LabelMapping,
        Self::NotificationEndpoint,
        Self::NotificationRule,
        Self::Task,
        Self::Telegraf,
        Self::Variable,
    ];

    /// Returns the canonical kind name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bucket => "Bucket",
            Self::Check => "Check",
            Self::Dashboard => "Dashboard",
            Self::Label => "Label",
            Self::LabelMapping => "LabelMapping",
            Self::NotificationEndpoint => "NotificationEndpoint",
            Self::NotificationRule => "NotificationRule",
            Self::Task => "Task",
            Self::Telegraf => "Telegraf",
            Self::Variable => "Variable",
        }
    }

    /// Resolves a kind name or alias, ignoring case.
    #[must_use]
    pub fn resolve(name: &str) -> Option<ResolvedKind> {
        let lower = name.trim().to_ascii_lowercase();
        let (kind, subtype) = match lower.as_str() {
            "bucket" => (Self::Bucket, None),
            "check" => (Self::Check, None),
            "checkdeadman" => (Self::Check, Some("deadman")),
            "checkthreshold" => (Self::Check, Some("threshold")),
            "dashboard" => (Self::Dashboard, None),
            "label" => (Self::Label, None),
            "labelmapping" => (Self::LabelMapping, None),
            "notificationendpoint" => (Self::NotificationEndpoint, None),
            "notificationendpointhttp" => (Self::NotificationEndpoint, Some("http")),
            "notificationendpointslack" => (Self::NotificationEndpoint, Some("slack")),
            "notificationendpointpagerduty" => (Self::NotificationEndpoint, Some("pagerduty")),
            "notificationrule" => (Self::NotificationRule, None),
            "task" => (Self::Task, None),
            "telegraf" => (Self::Telegraf, None),
            "variable" => (Self::Variable, None),
            _ => return None,
        };
        Some(ResolvedKind { kind, subtype })
    }

    /// Whether objects of this kind may carry label associations.
    #[must_use]
    pub const fn is_labelable(self) -> bool {
        !matches!(self, Self::LabelMapping)
    }

    /// Whether the kind has a standalone backend resource.
    ///
    /// Label mappings are realized as links between two resources.
    #[must_use]
    pub const fn is_resource(self) -> bool {
        !matches!(self, Self::LabelMapping)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::resolve(s)
            .map(|r| r.kind)
            .ok_or_else(|| format!("unknown kind \"{s}\""))
    }
}

impl Serialize for Kind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Kind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Text encodings a template may be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Encoding {
    /// A JSON object or array of objects.
    #[default]
    Json,
    /// One or more YAML documents.
    Yaml,
    /// A Jinja template rendering to YAML.
    Jinja,
}

impl Encoding {
    /// Returns the lowercase encoding name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Jinja => "jinja",
        }
    }

    /// Maps a content type to an encoding. Parameters after `;` are ignored.
    #[must_use]
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "application/json" | "json" => Some(Self::Json),
            "application/x-yaml" | "application/yaml" | "text/yml" | "text/yaml" | "yaml"
            | "yml" => Some(Self::Yaml),
            "application/x-jinja" | "jinja" | "j2" => Some(Self::Jinja),
            _ => None,
        }
    }

    /// Sniffs the encoding from a path or URL suffix.
    #[must_use]
    pub fn from_suffix(source: &str) -> Option<Self> {
        let path = source.split(['?', '#']).next().unwrap_or_default();
        let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(Self::Json),
            "yml" | "yaml" => Some(Self::Yaml),
            "jinja" | "j2" => Some(Self::Jinja),
            _ => None,
        }
    }

    /// Resolves an encoding: explicit content type, then source suffix, then JSON.
    #[must_use]
    pub fn resolve(content_type: Option<&str>, sources: &[String]) -> Self {
        content_type
            .and_then(Self::from_content_type)
            .or_else(|| sources.iter().find_map(|s| Self::from_suffix(s)))
            .unwrap_or_default()
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_content_type(s).ok_or_else(|| format!("unknown encoding \"{s}\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_aliases() {
        let r = Kind::resolve("CheckDeadman").unwrap();
        assert_eq!(r.kind, Kind::Check);
        assert_eq!(r.subtype, Some("deadman"));

        let r = Kind::resolve("notificationendpointslack").unwrap();
        assert_eq!(r.kind, Kind::NotificationEndpoint);
        assert_eq!(r.subtype, Some("slack"));

        assert_eq!("bUcKeT".parse::<Kind>(), Ok(Kind::Bucket));
        assert!(Kind::resolve("Pod").is_none());
    }

    #[test]
    fn test_kind_serializes_canonical() {
        let kind: Kind = serde_json::from_str("\"labelmapping\"").unwrap();
        assert_eq!(serde_json::to_string(&kind).unwrap(), "\"LabelMapping\"");
    }

    #[test]
    fn test_encoding_from_content_type() {
        assert_eq!(
            Encoding::from_content_type("application/json; charset=utf-8"),
            Some(Encoding::Json)
        );
        assert_eq!(Encoding::from_content_type("text/yml"), Some(Encoding::Yaml));
        assert_eq!(Encoding::from_content_type("j2"), Some(Encoding::Jinja));
        assert_eq!(Encoding::from_content_type("text/plain"), None);
    }

    #[test]
    fn test_encoding_resolution_order() {
        let sources = vec![String::from("http://host/pkg.jinja?ref=main")];
        assert_eq!(Encoding::resolve(None, &sources), Encoding::Jinja);
        assert_eq!(Encoding::resolve(Some("yaml"), &sources), Encoding::Yaml);
        assert_eq!(Encoding::resolve(Some(""), &[]), Encoding::Json);
    }
}
