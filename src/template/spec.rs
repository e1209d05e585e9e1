//! Typed per-kind resource specifications.
//!
//! Every field is optional at the type level so that a malformed template
//! still decodes and the validator can report every missing field at once.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::PlatformId;

use super::kind::Kind;

/// Activity status shared by checks, endpoints, rules and tasks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Running.
    #[default]
    Active,
    /// Paused.
    Inactive,
}

/// A reference from a resource to a label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Association {
    /// Always `Label`.
    pub kind: Kind,
    /// metaName of the label within the package.
    pub name: String,
    /// Backend ID of a pre-existing label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<PlatformId>,
}

/// A secret lookup key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecretRef {
    /// Key in the org's secret store.
    pub key: String,
}

/// A field that is either a literal value or a reference to a stored secret.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SecretField {
    /// Reference to a secret key.
    Reference {
        /// The referenced secret.
        #[serde(rename = "secretRef")]
        secret_ref: SecretRef,
    },
    /// Inline value.
    Literal(String),
}

impl SecretField {
    /// Returns the referenced key, if this is a reference.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Reference { secret_ref } => Some(&secret_ref.key),
            Self::Literal(_) => None,
        }
    }
}

/// Bucket retention rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RetentionRule {
    /// Rule type; only `expire` exists.
    #[serde(rename = "type", default = "default_retention_type")]
    pub rule_type: String,
    /// Seconds to keep data; 0 keeps it forever.
    pub every_seconds: i64,
}

fn default_retention_type() -> String {
    String::from("expire")
}

/// Bucket spec.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BucketSpec {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Retention rules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retention_rules: Vec<RetentionRule>,
    /// Label associations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub associations: Vec<Association>,
}

/// Check flavour.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckType {
    /// Fires when no data arrives.
    Deadman,
    /// Fires when values cross thresholds.
    Threshold,
}

/// A single threshold of a threshold check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Threshold {
    /// `greater`, `lesser`, `inside_range` or `outside_range`.
    #[serde(rename = "type")]
    pub threshold_type: String,
    /// Level reported when crossed.
    pub level: String,
    /// Comparison value for greater/lesser.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    /// Lower bound for ranges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Upper bound for ranges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// Check spec.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CheckSpec {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Deadman or threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_type: Option<CheckType>,
    /// Query text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Schedule interval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub every: Option<String>,
    /// Schedule offset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<String>,
    /// Status message template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message_template: Option<String>,
    /// Level reported by a deadman check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// Thresholds of a threshold check.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub thresholds: Vec<Threshold>,
    /// Activity status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    /// Label associations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub associations: Vec<Association>,
}

/// Dashboard spec.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSpec {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Chart definitions, stored as given.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub charts: Vec<Value>,
    /// Label associations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub associations: Vec<Association>,
}

/// Label spec.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct LabelSpec {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `#RRGGBB` color.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Label associations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub associations: Vec<Association>,
}

/// Label mapping spec.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct LabelMappingSpec {
    /// metaName of the label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Kind of the labeled resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_kind: Option<Kind>,
    /// metaName of the labeled resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
}

/// Notification endpoint flavour.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EndpointType {
    /// Generic HTTP webhook.
    Http,
    /// Slack webhook.
    Slack,
    /// PagerDuty events API.
    Pagerduty,
}

/// Notification endpoint spec.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSpec {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Endpoint flavour.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_type: Option<EndpointType>,
    /// Target URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// HTTP method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// `none`, `basic` or `bearer`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_method: Option<String>,
    /// Basic auth user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<SecretField>,
    /// Basic auth password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<SecretField>,
    /// Bearer or Slack token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<SecretField>,
    /// PagerDuty routing key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_key: Option<SecretField>,
    /// Activity status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    /// Label associations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub associations: Vec<Association>,
}

/// Status transition a rule reacts to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusRule {
    /// Current level.
    pub current_level: String,
    /// Previous level, if the rule matches on a transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_level: Option<String>,
}

/// Tag filter of a rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TagRule {
    /// Tag key.
    pub key: String,
    /// Tag value.
    pub value: String,
    /// Comparison operator.
    #[serde(default = "default_tag_operator")]
    pub operator: String,
}

fn default_tag_operator() -> String {
    String::from("equal")
}

/// Notification rule spec.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RuleSpec {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// metaName of the target endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_name: Option<String>,
    /// Schedule interval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub every: Option<String>,
    /// Schedule offset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<String>,
    /// Message template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_template: Option<String>,
    /// Status rules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub status_rules: Vec<StatusRule>,
    /// Tag rules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tag_rules: Vec<TagRule>,
    /// Activity status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    /// Label associations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub associations: Vec<Association>,
}

/// Task spec.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Query text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Interval schedule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub every: Option<String>,
    /// Cron schedule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    /// Schedule offset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<String>,
    /// Activity status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    /// Label associations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub associations: Vec<Association>,
}

/// Telegraf configuration spec.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TelegrafSpec {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// TOML configuration text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
    /// Label associations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub associations: Vec<Association>,
}

/// Variable flavour.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    /// Fixed list of values.
    Constant,
    /// Key to value map.
    Map,
    /// Values produced by a query.
    Query,
}

/// Values of a constant or map variable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum VariableValues {
    /// Constant values.
    List(Vec<String>),
    /// Map values.
    Map(BTreeMap<String, String>),
}

impl VariableValues {
    /// Returns true if no values are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::List(values) => values.is_empty(),
            Self::Map(values) => values.is_empty(),
        }
    }
}

/// Variable spec.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct VariableSpec {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Variable flavour.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub variable_type: Option<VariableType>,
    /// Constant or map values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<VariableValues>,
    /// Query for query variables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Query language.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Label associations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub associations: Vec<Association>,
}

/// Kind-specific specification of a template object.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceSpec {
    /// Bucket.
    Bucket(BucketSpec),
    /// Check.
    Check(CheckSpec),
    /// Dashboard.
    Dashboard(DashboardSpec),
    /// Label.
    Label(LabelSpec),
    /// Label mapping.
    LabelMapping(LabelMappingSpec),
    /// Notification endpoint.
    NotificationEndpoint(EndpointSpec),
    /// Notification rule.
    NotificationRule(RuleSpec),
    /// Task.
    Task(TaskSpec),
    /// Telegraf configuration.
    Telegraf(TelegrafSpec),
    /// Variable.
    Variable(VariableSpec),
}

impl ResourceSpec {
    /// Decodes the spec of the given kind from a JSON value.
    ///
    /// A `null` spec decodes to the kind's default.
    ///
    /// # Errors
    ///
    /// Returns the serde error if a field has the wrong shape.
    pub fn from_value(kind: Kind, value: Value) -> serde_json::Result<Self> {
        let value = if value.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            value
        };

        Ok(match kind {
            Kind::Bucket => Self::Bucket(serde_json::from_value(value)?),
            Kind::Check => Self::Check(serde_json::from_value(value)?),
            Kind::Dashboard => Self::Dashboard(serde_json::from_value(value)?),
            Kind::Label => Self::Label(serde_json::from_value(value)?),
            Kind::LabelMapping => Self::LabelMapping(serde_json::from_value(value)?),
            Kind::NotificationEndpoint => {
                Self::NotificationEndpoint(serde_json::from_value(value)?)
            }
            Kind::NotificationRule => Self::NotificationRule(serde_json::from_value(value)?),
            Kind::Task => Self::Task(serde_json::from_value(value)?),
            Kind::Telegraf => Self::Telegraf(serde_json::from_value(value)?),
            Kind::Variable => Self::Variable(serde_json::from_value(value)?),
        })
    }

    /// Encodes the spec as a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let encoded = match self {
            Self::Bucket(s) => serde_json::to_value(s),
            Self::Check(s) => serde_json::to_value(s),
            Self::Dashboard(s) => serde_json::to_value(s),
            Self::Label(s) => serde_json::to_value(s),
            Self::LabelMapping(s) => serde_json::to_value(s),
            Self::NotificationEndpoint(s) => serde_json::to_value(s),
            Self::NotificationRule(s) => serde_json::to_value(s),
            Self::Task(s) => serde_json::to_value(s),
            Self::Telegraf(s) => serde_json::to_value(s),
            Self::Variable(s) => serde_json::to_value(s),
        };
        // Plain structs with string keys cannot fail to serialize.
        encoded.unwrap_or(Value::Null)
    }

    /// Returns the kind of this spec.
    #[must_use]
    pub const fn kind(&self) -> Kind {
        match self {
            Self::Bucket(_) => Kind::Bucket,
            Self::Check(_) => Kind::Check,
            Self::Dashboard(_) => Kind::Dashboard,
            Self::Label(_) => Kind::Label,
            Self::LabelMapping(_) => Kind::LabelMapping,
            Self::NotificationEndpoint(_) => Kind::NotificationEndpoint,
            Self::NotificationRule(_) => Kind::NotificationRule,
            Self::Task(_) => Kind::Task,
            Self::Telegraf(_) => Kind::Telegraf,
            Self::Variable(_) => Kind::Variable,
        }
    }

    /// Returns the declared display name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Bucket(s) => s.name.as_deref(),
            Self::Check(s) => s.name.as_deref(),
            Self::Dashboard(s) => s.name.as_deref(),
            Self::Label(s) => s.name.as_deref(),
            Self::LabelMapping(_) => None,
            Self::NotificationEndpoint(s) => s.name.as_deref(),
            Self::NotificationRule(s) => s.name.as_deref(),
            Self::Task(s) => s.name.as_deref(),
            Self::Telegraf(s) => s.name.as_deref(),
            Self::Variable(s) => s.name.as_deref(),
        }
    }

    /// Overrides the display name. No-op for label mappings.
    pub fn set_name(&mut self, name: impl Into<String>) {
        let name = Some(name.into());
        match self {
            Self::Bucket(s) => s.name = name,
            Self::Check(s) => s.name = name,
            Self::Dashboard(s) => s.name = name,
            Self::Label(s) => s.name = name,
            Self::LabelMapping(_) => {}
            Self::NotificationEndpoint(s) => s.name = name,
            Self::NotificationRule(s) => s.name = name,
            Self::Task(s) => s.name = name,
            Self::Telegraf(s) => s.name = name,
            Self::Variable(s) => s.name = name,
        }
    }

    /// Returns the label associations.
    #[must_use]
    pub fn associations(&self) -> &[Association] {
        match self {
            Self::Bucket(s) => &s.associations,
            Self::Check(s) => &s.associations,
            Self::Dashboard(s) => &s.associations,
            Self::Label(s) => &s.associations,
            Self::LabelMapping(_) => &[],
            Self::NotificationEndpoint(s) => &s.associations,
            Self::NotificationRule(s) => &s.associations,
            Self::Task(s) => &s.associations,
            Self::Telegraf(s) => &s.associations,
            Self::Variable(s) => &s.associations,
        }
    }

    /// Replaces the label associations. No-op for label mappings.
    pub fn set_associations(&mut self, associations: Vec<Association>) {
        match self {
            Self::Bucket(s) => s.associations = associations,
            Self::Check(s) => s.associations = associations,
            Self::Dashboard(s) => s.associations = associations,
            Self::Label(s) => s.associations = associations,
            Self::LabelMapping(_) => {}
            Self::NotificationEndpoint(s) => s.associations = associations,
            Self::NotificationRule(s) => s.associations = associations,
            Self::Task(s) => s.associations = associations,
            Self::Telegraf(s) => s.associations = associations,
            Self::Variable(s) => s.associations = associations,
        }
    }

    /// Returns a copy with associations removed.
    ///
    /// Associations are realized as label mappings, so they take no part in
    /// the resource's own content.
    #[must_use]
    pub fn without_associations(&self) -> Self {
        let mut spec = self.clone();
        spec.set_associations(Vec::new());
        spec
    }

    /// Returns every secret key referenced by this spec, in field order.
    #[must_use]
    pub fn secret_refs(&self) -> Vec<&str> {
        match self {
            Self::NotificationEndpoint(s) => [&s.username, &s.password, &s.token, &s.routing_key]
                .into_iter()
                .filter_map(|f| f.as_ref().and_then(SecretField::key))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Parses a duration such as `1h`, `30m`, `7d`, `1w` or `1h30m`.
///
/// # Errors
///
/// Returns a description of the malformed input.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err(String::from("duration is empty"));
    }
    humantime::parse_duration(input).map_err(|e| format!("invalid duration \"{input}\": {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5_400));
        assert_eq!(parse_duration("1w").unwrap(), Duration::from_secs(604_800));
        assert_eq!(parse_duration("7d").unwrap(), Duration::from_secs(604_800));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("h").is_err());
        assert!(parse_duration("5x").is_err());
        let err = parse_duration("10").unwrap_err();
        assert!(err.starts_with("invalid duration \"10\""), "{err}");
    }

    #[test]
    fn test_secret_field_forms() {
        let spec = ResourceSpec::from_value(
            Kind::NotificationEndpoint,
            json!({
                "endpointType": "http",
                "url": "https://example.com",
                "username": "admin",
                "password": {"secretRef": {"key": "http-pass"}}
            }),
        )
        .unwrap();

        assert_eq!(spec.secret_refs(), vec!["http-pass"]);
        let ResourceSpec::NotificationEndpoint(endpoint) = &spec else {
            panic!("wrong spec variant");
        };
        assert_eq!(endpoint.username, Some(SecretField::Literal(String::from("admin"))));
    }

    #[test]
    fn test_null_spec_is_default() {
        let spec = ResourceSpec::from_value(Kind::Label, Value::Null).unwrap();
        assert_eq!(spec, ResourceSpec::Label(LabelSpec::default()));
    }

    #[test]
    fn test_spec_value_skips_empty_fields() {
        let spec = ResourceSpec::from_value(Kind::Bucket, json!({"description": "d"})).unwrap();
        assert_eq!(spec.to_value(), json!({"description": "d"}));
    }

    #[test]
    fn test_wrong_shape_is_error() {
        let result = ResourceSpec::from_value(Kind::Bucket, json!({"retentionRules": "forever"}));
        assert!(result.is_err());
    }
}
