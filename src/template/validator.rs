//! Package validation.
//!
//! The validator checks structure and cross references of a whole package and
//! reports every violation at once instead of stopping at the first.

use std::collections::{HashMap, HashSet};
use std::fmt;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TemplateError;

use super::kind::{API_VERSION, Kind};
use super::object::Object;
use super::package::Package;
use super::spec::{
    Association, BucketSpec, CheckSpec, CheckType, EndpointSpec, EndpointType, LabelMappingSpec,
    LabelSpec, ResourceSpec, RuleSpec, TaskSpec, TelegrafSpec, VariableSpec, VariableType,
    VariableValues, parse_duration,
};

/// Maximum metaName length.
pub const MAX_META_NAME_LEN: usize = 253;

/// Threshold types a threshold check accepts.
const THRESHOLD_TYPES: &[&str] = &["greater", "lesser", "inside_range", "outside_range"];

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    /// Kind of the offending object.
    pub kind: Kind,
    /// metaName of the offending object.
    pub meta_name: String,
    /// Field path within the object.
    pub field: String,
    /// What is wrong.
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} \"{}\" {}: {}",
            self.kind, self.meta_name, self.field, self.message
        )
    }
}

/// Outcome of a successful validation.
#[derive(Debug, Default)]
pub struct ValidationReport {
    /// Number of objects checked.
    pub objects: usize,
    /// Non-fatal findings.
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

/// Collects errors for one object.
struct Scope<'a> {
    obj: &'a Object,
    errors: &'a mut Vec<ValidationError>,
}

impl Scope<'_> {
    fn fail(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(ValidationError {
            kind: self.obj.kind,
            meta_name: self.obj.metadata.name.clone(),
            field: field.to_string(),
            message: message.into(),
        });
    }

    fn require(&mut self, field: &str, value: Option<&str>) {
        if value.is_none_or(|v| v.trim().is_empty()) {
            self.fail(field, "is required");
        }
    }

    fn duration(&mut self, field: &str, value: Option<&str>) {
        if let Some(v) = value
            && let Err(e) = parse_duration(v)
        {
            self.fail(field, e);
        }
    }
}

/// Validator for template packages.
#[derive(Debug, Default)]
pub struct TemplateValidator;

impl TemplateValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a package.
    ///
    /// # Errors
    ///
    /// Returns `TemplateError::Validation` carrying every violation found.
    pub fn validate(&self, package: &Package) -> Result<ValidationReport, TemplateError> {
        let mut errors = Vec::new();
        let mut report = ValidationReport {
            objects: package.len(),
            warnings: Vec::new(),
        };

        if package.is_empty() {
            report.warnings.push(String::from("template declares no resources"));
        }

        let mut display_names: HashMap<(Kind, &str), &str> = HashMap::new();
        for (i, obj) in package.objects().iter().enumerate() {
            let mut scope = Scope {
                obj,
                errors: &mut errors,
            };

            if obj.api_version != API_VERSION {
                scope.fail(
                    "apiVersion",
                    format!("unsupported apiVersion \"{}\"", obj.api_version),
                );
            }
            if !is_valid_meta_name(&obj.metadata.name) {
                scope.fail(
                    "metadata.name",
                    format!(
                        "must be lowercase alphanumeric with '-' or '.', start and end alphanumeric, at most {MAX_META_NAME_LEN} characters"
                    ),
                );
            }
            if package.index().position(obj.kind, &obj.metadata.name) != Some(i) {
                scope.fail("metadata.name", "duplicate metaName for this kind");
            }
            if obj.kind.is_resource() {
                let first = *display_names
                    .entry((obj.kind, obj.display_name()))
                    .or_insert_with(|| obj.meta_name());
                if first != obj.meta_name() {
                    scope.fail(
                        "spec.name",
                        format!("name \"{}\" is already used by {} \"{first}\"", obj.display_name(), obj.kind),
                    );
                }
            }

            Self::validate_associations(package, obj.spec.associations(), &mut scope, &mut report);

            match &obj.spec {
                ResourceSpec::Bucket(spec) => Self::validate_bucket(spec, &mut scope),
                ResourceSpec::Check(spec) => Self::validate_check(spec, &mut scope),
                ResourceSpec::Dashboard(_) => {}
                ResourceSpec::Label(spec) => Self::validate_label(spec, &mut scope),
                ResourceSpec::LabelMapping(spec) => {
                    Self::validate_label_mapping(package, spec, &mut scope);
                }
                ResourceSpec::NotificationEndpoint(spec) => {
                    Self::validate_endpoint(spec, &mut scope);
                }
                ResourceSpec::NotificationRule(spec) => {
                    Self::validate_rule(package, spec, &mut scope);
                }
                ResourceSpec::Task(spec) => Self::validate_task(spec, &mut scope),
                ResourceSpec::Telegraf(spec) => Self::validate_telegraf(spec, &mut scope),
                ResourceSpec::Variable(spec) => Self::validate_variable(spec, &mut scope),
            }
        }

        if errors.is_empty() {
            debug!(objects = report.objects, warnings = report.warning_count(), "template validation passed");
            Ok(report)
        } else {
            debug!(errors = errors.len(), "template validation failed");
            Err(TemplateError::Validation { errors })
        }
    }

    fn validate_associations(
        package: &Package,
        associations: &[Association],
        scope: &mut Scope<'_>,
        report: &mut ValidationReport,
    ) {
        let mut seen = HashSet::new();
        for (i, assoc) in associations.iter().enumerate() {
            let field = format!("spec.associations[{i}]");
            if assoc.kind != Kind::Label {
                scope.fail(&field, format!("associations must reference a Label, got {}", assoc.kind));
                continue;
            }
            if !seen.insert(assoc.name.as_str()) {
                report.warnings.push(format!(
                    "{} \"{}\" associates label \"{}\" more than once",
                    scope.obj.kind, scope.obj.metadata.name, assoc.name
                ));
                continue;
            }
            if assoc.id.is_none() && !package.index().contains(Kind::Label, &assoc.name) {
                scope.fail(&field, format!("label \"{}\" is not declared in the template", assoc.name));
            }
        }
    }

    fn validate_bucket(spec: &BucketSpec, scope: &mut Scope<'_>) {
        for (i, rule) in spec.retention_rules.iter().enumerate() {
            let field = format!("spec.retentionRules[{i}]");
            if rule.rule_type != "expire" {
                scope.fail(&field, format!("unsupported retention rule type \"{}\"", rule.rule_type));
            }
            if rule.every_seconds < 0 {
                scope.fail(&field, "everySeconds must be 0 (infinite) or positive");
            }
        }
    }

    fn validate_check(spec: &CheckSpec, scope: &mut Scope<'_>) {
        scope.require("spec.query", spec.query.as_deref());
        scope.require("spec.every", spec.every.as_deref());
        scope.duration("spec.every", spec.every.as_deref());
        scope.duration("spec.offset", spec.offset.as_deref());

        match spec.check_type {
            None => scope.fail("spec.checkType", "is required (deadman or threshold)"),
            Some(CheckType::Deadman) => {}
            Some(CheckType::Threshold) => {
                if spec.thresholds.is_empty() {
                    scope.fail("spec.thresholds", "a threshold check needs at least one threshold");
                }
                for (i, t) in spec.thresholds.iter().enumerate() {
                    let field = format!("spec.thresholds[{i}]");
                    if !THRESHOLD_TYPES.contains(&t.threshold_type.as_str()) {
                        scope.fail(&field, format!("unknown threshold type \"{}\"", t.threshold_type));
                    } else if t.threshold_type.ends_with("range") {
                        if t.min.is_none() || t.max.is_none() {
                            scope.fail(&field, "range thresholds need min and max");
                        }
                    } else if t.value.is_none() {
                        scope.fail(&field, "value is required");
                    }
                }
            }
        }
    }

    fn validate_label(spec: &LabelSpec, scope: &mut Scope<'_>) {
        if let Some(color) = &spec.color
            && !is_hex_color(color)
        {
            scope.fail("spec.color", format!("\"{color}\" is not a #RRGGBB color"));
        }
    }

    fn validate_label_mapping(package: &Package, spec: &LabelMappingSpec, scope: &mut Scope<'_>) {
        scope.require("spec.label", spec.label.as_deref());
        scope.require("spec.resourceName", spec.resource_name.as_deref());

        if let Some(label) = spec.label.as_deref()
            && !package.index().contains(Kind::Label, label)
        {
            scope.fail("spec.label", format!("label \"{label}\" is not declared in the template"));
        }

        match (spec.resource_kind, spec.resource_name.as_deref()) {
            (None, _) => scope.fail("spec.resourceKind", "is required"),
            (Some(kind), _) if !kind.is_labelable() => {
                scope.fail("spec.resourceKind", format!("{kind} cannot be labeled"));
            }
            (Some(kind), Some(name)) if !package.index().contains(kind, name) => {
                scope.fail(
                    "spec.resourceName",
                    format!("{kind} \"{name}\" is not declared in the template"),
                );
            }
            _ => {}
        }
    }

    fn validate_endpoint(spec: &EndpointSpec, scope: &mut Scope<'_>) {
        match spec.endpoint_type {
            None => scope.fail("spec.endpointType", "is required (http, slack or pagerduty)"),
            Some(EndpointType::Http | EndpointType::Slack) => {
                scope.require("spec.url", spec.url.as_deref());
            }
            Some(EndpointType::Pagerduty) => {
                if spec.routing_key.is_none() {
                    scope.fail("spec.routingKey", "is required");
                }
            }
        }

        if let Some(url) = spec.url.as_deref().filter(|u| !u.trim().is_empty()) {
            match Url::parse(url) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
                Ok(parsed) => scope.fail("spec.url", format!("unsupported scheme \"{}\"", parsed.scheme())),
                Err(e) => scope.fail("spec.url", format!("invalid url: {e}")),
            }
        }
    }

    fn validate_rule(package: &Package, spec: &RuleSpec, scope: &mut Scope<'_>) {
        scope.require("spec.endpointName", spec.endpoint_name.as_deref());
        scope.require("spec.every", spec.every.as_deref());
        scope.duration("spec.every", spec.every.as_deref());
        scope.duration("spec.offset", spec.offset.as_deref());

        if let Some(endpoint) = spec.endpoint_name.as_deref()
            && !endpoint.trim().is_empty()
            && !package.index().contains(Kind::NotificationEndpoint, endpoint)
        {
            scope.fail(
                "spec.endpointName",
                format!("notification endpoint \"{endpoint}\" is not declared in the template"),
            );
        }
    }

    fn validate_task(spec: &TaskSpec, scope: &mut Scope<'_>) {
        scope.require("spec.query", spec.query.as_deref());
        match (spec.every.as_deref(), spec.cron.as_deref()) {
            (Some(_), Some(_)) => scope.fail("spec", "set exactly one of every or cron, not both"),
            (None, None) => scope.fail("spec", "one of every or cron is required"),
            (every, _) => scope.duration("spec.every", every),
        }
        scope.duration("spec.offset", spec.offset.as_deref());
    }

    fn validate_telegraf(spec: &TelegrafSpec, scope: &mut Scope<'_>) {
        scope.require("spec.config", spec.config.as_deref());
    }

    fn validate_variable(spec: &VariableSpec, scope: &mut Scope<'_>) {
        match (spec.variable_type, &spec.values) {
            (None, _) => scope.fail("spec.type", "is required (constant, map or query)"),
            (Some(VariableType::Constant), Some(VariableValues::List(values))) if !values.is_empty() => {}
            (Some(VariableType::Constant), _) => {
                scope.fail("spec.values", "constant variables need a non-empty list of values");
            }
            (Some(VariableType::Map), Some(VariableValues::Map(values))) if !values.is_empty() => {}
            (Some(VariableType::Map), _) => {
                scope.fail("spec.values", "map variables need a non-empty map of values");
            }
            (Some(VariableType::Query), _) => {
                scope.require("spec.query", spec.query.as_deref());
            }
        }
    }
}

/// Checks the metaName convention: lowercase alphanumerics, `-` and `.`,
/// starting and ending alphanumeric.
fn is_valid_meta_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_META_NAME_LEN {
        return false;
    }

    let alnum = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    let mut chars = name.chars();
    let (Some(first), Some(last)) = (chars.next(), name.chars().last()) else {
        return false;
    };
    if !alnum(first) || !alnum(last) {
        return false;
    }

    name.chars().all(|c| alnum(c) || c == '-' || c == '.')
}

fn is_hex_color(color: &str) -> bool {
    color.len() == 7
        && color.starts_with('#')
        && color[1..].bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::spec::{BucketSpec, RetentionRule};

    fn object(name: &str, spec: ResourceSpec) -> Object {
        Object::new(name, spec)
    }

    fn validation_errors(package: &Package) -> Vec<ValidationError> {
        match TemplateValidator::new().validate(package) {
            Err(TemplateError::Validation { errors }) => errors,
            other => panic!("expected validation errors, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_meta_name() {
        assert!(is_valid_meta_name("rucket-11"));
        assert!(is_valid_meta_name("bkt1"));
        assert!(is_valid_meta_name("a.b-c"));
        assert!(!is_valid_meta_name(""));
        assert!(!is_valid_meta_name("Bucket"));
        assert!(!is_valid_meta_name("-bkt"));
        assert!(!is_valid_meta_name("bkt_1"));
        assert!(!is_valid_meta_name(&"a".repeat(254)));
    }

    #[test]
    fn test_hex_color() {
        assert!(is_hex_color("#FF00aa"));
        assert!(!is_hex_color("FF00AA"));
        assert!(!is_hex_color("#FF00A"));
    }

    #[test]
    fn test_empty_package_warns() {
        let report = TemplateValidator::new().validate(&Package::empty()).unwrap();
        assert_eq!(report.warning_count(), 1);
    }

    #[test]
    fn test_collects_every_error() {
        let package = Package::new(
            vec![
                object(
                    "bkt",
                    ResourceSpec::Bucket(BucketSpec {
                        retention_rules: vec![RetentionRule {
                            rule_type: String::from("expire"),
                            every_seconds: -1,
                        }],
                        ..BucketSpec::default()
                    }),
                ),
                object("task", ResourceSpec::Task(TaskSpec::default())),
                object(
                    "lbl",
                    ResourceSpec::Label(LabelSpec {
                        color: Some(String::from("red")),
                        ..LabelSpec::default()
                    }),
                ),
            ],
            Vec::new(),
        );

        let errors = validation_errors(&package);
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["spec.retentionRules[0]", "spec.query", "spec", "spec.color"]
        );
        assert_eq!(errors[1].kind, Kind::Task);
    }

    #[test]
    fn test_duplicate_within_package() {
        let package = Package::new(
            vec![
                object("bkt", ResourceSpec::Bucket(BucketSpec::default())),
                object("bkt", ResourceSpec::Bucket(BucketSpec::default())),
            ],
            Vec::new(),
        );
        let errors = validation_errors(&package);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "duplicate metaName for this kind");
    }

    #[test]
    fn test_duplicate_display_name_per_kind() {
        let shared = || {
            ResourceSpec::Bucket(BucketSpec {
                name: Some(String::from("shared")),
                ..BucketSpec::default()
            })
        };
        let package = Package::new(
            vec![
                object("a", shared()),
                object("b", shared()),
                object(
                    "shared",
                    ResourceSpec::Label(LabelSpec::default()),
                ),
            ],
            Vec::new(),
        );

        let errors = validation_errors(&package);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].meta_name, "b");
        assert_eq!(errors[0].field, "spec.name");
        assert_eq!(errors[0].message, "name \"shared\" is already used by Bucket \"a\"");
    }

    #[test]
    fn test_unresolved_references() {
        let package = Package::new(
            vec![
                object(
                    "bkt",
                    ResourceSpec::Bucket(BucketSpec {
                        associations: vec![Association {
                            kind: Kind::Label,
                            name: String::from("missing"),
                            id: None,
                        }],
                        ..BucketSpec::default()
                    }),
                ),
                object(
                    "rule",
                    ResourceSpec::NotificationRule(RuleSpec {
                        endpoint_name: Some(String::from("nowhere")),
                        every: Some(String::from("1m")),
                        ..RuleSpec::default()
                    }),
                ),
            ],
            Vec::new(),
        );
        let errors = validation_errors(&package);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].message.contains("missing"));
        assert!(errors[1].message.contains("nowhere"));
    }

    #[test]
    fn test_preexisting_label_by_id_is_exempt() {
        let package = Package::new(
            vec![object(
                "bkt",
                ResourceSpec::Bucket(BucketSpec {
                    associations: vec![Association {
                        kind: Kind::Label,
                        name: String::from("existing"),
                        id: Some(crate::id::PlatformId::new(7).unwrap()),
                    }],
                    ..BucketSpec::default()
                }),
            )],
            Vec::new(),
        );
        assert!(TemplateValidator::new().validate(&package).is_ok());
    }
}
