//! Template objects.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value, json};

use super::kind::{API_VERSION, Kind};
use super::spec::ResourceSpec;

/// Object metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// The metaName: unique per kind, stable across applies.
    pub name: String,
}

/// One declared resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    /// Always [`API_VERSION`] once decoded.
    pub api_version: String,
    /// Canonical kind.
    pub kind: Kind,
    /// Identity metadata.
    pub metadata: Metadata,
    /// Kind-specific fields.
    pub spec: ResourceSpec,
}

impl Object {
    /// Creates an object at the current API version.
    #[must_use]
    pub fn new(meta_name: impl Into<String>, spec: ResourceSpec) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: spec.kind(),
            metadata: Metadata {
                name: meta_name.into(),
            },
            spec,
        }
    }

    /// Returns the metaName.
    #[must_use]
    pub fn meta_name(&self) -> &str {
        &self.metadata.name
    }

    /// Returns the display name, defaulting to the metaName.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.spec.name().unwrap_or(&self.metadata.name)
    }

    /// Builds an object from a decoded value.
    ///
    /// `position` is the object's index within its source, used in messages.
    ///
    /// # Errors
    ///
    /// Returns every problem found with the object's envelope and spec.
    pub fn from_value(value: Value, position: usize) -> Result<Self, Vec<String>> {
        let at = format!("objects[{position}]");
        let Value::Object(mut fields) = value else {
            return Err(vec![format!("{at}: expected a mapping")]);
        };

        let mut errors = Vec::new();

        let api_version = match fields.get("apiVersion").and_then(Value::as_str) {
            Some(v) if v == API_VERSION => Some(v.to_string()),
            Some(v) => {
                errors.push(format!("{at}: unsupported apiVersion \"{v}\""));
                None
            }
            None => {
                errors.push(format!("{at}: missing apiVersion"));
                None
            }
        };

        let resolved = match fields.get("kind").and_then(Value::as_str) {
            Some(k) => {
                let resolved = Kind::resolve(k);
                if resolved.is_none() {
                    errors.push(format!("{at}: unknown kind \"{k}\""));
                }
                resolved
            }
            None => {
                errors.push(format!("{at}: missing kind"));
                None
            }
        };

        let meta_name = fields
            .get("metadata")
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(ToString::to_string);
        if meta_name.is_none() {
            errors.push(format!("{at}: missing metadata.name"));
        }

        let (Some(api_version), Some(resolved), Some(meta_name)) =
            (api_version, resolved, meta_name)
        else {
            return Err(errors);
        };

        let mut spec = fields.remove("spec").unwrap_or(Value::Null);
        if let Some(subtype) = resolved.subtype {
            let field = match resolved.kind {
                Kind::Check => "checkType",
                _ => "endpointType",
            };
            if spec.is_null() {
                spec = Value::Object(Map::new());
            }
            if let Value::Object(map) = &mut spec {
                map.entry(field).or_insert_with(|| json!(subtype));
            }
        }

        let spec = ResourceSpec::from_value(resolved.kind, spec).map_err(|e| {
            vec![format!(
                "{at}: {} \"{meta_name}\": invalid spec: {e}",
                resolved.kind
            )]
        })?;

        Ok(Self {
            api_version,
            kind: resolved.kind,
            metadata: Metadata { name: meta_name },
            spec,
        })
    }

    /// Encodes the object as a JSON value in canonical form.
    #[must_use]
    pub fn to_value(&self) -> Value {
        json!({
            "apiVersion": self.api_version,
            "kind": self.kind,
            "metadata": self.metadata,
            "spec": self.spec.to_value(),
        })
    }
}

impl Serialize for Object {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Object {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value, 0).map_err(|errors| serde::de::Error::custom(errors.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::spec::{CheckType, EndpointType};

    #[test]
    fn test_from_value_collects_envelope_errors() {
        let errors = Object::from_value(json!({"spec": {}}), 3).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|e| e.starts_with("objects[3]")));
    }

    #[test]
    fn test_unsupported_api_version() {
        let errors = Object::from_value(
            json!({"apiVersion": "v0", "kind": "Bucket", "metadata": {"name": "b"}}),
            0,
        )
        .unwrap_err();
        assert_eq!(errors, vec!["objects[0]: unsupported apiVersion \"v0\""]);
    }

    #[test]
    fn test_alias_sets_subtype() {
        let obj = Object::from_value(
            json!({
                "apiVersion": API_VERSION,
                "kind": "checkThreshold",
                "metadata": {"name": "cpu"},
                "spec": {"query": "q", "every": "1m"}
            }),
            0,
        )
        .unwrap();
        assert_eq!(obj.kind, Kind::Check);
        let ResourceSpec::Check(check) = &obj.spec else {
            panic!("expected check");
        };
        assert_eq!(check.check_type, Some(CheckType::Threshold));

        let obj = Object::from_value(
            json!({
                "apiVersion": API_VERSION,
                "kind": "NotificationEndpointPagerDuty",
                "metadata": {"name": "pd"}
            }),
            0,
        )
        .unwrap();
        let ResourceSpec::NotificationEndpoint(endpoint) = &obj.spec else {
            panic!("expected endpoint");
        };
        assert_eq!(endpoint.endpoint_type, Some(EndpointType::Pagerduty));
    }

    #[test]
    fn test_display_name_defaults_to_meta_name() {
        let obj = Object::from_value(
            json!({"apiVersion": API_VERSION, "kind": "Label", "metadata": {"name": "env"}}),
            0,
        )
        .unwrap();
        assert_eq!(obj.display_name(), "env");
        assert_eq!(obj.to_value()["kind"], "Label");
    }
}
