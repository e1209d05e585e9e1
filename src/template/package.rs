//! Packages: the canonical, combined form of one or more templates.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{SourceError, SourceOrigin, TemplateError};

use super::decode::DecoderRegistry;
use super::kind::{API_VERSION, Encoding, Kind};
use super::object::Object;
use super::summary::Summary;

/// Index from (kind, metaName) to an object's position in its package.
///
/// The first occurrence wins; later duplicates are reported by the validator.
#[derive(Debug, Clone, Default)]
pub struct PackageIndex {
    positions: HashMap<(Kind, String), usize>,
}

impl PackageIndex {
    fn build(objects: &[Object]) -> Self {
        let mut positions = HashMap::with_capacity(objects.len());
        for (i, obj) in objects.iter().enumerate() {
            positions
                .entry((obj.kind, obj.metadata.name.clone()))
                .or_insert(i);
        }
        Self { positions }
    }

    /// Returns the position of the object with the given identity.
    #[must_use]
    pub fn position(&self, kind: Kind, meta_name: &str) -> Option<usize> {
        self.positions.get(&(kind, meta_name.to_string())).copied()
    }

    /// Returns true if an object with the given identity exists.
    #[must_use]
    pub fn contains(&self, kind: Kind, meta_name: &str) -> bool {
        self.position(kind, meta_name).is_some()
    }
}

/// An ordered set of template objects with their provenance.
#[derive(Debug, Clone)]
pub struct Package {
    api_version: String,
    objects: Vec<Object>,
    sources: Vec<String>,
    index: PackageIndex,
}

impl Package {
    /// Creates a package from decoded objects.
    #[must_use]
    pub fn new(objects: Vec<Object>, sources: Vec<String>) -> Self {
        let index = PackageIndex::build(&objects);
        Self {
            api_version: API_VERSION.to_string(),
            objects,
            sources,
            index,
        }
    }

    /// Creates an empty package.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    /// Decodes a package from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns a `SourceError` if the encoding is unusable or decoding fails.
    pub fn parse(
        registry: &DecoderRegistry,
        bytes: &[u8],
        encoding: Encoding,
        origin: &SourceOrigin,
        sources: Vec<String>,
    ) -> Result<Self, SourceError> {
        let objects = registry.decode(bytes, encoding, origin)?;
        debug!(objects = objects.len(), %encoding, "decoded template");
        Ok(Self::new(objects, sources))
    }

    /// Returns the package API version.
    #[must_use]
    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// Returns the objects in insertion order.
    #[must_use]
    pub fn objects(&self) -> &[Object] {
        &self.objects
    }

    /// Returns the provenance strings.
    #[must_use]
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Returns the identity index.
    #[must_use]
    pub const fn index(&self) -> &PackageIndex {
        &self.index
    }

    /// Returns the number of objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns true if the package declares nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Looks up an object by identity.
    #[must_use]
    pub fn get(&self, kind: Kind, meta_name: &str) -> Option<&Object> {
        self.index
            .position(kind, meta_name)
            .and_then(|i| self.objects.get(i))
    }

    /// Iterates over the objects of one kind in package order.
    pub fn objects_of(&self, kind: Kind) -> impl Iterator<Item = &Object> {
        self.objects.iter().filter(move |o| o.kind == kind)
    }

    /// Combines packages in input order.
    ///
    /// # Errors
    ///
    /// Returns `TemplateError::DuplicateIdentity` for the first identity
    /// declared by two different inputs. No partial package is returned.
    pub fn combine(packages: Vec<Self>) -> Result<Self, TemplateError> {
        let mut owners: HashMap<(Kind, String), usize> = HashMap::new();
        let mut objects = Vec::new();
        let mut sources: Vec<String> = Vec::new();

        for (i, pkg) in packages.iter().enumerate() {
            for obj in &pkg.objects {
                let key = (obj.kind, obj.metadata.name.clone());
                match owners.get(&key) {
                    Some(&owner) if owner != i => {
                        let mut involved = packages[owner].sources.clone();
                        involved.extend(pkg.sources.iter().cloned());
                        return Err(TemplateError::DuplicateIdentity {
                            kind: obj.kind,
                            meta_name: obj.metadata.name.clone(),
                            sources: involved,
                        });
                    }
                    Some(_) => {}
                    None => {
                        owners.insert(key, i);
                    }
                }
            }
        }

        for pkg in packages {
            objects.extend(pkg.objects);
            for source in pkg.sources {
                if !sources.contains(&source) {
                    sources.push(source);
                }
            }
        }

        Ok(Self::new(objects, sources))
    }

    /// Encodes the package canonically.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Encode` for non-data encodings or serializer failures.
    pub fn encode(&self, encoding: Encoding) -> Result<Vec<u8>, SourceError> {
        let encode_err = |message: String| SourceError::Encode {
            encoding: encoding.to_string(),
            message,
        };

        let values: Vec<serde_json::Value> = self.objects.iter().map(Object::to_value).collect();
        match encoding {
            Encoding::Json => {
                serde_json::to_vec_pretty(&values).map_err(|e| encode_err(e.to_string()))
            }
            Encoding::Yaml => {
                let mut out = String::new();
                for value in &values {
                    out.push_str("---\n");
                    out.push_str(&serde_yaml::to_string(value).map_err(|e| encode_err(e.to_string()))?);
                }
                Ok(out.into_bytes())
            }
            Encoding::Jinja => Err(encode_err(String::from("templates cannot be generated"))),
        }
    }

    /// Builds the flat per-kind summary.
    #[must_use]
    pub fn summary(&self) -> Summary {
        Summary::from_package(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::decode::{Decoder, JsonDecoder, YamlDecoder};
    use crate::template::spec::{BucketSpec, LabelSpec, ResourceSpec};

    fn bucket(name: &str) -> Object {
        Object::new(name, ResourceSpec::Bucket(BucketSpec::default()))
    }

    fn pkg(names: &[&str], source: &str) -> Package {
        Package::new(
            names.iter().map(|n| bucket(n)).collect(),
            vec![source.to_string()],
        )
    }

    #[test]
    fn test_combine_keeps_order() {
        let combined = Package::combine(vec![
            pkg(&["bkt-1", "bkt-2"], "a.json"),
            pkg(&["bkt-3"], "b.json"),
            pkg(&["rucket-11"], "a.json"),
        ])
        .unwrap();

        let names: Vec<&str> = combined.objects().iter().map(Object::meta_name).collect();
        assert_eq!(names, vec!["bkt-1", "bkt-2", "bkt-3", "rucket-11"]);
        assert_eq!(combined.sources(), &["a.json", "b.json"]);
        assert!(combined.get(Kind::Bucket, "bkt-3").is_some());
    }

    #[test]
    fn test_combine_rejects_shared_identity() {
        let err = Package::combine(vec![pkg(&["bkt-1"], "a.json"), pkg(&["bkt-1"], "b.json")])
            .unwrap_err();
        match err {
            TemplateError::DuplicateIdentity {
                kind,
                meta_name,
                sources,
            } => {
                assert_eq!(kind, Kind::Bucket);
                assert_eq!(meta_name, "bkt-1");
                assert_eq!(sources, vec!["a.json", "b.json"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_same_name_different_kind_is_fine() {
        let labels = Package::new(
            vec![Object::new("bkt-1", ResourceSpec::Label(LabelSpec::default()))],
            Vec::new(),
        );
        let combined = Package::combine(vec![pkg(&["bkt-1"], "a"), labels]).unwrap();
        assert_eq!(combined.len(), 2);
    }

    #[test]
    fn test_round_trip() {
        let original = pkg(&["bkt-1", "bkt-2"], "a.json");

        let json = original.encode(Encoding::Json).unwrap();
        let decoded = JsonDecoder.decode(&json, &SourceOrigin::Raw).unwrap();
        assert_eq!(decoded, original.objects());

        let yaml = original.encode(Encoding::Yaml).unwrap();
        let decoded = YamlDecoder.decode(&yaml, &SourceOrigin::Raw).unwrap();
        assert_eq!(decoded, original.objects());
    }

    #[test]
    fn test_encode_jinja_is_rejected() {
        assert!(Package::empty().encode(Encoding::Jinja).is_err());
    }
}
