//! Template decoders.
//!
//! A [`Decoder`] turns raw bytes in one [`Encoding`] into template objects.
//! The [`DecoderRegistry`] selects a decoder per encoding and enforces whether
//! programmable templating is enabled.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{SourceError, SourceOrigin};

use super::kind::Encoding;
use super::object::Object;

/// Decodes raw template bytes into objects.
pub trait Decoder: Send + Sync {
    /// The encoding this decoder reads.
    fn encoding(&self) -> Encoding;

    /// Decodes `bytes`.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Decode` with every problem found.
    fn decode(&self, bytes: &[u8], origin: &SourceOrigin) -> Result<Vec<Object>, SourceError>;
}

/// Converts top-level values (objects or arrays of objects) into template objects.
fn objects_from_values(
    values: Vec<Value>,
    origin: &SourceOrigin,
) -> Result<Vec<Object>, SourceError> {
    let mut objects = Vec::new();
    let mut errors = Vec::new();
    let mut position = 0;

    for value in values {
        let items = match value {
            Value::Array(items) => items,
            other => vec![other],
        };
        for item in items {
            match Object::from_value(item, position) {
                Ok(obj) => objects.push(obj),
                Err(mut errs) => errors.append(&mut errs),
            }
            position += 1;
        }
    }

    if errors.is_empty() {
        Ok(objects)
    } else {
        Err(SourceError::Decode {
            origin: origin.clone(),
            errors,
        })
    }
}

/// JSON decoder: a single object or an array of objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl Decoder for JsonDecoder {
    fn encoding(&self) -> Encoding {
        Encoding::Json
    }

    fn decode(&self, bytes: &[u8], origin: &SourceOrigin) -> Result<Vec<Object>, SourceError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| SourceError::decode(origin.clone(), format!("invalid json: {e}")))?;
        objects_from_values(vec![value], origin)
    }
}

/// YAML decoder: one or more `---` separated documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlDecoder;

impl YamlDecoder {
    fn documents(bytes: &[u8], origin: &SourceOrigin) -> Result<Vec<Value>, SourceError> {
        let mut documents = Vec::new();
        for document in serde_yaml::Deserializer::from_slice(bytes) {
            let value = Value::deserialize(document)
                .map_err(|e| SourceError::decode(origin.clone(), format!("invalid yaml: {e}")))?;
            if !value.is_null() {
                documents.push(value);
            }
        }
        Ok(documents)
    }
}

impl Decoder for YamlDecoder {
    fn encoding(&self) -> Encoding {
        Encoding::Yaml
    }

    fn decode(&self, bytes: &[u8], origin: &SourceOrigin) -> Result<Vec<Object>, SourceError> {
        let documents = Self::documents(bytes, origin)?;
        objects_from_values(documents, origin)
    }
}

/// Programmable decoder: renders a Jinja template, then reads the output as YAML.
#[cfg(feature = "templating")]
#[derive(Debug, Clone, Default)]
pub struct JinjaDecoder {
    parameters: BTreeMap<String, Value>,
}

#[cfg(feature = "templating")]
impl JinjaDecoder {
    /// Creates a decoder that exposes `parameters` to templates.
    #[must_use]
    pub const fn new(parameters: BTreeMap<String, Value>) -> Self {
        Self { parameters }
    }

    /// Renders `bytes` as a Jinja template.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Decode` if the input is not UTF-8 or rendering
    /// fails.
    pub fn render(&self, bytes: &[u8], origin: &SourceOrigin) -> Result<String, SourceError> {
        let source = std::str::from_utf8(bytes)
            .map_err(|e| SourceError::decode(origin.clone(), format!("template is not utf-8: {e}")))?;
        let rendered = self
            .render_str(source)
            .map_err(|e| SourceError::decode(origin.clone(), format!("failed to render jinja: {e}")))?;
        debug!(bytes = rendered.len(), "rendered jinja template");
        Ok(rendered)
    }

    fn render_str(&self, source: &str) -> Result<String, minijinja::Error> {
        let mut env = minijinja::Environment::new();
        env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);
        env.add_function("env", |_name: String| -> Result<String, minijinja::Error> {
            Err(minijinja::Error::new(
                minijinja::ErrorKind::InvalidOperation,
                "environment access is disabled in templates",
            ))
        });
        env.add_template("template", source)?;
        let tmpl = env.get_template("template")?;
        tmpl.render(minijinja::context! { parameters => &self.parameters })
    }
}

#[cfg(feature = "templating")]
impl Decoder for JinjaDecoder {
    fn encoding(&self) -> Encoding {
        Encoding::Jinja
    }

    fn decode(&self, bytes: &[u8], origin: &SourceOrigin) -> Result<Vec<Object>, SourceError> {
        let rendered = self.render(bytes, origin)?;
        YamlDecoder.decode(rendered.as_bytes(), origin)
    }
}

/// Selects decoders by encoding.
#[derive(Clone)]
pub struct DecoderRegistry {
    decoders: Vec<Arc<dyn Decoder>>,
    templating: bool,
}

impl DecoderRegistry {
    /// Creates a registry with the built-in decoders.
    ///
    /// Templating is enabled when the `templating` feature is compiled in.
    #[must_use]
    pub fn new() -> Self {
        let mut decoders: Vec<Arc<dyn Decoder>> = vec![Arc::new(JsonDecoder), Arc::new(YamlDecoder)];
        #[cfg(feature = "templating")]
        decoders.push(Arc::new(JinjaDecoder::default()));

        Self {
            decoders,
            templating: cfg!(feature = "templating"),
        }
    }

    /// Enables or disables programmable templating.
    ///
    /// Enabling has no effect when the feature is not compiled in.
    #[must_use]
    pub const fn with_templating(mut self, enabled: bool) -> Self {
        self.templating = enabled;
        self
    }

    /// Registers a decoder, replacing any existing one for the same encoding.
    #[must_use]
    pub fn with_decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoders.retain(|d| d.encoding() != decoder.encoding());
        self.decoders.push(decoder);
        self
    }

    /// Returns whether programmable templating is usable.
    #[must_use]
    pub fn templating_enabled(&self) -> bool {
        self.templating && self.decoders.iter().any(|d| d.encoding() == Encoding::Jinja)
    }

    /// Returns the decoder for `encoding`, if one is usable.
    #[must_use]
    pub fn decoder(&self, encoding: Encoding) -> Option<&dyn Decoder> {
        if encoding == Encoding::Jinja && !self.templating {
            return None;
        }
        self.decoders
            .iter()
            .find(|d| d.encoding() == encoding)
            .map(AsRef::as_ref)
    }

    /// Fails fast if `encoding` has no usable decoder.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::InvalidEncoding` naming `origin`.
    pub fn ensure_supported(
        &self,
        encoding: Encoding,
        origin: &SourceOrigin,
    ) -> Result<(), SourceError> {
        if self.decoder(encoding).is_some() {
            Ok(())
        } else {
            Err(SourceError::InvalidEncoding {
                origin: origin.clone(),
                encoding: encoding.to_string(),
            })
        }
    }

    /// Decodes `bytes` with the decoder for `encoding`.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::InvalidEncoding` if no decoder is usable, or the
    /// decoder's own error.
    pub fn decode(
        &self,
        bytes: &[u8],
        encoding: Encoding,
        origin: &SourceOrigin,
    ) -> Result<Vec<Object>, SourceError> {
        let decoder = self.decoder(encoding).ok_or_else(|| SourceError::InvalidEncoding {
            origin: origin.clone(),
            encoding: encoding.to_string(),
        })?;
        decoder.decode(bytes, origin)
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let encodings: Vec<Encoding> = self.decoders.iter().map(|d| d.encoding()).collect();
        f.debug_struct("DecoderRegistry")
            .field("encodings", &encodings)
            .field("templating", &self.templating)
            .finish()
    }
}
