//! Error types for the stackplate engine.
//!
//! This module provides the error hierarchy for every stage of a template
//! request: request shape, template sources, combination and validation,
//! backend access, stack persistence and settings.

use std::fmt;
use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

use crate::id::{IdError, PlatformId};
use crate::template::{Kind, ValidationError};

/// Stable error codes carried by API error payloads.
pub mod codes {
    /// Malformed request shape or identifier.
    pub const INVALID: &str = "invalid";
    /// Template could not be decoded, combined or validated.
    pub const UNPROCESSABLE: &str = "unprocessable entity";
    /// Referenced stack or resource does not exist.
    pub const NOT_FOUND: &str = "not found";
    /// Concurrent modification of the same stack.
    pub const CONFLICT: &str = "conflict";
    /// Anything the caller cannot fix.
    pub const INTERNAL: &str = "internal error";
    /// The request was canceled before it completed.
    pub const CANCELED: &str = "request canceled";
}

/// The main error type for the stackplate engine.
#[derive(Debug, Error)]
pub enum StackplateError {
    /// Request-shape errors; no package was built.
    #[error(transparent)]
    Request(#[from] RequestError),

    /// A template source could not be fetched or decoded.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Combination or validation of templates failed.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Backend resource store errors.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Stack store errors.
    #[error("Stack state error: {0}")]
    State(#[from] StateError),

    /// Settings errors.
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    /// The request was canceled or timed out.
    #[error("request canceled")]
    Cancelled,

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors in the shape of an incoming request.
#[derive(Debug, Error)]
pub enum RequestError {
    /// An identifier did not parse.
    #[error("invalid {field} \"{value}\": {source}")]
    InvalidId {
        /// Request field holding the identifier.
        field: &'static str,
        /// The raw value supplied.
        value: String,
        /// Why it did not parse.
        source: IdError,
    },

    /// The request body could not be decoded.
    #[error("malformed request body: {message}")]
    MalformedBody {
        /// Decoder message.
        message: String,
    },

    /// Neither org-wide export nor explicit resources were requested.
    #[error("export requires at least one orgID or resource reference")]
    EmptyExport,

    /// An apply request carried no template source.
    #[error("at least one template source is required")]
    NoTemplates,
}

/// Where a template came from, used to tag source errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOrigin {
    /// Inline body with no declared provenance.
    Raw,
    /// Remote URL or declared provenance strings of an inline template.
    Urls(Vec<String>),
    /// Local file.
    File(PathBuf),
}

impl fmt::Display for SourceOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw => write!(f, "source(s)"),
            Self::Urls(urls) => {
                let quoted: Vec<String> = urls.iter().map(|u| format!("\"{u}\"")).collect();
                write!(f, "url[{}]", quoted.join(" "))
            }
            Self::File(path) => write!(f, "file[\"{}\"]", path.display()),
        }
    }
}

/// Template source errors: fetch, encoding and decoding.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The encoding is unknown or its decoder is disabled.
    #[error("template from {origin} had an issue: invalid encoding provided: {encoding}")]
    InvalidEncoding {
        /// Source that was rejected.
        origin: SourceOrigin,
        /// Encoding name.
        encoding: String,
    },

    /// The bytes did not decode into valid objects.
    #[error("template from {origin} had an issue: {}", errors.join("; "))]
    Decode {
        /// Source that was rejected.
        origin: SourceOrigin,
        /// One message per malformed object or syntax error.
        errors: Vec<String>,
    },

    /// The remote template could not be retrieved.
    #[error("template from url[\"{url}\"] had an issue: {message}")]
    Remote {
        /// Offending URL.
        url: String,
        /// Fetch failure description.
        message: String,
    },

    /// A package could not be encoded.
    #[error("failed to encode template as {encoding}: {message}")]
    Encode {
        /// Target encoding.
        encoding: String,
        /// Encoder message.
        message: String,
    },
}

/// Combination and validation errors.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Two combined templates declared the same identity.
    #[error(
        "duplicate {kind} with metadata.name \"{meta_name}\" found across templates from [{}]",
        sources.join(", ")
    )]
    DuplicateIdentity {
        /// Kind of the colliding objects.
        kind: Kind,
        /// The shared metaName.
        meta_name: String,
        /// Provenance of both packages involved.
        sources: Vec<String>,
    },

    /// One or more validation rules failed.
    #[error("template failed validation with {} error(s): {}", errors.len(), join_validation(errors))]
    Validation {
        /// Every violation found.
        errors: Vec<ValidationError>,
    },

    /// The configured kind order is unusable.
    #[error("invalid kind order: {message}")]
    InvalidKindOrder {
        /// Description of the problem.
        message: String,
    },
}

/// Backend resource store errors.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The store cannot be reached.
    #[error("backend unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },

    /// A resource ID does not exist.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Resource kind.
        kind: Kind,
        /// Backend ID.
        id: PlatformId,
    },

    /// An operation on a specific object failed.
    #[error("{kind} \"{meta_name}\": {message}")]
    Resource {
        /// Resource kind.
        kind: Kind,
        /// Object metaName.
        meta_name: String,
        /// Underlying failure.
        message: String,
    },
}

/// Stack persistence errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// Stack does not exist.
    #[error("stack {stack_id} not found")]
    NotFound {
        /// Requested stack ID.
        stack_id: PlatformId,
    },

    /// Stack belongs to a different org.
    #[error("stack {stack_id} does not belong to org {org_id}")]
    OrgMismatch {
        /// Requested stack ID.
        stack_id: PlatformId,
        /// Org of the request.
        org_id: PlatformId,
    },

    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// State lock acquisition failed.
    #[error("Failed to acquire state lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// State lock is held by another process.
    #[error("State is locked by another process (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },
}

/// Settings errors.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file was not found.
    #[error("Settings file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The settings file could not be parsed.
    #[error("Failed to parse settings: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// An environment override holds an unusable value.
    #[error("Invalid value for {name}: {value}")]
    InvalidValue {
        /// Variable name.
        name: String,
        /// Offending value.
        value: String,
    },
}

/// Result type alias for stackplate operations.
pub type Result<T> = std::result::Result<T, StackplateError>;

fn join_validation(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl StackplateError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns the stable error code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Request(RequestError::EmptyExport) | Self::Source(_) | Self::Template(_) => {
                codes::UNPROCESSABLE
            }
            Self::Request(_) => codes::INVALID,
            Self::Backend(BackendError::NotFound { .. })
            | Self::State(StateError::NotFound { .. } | StateError::OrgMismatch { .. }) => {
                codes::NOT_FOUND
            }
            Self::State(StateError::LockedByOther { .. }) => codes::CONFLICT,
            Self::Cancelled => codes::CANCELED,
            _ => codes::INTERNAL,
        }
    }

    /// Returns the HTTP status a transport should answer with.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self.code() {
            codes::INVALID => StatusCode::BAD_REQUEST,
            codes::UNPROCESSABLE => StatusCode::UNPROCESSABLE_ENTITY,
            codes::NOT_FOUND => StatusCode::NOT_FOUND,
            codes::CONFLICT => StatusCode::CONFLICT,
            codes::CANCELED => StatusCode::REQUEST_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the individual messages behind this error.
    ///
    /// Aggregates expand to one entry per violation; everything else is a
    /// single entry.
    #[must_use]
    pub fn details(&self) -> Vec<String> {
        match self {
            Self::Template(TemplateError::Validation { errors }) => {
                errors.iter().map(ToString::to_string).collect()
            }
            Self::Source(SourceError::Decode { errors, .. }) => errors.clone(),
            other => vec![other.to_string()],
        }
    }

    /// Returns true for failures that happen before or while building the
    /// package, where a partial summary is still meaningful.
    #[must_use]
    pub const fn is_template_stage(&self) -> bool {
        matches!(self, Self::Source(_) | Self::Template(_))
    }
}

impl SourceError {
    /// Creates a remote fetch error for the given URL.
    #[must_use]
    pub fn remote(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a decode error carrying a single message.
    #[must_use]
    pub fn decode(origin: SourceOrigin, message: impl Into<String>) -> Self {
        Self::Decode {
            origin,
            errors: vec![message.into()],
        }
    }
}

impl BackendError {
    /// Creates an availability error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Wraps a failure with the object it concerns.
    #[must_use]
    pub fn resource(kind: Kind, meta_name: &str, message: impl fmt::Display) -> Self {
        Self::Resource {
            kind,
            meta_name: meta_name.to_string(),
            message: message.to_string(),
        }
    }
}

impl StateError {
    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}
