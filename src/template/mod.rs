//! Template module.
//!
//! This module handles everything between raw template bytes and a validated
//! package:
//! - Decoding JSON, YAML and Jinja sources into objects
//! - Fetching remote templates under an address policy
//! - Combining sources into one package and validating it
//! - Building the per-kind summary and spec hashes

mod decode;
mod hash;
mod kind;
mod object;
mod package;
mod remote;
mod spec;
mod summary;
mod validator;

#[cfg(feature = "templating")]
pub use decode::JinjaDecoder;
pub use decode::{Decoder, DecoderRegistry, JsonDecoder, YamlDecoder};
pub use hash::SpecHasher;
pub use kind::{API_VERSION, Encoding, Kind, ResolvedKind};
pub use object::{Metadata, Object};
pub use package::{Package, PackageIndex};
pub use remote::{
    AddressValidator, BLOCKED_HOST, DEFAULT_FETCH_TIMEOUT_SECS, PassValidator, PrivateIpValidator,
    RemoteFetcher, RemoteTemplate,
};
pub use spec::{
    Association, BucketSpec, CheckSpec, CheckType, DashboardSpec, EndpointSpec, EndpointType,
    LabelMappingSpec, LabelSpec, ResourceSpec, RetentionRule, RuleSpec, SecretField, SecretRef,
    Status, StatusRule, TagRule, TaskSpec, TelegrafSpec, Threshold, VariableSpec, VariableType,
    VariableValues, parse_duration,
};
pub use summary::{
    StateStatus, Summary, SummaryAssociation, SummaryLabelMapping, SummaryResource,
};
pub use validator::{TemplateValidator, ValidationError, ValidationReport};
