//! Template service orchestrating decode, diff and apply.
//!
//! One [`TemplateService`] is shared across requests. Each call builds its own
//! package and observes the caller's cancellation token.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{Backend, BackendResource};
use crate::config::Settings;
use crate::error::{BackendError, RequestError, Result, SourceOrigin, StackplateError, StateError};
use crate::id::PlatformId;
use crate::planner::{ApplyExecutor, ApplyFailure, ApplyPlan, Diff, DiffEngine, KindOrder};
use crate::state::{Stack, StackEvent, StackOperation, StackStore};
#[cfg(feature = "templating")]
use crate::template::JinjaDecoder;
use crate::template::{
    Association, DecoderRegistry, Encoding, Kind, Object, Package, RemoteFetcher, ResourceSpec,
    Summary, TemplateValidator, ValidationReport,
};

/// Where a template comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    /// Template bytes supplied with the request.
    Inline {
        /// Raw template.
        contents: Vec<u8>,
        /// Declared content type.
        content_type: Option<String>,
        /// Declared provenance.
        sources: Vec<String>,
    },
    /// Template fetched from a URL.
    Remote {
        /// Location.
        url: String,
        /// Declared content type.
        content_type: Option<String>,
    },
    /// Template read from the local filesystem.
    File(PathBuf),
}

impl TemplateSource {
    /// Creates an inline source with no declared provenance.
    #[must_use]
    pub fn inline(contents: impl Into<Vec<u8>>, content_type: Option<&str>) -> Self {
        Self::Inline {
            contents: contents.into(),
            content_type: content_type.map(ToString::to_string),
            sources: Vec::new(),
        }
    }

    /// Creates a remote source.
    #[must_use]
    pub fn remote(url: impl Into<String>) -> Self {
        Self::Remote {
            url: url.into(),
            content_type: None,
        }
    }
}

/// Options for one apply call.
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Compute the impact without mutating anything.
    pub dry_run: bool,
    /// Stack to reconcile against; a new stack is created when absent.
    pub stack_id: Option<PlatformId>,
    /// Secret values keyed by secret key.
    pub secrets: BTreeMap<String, String>,
    /// Concurrent writes per phase; the settings value when absent.
    pub max_concurrency: Option<usize>,
    /// Apply phases; the settings value when absent.
    pub kind_order: Option<KindOrder>,
}

/// Outcome of a dry run or apply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImpactSummary {
    /// Template sources, in submission order.
    pub sources: Vec<String>,
    /// Stack the apply was recorded under.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "stackID")]
    pub stack_id: Option<PlatformId>,
    /// Per-kind diff.
    pub diff: Diff,
    /// Per-kind summary.
    pub summary: Summary,
    /// Per-object apply failures.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ApplyFailure>,
}

/// Filters for an org-wide export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgExport {
    /// Org to export.
    pub org_id: PlatformId,
    /// Only resources carrying one of these label names; all when empty.
    pub by_label: Vec<String>,
    /// Only these kinds; all when empty.
    pub by_resource_kind: Vec<Kind>,
}

/// A single resource to export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    /// Resource kind.
    pub kind: Kind,
    /// Backend ID.
    pub id: PlatformId,
    /// Display name override.
    pub name: Option<String>,
    /// metaName override.
    pub meta_name: Option<String>,
}

/// Service running template requests against a backend and stack store.
pub struct TemplateService {
    backend: Arc<dyn Backend>,
    stacks: Arc<dyn StackStore>,
    registry: DecoderRegistry,
    fetcher: RemoteFetcher,
    settings: Settings,
}

impl TemplateService {
    /// Creates a service from settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid or the HTTP client cannot
    /// be built.
    pub fn new(
        backend: Arc<dyn Backend>,
        stacks: Arc<dyn StackStore>,
        settings: Settings,
    ) -> Result<Self> {
        settings.validate()?;
        let fetcher =
            RemoteFetcher::new(settings.address_policy.validator(), settings.fetch_timeout())?;
        let registry = Self::registry_for(&settings);
        Ok(Self {
            backend,
            stacks,
            registry,
            fetcher,
            settings,
        })
    }

    #[cfg(feature = "templating")]
    fn registry_for(settings: &Settings) -> DecoderRegistry {
        DecoderRegistry::new()
            .with_decoder(Arc::new(JinjaDecoder::new(
                settings.template_parameters.clone(),
            )))
            .with_templating(settings.enable_templating)
    }

    #[cfg(not(feature = "templating"))]
    fn registry_for(settings: &Settings) -> DecoderRegistry {
        DecoderRegistry::new().with_templating(settings.enable_templating)
    }

    /// Replaces the remote fetcher.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: RemoteFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Returns the decoder registry.
    #[must_use]
    pub const fn registry(&self) -> &DecoderRegistry {
        &self.registry
    }

    /// Returns the settings in use.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Decodes and combines `sources`, in order, into one package.
    ///
    /// # Errors
    ///
    /// Returns the first source error, `TemplateError::DuplicateIdentity` if
    /// sources collide, or `StackplateError::Cancelled`.
    pub async fn load_package(
        &self,
        sources: &[TemplateSource],
        cancel: &CancellationToken,
    ) -> Result<Package> {
        if sources.is_empty() {
            return Err(RequestError::NoTemplates.into());
        }

        let packages = stream::iter(sources)
            .map(|source| self.load_source(source, cancel))
            .buffered(self.settings.max_concurrency.max(1))
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()?;
        let package = Package::combine(packages)?;
        info!(
            objects = package.len(),
            sources = package.sources().len(),
            "Loaded template package"
        );
        Ok(package)
    }

    async fn load_source(
        &self,
        source: &TemplateSource,
        cancel: &CancellationToken,
    ) -> Result<Package> {
        match source {
            TemplateSource::Inline {
                contents,
                content_type,
                sources,
            } => {
                let encoding = Encoding::resolve(content_type.as_deref(), sources);
                let origin = if sources.is_empty() {
                    SourceOrigin::Raw
                } else {
                    SourceOrigin::Urls(sources.clone())
                };
                let declared = if sources.is_empty() {
                    vec![String::from("byte stream")]
                } else {
                    sources.clone()
                };
                Ok(Package::parse(&self.registry, contents, encoding, &origin, declared)?)
            }
            TemplateSource::Remote { url, content_type } => {
                let origin = SourceOrigin::Urls(vec![url.clone()]);
                let expected = Encoding::resolve(content_type.as_deref(), std::slice::from_ref(url));
                self.registry.ensure_supported(expected, &origin)?;

                let remote = self.fetcher.fetch(url, content_type.as_deref(), cancel).await?;
                Ok(Package::parse(
                    &self.registry,
                    &remote.bytes,
                    remote.encoding,
                    &origin,
                    vec![remote.url],
                )?)
            }
            TemplateSource::File(path) => {
                let origin = SourceOrigin::File(path.clone());
                let encoding = Encoding::from_suffix(&path.to_string_lossy()).unwrap_or_default();
                self.registry.ensure_supported(encoding, &origin)?;
                let bytes = race(cancel, async {
                    tokio::fs::read(path).await.map_err(StackplateError::from)
                })
                .await?;
                Ok(Package::parse(
                    &self.registry,
                    &bytes,
                    encoding,
                    &origin,
                    vec![path.display().to_string()],
                )?)
            }
        }
    }

    /// Validates a package.
    ///
    /// # Errors
    ///
    /// Returns `TemplateError::Validation` carrying every violation.
    pub fn validate(&self, package: &Package) -> Result<ValidationReport> {
        let report = TemplateValidator::new().validate(package)?;
        for warning in &report.warnings {
            warn!(warning = %warning, "Template warning");
        }
        Ok(report)
    }

    /// Computes the impact of `package` without mutating anything.
    ///
    /// # Errors
    ///
    /// See [`TemplateService::apply`].
    pub async fn dry_run(
        &self,
        org_id: PlatformId,
        package: &Package,
        options: ApplyOptions,
        cancel: &CancellationToken,
    ) -> Result<ImpactSummary> {
        let options = ApplyOptions {
            dry_run: true,
            ..options
        };
        self.apply(org_id, org_id, package, options, cancel).await
    }

    /// Reconciles the org with `package`.
    ///
    /// Validates, diffs against current state, then, unless `dry_run` is
    /// set, writes secrets, executes the plan and upserts the stack.
    ///
    /// # Errors
    ///
    /// Returns validation errors, `StateError::NotFound` for an unknown
    /// stack, backend and stack store failures, or `Cancelled`.
    pub async fn apply(
        &self,
        org_id: PlatformId,
        user_id: PlatformId,
        package: &Package,
        options: ApplyOptions,
        cancel: &CancellationToken,
    ) -> Result<ImpactSummary> {
        self.validate(package)?;

        let existing = match options.stack_id {
            Some(stack_id) => Some(
                race(cancel, self.stacks.load(org_id, stack_id))
                    .await?
                    .ok_or(StateError::NotFound { stack_id })?,
            ),
            None => None,
        };

        let mut summary = package.summary();
        let diff = race(
            cancel,
            DiffEngine::new().diff(
                package,
                &summary,
                org_id,
                existing.as_ref(),
                self.backend.as_reader(),
            ),
        )
        .await?;
        diff.fill_ids(&mut summary);
        summary.missing_secrets = self
            .missing_secrets(org_id, &summary.missing_secrets, &options.secrets, cancel)
            .await?;

        if options.dry_run {
            debug!(org = %org_id, "Dry run complete");
            return Ok(ImpactSummary {
                sources: package.sources().to_vec(),
                stack_id: options.stack_id,
                diff,
                summary,
                failures: Vec::new(),
            });
        }

        for (key, value) in &options.secrets {
            race(cancel, self.backend.put_secret(org_id, key, value)).await?;
        }

        let order = match options.kind_order {
            Some(order) => order,
            None => self.settings.kind_order()?,
        };
        let plan = ApplyPlan::from_diff(&diff, package, &order);
        info!(org = %org_id, plan = %plan.summary(), "Applying template");

        let execution = ApplyExecutor::new(self.backend.as_writer(), org_id, user_id)
            .with_max_concurrency(options.max_concurrency.unwrap_or(self.settings.max_concurrency))
            .with_cancellation(cancel.clone())
            .execute(&plan)
            .await?;

        for result in execution.results.iter().filter(|r| r.success) {
            if let Some(id) = result.id {
                let action = &plan.actions[result.index];
                summary.set_id(action.kind, &action.meta_name, id);
            }
        }

        let (mut stack, operation) = match existing {
            Some(stack) => (stack, StackOperation::Update),
            None => (Stack::new(org_id), StackOperation::Create),
        };
        stack.sources = package.sources().to_vec();
        stack.urls = package
            .sources()
            .iter()
            .filter(|s| s.starts_with("http://") || s.starts_with("https://"))
            .cloned()
            .collect();
        let realized = execution.realized.len();
        stack.set_resources(execution.realized);
        stack.add_event(StackEvent::new(
            operation,
            user_id,
            package.sources().to_vec(),
            realized,
            execution
                .failures
                .iter()
                .map(|f| format!("{}/{}", f.kind, f.meta_name))
                .collect(),
        ));
        self.stacks.save(&stack).await?;
        info!(
            stack = %stack.id,
            resources = realized,
            failures = execution.failures.len(),
            "Stack saved"
        );

        Ok(ImpactSummary {
            sources: package.sources().to_vec(),
            stack_id: Some(stack.id),
            diff,
            summary,
            failures: execution.failures,
        })
    }

    async fn missing_secrets(
        &self,
        org_id: PlatformId,
        referenced: &[String],
        supplied: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let mut missing = Vec::new();
        for key in referenced.iter().filter(|k| !supplied.contains_key(*k)) {
            if !race(cancel, self.backend.has_secret(org_id, key)).await? {
                missing.push(key.clone());
            }
        }
        Ok(missing)
    }

    /// Builds a package from existing backend resources.
    ///
    /// Explicit resources come first, then org-wide selections. Labels linked
    /// to exported resources are exported with them and referenced through
    /// associations.
    ///
    /// # Errors
    ///
    /// Returns `RequestError::EmptyExport` if nothing was requested and
    /// `BackendError::NotFound` for an unknown resource ID.
    pub async fn export(
        &self,
        orgs: &[OrgExport],
        resources: &[ResourceRef],
        cancel: &CancellationToken,
    ) -> Result<Package> {
        if orgs.is_empty() && resources.is_empty() {
            return Err(RequestError::EmptyExport.into());
        }
        race(cancel, self.export_inner(orgs, resources)).await
    }

    async fn export_inner(&self, orgs: &[OrgExport], resources: &[ResourceRef]) -> Result<Package> {
        let reader = self.backend.as_reader();
        let mut exporter = Exporter::default();

        for reference in resources {
            let resource = reader
                .get(reference.kind, reference.id)
                .await?
                .ok_or(BackendError::NotFound {
                    kind: reference.kind,
                    id: reference.id,
                })?;
            self.export_resource(
                &mut exporter,
                resource,
                reference.name.as_deref(),
                reference.meta_name.as_deref(),
            )
            .await?;
        }

        for org in orgs {
            let kinds: Vec<Kind> = if org.by_resource_kind.is_empty() {
                Kind::ALL.into_iter().filter(|k| k.is_resource()).collect()
            } else {
                org.by_resource_kind.clone()
            };
            for kind in kinds {
                for resource in reader.list(org.org_id, kind).await? {
                    if !org.by_label.is_empty() {
                        let labels = self.linked_labels(&resource).await?;
                        if !labels.iter().any(|l| org.by_label.contains(&l.name)) {
                            continue;
                        }
                    }
                    self.export_resource(&mut exporter, resource, None, None).await?;
                }
            }
        }

        info!(objects = exporter.objects.len(), "Exported resources");
        Ok(exporter.finish())
    }

    async fn linked_labels(&self, resource: &BackendResource) -> Result<Vec<BackendResource>> {
        let reader = self.backend.as_reader();
        let mut labels = Vec::new();
        for link in reader.label_links(resource.org_id, resource.id).await? {
            if let Some(label) = reader.get(Kind::Label, link.label_id).await? {
                labels.push(label);
            }
        }
        Ok(labels)
    }

    async fn export_resource(
        &self,
        exporter: &mut Exporter,
        resource: BackendResource,
        name: Option<&str>,
        meta_name: Option<&str>,
    ) -> Result<()> {
        if exporter.contains(resource.kind, resource.id) {
            return Ok(());
        }

        let mut associations = Vec::new();
        if resource.kind.is_labelable() {
            for label in self.linked_labels(&resource).await? {
                let label_meta = exporter.add(label, None, None, Vec::new())?;
                associations.push(Association {
                    kind: Kind::Label,
                    name: label_meta,
                    id: None,
                });
            }
        }
        exporter.add(resource, name, meta_name, associations)?;
        Ok(())
    }

    /// Lists the org's stacks.
    ///
    /// # Errors
    ///
    /// Returns an error if the stack store fails.
    pub async fn list_stacks(&self, org_id: PlatformId) -> Result<Vec<Stack>> {
        self.stacks.list(org_id).await
    }

    /// Gets one stack.
    ///
    /// # Errors
    ///
    /// Returns `StateError::NotFound` if the org has no such stack.
    pub async fn get_stack(&self, org_id: PlatformId, stack_id: PlatformId) -> Result<Stack> {
        self.stacks
            .load(org_id, stack_id)
            .await?
            .ok_or_else(|| StateError::NotFound { stack_id }.into())
    }

    /// Deletes a stack record. Resources it manages are left in place.
    ///
    /// # Errors
    ///
    /// Returns `StateError::NotFound` if the org has no such stack.
    pub async fn delete_stack(&self, org_id: PlatformId, stack_id: PlatformId) -> Result<()> {
        self.get_stack(org_id, stack_id).await?;
        self.stacks.delete(org_id, stack_id).await
    }
}

#[derive(Default)]
struct Exporter {
    objects: Vec<Object>,
    exported: HashMap<(Kind, PlatformId), String>,
    meta_names: HashSet<(Kind, String)>,
}

impl Exporter {
    fn contains(&self, kind: Kind, id: PlatformId) -> bool {
        self.exported.contains_key(&(kind, id))
    }

    fn add(
        &mut self,
        resource: BackendResource,
        name: Option<&str>,
        meta_name: Option<&str>,
        associations: Vec<Association>,
    ) -> Result<String> {
        if let Some(existing) = self.exported.get(&(resource.kind, resource.id)) {
            return Ok(existing.clone());
        }

        let display = name.unwrap_or(&resource.name).to_string();
        let base = meta_name.map_or_else(|| slugify(&display), ToString::to_string);
        let meta_name = self.unique_meta_name(resource.kind, base);

        let mut spec = ResourceSpec::from_value(resource.kind, resource.spec).map_err(|e| {
            BackendError::resource(resource.kind, &meta_name, format!("stored spec is invalid: {e}"))
        })?;
        spec.set_name(display);
        spec.set_associations(associations);

        self.exported.insert((resource.kind, resource.id), meta_name.clone());
        self.objects.push(Object::new(meta_name.clone(), spec));
        Ok(meta_name)
    }

    fn unique_meta_name(&mut self, kind: Kind, base: String) -> String {
        let mut candidate = base.clone();
        let mut suffix = 2;
        while self.meta_names.contains(&(kind, candidate.clone())) {
            candidate = format!("{base}-{suffix}");
            suffix += 1;
        }
        self.meta_names.insert((kind, candidate.clone()));
        candidate
    }

    fn finish(self) -> Package {
        let mut objects = self.objects;
        objects.sort_by_key(|o| o.kind != Kind::Label);
        Package::new(objects, Vec::new())
    }
}

/// Converts a display name into a metaName: lowercase alphanumerics joined
/// by single dashes.
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("resource");
    }
    slug
}

async fn race<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(StackplateError::Cancelled),
        result = fut => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, NewResource, StateReader};
    use crate::config::AddressPolicy;
    use crate::error::TemplateError;
    use crate::planner::ChangeType;
    use crate::state::{MemoryStackStore, MockStackStore};
    use crate::template::StateStatus;
    use serde_json::json;

    fn org() -> PlatformId {
        PlatformId::new(9000).unwrap()
    }

    fn service_with(backend: Arc<MemoryBackend>, stacks: Arc<dyn StackStore>) -> TemplateService {
        TemplateService::new(backend, stacks, Settings::default()).unwrap()
    }

    fn service() -> (TemplateService, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        (
            service_with(Arc::clone(&backend), Arc::new(MemoryStackStore::new())),
            backend,
        )
    }

    fn bucket_json(name: &str, description: &str) -> String {
        format!(
            r#"[{{"apiVersion": "stackplate.dev/v1alpha1", "kind": "Bucket",
                 "metadata": {{"name": "{name}"}}, "spec": {{"description": "{description}"}}}}]"#
        )
    }

    async fn load(service: &TemplateService, body: &str) -> Package {
        service
            .load_package(
                &[TemplateSource::inline(body, Some("application/json"))],
                &CancellationToken::new(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_remotes_keep_request_order() {
        use std::time::Duration;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        for (route, name, delay) in [("/slow.json", "slow", 300), ("/fast.json", "fast", 0)] {
            Mock::given(method("GET"))
                .and(path(route))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_string(bucket_json(name, "remote"))
                        .set_delay(Duration::from_millis(delay)),
                )
                .mount(&server)
                .await;
        }

        let settings = Settings {
            address_policy: AddressPolicy::Pass,
            ..Settings::default()
        };
        let service = TemplateService::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(MemoryStackStore::new()),
            settings,
        )
        .unwrap();

        let package = service
            .load_package(
                &[
                    TemplateSource::remote(format!("{}/slow.json", server.uri())),
                    TemplateSource::remote(format!("{}/fast.json", server.uri())),
                ],
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let names: Vec<&str> = package.objects().iter().map(Object::meta_name).collect();
        assert_eq!(names, vec!["slow", "fast"]);
    }

    #[tokio::test]
    async fn test_dry_run_does_not_mutate() {
        let (service, backend) = service();
        let package = load(&service, &bucket_json("rucket-11", "x")).await;

        let impact = service
            .dry_run(org(), &package, ApplyOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(impact.summary.buckets.len(), 1);
        assert_eq!(impact.diff.buckets[0].identifier.meta_name, "rucket-11");
        assert_eq!(impact.diff.buckets[0].change, ChangeType::Create);
        assert!(impact.stack_id.is_none());
        assert_eq!(backend.resource_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reapply_is_idempotent() {
        let (service, backend) = service();
        let cancel = CancellationToken::new();
        let package = load(&service, &bucket_json("bkt", "v1")).await;

        let first = service
            .apply(org(), org(), &package, ApplyOptions::default(), &cancel)
            .await
            .unwrap();
        let stack_id = first.stack_id.unwrap();
        assert!(first.summary.buckets[0].id.is_some());

        let options = ApplyOptions {
            stack_id: Some(stack_id),
            ..ApplyOptions::default()
        };
        let second = service
            .apply(org(), org(), &package, options.clone(), &cancel)
            .await
            .unwrap();
        assert_eq!(second.diff.buckets[0].change, ChangeType::Unchanged);
        assert_eq!(second.diff.buckets[0].identifier.state_status, StateStatus::Exists);
        assert_eq!(backend.resource_count().unwrap(), 1);

        let changed = load(&service, &bucket_json("bkt", "v2")).await;
        let third = service
            .apply(org(), org(), &changed, options, &cancel)
            .await
            .unwrap();
        assert_eq!(third.diff.buckets[0].change, ChangeType::Update);
        assert_eq!(backend.resource_count().unwrap(), 1);

        let stack = service.get_stack(org(), stack_id).await.unwrap();
        assert_eq!(stack.resources.len(), 1);
        assert_eq!(stack.events.len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_stack_is_not_found() {
        let (service, _) = service();
        let package = load(&service, &bucket_json("bkt", "v1")).await;
        let options = ApplyOptions {
            stack_id: Some(PlatformId::new(42).unwrap()),
            ..ApplyOptions::default()
        };

        let err = service
            .apply(org(), org(), &package, options, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StackplateError::State(StateError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_secrets_supplied_and_missing() {
        let (service, backend) = service();
        let body = r#"
apiVersion: stackplate.dev/v1alpha1
kind: NotificationEndpointHTTP
metadata:
  name: hook
spec:
  url: https://example.com/hook
  authMethod: basic
  username:
    secretRef:
      key: user-key
  password:
    secretRef:
      key: pass-key
"#;
        let package = service
            .load_package(
                &[TemplateSource::inline(body, Some("application/x-yaml"))],
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        let options = ApplyOptions {
            secrets: BTreeMap::from([(String::from("user-key"), String::from("admin"))]),
            ..ApplyOptions::default()
        };

        let impact = service
            .apply(org(), org(), &package, options, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(impact.summary.missing_secrets, vec![String::from("pass-key")]);
        assert!(impact.failures.is_empty());
        assert!(backend.has_secret(org(), "user-key").await.unwrap());
        assert_eq!(backend.resource_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stack_save_failure_is_fatal() {
        let backend = Arc::new(MemoryBackend::new());
        let mut stacks = MockStackStore::new();
        stacks
            .expect_save()
            .returning(|_| Err(StateError::serialization("disk full").into()));
        let service = service_with(Arc::clone(&backend), Arc::new(stacks));
        let package = load(&service, &bucket_json("bkt", "v1")).await;

        let err = service
            .apply(org(), org(), &package, ApplyOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StackplateError::State(_)));
    }

    #[tokio::test]
    async fn test_validation_failure() {
        let (service, _) = service();
        let package = load(&service, &bucket_json("Not_Valid", "v1")).await;

        let err = service
            .apply(org(), org(), &package, ApplyOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StackplateError::Template(TemplateError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_cancelled_apply() {
        let (service, backend) = service();
        let package = load(&service, &bucket_json("bkt", "v1")).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = service
            .apply(org(), org(), &package, ApplyOptions::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, StackplateError::Cancelled));
        assert_eq!(backend.resource_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_export_label_with_name_override() {
        let (service, backend) = service();
        let label = backend
            .insert(
                org(),
                NewResource {
                    kind: Kind::Label,
                    name: String::from("old"),
                    spec: json!({"color": "#ffaa00"}),
                },
            )
            .unwrap();

        let package = service
            .export(
                &[],
                &[ResourceRef {
                    kind: Kind::Label,
                    id: label.id,
                    name: Some(String::from("new name")),
                    meta_name: None,
                }],
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(package.len(), 1);
        let obj = &package.objects()[0];
        assert_eq!(obj.meta_name(), "new-name");
        assert_eq!(obj.display_name(), "new name");
        assert!(service.validate(&package).is_ok());
        assert_eq!(package.summary().labels.len(), 1);
    }

    #[tokio::test]
    async fn test_export_requires_selection() {
        let (service, _) = service();
        let err = service
            .export(&[], &[], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StackplateError::Request(RequestError::EmptyExport)));
    }

    #[tokio::test]
    async fn test_export_org_includes_labels() {
        let (service, _) = service();
        let cancel = CancellationToken::new();
        let body = r#"[
            {"apiVersion": "stackplate.dev/v1alpha1", "kind": "Label", "metadata": {"name": "env"}},
            {"apiVersion": "stackplate.dev/v1alpha1", "kind": "Bucket", "metadata": {"name": "bkt"},
             "spec": {"associations": [{"kind": "Label", "name": "env"}]}},
            {"apiVersion": "stackplate.dev/v1alpha1", "kind": "Bucket", "metadata": {"name": "plain"}}
        ]"#;
        let package = load(&service, body).await;
        service
            .apply(org(), org(), &package, ApplyOptions::default(), &cancel)
            .await
            .unwrap();

        let exported = service
            .export(
                &[OrgExport {
                    org_id: org(),
                    by_label: vec![String::from("env")],
                    by_resource_kind: vec![Kind::Bucket],
                }],
                &[],
                &cancel,
            )
            .await
            .unwrap();

        assert_eq!(exported.len(), 2);
        assert_eq!(exported.objects()[0].kind, Kind::Label);
        let bucket = exported.get(Kind::Bucket, "bkt").unwrap();
        assert_eq!(bucket.spec.associations()[0].name, "env");
        assert!(service.validate(&exported).is_ok());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("new name"), "new-name");
        assert_eq!(slugify("  My__Bucket!! "), "my-bucket");
        assert_eq!(slugify("***"), "resource");
    }
}
