//! Transport-agnostic request handler.
//!
//! [`TemplatesHandler`] takes the body and content type of a request, runs it
//! through the [`TemplateService`] and answers with an [`ApiResponse`]. A
//! transport only has to copy the status and JSON body onto the wire.

use std::sync::Arc;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::{RequestError, Result, SourceOrigin, StackplateError};
use crate::id::PlatformId;
use crate::service::TemplateService;
use crate::template::{Encoding, Object, Summary};

use super::request::{ReqApply, ReqExport, parse_id};
use super::response::{ApiResponse, RespApply};

/// Handles template and stack requests.
#[derive(Clone)]
pub struct TemplatesHandler {
    service: Arc<TemplateService>,
}

impl TemplatesHandler {
    /// Creates a handler over a shared service.
    #[must_use]
    pub const fn new(service: Arc<TemplateService>) -> Self {
        Self { service }
    }

    /// Returns the underlying service.
    #[must_use]
    pub fn service(&self) -> &TemplateService {
        &self.service
    }

    /// Handles an apply or dry-run request.
    ///
    /// Answers 200 for a dry run and 201 for an apply. Template failures get a
    /// [`super::RespApplyErr`] body carrying whatever summary could be built.
    pub async fn apply(
        &self,
        user_id: PlatformId,
        content_type: Option<&str>,
        body: &[u8],
        cancel: &CancellationToken,
    ) -> ApiResponse {
        let mut summary = Summary::default();
        match self
            .try_apply(user_id, content_type, body, cancel, &mut summary)
            .await
        {
            Ok(response) => response,
            Err(err) => Self::failure(&err, summary),
        }
    }

    async fn try_apply(
        &self,
        user_id: PlatformId,
        content_type: Option<&str>,
        body: &[u8],
        cancel: &CancellationToken,
        summary: &mut Summary,
    ) -> Result<ApiResponse> {
        let req: ReqApply = self.decode_body(content_type, body)?;
        let org_id = req.org_id()?;
        let options = req.options()?;
        let dry_run = options.dry_run;

        let package = self
            .service
            .load_package(&req.template_sources(), cancel)
            .await?;
        *summary = package.summary();

        let impact = self
            .service
            .apply(org_id, user_id, &package, options, cancel)
            .await?;

        let status = if dry_run {
            StatusCode::OK
        } else {
            StatusCode::CREATED
        };
        debug!(org = %org_id, dry_run, status = status.as_u16(), "apply request handled");
        Ok(ApiResponse::json(status, &RespApply::from(impact)))
    }

    /// Handles an export request. The body of a 200 response is the package
    /// as a JSON array of objects.
    pub async fn export(
        &self,
        content_type: Option<&str>,
        body: &[u8],
        cancel: &CancellationToken,
    ) -> ApiResponse {
        match self.try_export(content_type, body, cancel).await {
            Ok(response) => response,
            Err(err) => Self::failure(&err, Summary::default()),
        }
    }

    async fn try_export(
        &self,
        content_type: Option<&str>,
        body: &[u8],
        cancel: &CancellationToken,
    ) -> Result<ApiResponse> {
        let req: ReqExport = self.decode_body(content_type, body)?;
        let orgs = req.orgs()?;
        let resources = req.resource_refs()?;

        let package = self.service.export(&orgs, &resources, cancel).await?;
        let objects: Vec<Value> = package.objects().iter().map(Object::to_value).collect();
        Ok(ApiResponse {
            status: StatusCode::OK,
            body: Value::Array(objects),
        })
    }

    /// Lists the stacks of an org.
    pub async fn list_stacks(&self, org_id: &str) -> ApiResponse {
        let result = match parse_id("orgID", org_id) {
            Ok(org_id) => self.service.list_stacks(org_id).await,
            Err(err) => Err(err.into()),
        };
        match result {
            Ok(stacks) => ApiResponse::json(StatusCode::OK, &stacks),
            Err(err) => Self::failure(&err, Summary::default()),
        }
    }

    /// Reads one stack.
    pub async fn get_stack(&self, org_id: &str, stack_id: &str) -> ApiResponse {
        let result = match stack_ids(org_id, stack_id) {
            Ok((org_id, stack_id)) => self.service.get_stack(org_id, stack_id).await,
            Err(err) => Err(err.into()),
        };
        match result {
            Ok(stack) => ApiResponse::json(StatusCode::OK, &stack),
            Err(err) => Self::failure(&err, Summary::default()),
        }
    }

    /// Deletes one stack record.
    pub async fn delete_stack(&self, org_id: &str, stack_id: &str) -> ApiResponse {
        let result = match stack_ids(org_id, stack_id) {
            Ok((org_id, stack_id)) => self.service.delete_stack(org_id, stack_id).await,
            Err(err) => Err(err.into()),
        };
        match result {
            Ok(()) => ApiResponse {
                status: StatusCode::NO_CONTENT,
                body: Value::Null,
            },
            Err(err) => Self::failure(&err, Summary::default()),
        }
    }

    fn failure(err: &StackplateError, summary: Summary) -> ApiResponse {
        error!(error = %err, code = err.code(), "api error encountered");
        if err.is_template_stage() {
            ApiResponse::apply_error(err, summary)
        } else {
            ApiResponse::error(err)
        }
    }

    /// Decodes a request body. The content type picks JSON (the default),
    /// YAML, or a Jinja template rendering to YAML.
    fn decode_body<T: DeserializeOwned>(&self, content_type: Option<&str>, body: &[u8]) -> Result<T> {
        let encoding = content_type
            .and_then(Encoding::from_content_type)
            .unwrap_or_default();
        match encoding {
            Encoding::Json => serde_json::from_slice(body).map_err(malformed),
            Encoding::Yaml => serde_yaml::from_slice(body).map_err(malformed),
            Encoding::Jinja => {
                self.service
                    .registry()
                    .ensure_supported(Encoding::Jinja, &SourceOrigin::Raw)?;
                let rendered = self.render_body(body)?;
                serde_yaml::from_str(&rendered).map_err(malformed)
            }
        }
    }

    #[cfg(feature = "templating")]
    fn render_body(&self, body: &[u8]) -> Result<String> {
        let decoder = crate::template::JinjaDecoder::new(
            self.service.settings().template_parameters.clone(),
        );
        Ok(decoder.render(body, &SourceOrigin::Raw)?)
    }

    #[cfg(not(feature = "templating"))]
    fn render_body(&self, _body: &[u8]) -> Result<String> {
        Err(crate::error::SourceError::InvalidEncoding {
            origin: SourceOrigin::Raw,
            encoding: Encoding::Jinja.to_string(),
        }
        .into())
    }
}

fn stack_ids(org_id: &str, stack_id: &str) -> std::result::Result<(PlatformId, PlatformId), RequestError> {
    Ok((parse_id("orgID", org_id)?, parse_id("stackID", stack_id)?))
}

fn malformed(err: impl std::fmt::Display) -> StackplateError {
    RequestError::MalformedBody {
        message: err.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::config::Settings;
    use crate::state::MemoryStackStore;

    fn handler(settings: Settings) -> TemplatesHandler {
        let service = TemplateService::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(MemoryStackStore::new()),
            settings,
        )
        .unwrap();
        TemplatesHandler::new(Arc::new(service))
    }

    fn user() -> PlatformId {
        PlatformId::new(1).unwrap()
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let resp = handler(Settings::default())
            .apply(user(), None, b"{not json", &CancellationToken::new())
            .await;
        assert_eq!(resp.status, StatusCode::BAD_REQUEST);
        assert_eq!(resp.body["code"], "invalid");
    }

    #[tokio::test]
    async fn test_yaml_body() {
        let body = br#"
orgID: "0000000000002328"
dryRun: true
template:
  contentType: json
  contents:
    - apiVersion: stackplate.dev/v1alpha1
      kind: Bucket
      metadata:
        name: rucket-11
"#;
        let resp = handler(Settings::default())
            .apply(user(), Some("application/x-yaml"), body, &CancellationToken::new())
            .await;
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.body["summary"]["buckets"][0]["metaName"], "rucket-11");
    }

    #[tokio::test]
    async fn test_jinja_body_rejected_when_templating_disabled() {
        let settings = Settings {
            enable_templating: false,
            ..Settings::default()
        };
        let resp = handler(settings)
            .apply(
                user(),
                Some("application/x-jinja"),
                b"orgID: \"0000000000002328\"",
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(resp.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            resp.body["message"],
            "template from source(s) had an issue: invalid encoding provided: jinja"
        );
        assert_eq!(resp.body["errors"].as_array().unwrap().len(), 1);
    }

    #[cfg(feature = "templating")]
    #[tokio::test]
    async fn test_jinja_body_rendered() {
        let body = br#"
orgID: "0000000000002328"
dryRun: true
templates:
{% for n in [1, 2] %}
  - contentType: json
    sources: ["bkt{{ n }}.json"]
    contents:
      - apiVersion: stackplate.dev/v1alpha1
        kind: Bucket
        metadata:
          name: bkt{{ n }}
{% endfor %}
"#;
        let resp = handler(Settings::default())
            .apply(user(), Some("application/x-jinja"), body, &CancellationToken::new())
            .await;
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.body["summary"]["buckets"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_stack_routes_parse_ids() {
        let handler = handler(Settings::default());
        let resp = handler.list_stacks("nope").await;
        assert_eq!(resp.status, StatusCode::BAD_REQUEST);

        let resp = handler.list_stacks("0000000000002328").await;
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.body, serde_json::json!([]));

        let resp = handler
            .get_stack("0000000000002328", "0000000000000001")
            .await;
        assert_eq!(resp.status, StatusCode::NOT_FOUND);
    }
}
