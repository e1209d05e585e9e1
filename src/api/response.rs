//! Response payloads and status mapping.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StackplateError;
use crate::id::PlatformId;
use crate::planner::{ApplyFailure, Diff};
use crate::service::ImpactSummary;
use crate::template::Summary;

/// Successful apply or dry run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespApply {
    /// Template sources, in submission order.
    pub sources: Vec<String>,
    /// Stack the apply was recorded under.
    #[serde(rename = "stackID", default, skip_serializing_if = "Option::is_none")]
    pub stack_id: Option<PlatformId>,
    /// Per-kind diff.
    pub diff: Diff,
    /// Per-kind summary.
    pub summary: Summary,
    /// Per-object apply failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ApplyFailure>>,
}

impl From<ImpactSummary> for RespApply {
    fn from(impact: ImpactSummary) -> Self {
        Self {
            sources: impact.sources,
            stack_id: impact.stack_id,
            diff: impact.diff,
            summary: impact.summary,
            errors: Some(impact.failures).filter(|f| !f.is_empty()),
        }
    }
}

/// Failure while decoding, combining or validating templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespApplyErr {
    /// Stable error code.
    pub code: String,
    /// Human readable message.
    pub message: String,
    /// Summary of whatever package could be built.
    pub summary: Summary,
    /// Always empty; present for shape compatibility with [`RespApply`].
    pub diff: Diff,
    /// Individual problems.
    pub errors: Vec<String>,
}

/// Any other failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RespError {
    /// Stable error code.
    pub code: String,
    /// Human readable message.
    pub message: String,
}

/// A transport-agnostic response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP status.
    pub status: StatusCode,
    /// JSON body.
    pub body: Value,
}

impl ApiResponse {
    /// Serializes `body` into a response with `status`.
    #[must_use]
    pub fn json<T: Serialize>(status: StatusCode, body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(body) => Self { status, body },
            Err(e) => Self::error(&StackplateError::internal(format!("encode response: {e}"))),
        }
    }

    /// Builds the plain error response for `err`.
    #[must_use]
    pub fn error(err: &StackplateError) -> Self {
        let body = RespError {
            code: err.code().to_string(),
            message: err.to_string(),
        };
        Self {
            status: status_for(err),
            body: serde_json::json!({ "code": body.code, "message": body.message }),
        }
    }

    /// Builds the template-stage error response for `err`.
    #[must_use]
    pub fn apply_error(err: &StackplateError, summary: Summary) -> Self {
        Self::json(
            status_for(err),
            &RespApplyErr {
                code: err.code().to_string(),
                message: err.to_string(),
                summary,
                diff: Diff::default(),
                errors: err.details(),
            },
        )
    }

    /// Decodes the body.
    ///
    /// # Errors
    ///
    /// Returns the serde error if the body does not have the shape of `T`.
    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.body)
    }
}

/// Returns the HTTP status for an error.
#[must_use]
pub fn status_for(err: &StackplateError) -> StatusCode {
    err.status()
}
