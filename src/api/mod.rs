//! Request and response payload contracts.
//!
//! This module does not run a server. [`TemplatesHandler`] maps request
//! bodies to [`ApiResponse`] values that any transport can write out.

mod handler;
mod request;
mod response;

pub use handler::TemplatesHandler;
pub use request::{
    ReqApply, ReqExport, ReqExportOrg, ReqExportResource, ReqRawTemplate, ReqResourceFilters,
    ReqTemplateRemote,
};
pub use response::{ApiResponse, RespApply, RespApplyErr, RespError, status_for};
