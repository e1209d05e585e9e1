//! Shared helpers for handler tests.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{Value, json};
use stackplate::api::{ApiResponse, TemplatesHandler};
use stackplate::backend::MemoryBackend;
use stackplate::config::{AddressPolicy, Settings};
use stackplate::id::PlatformId;
use stackplate::service::TemplateService;
use stackplate::state::MemoryStackStore;
use tokio_util::sync::CancellationToken;

pub const ORG_ID: &str = "0000000000002328";

pub fn user() -> PlatformId {
    PlatformId::new(1).unwrap()
}

pub fn handler_with(settings: Settings) -> TemplatesHandler {
    let service = TemplateService::new(
        Arc::new(MemoryBackend::new()),
        Arc::new(MemoryStackStore::new()),
        settings,
    )
    .unwrap();
    TemplatesHandler::new(Arc::new(service))
}

/// Handler that may fetch from loopback addresses.
pub fn handler() -> TemplatesHandler {
    handler_with(Settings {
        address_policy: AddressPolicy::Pass,
        ..Settings::default()
    })
}

pub fn bucket(name: &str) -> Value {
    json!({
        "apiVersion": "stackplate.dev/v1alpha1",
        "kind": "Bucket",
        "metadata": {"name": name},
        "spec": {"description": format!("{name} bucket")}
    })
}

pub fn raw_template(source: &str, objects: Value) -> Value {
    json!({
        "contentType": "application/json",
        "sources": [source],
        "contents": objects
    })
}

pub async fn apply(handler: &TemplatesHandler, body: &Value) -> ApiResponse {
    let bytes = serde_json::to_vec(body).unwrap();
    handler
        .apply(user(), Some("application/json"), &bytes, &CancellationToken::new())
        .await
}

pub async fn export(handler: &TemplatesHandler, body: &Value) -> ApiResponse {
    let bytes = serde_json::to_vec(body).unwrap();
    handler
        .export(Some("application/json"), &bytes, &CancellationToken::new())
        .await
}

pub fn meta_names(collection: &Value) -> Vec<String> {
    collection
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["metaName"].as_str().unwrap().to_string())
        .collect()
}

/// Asserts that every per-kind collection is an array, never null or absent.
pub fn assert_collections(value: &Value) {
    for key in [
        "buckets",
        "checks",
        "dashboards",
        "labels",
        "labelMappings",
        "notificationEndpoints",
        "notificationRules",
        "tasks",
        "telegrafConfigs",
        "variables",
    ] {
        assert!(value[key].is_array(), "{key} should be an array in {value}");
    }
}
