//! Export requests through the handler.

mod common;

use reqwest::StatusCode;
use serde_json::json;

use common::{ORG_ID, apply, bucket, export, handler, raw_template};

#[tokio::test]
async fn test_export_label_with_new_name_round_trips() {
    let handler = handler();
    let label = json!({
        "apiVersion": "stackplate.dev/v1alpha1",
        "kind": "Label",
        "metadata": {"name": "label-1"},
        "spec": {"name": "old name", "color": "#ffaa00"}
    });
    let applied = apply(
        &handler,
        &json!({"orgID": ORG_ID, "template": raw_template("label.json", json!([label]))}),
    )
    .await;
    assert_eq!(applied.status, StatusCode::CREATED);
    let label_id = applied.body["summary"]["labels"][0]["id"].as_str().unwrap().to_string();

    let resp = export(
        &handler,
        &json!({"resources": [{"kind": "Label", "id": label_id, "name": "new name"}]}),
    )
    .await;

    assert_eq!(resp.status, StatusCode::OK, "{}", resp.body);
    let objects = resp.body.as_array().unwrap();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0]["kind"], "Label");
    assert_eq!(objects[0]["metadata"]["name"], "new-name");
    assert_eq!(objects[0]["spec"]["name"], "new name");

    let again = apply(
        &handler,
        &json!({
            "orgID": ORG_ID,
            "dryRun": true,
            "template": raw_template("export.json", resp.body.clone())
        }),
    )
    .await;
    assert_eq!(again.status, StatusCode::OK, "{}", again.body);
    assert_eq!(again.body["summary"]["labels"][0]["name"], "new name");
}

#[tokio::test]
async fn test_export_org_by_kind() {
    let handler = handler();
    let applied = apply(
        &handler,
        &json!({
            "orgID": ORG_ID,
            "template": raw_template("bkts.json", json!([bucket("bkt1"), bucket("bkt2")]))
        }),
    )
    .await;
    assert_eq!(applied.status, StatusCode::CREATED);

    let resp = export(
        &handler,
        &json!({"orgIDs": [{"orgID": ORG_ID, "resourceFilters": {"byResourceKind": ["Bucket"]}}]}),
    )
    .await;

    assert_eq!(resp.status, StatusCode::OK);
    let mut names: Vec<&str> = resp
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["metadata"]["name"].as_str().unwrap())
        .collect();
    names.sort_unstable();
    assert_eq!(names, vec!["bkt1", "bkt2"]);
}

#[tokio::test]
async fn test_empty_export_is_unprocessable() {
    let resp = export(&handler(), &json!({})).await;
    assert_eq!(resp.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(resp.body["code"], "unprocessable entity");
}

#[tokio::test]
async fn test_export_unknown_resource() {
    let resp = export(
        &handler(),
        &json!({"resources": [{"kind": "Bucket", "id": "00000000000000ff"}]}),
    )
    .await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_export_bad_org_id() {
    let resp = export(&handler(), &json!({"orgIDs": [{"orgID": "nope"}]})).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
}
