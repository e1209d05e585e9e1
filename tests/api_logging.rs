//! Each failed request is logged exactly once.

mod common;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use reqwest::StatusCode;
use serde_json::json;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

use common::{ORG_ID, apply, bucket, export, handler, raw_template};

#[derive(Clone, Default)]
struct ErrorCounter(Arc<AtomicUsize>);

impl ErrorCounter {
    fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

impl<S: Subscriber> Layer<S> for ErrorCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() != Level::ERROR {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        if visitor.0 == "api error encountered" {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[tokio::test]
async fn test_errors_logged_once_per_request() {
    let counter = ErrorCounter::default();
    let subscriber = tracing_subscriber::registry().with(counter.clone());
    let _guard = tracing::subscriber::set_default(subscriber);
    let handler = handler();

    let resp = apply(
        &handler,
        &json!({
            "orgID": ORG_ID,
            "dryRun": true,
            "template": raw_template("bkt.json", json!([bucket("bkt")]))
        }),
    )
    .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(counter.count(), 0);

    let resp = apply(&handler, &json!({"orgID": "bad"})).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(counter.count(), 1);

    let resp = apply(
        &handler,
        &json!({
            "orgID": ORG_ID,
            "templates": [
                raw_template("a.json", json!([bucket("Bad_Name")])),
                raw_template("b.json", json!([bucket("Other_Bad")]))
            ]
        }),
    )
    .await;
    assert_eq!(resp.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(counter.count(), 2);

    let resp = export(&handler, &json!({})).await;
    assert_eq!(resp.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(counter.count(), 3);
}
