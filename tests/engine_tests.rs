//! End-to-end engine tests against a mock HTTP provider.

mod common;

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{ctx_with_canvas, TestHarness};
use tycho::config::{Credentials, HttpMethod, MethodConfig};
use tycho::context::CallerContext;

fn sync_get_method(name: &str, endpoint: String) -> MethodConfig {
    MethodConfig::builder()
        .name(name)
        .endpoint(endpoint)
        .http_method(HttpMethod::Get)
        .build()
}

#[tokio::test]
async fn sync_method_issues_exactly_one_call_and_returns_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "x"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"hits": 3})))
        .expect(1)
        .mount(&server)
        .await;

    let harness = TestHarness::new();
    harness
        .config_store
        .add_method("acme", sync_get_method("search", format!("{}/search", server.uri())));

    let response = harness
        .engine
        .execute("acme", "search", json!({"q": "x"}), ctx_with_canvas())
        .await;

    assert!(response.success, "unexpected error: {:?}", response.error);
    assert_eq!(response.json().unwrap(), &json!({"hits": 3}));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn primitive_response_is_wrapped_under_result() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(42)))
        .mount(&server)
        .await;

    let harness = TestHarness::new();
    harness
        .config_store
        .add_method("acme", sync_get_method("count", format!("{}/count", server.uri())));

    let response = harness
        .engine
        .execute("acme", "count", json!({}), ctx_with_canvas())
        .await;

    assert!(response.success);
    assert_eq!(response.json().unwrap(), &json!({"result": 42}));
}

#[tokio::test]
async fn unknown_method_is_a_structured_error() {
    let harness = TestHarness::new();

    let response = harness
        .engine
        .execute("acme", "nope", json!({}), ctx_with_canvas())
        .await;

    assert!(!response.success);
    assert_eq!(response.error_code.as_deref(), Some("METHOD_NOT_FOUND"));
    assert!(response.error.unwrap().contains("nope"));
}

#[tokio::test]
async fn repeated_calls_reload_config_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let harness = TestHarness::new();
    harness
        .config_store
        .add_method("acme", sync_get_method("ping", format!("{}/ping", server.uri())));

    for _ in 0..3 {
        let response = harness
            .engine
            .execute("acme", "ping", json!({}), ctx_with_canvas())
            .await;
        assert!(response.success);
    }

    use std::sync::atomic::Ordering;
    assert_eq!(harness.config_store.method_loads.load(Ordering::SeqCst), 1);
    assert_eq!(
        harness.config_store.credential_loads.load(Ordering::SeqCst),
        1
    );
}

#[tokio::test]
async fn invalidation_forces_config_reload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let harness = TestHarness::new();
    harness
        .config_store
        .add_method("acme", sync_get_method("ping", format!("{}/ping", server.uri())));

    harness
        .engine
        .execute("acme", "ping", json!({}), ctx_with_canvas())
        .await;
    harness.engine.invalidate_toolset("acme");
    harness
        .engine
        .execute("acme", "ping", json!({}), ctx_with_canvas())
        .await;

    use std::sync::atomic::Ordering;
    assert_eq!(harness.config_store.method_loads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn api_key_credentials_become_bearer_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer k-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let harness = TestHarness::new();
    harness.config_store.add_method(
        "acme",
        MethodConfig::builder()
            .name("create")
            .endpoint(format!("{}/create", server.uri()))
            .build(),
    );
    harness
        .config_store
        .set_credentials("acme", Credentials::new(json!({"api_key": "k-123"})));

    let response = harness
        .engine
        .execute("acme", "create", json!({"a": 1}), ctx_with_canvas())
        .await;
    assert!(response.success);
}

#[tokio::test]
async fn schema_defaults_are_filled_before_dispatch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("size", "1024x1024"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let harness = TestHarness::new();
    let mut method_config =
        sync_get_method("generate", format!("{}/generate", server.uri()));
    method_config.input_schema = json!({
        "type": "object",
        "properties": {
            "size": { "type": "string", "default": "1024x1024" },
        },
    });
    harness.config_store.add_method("acme", method_config);

    let response = harness
        .engine
        .execute("acme", "generate", json!({}), ctx_with_canvas())
        .await;
    assert!(response.success);
}

#[tokio::test]
async fn invalid_params_fail_before_any_network_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let harness = TestHarness::new();
    let mut method_config = sync_get_method("search", format!("{}/search", server.uri()));
    method_config.input_schema = json!({
        "type": "object",
        "properties": { "q": { "type": "string" } },
        "required": ["q"],
    });
    harness.config_store.add_method("acme", method_config);

    let response = harness
        .engine
        .execute("acme", "search", json!({}), ctx_with_canvas())
        .await;

    assert!(!response.success);
    assert_eq!(response.error_code.as_deref(), Some("INVALID_ARGUMENT"));
}

#[tokio::test]
async fn produced_urls_are_persisted_in_one_batch_and_rewritten() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "images": [{"url": "https://cdn.example.com/a.png"}, {"url": "https://cdn.example.com/b.png"}],
        })))
        .mount(&server)
        .await;

    let harness = TestHarness::new();
    let mut method_config = MethodConfig::builder()
        .name("generate")
        .endpoint(format!("{}/generate", server.uri()))
        .build();
    method_config.output_schema = json!({
        "type": "object",
        "properties": {
            "images": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "url": { "type": "string", "isResource": true },
                    },
                },
            },
        },
    });
    harness.config_store.add_method("acme", method_config);

    let response = harness
        .engine
        .execute("acme", "generate", json!({"prompt": "cats"}), ctx_with_canvas())
        .await;

    assert!(response.success, "unexpected error: {:?}", response.error);
    use std::sync::atomic::Ordering;
    assert_eq!(harness.file_store.batch_calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.file_store.created.lock().unwrap().len(), 2);
    assert_eq!(response.files.len(), 2);

    let body = response.json().unwrap();
    assert_eq!(body["images"][0]["url"], "file://sf-1");
    assert_eq!(body["images"][1]["url"], "file://sf-2");
}

#[tokio::test]
async fn produced_resources_without_canvas_are_a_fatal_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "image": "https://cdn.example.com/a.png",
        })))
        .mount(&server)
        .await;

    let harness = TestHarness::new();
    let mut method_config = MethodConfig::builder()
        .name("generate")
        .endpoint(format!("{}/generate", server.uri()))
        .build();
    method_config.output_schema = json!({
        "type": "object",
        "properties": { "image": { "type": "string", "isResource": true } },
    });
    harness.config_store.add_method("acme", method_config);

    let no_canvas = CallerContext::builder().user_id("u-1").build();
    let response = harness
        .engine
        .execute("acme", "generate", json!({}), no_canvas)
        .await;

    assert!(!response.success);
    assert_eq!(
        response.error_code.as_deref(),
        Some("MISSING_CANVAS_CONTEXT")
    );
}

#[tokio::test]
async fn billing_rule_reaches_the_usage_meter() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let harness = TestHarness::new();
    let mut method_config = MethodConfig::builder()
        .name("create")
        .endpoint(format!("{}/create", server.uri()))
        .build();
    method_config.billing = Some(json!({"credits": 5}));
    harness.config_store.add_method("acme", method_config);

    let response = harness
        .engine
        .execute("acme", "create", json!({}), ctx_with_canvas())
        .await;
    assert!(response.success);

    // metering is fire-and-forget; give the spawned task a beat
    tokio::time::sleep(Duration::from_millis(100)).await;
    let records = harness.usage_meter.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].0, "create");
    assert_eq!(records[0].1, json!({"credits": 5}));
}

#[tokio::test]
async fn non_2xx_response_surfaces_as_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let harness = TestHarness::new();
    harness.config_store.add_method(
        "acme",
        MethodConfig::builder()
            .name("create")
            .endpoint(format!("{}/create", server.uri()))
            .build(),
    );

    let response = harness
        .engine
        .execute("acme", "create", json!({}), ctx_with_canvas())
        .await;

    assert!(!response.success);
    assert_eq!(response.error_code.as_deref(), Some("API_ERROR"));
    assert!(response.error.unwrap().contains("bad gateway"));
}

#[tokio::test]
async fn binary_response_is_persisted_as_a_single_file() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(b"\x89PNG-bytes".to_vec()),
        )
        .mount(&server)
        .await;

    let harness = TestHarness::new();
    harness.config_store.add_method(
        "acme",
        MethodConfig::builder()
            .name("render")
            .endpoint(format!("{}/render", server.uri()))
            .build(),
    );

    let response = harness
        .engine
        .execute("acme", "render", json!({}), ctx_with_canvas())
        .await;

    assert!(response.success);
    assert_eq!(response.files.len(), 1);
    assert_eq!(response.files[0].mime_type, "image/png");
    assert_eq!(response.json().unwrap()["file"], "file://sf-1");
}
