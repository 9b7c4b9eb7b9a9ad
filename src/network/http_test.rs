//! End-to-end checks of the HTTP adapter with `warp::test`

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use warp::http::StatusCode;

use super::http::routes;
use super::http::status_of;
use super::*;
use crate::digest_of;
use crate::test_utils::key;
use crate::test_utils::wait_until;
use crate::Archive;
use crate::ArchiveItem;
use crate::ConfigService;
use crate::ErrorKind;
use crate::MemoryConfigStore;
use crate::PublishRequest;
use crate::Settings;

const BASE: &str = "/v1/cs/configs";
const FORM: &str = "application/x-www-form-urlencoded";

fn service() -> Arc<ConfigService> {
    Arc::new(ConfigService::new(Arc::new(MemoryConfigStore::new()), &Settings::default()))
}

fn form(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Minimal form encoding for values containing the wire separators
fn encode_form_value(v: &str) -> String {
    v.bytes()
        .map(|b| match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' => (b as char).to_string(),
            _ => format!("%{b:02X}"),
        })
        .collect()
}

#[test]
fn error_kinds_map_to_statuses() {
    assert_eq!(status_of(ErrorKind::Validation), StatusCode::BAD_REQUEST);
    assert_eq!(status_of(ErrorKind::Namespace), StatusCode::BAD_REQUEST);
    assert_eq!(status_of(ErrorKind::Conflict), StatusCode::FORBIDDEN);
    assert_eq!(status_of(ErrorKind::NotFound), StatusCode::NOT_FOUND);
    assert_eq!(status_of(ErrorKind::Overload), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(status_of(ErrorKind::Persistence), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn publish_then_get_returns_content_and_digest() {
    let api = routes(service());

    let resp = warp::test::request()
        .method("POST")
        .path(BASE)
        .header("content-type", FORM)
        .body(form(&[("dataId", "app.yaml"), ("group", "G"), ("content", "hello")]))
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = warp::test::request()
        .method("GET")
        .path(&format!("{BASE}?dataId=app.yaml&group=G"))
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.body(), "hello");
    assert_eq!(resp.headers()["content-digest"], digest_of("hello").as_str());
}

#[tokio::test]
async fn beta_ips_header_publishes_beta_variant() {
    let svc = service();
    let api = routes(svc.clone());
    svc.publish(PublishRequest::formal(key("app.yaml"), "formal")).await.unwrap();

    let resp = warp::test::request()
        .method("POST")
        .path(BASE)
        .header("content-type", FORM)
        .header("betaIps", "10.0.0.1,10.0.0.2")
        .body(form(&[("dataId", "app.yaml"), ("group", "DEFAULT_GROUP"), ("content", "beta")]))
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let as_beta = warp::test::request()
        .path(&format!("{BASE}?dataId=app.yaml&group=DEFAULT_GROUP"))
        .header("x-real-ip", "10.0.0.2")
        .reply(&api)
        .await;
    let as_other = warp::test::request()
        .path(&format!("{BASE}?dataId=app.yaml&group=DEFAULT_GROUP"))
        .header("x-forwarded-for", "10.9.9.9, 10.0.0.1")
        .reply(&api)
        .await;

    assert_eq!(as_beta.body(), "beta");
    assert_eq!(as_other.body(), "formal");
}

#[tokio::test]
async fn errors_carry_mapped_status_and_kind() {
    let api = routes(service());

    let missing = warp::test::request()
        .path(&format!("{BASE}?dataId=nope&group=G"))
        .reply(&api)
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = serde_json::from_slice(missing.body()).unwrap();
    assert_eq!(body["kind"], "NOT_FOUND");

    let invalid = warp::test::request()
        .method("POST")
        .path(BASE)
        .header("content-type", FORM)
        .body(form(&[("dataId", "app.yaml"), ("group", "G")]))
        .reply(&api)
        .await;
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

    let bad_beta = warp::test::request()
        .method("POST")
        .path(BASE)
        .header("content-type", FORM)
        .header("betaIps", "not-an-ip")
        .body(form(&[("dataId", "a"), ("group", "G"), ("content", "x")]))
        .reply(&api)
        .await;
    assert_eq!(bad_beta.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn aggregated_publish_is_forbidden() {
    let mut settings = Settings::default();
    settings.mutation.aggregation_whitelist = vec!["aggr-*".into()];
    let api = routes(Arc::new(ConfigService::new(Arc::new(MemoryConfigStore::new()), &settings)));

    let resp = warp::test::request()
        .method("POST")
        .path(BASE)
        .header("content-type", FORM)
        .body(form(&[("dataId", "aggr-x"), ("group", "G"), ("content", "x")]))
        .reply(&api)
        .await;

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn delete_then_get_is_not_found() {
    let svc = service();
    let api = routes(svc.clone());
    svc.publish(PublishRequest::formal(key("app.yaml"), "x")).await.unwrap();

    let resp = warp::test::request()
        .method("DELETE")
        .path(&format!("{BASE}?dataId=app.yaml&group=DEFAULT_GROUP"))
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = warp::test::request()
        .path(&format!("{BASE}?dataId=app.yaml&group=DEFAULT_GROUP"))
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn listener_answers_immediately_for_stale_digest() {
    let svc = service();
    let api = routes(svc.clone());
    svc.publish(PublishRequest::formal(key("app.yaml"), "v1")).await.unwrap();

    let mut watch_set = BTreeMap::new();
    watch_set.insert(key("app.yaml"), "stale".to_string());
    let body = format!(
        "Listening-Configs={}",
        encode_form_value(&encode_listening_configs(&watch_set))
    );

    let resp = warp::test::request()
        .method("POST")
        .path(&format!("{BASE}/listener"))
        .header("content-type", FORM)
        .header("Long-Pulling-Timeout", "30000")
        .body(body)
        .reply(&api)
        .await;

    assert_eq!(resp.status(), StatusCode::OK);
    let changed = parse_changed_keys(std::str::from_utf8(resp.body()).unwrap()).unwrap();
    assert_eq!(changed, vec![key("app.yaml")]);
}

#[tokio::test]
async fn listener_without_timeout_header_does_not_hang() {
    let svc = service();
    let api = routes(svc.clone());
    svc.publish(PublishRequest::formal(key("app.yaml"), "v1")).await.unwrap();

    let mut watch_set = BTreeMap::new();
    watch_set.insert(key("app.yaml"), digest_of("v1"));
    let body = format!(
        "Listening-Configs={}",
        encode_form_value(&encode_listening_configs(&watch_set))
    );

    let resp = warp::test::request()
        .method("POST")
        .path(&format!("{BASE}/listener"))
        .header("content-type", FORM)
        .body(body)
        .reply(&api)
        .await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.body().is_empty());
    assert_eq!(svc.long_poll().waiting_sessions(), 0);
}

#[tokio::test]
async fn suspended_listener_is_woken_by_publish() {
    let svc = service();
    let api = routes(svc.clone());
    svc.publish(PublishRequest::formal(key("app.yaml"), "v1")).await.unwrap();

    let mut watch_set = BTreeMap::new();
    watch_set.insert(key("app.yaml"), digest_of("v1"));
    let body = format!(
        "Listening-Configs={}",
        encode_form_value(&encode_listening_configs(&watch_set))
    );

    let poll = tokio::spawn(async move {
        warp::test::request()
            .method("POST")
            .path(&format!("{BASE}/listener"))
            .header("content-type", FORM)
            .header("Long-Pulling-Timeout", "30000")
            .header("x-real-ip", "10.1.1.1")
            .body(body)
            .reply(&api)
            .await
    });
    let waiting = svc.clone();
    wait_until(move || waiting.long_poll().waiting_sessions() == 1).await;

    let listeners = warp::test::request()
        .path(&format!("{BASE}/listener?dataId=app.yaml&group=DEFAULT_GROUP"))
        .reply(&routes(svc.clone()))
        .await;
    let status: serde_json::Value = serde_json::from_slice(listeners.body()).unwrap();
    assert_eq!(status["listeners"]["10.1.1.1"], digest_of("v1"));

    svc.publish(PublishRequest::formal(key("app.yaml"), "v2")).await.unwrap();
    let resp = tokio::time::timeout(Duration::from_secs(5), poll).await.unwrap().unwrap();
    assert_eq!(parse_changed_keys(std::str::from_utf8(resp.body()).unwrap()).unwrap(), vec![key(
        "app.yaml"
    )]);
}

#[tokio::test]
async fn malformed_listening_configs_is_bad_request() {
    let api = routes(service());

    let resp = warp::test::request()
        .method("POST")
        .path(&format!("{BASE}/listener"))
        .header("content-type", FORM)
        .body("Listening-Configs=garbage")
        .reply(&api)
        .await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn search_and_export_return_json() {
    let svc = service();
    let api = routes(svc.clone());
    for id in ["svc-a", "svc-b", "other"] {
        svc.publish(PublishRequest::formal(key(id), "x")).await.unwrap();
    }

    let resp = warp::test::request()
        .path(&format!("{BASE}?search=blur&dataId=svc-*&pageNo=1&pageSize=10"))
        .reply(&api)
        .await;
    let page: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
    assert_eq!(page["total_count"], 2);

    let resp = warp::test::request()
        .path(&format!("{BASE}?export=true&group=DEFAULT_GROUP"))
        .reply(&api)
        .await;
    let archive: Archive = serde_json::from_slice(resp.body()).unwrap();
    assert_eq!(archive.items.len(), 3);
}

#[tokio::test]
async fn advance_fields_are_served_by_detail_and_catalog() {
    let api = routes(service());
    let tags = encode_form_value("prod,billing");
    let desc = encode_form_value("billing settings");

    let resp = warp::test::request()
        .method("POST")
        .path(BASE)
        .header("content-type", FORM)
        .body(form(&[
            ("dataId", "app.yaml"),
            ("group", "G"),
            ("content", "a"),
            ("type", "yaml"),
            ("desc", &desc),
            ("use", "runtime"),
            ("effect", "restart"),
            ("config_tags", &tags),
        ]))
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = warp::test::request()
        .path(&format!("{BASE}?dataId=app.yaml&group=G&show=all"))
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let detail: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
    assert_eq!(detail["content"], "a");
    assert_eq!(detail["advance"]["description"], "billing settings");
    assert_eq!(detail["advance"]["config_tags"], serde_json::json!(["prod", "billing"]));

    let resp = warp::test::request()
        .path(&format!("{BASE}/catalog?dataId=app.yaml&group=G"))
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let catalog: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
    assert_eq!(catalog["content_type"], "yaml");
    assert_eq!(catalog["use"], "runtime");
    assert_eq!(catalog["effect"], "restart");
    assert!(catalog.get("content").is_none());

    let resp = warp::test::request()
        .path(&format!("{BASE}/catalog?dataId=missing&group=G"))
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn too_many_config_tags_is_bad_request() {
    let api = routes(service());
    let tags = encode_form_value("a,b,c,d,e,f");

    let resp = warp::test::request()
        .method("POST")
        .path(BASE)
        .header("content-type", FORM)
        .body(form(&[("dataId", "app.yaml"), ("group", "G"), ("content", "a"), ("config_tags", &tags)]))
        .reply(&api)
        .await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn import_accepts_json_archive() {
    let svc = service();
    let api = routes(svc.clone());
    let archive = Archive::new(vec![ArchiveItem::new("G/a", "x")]);

    let resp = warp::test::request()
        .method("POST")
        .path(&format!("{BASE}?import=true&policy=overwrite"))
        .json(&archive)
        .reply(&api)
        .await;

    assert_eq!(resp.status(), StatusCode::OK);
    let result: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
    assert_eq!(result["succeeded"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let api = routes(service());

    let resp = warp::test::request().path("/v1/cs/other").reply(&api).await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
