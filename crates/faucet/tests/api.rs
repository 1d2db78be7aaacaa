//! HTTP contract tests

mod common;

use axum::body::{to_bytes, Body};
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{harness, ip, test_config, Harness, SOLUTION};
use drip_faucet::api::{self, BANNER};
use drip_faucet::FaucetConfig;
use serde_json::{json, Value};
use std::net::SocketAddr;
use tower::ServiceExt;

fn app(h: &Harness) -> Router {
    api::router(h.service.clone()).layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))))
}

async fn post(app: Router, path: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json");
    let request = match body {
        Some(body) => request.body(Body::from(body.to_string())).unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_request_and_confirm_drip() {
    let h = harness();

    let (status, body) = post(app(&h), "/request-drip", Some(json!({ "address": "xet:alice" }))).await;
    assert_eq!(status, StatusCode::OK);
    let session_id = body["sessionId"].as_str().unwrap().to_string();
    assert!(body["captcha"].as_str().unwrap().starts_with("<svg"));

    let (status, body) = post(
        app(&h),
        "/confirm-drip",
        Some(json!({ "sessionId": session_id, "solution": SOLUTION.to_uppercase() })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));
}

#[tokio::test]
async fn test_errors_are_bad_request_with_message() {
    let h = harness();

    let (status, body) = post(app(&h), "/request-drip", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing field \"address\".");

    let (status, body) = post(
        app(&h),
        "/confirm-drip",
        Some(json!({ "sessionId": "nope", "solution": "abc" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "The session id is invalid.");

    let (status, body) = post(app(&h), "/confirm-drip", Some(json!({ "solution": 5 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_forwarded_for_is_rate_limited() {
    let config = drip_faucet::FaucetConfig {
        ip_max_requests: 1,
        ..common::test_config()
    };
    let h = common::harness_with(config, 1_000_000);

    let request = |address: &str| {
        Request::builder()
            .method("POST")
            .uri("/request-drip")
            .header("content-type", "application/json")
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(Body::from(json!({ "address": address }).to_string()))
            .unwrap()
    };

    let response = app(&h).oneshot(request("xet:a")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let response = app(&h).oneshot(request("xet:b")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // the socket peer itself is still allowed
    assert!(h.service.request_drip("xet:c", ip(1)).await.is_ok());
}

#[tokio::test]
async fn test_stats_and_txs() {
    let h = harness();

    let (status, body) = post(app(&h), "/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["drips"], 0);
    assert_eq!(body["last_drip"], Value::Null);
    assert_eq!(body["drip_amount"], common::DRIP_AMOUNT);

    let challenge = h.service.request_drip("xet:alice", ip(1)).await.unwrap();
    h.service.confirm_drip(&challenge.session_id, SOLUTION).await.unwrap();
    h.service.dispatcher().run_cycle().await;

    let (status, body) = post(app(&h), "/txs", None).await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["address"], "xet:alice");
    for field in ["id", "tx_hash", "amount", "timestamp"] {
        assert!(rows[0].get(field).is_some(), "missing {}", field);
    }

    let (_, body) = post(app(&h), "/txs", Some(json!({ "page": 2, "size": 10 }))).await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_path_returns_banner() {
    let h = harness();

    let response = app(&h)
        .oneshot(Request::builder().uri("/anything").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], BANNER.as_bytes());
}

#[tokio::test]
async fn test_get_on_post_routes_returns_banner() {
    let h = harness();

    for path in ["/stats", "/txs", "/request-drip", "/confirm-drip"] {
        let response = app(&h)
            .oneshot(Request::builder().method("GET").uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "GET {}", path);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], BANNER.as_bytes());
    }
}

#[tokio::test]
async fn test_bind_listener_resolves_hostname() {
    let config = FaucetConfig {
        host: "localhost".to_string(),
        port: 0,
        ..test_config()
    };

    let listener = api::bind_listener(&config).await.unwrap();
    assert!(listener.local_addr().unwrap().ip().is_loopback());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let h = harness();
    h.service.request_drip("xet:alice", ip(1)).await.unwrap();

    let response = app(&h)
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("faucet_challenges_issued_total 1"));
}
