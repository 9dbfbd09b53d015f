//! Try-on proxy against a mocked upstream

mod common;

use axum::http::StatusCode;
use mockito::Matcher;
use serde_json::{json, Value};
use std::io::Write;
use std::time::Duration;
use swapstreet::models::TryOnConfig;
use swapstreet::AppConfig;

use common::{error_code, TestApp, TestUser};

const PERSON: &str = "cGVyc29uLXBob3Rv"; // "person-photo"

fn config(server: &mockito::ServerGuard, per_hour: u32) -> AppConfig {
    AppConfig {
        tryon: Some(TryOnConfig {
            api_url: format!("{}/v1/tryon", server.url()),
            api_key: Some("upstream-key".to_string()),
            timeout: Duration::from_secs(5),
        }),
        tryon_requests_per_hour: per_hour,
        ..AppConfig::for_testing()
    }
}

async fn setup(server: &mockito::ServerGuard, per_hour: u32) -> (TestApp, TestUser, Value) {
    setup_with(config(server, per_hour)).await
}

async fn setup_with(config: AppConfig) -> (TestApp, TestUser, Value) {
    let app = TestApp::with_config(config);
    let seller = app.register("seller").await;
    let listing = app.create_listing(&seller, "Denim jacket", 4500).await;
    let shopper = app.register("shopper").await;
    (app, shopper, listing)
}

#[tokio::test]
async fn test_tryon_forwards_images_and_returns_rendering() {
    let mut server = mockito::Server::new_async().await;
    let upstream = server
        .mock("POST", "/v1/tryon")
        .match_header("authorization", "Bearer upstream-key")
        .match_body(Matcher::PartialJson(json!({
            "person_image": PERSON,
            "category": "jackets",
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"image":"cmVuZGVyZWQ="}"#)
        .create_async()
        .await;

    let (app, shopper, listing) = setup(&server, 10).await;

    let (status, body) = app
        .post(
            "/api/tryon",
            Some(&shopper.access_token),
            json!({
                "listing_id": listing["id"],
                "person_image": format!("data:image/jpeg;base64,{}", PERSON),
            }),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["listing_id"], listing["id"]);
    assert_eq!(body["data"]["image"], "cmVuZGVyZWQ=");
    assert!(body["data"].get("image_url").is_none());
    upstream.assert_async().await;
}

#[tokio::test]
async fn test_tryon_upstream_failures_map_to_502() {
    let mut server = mockito::Server::new_async().await;
    let (app, shopper, listing) = setup(&server, 10).await;
    let request = json!({ "listing_id": listing["id"], "person_image": PERSON });

    let failing = server
        .mock("POST", "/v1/tryon")
        .with_status(500)
        .with_body("model overloaded")
        .create_async()
        .await;

    let (status, body) = app.post("/api/tryon", Some(&shopper.access_token), request.clone()).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(error_code(&body), "TRYON_UPSTREAM_ERROR");
    failing.assert_async().await;
    failing.remove_async().await;

    // A 200 without any image is just as unusable
    server
        .mock("POST", "/v1/tryon")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("{}")
        .create_async()
        .await;

    let (status, body) = app.post("/api/tryon", Some(&shopper.access_token), request).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(error_code(&body), "TRYON_UPSTREAM_ERROR");
}

#[tokio::test]
async fn test_tryon_slow_upstream_maps_to_504() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/tryon")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_chunked_body(|w| {
            std::thread::sleep(Duration::from_secs(3));
            w.write_all(br#"{"image":"bGF0ZQ=="}"#)
        })
        .create_async()
        .await;

    let mut config = config(&server, 10);
    if let Some(tryon) = config.tryon.as_mut() {
        tryon.timeout = Duration::from_millis(500);
    }
    let (app, shopper, listing) = setup_with(config).await;

    let (status, body) = app
        .post(
            "/api/tryon",
            Some(&shopper.access_token),
            json!({ "listing_id": listing["id"], "person_image": PERSON }),
        )
        .await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT, "{}", body);
    assert_eq!(error_code(&body), "EXTERNAL_TIMEOUT");
}

#[tokio::test]
async fn test_tryon_quota_and_input_checks() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/tryon")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"image_url":"https://cdn.example.com/render.png"}"#)
        .create_async()
        .await;

    let (app, shopper, listing) = setup(&server, 1).await;

    let (status, body) = app
        .post(
            "/api/tryon",
            Some(&shopper.access_token),
            json!({ "listing_id": listing["id"], "person_image": PERSON, "image_index": 3 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);

    let (status, _) = app
        .post(
            "/api/tryon",
            Some(&shopper.access_token),
            json!({ "listing_id": listing["id"], "person_image": "***" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Rejected requests do not consume the quota
    let request = json!({ "listing_id": listing["id"], "person_image": PERSON });
    let (status, body) = app.post("/api/tryon", Some(&shopper.access_token), request.clone()).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["image_url"], "https://cdn.example.com/render.png");

    let (status, body) = app.post("/api/tryon", Some(&shopper.access_token), request).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(error_code(&body), "API_RATE_LIMITED");
}
