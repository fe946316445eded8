use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use listing_scraper::api::{build_router, AppState, NO_VALID_SOURCE};
use listing_scraper::browser::fixture::{FixtureBrowser, FixturePage};
use listing_scraper::jitter::Jitter;
use listing_scraper::model::ScrapeOptions;
use listing_scraper::orchestrator::Scraper;
use serde_json::{json, Value};
use tower::ServiceExt;

const LISTING: &str = "https://www.amazon.in/s?k=laptop";
const LISTING_QUERY: &str = "https%3A%2F%2Fwww.amazon.in%2Fs%3Fk%3Dlaptop";

fn amazon_listing() -> FixturePage {
    FixturePage::new(
        r#"<html><body><div class="s-main-slot">
          <div class="s-result-item" data-component-type="s-search-result" data-asin="B0C1">
            <h2><a href="/dp/B0C1"><span>Acer Aspire Lite Intel Core i5</span></a></h2>
            <img class="s-image" src="https://m.media-amazon.com/images/I/acer.jpg">
            <span class="a-price"><span class="a-offscreen">₹52,990</span></span>
            <span class="a-price a-text-price"><span class="a-offscreen">₹79,990</span></span>
          </div>
          <div class="s-result-item" data-component-type="s-search-result" data-asin="B0C2">
            <h2><a href="/dp/B0C2"><span>ASUS Vivobook 15</span></a></h2>
            <span class="a-price"><span class="a-offscreen">₹34,990</span></span>
          </div>
        </div></body></html>"#,
    )
}

fn app(fixture: &FixtureBrowser) -> Router {
    let scraper = Scraper::new(Arc::new(fixture.clone()), ScrapeOptions::without_delays())
        .with_jitter(Jitter::seeded(21));
    build_router(AppState {
        scraper: Arc::new(scraper),
        max_pages_cap: 10,
    })
}

async fn get(app: Router, uri: &str) -> (StatusCode, header::HeaderMap, Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::ORIGIN, "https://dashboard.example")
        .body(Body::empty())
        .expect("request builder must not fail");
    let response = app.oneshot(request).await.expect("handler should respond");
    let status = response.status();
    let headers = response.headers().clone();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("body must be collected")
        .to_bytes();
    let value = serde_json::from_slice(&body)
        .unwrap_or_else(|err| panic!("invalid json: {err}; body={body:?}"));
    (status, headers, value)
}

#[tokio::test]
async fn healthz_reports_ok() {
    let (status, _, body) = get(app(&FixtureBrowser::new()), "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn disallowed_host_is_rejected_before_launching() {
    let fixture = FixtureBrowser::new();
    let (status, headers, body) =
        get(app(&fixture), "/scrape?amazon_url=https%3A%2F%2Fevil.com").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"ok": false, "error": NO_VALID_SOURCE}));
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(headers[header::CONTENT_TYPE], "application/json; charset=utf-8");
    assert_eq!(fixture.launches(), 0);
}

#[tokio::test]
async fn non_numeric_max_pages_is_a_bad_request() {
    let uri = format!("/scrape?amazon_url={LISTING_QUERY}&max_pages=lots");
    let (status, _, body) = get(app(&FixtureBrowser::new()), &uri).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], json!(false));
}

#[tokio::test]
async fn malformed_query_string_gets_the_json_envelope() {
    let fixture = FixtureBrowser::new();
    let uri = format!("/scrape?amazon_url={LISTING_QUERY}&amazon_url=x");
    let (status, headers, body) = get(app(&fixture), &uri).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(headers[header::CONTENT_TYPE], "application/json; charset=utf-8");
    assert_eq!(body["ok"], json!(false));
    let message = body["error"].as_str().unwrap_or_default();
    assert!(message.contains("amazon_url"), "{message}");
    assert_eq!(fixture.launches(), 0);
}

#[tokio::test]
async fn amazon_listing_end_to_end() {
    let fixture = FixtureBrowser::new().with_page(LISTING, amazon_listing());
    let uri = format!("/scrape?amazon_url={LISTING_QUERY}&max_pages=1&pdp_prices=0");

    let (status, headers, body) = get(app(&fixture), &uri).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(body["ok"], json!(true));
    assert_eq!(body["count"], json!(2));

    let rows = body["rows"].as_array().expect("rows array");
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row["platform"] == json!("amazon")));
    assert_eq!(rows[0]["list_position"], json!(1));
    assert_eq!(rows[0]["brand_guess"], json!("Acer"));
    assert_eq!(rows[0]["discount_percent"], json!(33.8));
    assert_eq!(rows[1]["mrp"], Value::Null);
    assert_eq!(rows[1]["discount_percent"], Value::Null);
    assert_eq!(rows[1]["rating"], Value::Null);
    assert_eq!(body["captcha"], json!({"amazon": false, "flipkart": false}));

    assert_eq!(fixture.pages_opened(), 1);
    assert_eq!(fixture.browser_closes(), 1);
}

#[tokio::test]
async fn launch_failure_is_a_server_error() {
    let fixture = FixtureBrowser::new().failing_launch();
    let uri = format!("/api/scrape?amazon_url={LISTING_QUERY}");
    let (status, _, body) = get(app(&fixture), &uri).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["ok"], json!(false));
    let message = body["error"].as_str().unwrap_or_default();
    assert!(message.contains("failed to launch browser"), "{message}");
}

#[tokio::test]
async fn openapi_document_is_served() {
    let (status, _, body) = get(app(&FixtureBrowser::new()), "/api-docs/openapi.json").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/scrape"].is_object());
}
