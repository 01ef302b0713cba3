//! HTTP router tests driven through `tower::ServiceExt::oneshot`

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use pretty_assertions::assert_eq;
use tower::ServiceExt;

use microcms::cms::{CmsGateway, NOT_FOUND_TEXT};
use microcms::config::SiteConfig;
use microcms::server::{router, ApiResult, AppState};
use microcms::store::MemoryStore;

const CONTAINER: &str = "cms";

fn app(store: MemoryStore) -> Router {
    let gateway = CmsGateway::new(Arc::new(store), SiteConfig::default());
    router(AppState::new(gateway))
}

fn seeded() -> MemoryStore {
    let store = MemoryStore::with_container(CONTAINER);
    store.insert(CONTAINER, "MicroCMS.md", "# Home");
    store.insert(CONTAINER, "post.md", "# Hello\n\nFirst *post*.");
    store.insert(CONTAINER, "sub/deep.md", "Deep page");
    store.insert(
        CONTAINER,
        "layouts/main.html",
        "<html><body>{% BODY %}<footer>{% TIMESTAMP %}</footer></body></html>",
    );
    store.insert(CONTAINER, "layouts/plain.html", "<div class=\"plain\">{% BODY %}</div>");
    store.insert(CONTAINER, "images/logo.png", vec![0x89, b'P', b'N', b'G']);
    store
}

async fn get(app: Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

async fn get_text(app: Router, uri: &str) -> (StatusCode, String) {
    let (status, _, body) = get(app, uri).await;
    (status, String::from_utf8(body).unwrap())
}

#[tokio::test]
async fn test_root_redirects_to_home_page() {
    let (status, headers, _) = get(app(seeded()), "/").await;

    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(headers[header::LOCATION], "/page/MicroCMS");
}

#[tokio::test]
async fn test_page_renders_through_main_layout() {
    let (status, body) = get_text(app(seeded()), "/page/post").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with("<html><body><h1>Hello</h1>"));
    assert!(body.contains("<em>post</em>"));
    assert!(!body.contains("{% BODY %}"));
    assert!(!body.contains("{% TIMESTAMP %}"));
}

#[tokio::test]
async fn test_named_layout_is_used() {
    let (status, body) = get_text(app(seeded()), "/page/post?layout=plain").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with("<div class=\"plain\"><h1>Hello</h1>"));
}

#[tokio::test]
async fn test_missing_layout_falls_back_to_built_in_shell() {
    let (status, body) = get_text(app(seeded()), "/page/post?layout=nope").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with("<!DOCTYPE html>"));
    assert!(body.contains("<h1>Hello</h1>"));
}

#[tokio::test]
async fn test_page_without_name_serves_home() {
    let (status, body) = get_text(app(seeded()), "/page").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<h1>Home</h1>"));
}

#[tokio::test]
async fn test_nested_page() {
    let (status, body) = get_text(app(seeded()), "/page/sub/deep").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Deep page"));
}

#[tokio::test]
async fn test_wrapped_page_returns_markdown_json() {
    let (status, body) = get_text(app(seeded()), "/page/post?wrapped=true").await;

    assert_eq!(status, StatusCode::OK);
    let result: ApiResult = serde_json::from_str(&body).unwrap();
    assert_eq!(result.result_code, "success");
    assert_eq!(result.result_object, "# Hello\n\nFirst *post*.");

    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert!(json.get("resultObject").is_some());
}

#[tokio::test]
async fn test_missing_page_uses_error_page() {
    let store = seeded();
    store.insert(CONTAINER, "error.md", "# Oops");

    let (status, body) = get_text(app(store), "/page/nothing-here").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("<h1>Oops</h1>"));
}

#[tokio::test]
async fn test_missing_page_without_error_page() {
    let (status, body) = get_text(app(seeded()), "/page/nothing-here").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains(NOT_FOUND_TEXT));
}

#[tokio::test]
async fn test_image_is_served_with_content_type() {
    let (status, headers, body) = get(app(seeded()), "/image/logo.png").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "image/png");
    assert_eq!(body, vec![0x89, b'P', b'N', b'G']);
}

#[tokio::test]
async fn test_missing_image_is_not_found() {
    let (status, body) = get_text(app(seeded()), "/image/nope.png").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["resultCode"], "failure");
}

#[tokio::test]
async fn test_list_shows_pages_only() {
    let (status, body) = get_text(app(seeded()), "/list?layout=plain").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with("<div class=\"plain\"><ul>"));
    assert!(body.contains("<a href=\"/page/post\">post</a>"));
    assert!(body.contains("<a href=\"/page/sub/deep\">sub/deep</a>"));
    assert!(!body.contains("logo"));
    assert!(!body.contains("layouts/"));
}

#[tokio::test]
async fn test_list_without_layout_is_bare() {
    let store = MemoryStore::with_container(CONTAINER);
    store.insert(CONTAINER, "a.md", "a");

    let (status, body) = get_text(app(store), "/list").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "<ul>\n<li><a href=\"/page/a\">a</a></li>\n</ul>\n");
}

#[tokio::test]
async fn test_ping_echoes_message() {
    let (status, body) = get_text(app(seeded()), "/ping?msg=hello").await;

    assert_eq!(status, StatusCode::OK);
    let result: ApiResult = serde_json::from_str(&body).unwrap();
    assert!(result.result_object.contains("Message : hello"));
    assert!(result.result_object.contains(microcms::VERSION));
}
