//! HTTP-level tests for the conversion service, driven through the router

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use common::{build_pdf, encrypted_pdf, numbered_pdf, ruled_table_page};
use pdf2md_server::{server::create_router, RateLimit, ServiceConfig};
use serde_json::Value;
use tower::ServiceExt;

const BOUNDARY: &str = "X-PDF2MD-BOUNDARY";

fn test_config() -> ServiceConfig {
    ServiceConfig {
        workers: 2,
        max_file_size_mb: 1,
        max_pages: 2,
        rate_limit: "100/minute".parse().unwrap(),
        ..ServiceConfig::default()
    }
}

fn router(config: ServiceConfig) -> Router {
    create_router(config).expect("Failed to build router")
}

fn multipart_body(field: &str, filename: &str, data: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\n\
Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
Content-Type: application/pdf\r\n\
\r\n"
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn convert_request() -> axum::http::request::Builder {
    Request::builder()
        .method("POST")
        .uri("/convert")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
}

fn upload(field: &str, filename: &str, data: &[u8]) -> Request<Body> {
    let body = multipart_body(field, filename, data);
    convert_request()
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body))
        .expect("Failed to build request")
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value, HeaderMap) {
    let response = router.clone().oneshot(request).await.expect("Request failed");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), 10_000_000)
        .await
        .expect("Failed to read body");
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value, headers)
}

fn detail(value: &Value) -> &str {
    value.get("detail").and_then(Value::as_str).unwrap_or_default()
}

#[tokio::test]
async fn test_convert_success() {
    let app = router(test_config());
    let (status, body, _) = send(&app, upload("file", "report.pdf", &numbered_pdf(2))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pages_processed"], 2);
    assert!(body["processing_time_sec"].as_f64().unwrap() >= 0.0);
    assert_eq!(
        body["content"],
        concat!(
            "## Page 1\n\n### Text Content\nThis is the body of page 1\n---\n",
            "## Page 2\n\n### Text Content\nThis is the body of page 2"
        )
    );
}

#[tokio::test]
async fn test_convert_table_page() {
    let app = router(test_config());
    let pdf = build_pdf(vec![ruled_table_page()]);
    let (status, body, _) = send(&app, upload("file", "table.pdf", &pdf)).await;

    assert_eq!(status, StatusCode::OK);
    let content = body["content"].as_str().unwrap();
    assert!(content.contains("| Region | Revenue |\n| --- | --- |\n| North | 1250000 |"));
}

#[tokio::test]
async fn test_declared_size_over_limit_rejected() {
    let app = router(test_config());
    let request = convert_request()
        .header(header::CONTENT_LENGTH, 2 * 1024 * 1024)
        .body(Body::from(multipart_body("file", "big.pdf", b"%PDF-1.5")))
        .unwrap();

    let (status, body, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(detail(&body), "File too large. Maximum allowed size is 1MB.");
}

#[tokio::test]
async fn test_undeclared_size_over_limit_rejected() {
    let app = router(test_config());

    // Slightly over the file limit but within the multipart allowance
    let data = vec![b'x'; 1024 * 1024 + 10];
    let request = convert_request()
        .body(Body::from(multipart_body("file", "big.pdf", &data)))
        .unwrap();
    let (status, body, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(detail(&body), "File too large. Maximum allowed size is 1MB.");

    // Far over: the body limit trips while reading the field
    let data = vec![b'x'; 2 * 1024 * 1024];
    let request = convert_request()
        .body(Body::from(multipart_body("file", "big.pdf", &data)))
        .unwrap();
    let (status, body, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(detail(&body), "File too large. Maximum allowed size is 1MB.");
}

#[tokio::test]
async fn test_too_many_pages_rejected() {
    let app = router(test_config());
    let (status, body, _) = send(&app, upload("file", "long.pdf", &numbered_pdf(3))).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(detail(&body), "PDF too long (3 pages). Max is 2.");
}

#[tokio::test]
async fn test_rate_limit_enforced_per_client() {
    let app = router(ServiceConfig {
        rate_limit: RateLimit::default(),
        ..test_config()
    });
    let from = |ip: &str| {
        let body = multipart_body("file", "notes.txt", b"hello");
        convert_request()
            .header("x-forwarded-for", ip)
            .body(Body::from(body))
            .unwrap()
    };

    assert_eq!(send(&app, from("198.51.100.1")).await.0, StatusCode::BAD_REQUEST);
    assert_eq!(send(&app, from("198.51.100.1")).await.0, StatusCode::BAD_REQUEST);

    let (status, body, headers) = send(&app, from("198.51.100.1")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(detail(&body), "Rate limit exceeded: 2 per 1 minute");
    assert!(headers.contains_key(header::RETRY_AFTER));

    // Another client has its own budget
    assert_eq!(send(&app, from("198.51.100.2")).await.0, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_rate_limit_only_guards_convert() {
    let app = router(ServiceConfig {
        rate_limit: "1/minute".parse().unwrap(),
        ..test_config()
    });

    for _ in 0..3 {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        assert_eq!(send(&app, request).await.0, StatusCode::OK);
    }
}

#[tokio::test]
async fn test_non_pdf_filename_rejected() {
    let app = router(test_config());
    let (status, body, _) = send(&app, upload("file", "notes.txt", &numbered_pdf(1))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(detail(&body), "Only PDF files are allowed.");
}

#[tokio::test]
async fn test_missing_file_field() {
    let app = router(test_config());
    let (status, body, _) = send(&app, upload("document", "report.pdf", &numbered_pdf(1))).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(detail(&body), "Field 'file' is required.");
}

#[tokio::test]
async fn test_unreadable_pdf_is_generic_500() {
    let app = router(test_config());
    let (status, body, _) = send(&app, upload("file", "broken.pdf", b"not really a pdf")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(detail(&body), "An error occurred during conversion.");
}

#[tokio::test]
async fn test_non_multipart_request_gets_json_error() {
    let app = router(test_config());
    let request = Request::builder()
        .method("POST")
        .uri("/convert")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"file": "report.pdf"}"#))
        .unwrap();

    let (status, body, headers) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    assert!(
        detail(&body).starts_with("Invalid multipart request: "),
        "unexpected body: {}",
        body
    );
}

#[tokio::test]
async fn test_multipart_without_boundary_gets_json_error() {
    let app = router(test_config());
    let request = Request::builder()
        .method("POST")
        .uri("/convert")
        .header(header::CONTENT_TYPE, "multipart/form-data")
        .body(Body::from(multipart_body("file", "report.pdf", &numbered_pdf(1))))
        .unwrap();

    let (status, body, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(detail(&body).starts_with("Invalid multipart request: "));
}

#[tokio::test]
async fn test_encrypted_upload_rejected() {
    let app = router(test_config());
    let (status, body, _) = send(&app, upload("file", "locked.pdf", &encrypted_pdf())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(detail(&body), "Encrypted PDFs are not supported.");
}

#[tokio::test]
async fn test_broken_page_still_converts_over_http() {
    let app = router(ServiceConfig {
        max_pages: 5,
        ..test_config()
    });
    let pdf = common::pdf_with_broken_middle_page(common::Breakage::MissingStream);
    let (status, body, _) = send(&app, upload("file", "damaged.pdf", &pdf)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pages_processed"], 3);
    let content = body["content"].as_str().unwrap();
    assert!(content.contains("## Page 2\n\nProcessing error: "));
    assert!(content.ends_with("This is the body of page 3"));
}

#[tokio::test]
async fn test_health_and_info() {
    let app = router(test_config());

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

    let request = Request::builder().uri("/info").body(Body::empty()).unwrap();
    let (status, body, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "PDF to Markdown Converter");
    assert_eq!(body["limits"]["max_file_size_mb"], 1);
    assert_eq!(body["limits"]["max_pages"], 2);
    assert_eq!(body["limits"]["rate_limit"], "100 per 1 minute");
}
