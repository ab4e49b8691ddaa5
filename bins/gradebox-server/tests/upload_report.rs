//! Upload, result delivery and report polling through the HTTP surface.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Method, Request, StatusCode};
use futures_util::StreamExt;
use gradebox_common::QueueClient;
use gradebox_server::consumer;
use serde_json::Value;
use uuid::Uuid;

use common::{
    app, app_with, body_bytes, body_string, get, send, upload, wait_for_result, StubGrader,
    TestOptions, REPORT_CHANNEL, WORK_CHANNEL,
};

const NOTEBOOK: &[u8] = br#"{"cells":[],"metadata":{"kernelspec":{"name":"python3"}}}"#;

fn report_url(response: &axum::http::Response<Body>) -> String {
    response
        .headers()
        .get("x-report-url")
        .expect("X-Report-Url header")
        .to_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn upload_returns_uuid_and_publishes_notebook() {
    let app = app();
    let mut work = app.queue.receive(WORK_CHANNEL).await.unwrap();

    let response = upload(app.router(), "/upload", NOTEBOOK, &[]).await;
    assert_eq!(response.status(), StatusCode::OK);

    let url = report_url(&response);
    let id = url.strip_prefix("/report/").unwrap().to_string();
    let parsed = Uuid::parse_str(&id).unwrap();
    assert_eq!(parsed.get_version_num(), 4);

    let page = body_string(response).await;
    assert!(page.contains("Upload succeeded"));
    assert!(page.contains(&url));

    let published: Value = serde_json::from_slice(&work.next().await.unwrap()).unwrap();
    assert_eq!(published["metadata"]["submission_id"], id.as_str());
    assert_eq!(published["metadata"]["user_hash"], "unknown");
    assert_eq!(published["metadata"]["kernelspec"]["name"], "python3");
    assert!(app.dir.path().join(format!("{}.ipynb", id)).exists());
}

#[tokio::test]
async fn upload_txt_answers_with_report_url() {
    let app = app();
    let response = upload(app.router(), "/upload.txt", NOTEBOOK, &[]).await;
    assert_eq!(response.status(), StatusCode::OK);

    let url = report_url(&response);
    assert_eq!(body_string(response).await, url);
}

#[tokio::test]
async fn upload_passes_requested_exercise() {
    let app = app();
    let mut work = app.queue.receive(WORK_CHANNEL).await.unwrap();

    let request = common::multipart_request("/upload")
        .body(Body::from(common::multipart_body(NOTEBOOK, Some("ex2"))))
        .unwrap();
    let response = send(app.router(), request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let published: Value = serde_json::from_slice(&work.next().await.unwrap()).unwrap();
    assert_eq!(published["metadata"]["requested_exercise_id"], "ex2");
}

#[tokio::test]
async fn published_result_is_served_rendered_and_raw() {
    let app = app();
    let inbound = app.queue.receive(REPORT_CHANNEL).await.unwrap();
    let consumer = consumer::spawn(app.store().clone(), inbound);

    let message = br#"{"submission_id":"S1","ex1":{"report":"<p>ok</p>"}}"#;
    app.queue.post(REPORT_CHANNEL, message).await.unwrap();
    wait_for_result(app.store(), "S1").await;

    let response = get(app.router(), "/report/S1").await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_string(response).await;
    assert!(page.contains("<p>ok</p>"));
    assert!(page.contains("<h2>ex1</h2>"));

    let response = get(app.router(), "/report/S1.txt").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    assert_eq!(body_bytes(response).await, message.to_vec());

    consumer.stop().await;
}

#[tokio::test]
async fn pending_report_serves_wait_page() {
    let app = app();

    let mut reloads = Vec::new();
    for _ in 0..3 {
        let response = get(app.router(), "/report/pending-1").await;
        assert_eq!(response.status(), StatusCode::OK);
        let page = body_string(response).await;
        assert!(page.contains("Please wait"));

        let marker = "onload=\"refresh(";
        let start = page.find(marker).unwrap() + marker.len();
        let end = start + page[start..].find(')').unwrap();
        reloads.push(page[start..end].parse::<u64>().unwrap());
    }

    assert_eq!(reloads[0], 500);
    assert!(reloads.windows(2).all(|w| w[0] <= w[1]), "{:?}", reloads);
}

#[tokio::test]
async fn empty_result_reports_no_checks() {
    let app = app();
    app.store()
        .write_result("S2", br#"{"submission_id":"S2"}"#)
        .await
        .unwrap();

    let page = body_string(get(app.router(), "/report/S2").await).await;
    assert!(page.contains("No checks were found"));
}

#[tokio::test]
async fn concurrent_uploads_get_distinct_ids() {
    const N: usize = 16;
    let app = app();
    let mut work = app.queue.receive(WORK_CHANNEL).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..N {
        let router = app.router();
        tasks.push(tokio::spawn(async move {
            let notebook = format!(r#"{{"cells":[],"n":{}}}"#, i);
            let response = upload(router, "/upload.txt", notebook.as_bytes(), &[]).await;
            assert_eq!(response.status(), StatusCode::OK);
            body_string(response).await
        }));
    }

    let mut urls = HashSet::new();
    for task in tasks {
        urls.insert(task.await.unwrap());
    }
    assert_eq!(urls.len(), N);

    let mut published = HashSet::new();
    for _ in 0..N {
        let message: Value = serde_json::from_slice(&work.next().await.unwrap()).unwrap();
        published.insert(message["metadata"]["submission_id"].as_str().unwrap().to_string());
    }
    assert_eq!(published.len(), N);
    for id in &published {
        assert!(urls.contains(&format!("/report/{}", id)));
    }
}

#[tokio::test]
async fn non_multipart_upload_is_rejected() {
    let app = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/upload")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(NOTEBOOK))
        .unwrap();
    let response = send(app.router(), request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn invalid_notebook_is_rejected() {
    let app = app();
    let response = upload(app.router(), "/upload", b"this is not json", &[]).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(std::fs::read_dir(app.dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn missing_notebook_field_is_rejected() {
    let app = app();
    let body = "--gradebox-test-boundary\r\nContent-Disposition: form-data; name=\"exercise_id\"\r\n\r\nex1\r\n--gradebox-test-boundary--\r\n";
    let request = common::multipart_request("/upload")
        .body(Body::from(body))
        .unwrap();
    let response = send(app.router(), request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let app = app();
    let mut notebook = br#"{"padding":""#.to_vec();
    notebook.extend(std::iter::repeat(b'x').take(2 << 20));
    notebook.extend_from_slice(br#""}"#);

    let response = upload(app.router(), "/upload", &notebook, &[]).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn invalid_report_id_is_rejected() {
    let app = app();
    let response = get(app.router(), "/report/..").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn local_grading_renders_immediately() {
    let app = app_with(TestOptions {
        grader: Some(Arc::new(StubGrader(r#"{"ex1":{"report":"<p>graded</p>"}}"#))),
        ..TestOptions::default()
    });

    let response = upload(app.router(), "/upload", NOTEBOOK, &[]).await;
    assert_eq!(response.status(), StatusCode::OK);
    let url = report_url(&response);
    assert!(body_string(response).await.contains("<p>graded</p>"));

    let raw = upload(app.router(), "/upload.txt", NOTEBOOK, &[]).await;
    let raw: Value = serde_json::from_slice(&body_bytes(raw).await).unwrap();
    assert_eq!(raw["ex1"]["report"], "<p>graded</p>");

    // the first result is already stored and servable
    let page = body_string(get(app.router(), &url).await).await;
    assert!(page.contains("<p>graded</p>"));
}

#[tokio::test]
async fn cors_preflight_exposes_report_url() {
    let app = app_with(TestOptions {
        allow_cors: true,
        ..TestOptions::default()
    });
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/upload")
        .header("Origin", "https://notebooks.example")
        .header("Access-Control-Request-Method", "POST")
        .body(Body::empty())
        .unwrap();
    let response = send(app.router(), request).await;

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(
        headers["access-control-allow-origin"],
        "https://notebooks.example"
    );
    assert_eq!(headers["access-control-allow-credentials"], "true");
    assert_eq!(headers["access-control-max-age"], "1800");

    let response = upload(
        app.router(),
        "/upload",
        NOTEBOOK,
        &[("Origin", "https://notebooks.example")],
    )
    .await;
    let exposed = response.headers()["access-control-expose-headers"]
        .to_str()
        .unwrap()
        .to_ascii_lowercase();
    assert!(exposed.contains("x-report-url"));
}

#[tokio::test]
async fn static_endpoints() {
    let app = app();

    let response = get(app.router(), "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get(app.router(), "/favicon.ico").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "image/x-icon");

    let page = body_string(get(app.router(), "/").await).await;
    assert!(page.contains("name=\"notebook\""));

    let metrics = body_string(get(app.router(), "/metrics").await).await;
    assert!(metrics.contains("gradebox_"));
}

#[tokio::test]
async fn upload_directory_is_served() {
    let app = app();
    std::fs::write(app.dir.path().join("abc.txt"), b"raw").unwrap();

    let response = get(app.router(), "/uploads/abc.txt").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"raw".to_vec());
}
