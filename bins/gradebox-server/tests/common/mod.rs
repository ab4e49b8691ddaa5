//! Shared fixtures for the server integration tests.
//!
//! Builds the real router over a temporary upload directory, an in-memory
//! queue and stub collaborators, so tests run without Redis or an identity
//! provider.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::header::{CONTENT_TYPE, SET_COOKIE};
use axum::http::{Request, Response};
use axum::Router;
use tempfile::TempDir;
use tower::ServiceExt;

use gradebox_common::memory::MemoryQueue;
use gradebox_server::auth::{
    AuthError, AuthGateway, BearerAuth, CookieSigner, IdentityProvider, SessionAuth, TokenIssuer,
    UserProfile,
};
use gradebox_server::grader::{GradeError, Grader};
use gradebox_server::ingest::{Dispatch, IngestService};
use gradebox_server::poll::{PollPolicy, PollTracker};
use gradebox_server::store::ResultStore;
use gradebox_server::{build_router, AppState, HttpOptions};

pub const WORK_CHANNEL: &str = "autograde";
pub const REPORT_CHANNEL: &str = "report";
pub const SALT: &str = "test-salt";
pub const COOKIE_KEY: &[u8] = b"integration-test-cookie-key-0123";

pub const PRIVATE_PEM: &[u8] = include_bytes!("../fixtures/jwt_private.pem");
pub const PUBLIC_PEM: &[u8] = include_bytes!("../fixtures/jwt_public.pem");

const BOUNDARY: &str = "gradebox-test-boundary";
const BODY_LIMIT: usize = 16 * 1024 * 1024;

/// Identity provider that trusts the authorization code: the code *is* the
/// email address.
pub struct StubProvider;

#[async_trait]
impl IdentityProvider for StubProvider {
    fn authorize_url(&self, state: &str) -> String {
        format!("https://idp.test/authorize?state={}", state)
    }

    async fn fetch_profile(&self, code: &str) -> Result<UserProfile, AuthError> {
        Ok(UserProfile {
            email: code.to_string(),
            name: None,
        })
    }
}

/// Grader returning a fixed result document.
pub struct StubGrader(pub &'static str);

#[async_trait]
impl Grader for StubGrader {
    async fn grade(&self, _notebook: &[u8]) -> Result<Vec<u8>, GradeError> {
        Ok(self.0.as_bytes().to_vec())
    }
}

#[derive(Default)]
pub struct TestOptions {
    pub session: bool,
    pub bearer: bool,
    pub allowed_users: Vec<&'static str>,
    pub grader: Option<Arc<dyn Grader>>,
    pub allow_cors: bool,
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub queue: Arc<MemoryQueue>,
    pub dir: TempDir,
}

impl TestApp {
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    pub fn store(&self) -> &ResultStore {
        &self.state.store
    }
}

pub fn token_issuer() -> TokenIssuer {
    TokenIssuer::from_rsa_pem(PRIVATE_PEM, PUBLIC_PEM, Duration::from_secs(3600)).unwrap()
}

/// App with authentication disabled and queue dispatch.
pub fn app() -> TestApp {
    app_with(TestOptions::default())
}

pub fn app_with(options: TestOptions) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let store = ResultStore::new(dir.path());
    let queue = Arc::new(MemoryQueue::new());

    let session = options.session.then(|| SessionAuth {
        cookies: CookieSigner::new(COOKIE_KEY, false).unwrap(),
        provider: Arc::new(StubProvider),
    });
    let bearer = options.bearer.then(|| BearerAuth {
        tokens: token_issuer(),
    });
    let allowed: HashSet<String> = options.allowed_users.iter().map(|s| s.to_string()).collect();
    let auth = AuthGateway::new(SALT, allowed, session, bearer);

    let dispatch = match options.grader {
        Some(grader) => Dispatch::Local(grader),
        None => Dispatch::Queue {
            client: queue.clone(),
            channel: WORK_CHANNEL.to_string(),
        },
    };

    let state = Arc::new(AppState {
        auth,
        ingest: IngestService::new(store.clone(), dispatch, None),
        store,
        polls: Arc::new(PollTracker::new(PollPolicy::default())),
        options: HttpOptions {
            allow_cors: options.allow_cors,
            static_dir: None,
        },
    });

    TestApp { state, queue, dir }
}

pub async fn send(app: Router, request: Request<Body>) -> Response<Body> {
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), BODY_LIMIT).await.unwrap().to_vec()
}

pub async fn body_string(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

/// multipart/form-data body with a `notebook` file field and an optional
/// `exercise_id` field.
pub fn multipart_body(notebook: &[u8], exercise_id: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"notebook\"; filename=\"nb.ipynb\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(notebook);
    body.extend_from_slice(b"\r\n");
    if let Some(exercise_id) = exercise_id {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"exercise_id\"\r\n\r\n{exercise_id}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_request(uri: &str) -> axum::http::request::Builder {
    Request::post(uri).header(
        CONTENT_TYPE,
        format!("multipart/form-data; boundary={BOUNDARY}"),
    )
}

/// POST a notebook to `uri` with extra headers.
pub async fn upload(app: Router, uri: &str, notebook: &[u8], headers: &[(&str, &str)]) -> Response<Body> {
    let mut builder = multipart_request(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder.body(Body::from(multipart_body(notebook, None))).unwrap();
    send(app, request).await
}

/// `name=value` pairs from every Set-Cookie header, attributes dropped.
pub fn cookie_pairs(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .map(str::to_string)
        .collect()
}

/// Wait until the consumer has stored a result for `id`.
pub async fn wait_for_result(store: &ResultStore, id: &str) -> Vec<u8> {
    for _ in 0..200 {
        if let Some(result) = store.read_result(id).await.unwrap() {
            return result;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no result stored for {}", id);
}
