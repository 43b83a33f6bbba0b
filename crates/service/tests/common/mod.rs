#![allow(dead_code)]

use std::collections::HashSet;

use axum::body::Body;
use axum::Router;
use http::{Request, Response};
use tempfile::TempDir;
use tower::ServiceExt;

use common::testkit::TestSigner;
use service::{Config, ServiceState};

pub const HOST: &str = "localhost:6455";
pub const API_URL: &str = "http://localhost:6455/api/nip96";
const BOUNDARY: &str = "augury-test-boundary";

pub struct TestService {
    pub dir: TempDir,
    pub state: ServiceState,
    pub router: Router,
    pub config: Config,
}

/// A service over a fresh temp store that accepts posts from `posters`
pub async fn service(posters: &[&TestSigner]) -> TestService {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::new(dir.path());
    config.posters = posters.iter().map(|s| s.pubkey()).collect::<HashSet<_>>();
    let state = ServiceState::from_config(&config).await.unwrap();
    let router = service::http::router(state.clone(), config.max_upload_bytes);
    TestService {
        dir,
        state,
        router,
        config,
    }
}

impl TestService {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// One multipart form part
pub struct Part<'a> {
    pub name: &'a str,
    pub file_name: Option<&'a str>,
    pub data: &'a [u8],
}

pub fn file(data: &[u8]) -> Part<'_> {
    Part {
        name: "file",
        file_name: None,
        data,
    }
}

pub fn text<'a>(name: &'a str, value: &'a str) -> Part<'a> {
    Part {
        name,
        file_name: None,
        data: value.as_bytes(),
    }
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part.file_name {
            Some(file_name) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                    part.name, file_name
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                    part.name
                )
                .as_bytes(),
            ),
        }
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn upload_request(authorization: Option<&str>, parts: &[Part<'_>]) -> Request<Body> {
    let mut builder = Request::post("/api/nip96").header("host", HOST).header(
        "content-type",
        format!("multipart/form-data; boundary={}", BOUNDARY),
    );
    if let Some(authorization) = authorization {
        builder = builder.header("authorization", authorization);
    }
    builder.body(Body::from(multipart_body(parts))).unwrap()
}

pub fn get(path: &str, host: &str) -> Request<Body> {
    Request::get(path)
        .header("host", host)
        .body(Body::empty())
        .unwrap()
}

pub async fn json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

/// Upload `parts` as `signer` and return the CID from the response
pub async fn upload(svc: &TestService, signer: &TestSigner, parts: &[Part<'_>]) -> String {
    let auth = signer.auth_header("POST", API_URL, now());
    let response = svc.send(upload_request(Some(&auth), parts)).await;
    assert_eq!(response.status(), 201);
    let body = json(response).await;
    body["nip94_event"]["tags"][2][1].as_str().unwrap().to_string()
}
