#![allow(dead_code)]

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::{TempDir, tempdir};
use tower::ServiceExt;
use uplift_gateway::{AppState, ServerConfig, build_router};

const BOUNDARY: &str = "uplift-test-boundary";

/// Builder for `multipart/form-data` request bodies.
#[derive(Default)]
pub struct Form {
    body: Vec<u8>,
}

impl Form {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
        );
        self.body.extend_from_slice(value.as_bytes());
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn file(mut self, name: &str, filename: &str, content: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(content);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn into_request(mut self, uri: &str) -> Request<Body> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Request::post(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(self.body))
            .expect("request")
    }
}

pub fn router(config: ServerConfig) -> Router {
    let state = AppState::new(Arc::new(config)).expect("app state");
    build_router(state)
}

pub fn default_router() -> Router {
    router(ServerConfig::default())
}

pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.expect("response")
}

pub async fn get(router: &Router, uri: &str) -> Response<Body> {
    send(router, Request::get(uri).body(Body::empty()).expect("request")).await
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes()
        .to_vec()
}

pub async fn json_body(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).expect("JSON body")
}

pub fn content_type(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Assert a structured error response and return its detail object.
pub async fn error_detail(response: Response<Body>, status: StatusCode, error_type: &str) -> Value {
    assert_eq!(response.status(), status);
    let body = json_body(response).await;
    assert_eq!(body["detail"]["type"], error_type, "unexpected error body {body}");
    body["detail"].clone()
}

/// Entry names and contents of a zip archive, in archive order.
pub fn archive_entries(bytes: Vec<u8>) -> Vec<(String, String)> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("zip archive");
    (0..archive.len())
        .map(|i| {
            let mut entry = archive.by_index(i).expect("zip entry");
            let mut content = String::new();
            entry.read_to_string(&mut content).expect("entry text");
            (entry.name().to_string(), content)
        })
        .collect()
}

pub const ARTIFACTS_PREFIX: &str = "https://example.org/artifacts/";
pub const BASE_PROFILE: &str = "https://example.org/profiles/base";
pub const CHILD_PROFILE: &str = "https://example.org/profiles/child";

const PROFILES: &str = r#"
@prefix prof: <http://www.w3.org/ns/dx/prof/> .
@prefix role: <http://www.w3.org/ns/dx/prof/role/> .
@prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .

<https://example.org/profiles/base> a prof:Profile ;
    rdfs:label "Base profile" ;
    prof:hasToken "base" ;
    prof:hasResource [
        prof:hasRole role:validation ;
        prof:hasArtifact <https://example.org/artifacts/base-shapes.ttl>
    ] .

<https://example.org/profiles/child> a prof:Profile ;
    rdfs:label "Child profile" ;
    prof:hasToken "child" ;
    prof:isProfileOf <https://example.org/profiles/base> ;
    prof:hasResource [
        prof:hasRole role:entailment ;
        prof:hasArtifact <https://example.org/artifacts/child-rules.ttl>
    ] .
"#;

const BASE_SHAPES: &str = r#"
@prefix sh: <http://www.w3.org/ns/shacl#> .
@prefix ex: <http://example.org/> .

ex:ThingShape a sh:NodeShape ;
    sh:targetClass ex:Thing ;
    sh:property [
        sh:path ex:name ;
        sh:minCount 1 ;
        sh:message "A thing needs a name" ;
    ] .
"#;

const CHILD_RULES: &str = r#"
@prefix sh: <http://www.w3.org/ns/shacl#> .
@prefix ex: <http://example.org/> .

ex:WidgetRules a sh:NodeShape ;
    sh:targetClass ex:Widget ;
    sh:rule [
        a sh:SPARQLRule ;
        sh:construct "CONSTRUCT { $this a <http://example.org/Thing> } WHERE { }" ;
    ] .
"#;

/// A temporary profile catalog: two profiles, a shapes artifact and a rules artifact.
pub struct ProfileFixture {
    _dir: TempDir,
    root: PathBuf,
}

impl ProfileFixture {
    pub fn new() -> Self {
        let dir = tempdir().expect("tempdir");
        let root = dir.path().to_path_buf();
        std::fs::create_dir_all(root.join("artifacts")).expect("artifacts dir");
        std::fs::write(root.join("profiles.ttl"), PROFILES).expect("profiles");
        std::fs::write(root.join("artifacts/base-shapes.ttl"), BASE_SHAPES).expect("shapes");
        std::fs::write(root.join("artifacts/child-rules.ttl"), CHILD_RULES).expect("rules");
        Self { _dir: dir, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> ServerConfig {
        let mut config = ServerConfig::default();
        config.profile_sources = vec![self.root.join("profiles.ttl").display().to_string()];
        config
            .artifact_mappings
            .insert(ARTIFACTS_PREFIX.to_string(), self.root.join("artifacts"));
        config
    }
}
