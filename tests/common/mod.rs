//! Shared helpers for the HTTP integration tests.

#![allow(dead_code)]

use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderName, StatusCode};
use axum_test::TestServer;
use base64::{engine::general_purpose, Engine as _};
use files_manager::{App, Config};
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use std::io::Cursor;
use tempfile::TempDir;

pub const X_TOKEN: HeaderName = HeaderName::from_static("x-token");

pub struct TestApp {
    pub server: TestServer,
    pub app: App,
    pub blobs: TempDir,
}

/// Build a test configuration with blobs under a temporary directory.
pub fn test_config(blobs: &TempDir) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        folder_path: blobs.path().to_string_lossy().into_owned(),
        data_dir: None,
        bcrypt_cost: 4,
        ..Config::default()
    }
}

/// Create a test server with in-memory capabilities. The worker is not
/// started; call `app.spawn_worker()` when a test needs it.
pub fn create_test_app() -> TestApp {
    create_test_app_with(|_| {})
}

/// Like [`create_test_app`], with a hook to adjust the configuration.
pub fn create_test_app_with(configure: impl FnOnce(&mut Config)) -> TestApp {
    let blobs = tempfile::tempdir().expect("Failed to create blob directory");
    let mut config = test_config(&blobs);
    configure(&mut config);
    let app = App::build(&config).expect("Failed to build app");
    let server = TestServer::new(app.router()).expect("Failed to create test server");

    TestApp { server, app, blobs }
}

pub fn basic_auth(email: &str, password: &str) -> String {
    format!(
        "Basic {}",
        general_purpose::STANDARD.encode(format!("{email}:{password}"))
    )
}

pub fn encode(content: &[u8]) -> String {
    general_purpose::STANDARD.encode(content)
}

/// A small PNG with a gradient so that resized versions differ.
pub fn png_fixture(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 5 % 256) as u8, (y * 7 % 256) as u8, 128])
    });
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .expect("Failed to encode fixture");
    out.into_inner()
}

/// Register a user and return the response body.
pub async fn register(server: &TestServer, email: &str, password: &str) -> Value {
    let response = server
        .post("/users")
        .json(&json!({ "email": email, "password": password }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Value>()
}

/// Log in and return the session token.
pub async fn connect(server: &TestServer, email: &str, password: &str) -> String {
    let response = server
        .get("/connect")
        .add_header(AUTHORIZATION, basic_auth(email, password))
        .await;
    response.assert_status_ok();
    response.json::<Value>()["token"]
        .as_str()
        .expect("token missing")
        .to_string()
}

/// Register and log in in one go.
pub async fn signed_in(server: &TestServer, email: &str) -> String {
    register(server, email, "pw123").await;
    connect(server, email, "pw123").await
}

/// Upload a node and return the response body; asserts 201.
pub async fn upload(server: &TestServer, token: &str, body: Value) -> Value {
    let response = server
        .post("/files")
        .add_header(X_TOKEN, token.to_string())
        .json(&body)
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Value>()
}
