#![allow(dead_code)]

use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use bridge_server::api::{app, AppState};
use bridge_server::auth::{generate_jwt, Claims};
use bridge_server::types::{Role, RoleSet};

/// Secret handed to spawned servers so tests can mint their tokens
pub const SERVER_SECRET: &str = "integration-test-secret";

/// A server binary running on its own port with the memory backend.
/// Killed when dropped.
pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    child: Child,
}

impl TestServer {
    pub async fn start() -> Result<Self> {
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let child = Command::new(env!("CARGO_BIN_EXE_bridge-server"))
            .arg("serve")
            .env("APP_ENV", "development")
            .env("BRIDGE_STORE", "memory")
            .env("BRIDGE_PORT", port.to_string())
            .env("BRIDGE_BOOTSTRAP_STUDIES", "api")
            .env("JWT_SECRET", SERVER_SECRET)
            .env("RUST_LOG", "warn")
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .context("failed to spawn server binary")?;

        let server = Self { port, base_url, child };
        server.wait_ready(Duration::from_secs(10)).await?;
        Ok(server)
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Ok(resp) = client.get(format!("{}/health", self.base_url)).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    /// Token signed with the spawned server's secret
    pub fn token(&self, study: &str, roles: &[Role]) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: "smoke-user".to_string(),
            study: study.to_string(),
            roles: RoleSet::of(roles),
            exp: now + 3600,
            iat: now,
        };
        Ok(jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(SERVER_SECRET.as_bytes()),
        )?)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// The full router over a fresh memory store, driven in-process.
/// Studies `api` and `other` exist and are active.
pub struct TestApp {
    router: Router,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let state = AppState::memory();
        state
            .studies
            .bootstrap(&["api".to_string(), "other".to_string()])
            .await?;
        Ok(Self { router: app(state) })
    }

    pub async fn send(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header("Bridge-Session", token);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json)?)
            }
            None => Body::empty(),
        };

        self.send_request(builder.body(body)?).await
    }

    pub async fn send_request(&self, request: Request<Body>) -> Result<(StatusCode, Value)> {
        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok((status, json))
    }

    pub async fn get(&self, path: &str, token: &str) -> Result<(StatusCode, Value)> {
        self.send(Method::GET, path, Some(token), None).await
    }

    pub async fn post(&self, path: &str, token: &str, body: Value) -> Result<(StatusCode, Value)> {
        self.send(Method::POST, path, Some(token), Some(body)).await
    }

    pub async fn post_empty(&self, path: &str, token: &str) -> Result<(StatusCode, Value)> {
        self.send(Method::POST, path, Some(token), None).await
    }

    pub async fn delete(&self, path: &str, token: &str) -> Result<(StatusCode, Value)> {
        self.send(Method::DELETE, path, Some(token), None).await
    }
}

/// Session token for `study`, signed with this process's configuration
pub fn token(study: &str, roles: &[Role]) -> String {
    generate_jwt(&Claims::new("test-user", study, RoleSet::of(roles))).expect("token generation")
}

pub fn developer() -> String {
    token("api", &[Role::Developer])
}

pub fn admin() -> String {
    token("api", &[Role::Developer, Role::Admin])
}

pub fn researcher() -> String {
    token("api", &[Role::Researcher])
}
