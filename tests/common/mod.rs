#![allow(dead_code)]

use std::process::{Child, Command, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};

static SERVER: OnceLock<TestServer> = OnceLock::new();

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    #[allow(dead_code)]
    child: Child,
}

impl TestServer {
    fn spawn() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let mut cmd = Command::new(env!("CARGO_BIN_EXE_demo-hub"));
        cmd.env("DEMO_HUB_PORT", port.to_string())
            // no migrations on boot, and a short pool timeout so /health answers quickly without a database
            .env("DATABASE_AUTO_MIGRATE", "false")
            .env("DATABASE_CONNECTION_TIMEOUT", "2")
            .env("STORAGE_UPLOAD_DIR", std::env::temp_dir().join(format!("demo-hub-test-{}", port)))
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let child = cmd.spawn().context("failed to spawn server binary")?;

        Ok(Self { port, base_url, child })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            let url = format!("{}/health", self.base_url);
            if let Ok(resp) = client.get(&url).send().await {
                // Up is up, with or without a database behind it
                if resp.status() == StatusCode::OK || resp.status() == StatusCode::SERVICE_UNAVAILABLE {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }
}

pub async fn ensure_server() -> Result<&'static TestServer> {
    let server = SERVER.get_or_init(|| TestServer::spawn().expect("failed to spawn server binary"));
    server.wait_ready(Duration::from_secs(15)).await?;
    Ok(server)
}

/// Database-backed tests run only when DATABASE_URL points at a scratch Postgres
pub fn database_configured() -> bool {
    let _ = dotenvy::dotenv();
    match std::env::var("DATABASE_URL") {
        Ok(url) if !url.trim().is_empty() => true,
        _ => {
            eprintln!("DATABASE_URL not set; skipping database-backed test");
            false
        }
    }
}

/// Run the operator CLI with `--json` and parse what it prints
pub fn demohub(args: &[&str]) -> Result<Value> {
    let output = Command::new(env!("CARGO_BIN_EXE_demohub"))
        .arg("--json")
        .args(args)
        .output()
        .context("failed to run demohub")?;
    anyhow::ensure!(
        output.status.success(),
        "demohub {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    Ok(serde_json::from_slice(&output.stdout)?)
}

/// Unique per run so repeated runs against one database do not collide
pub fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4().simple())
}

pub const PASSWORD: &str = "correct-horse-battery";

/// Logged-in client for one account
pub struct Session {
    pub base_url: String,
    pub token: String,
    pub user_id: String,
    client: reqwest::Client,
}

impl Session {
    pub async fn login(server: &TestServer, email: &str, password: &str) -> Result<Self> {
        let client = reqwest::Client::new();
        let res = client
            .post(format!("{}/auth/login", server.base_url))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        anyhow::ensure!(res.status() == StatusCode::OK, "login as {} failed: {}", email, res.status());
        let body = res.json::<Value>().await?;
        Ok(Self {
            base_url: server.base_url.clone(),
            token: body["data"]["token"].as_str().context("token missing")?.to_string(),
            user_id: body["data"]["user"]["id"].as_str().context("user id missing")?.to_string(),
            client,
        })
    }

    /// Migrate, then bootstrap a fresh admin through the CLI and log in as it
    pub async fn bootstrap_admin(server: &TestServer) -> Result<Self> {
        demohub(&["db", "migrate"])?;
        let email = format!("{}@test.example.com", unique("admin"));
        demohub(&["user", "create", "--email", &email, "--password", PASSWORD, "--role", "admin"])?;
        Self::login(server, &email, PASSWORD).await
    }

    /// Create an account as this (admin) session and log in as it
    pub async fn create_user(&self, server: &TestServer, role: &str) -> Result<Session> {
        let email = format!("{}@test.example.com", unique(role));
        let (status, body) = self
            .send(
                Method::POST,
                "/api/users",
                Some(json!({ "email": email, "password": PASSWORD, "name": role, "role": role })),
            )
            .await?;
        anyhow::ensure!(status == StatusCode::CREATED, "create {} failed: {} {}", role, status, body);
        Self::login(server, &email, PASSWORD).await
    }

    pub async fn send(&self, method: Method, path: &str, body: Option<Value>) -> Result<(StatusCode, Value)> {
        let mut request = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token);
        if let Some(body) = body {
            request = request.json(&body);
        }
        into_parts(request.send().await?).await
    }

    pub async fn get(&self, path: &str) -> Result<(StatusCode, Value)> {
        self.send(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<(StatusCode, Value)> {
        self.send(Method::POST, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<(StatusCode, Value)> {
        self.send(Method::DELETE, path, None).await
    }

    pub async fn upload(&self, demo_id: &str, file_name: &str, bytes: Vec<u8>) -> Result<(StatusCode, Value)> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);
        let res = self
            .client
            .post(format!("{}/api/demos/{}/media", self.base_url, demo_id))
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await?;
        into_parts(res).await
    }

    /// A product with one active demo; returns (product_id, demo_id)
    pub async fn product_with_demo(&self) -> Result<(String, String)> {
        let (status, product) = self.post("/api/products", json!({ "name": unique("product") })).await?;
        anyhow::ensure!(status == StatusCode::CREATED, "create product: {} {}", status, product);
        let product_id = product["data"]["id"].as_str().context("product id")?.to_string();

        let (status, demo) = self
            .post(
                "/api/demos",
                json!({ "product_id": product_id, "title": "Guided tour", "credentials": { "user": "demo" } }),
            )
            .await?;
        anyhow::ensure!(status == StatusCode::CREATED, "create demo: {} {}", status, demo);
        let demo_id = demo["data"]["id"].as_str().context("demo id")?.to_string();
        Ok((product_id, demo_id))
    }

    pub async fn storage_total(&self) -> Result<i64> {
        let (_, body) = self.get("/api/storage").await?;
        body["data"]["total_bytes"].as_i64().context("total_bytes missing")
    }
}

async fn into_parts(res: reqwest::Response) -> Result<(StatusCode, Value)> {
    let status = res.status();
    let text = res.text().await?;
    let body = if text.is_empty() { Value::Null } else { serde_json::from_str(&text)? };
    Ok((status, body))
}

/// Smallest byte run the upload sniffer accepts as a PNG, padded to `size`
pub fn png_bytes(size: usize) -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.resize(size.max(bytes.len()), 0);
    bytes
}
