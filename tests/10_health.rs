mod common;

use anyhow::Result;
use reqwest::StatusCode;

#[tokio::test]
async fn health_endpoint_responds() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let res = client.get(format!("{}/health", server.base_url)).send().await?;

    // We consider OK or SERVICE_UNAVAILABLE acceptable as a basic liveness check
    let status = res.status();
    assert!(
        status == StatusCode::OK || status == StatusCode::SERVICE_UNAVAILABLE,
        "unexpected status: {}",
        status
    );

    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["success"], status == StatusCode::OK, "envelope mismatch: {}", body);
    assert!(body["data"]["timestamp"].is_string());
    Ok(())
}

#[tokio::test]
async fn root_describes_service() -> Result<()> {
    let server = common::ensure_server().await?;
    let body = reqwest::get(format!("{}/", server.base_url))
        .await?
        .json::<serde_json::Value>()
        .await?;

    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["name"], "Demo Hub API");
    Ok(())
}
