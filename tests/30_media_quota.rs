mod common;

use anyhow::Result;
use reqwest::{Method, StatusCode};
use serde_json::json;

use common::{png_bytes, Session};

#[tokio::test]
async fn upload_quota_and_release_cycle() -> Result<()> {
    if !common::database_configured() {
        return Ok(());
    }
    let server = common::ensure_server().await?;
    let admin = Session::bootstrap_admin(server).await?;
    let (_, demo_id) = admin.product_with_demo().await?;
    assert_eq!(admin.storage_total().await?, 0);

    // upload counts against the uploader
    let (status, media) = admin.upload(&demo_id, "shot.png", png_bytes(4096)).await?;
    assert_eq!(status, StatusCode::CREATED, "{}", media);
    let media_id = media["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(media["data"]["size_bytes"], 4096);
    assert_eq!(admin.storage_total().await?, 4096);

    // a second file would cross the new limit
    let (status, body) = admin
        .send(
            Method::PUT,
            &format!("/api/storage/{}/limit", admin.user_id),
            Some(json!({ "limit_bytes": 6000 })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["remaining_bytes"], 6000 - 4096);

    let (status, body) = admin.upload(&demo_id, "big.png", png_bytes(4096)).await?;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE, "{}", body);
    assert_eq!(body["code"], "QUOTA_EXCEEDED");
    assert_eq!(admin.storage_total().await?, 4096, "refused upload must not be charged");

    // svg is refused outright
    let svg = br#"<svg xmlns="http://www.w3.org/2000/svg"><script>alert(1)</script></svg>"#.to_vec();
    let (status, _) = admin.upload(&demo_id, "logo.svg", svg).await?;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    // deleting the media row gives the bytes back
    let (status, body) = admin.delete(&format!("/api/media/{}", media_id)).await?;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["deleted"], true);
    assert_eq!(admin.storage_total().await?, 0);

    // so does deleting the demo that holds media
    let (status, _) = admin.upload(&demo_id, "again.png", png_bytes(2000)).await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(admin.storage_total().await?, 2000);
    let (status, _) = admin.delete(&format!("/api/demos/{}", demo_id)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(admin.storage_total().await?, 0);
    let (status, _) = admin.get(&format!("/api/demos/{}", demo_id)).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // and deleting a product cascades through its demos
    let (product_id, demo_id) = admin.product_with_demo().await?;
    let (status, _) = admin.upload(&demo_id, "cascade.png", png_bytes(1500)).await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(admin.storage_total().await?, 1500);
    let (status, _) = admin.delete(&format!("/api/products/{}", product_id)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(admin.storage_total().await?, 0);

    Ok(())
}

#[tokio::test]
async fn uploads_need_an_existing_demo_and_an_admin() -> Result<()> {
    if !common::database_configured() {
        return Ok(());
    }
    let server = common::ensure_server().await?;
    let admin = Session::bootstrap_admin(server).await?;
    let sales = admin.create_user(server, "sales").await?;
    let (_, demo_id) = admin.product_with_demo().await?;

    let (status, _) = admin
        .upload("00000000-0000-0000-0000-000000000000", "x.png", png_bytes(64))
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = sales.upload(&demo_id, "x.png", png_bytes(64)).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(admin.storage_total().await?, 0);
    Ok(())
}
