mod common;

use anyhow::Result;
use reqwest::StatusCode;

use common::ensure_server;

#[tokio::test]
async fn share_renders_html_preview_without_a_key() -> Result<()> {
    let server = ensure_server().await?;
    let client = reqwest::Client::new();
    let resp = client
        .get(format!("{}/share/001-001-001", server.base_url))
        .send()
        .await?;

    assert_eq!(resp.status(), StatusCode::OK);
    let content_type = resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    assert!(content_type.starts_with("text/html"));

    let html = resp.text().await?;
    assert!(html.contains("<title>Genesis 1:1</title>"));
    assert!(html.contains(
        r#"<meta property="og:description" content="In the beginning God created the heavens and the earth.">"#
    ));
    assert!(html.contains(
        r#"window.location.replace("https://scrollbible.app/v/001-001-001")"#
    ));
    Ok(())
}

#[tokio::test]
async fn share_query_parameters_cannot_redirect_the_lookup() -> Result<()> {
    // The fr|sg21 partition holds its own 001-001-001 item; the share
    // route's pinned lookup parameters must keep serving the en|webp one.
    let server = ensure_server().await?;
    let client = reqwest::Client::new();
    let resp = client
        .get(format!(
            "{}/share/001-001-001?language=fr&translation=sg21",
            server.base_url
        ))
        .send()
        .await?;

    assert_eq!(resp.status(), StatusCode::OK);
    let html = resp.text().await?;
    assert!(html.contains("<title>Genesis 1:1</title>"));
    assert!(!html.contains("Genèse"));
    Ok(())
}

#[tokio::test]
async fn share_of_an_unknown_verse_is_a_404() -> Result<()> {
    let server = ensure_server().await?;
    let client = reqwest::Client::new();
    let resp = client
        .get(format!("{}/share/999-999-999", server.base_url))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    Ok(())
}
