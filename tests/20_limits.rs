mod common;

use anyhow::Result;
use reqwest::StatusCode;

use common::{ensure_server, TINY_KEY};

/// `tiny-key` is provisioned with burst 2 and an effectively-zero refill
/// rate, so the third request in quick succession must throttle. The 429s
/// still count against the monthly quota of 3, so the bucket can never
/// admit a request again within this test run.
#[tokio::test]
async fn tiny_key_throttles_after_its_burst() -> Result<()> {
    let server = ensure_server().await?;
    let client = reqwest::Client::new();
    let url = format!(
        "{}/item?document=bible&language=en&translation=webp&id=001-001-001",
        server.base_url
    );

    let mut statuses = Vec::new();
    for _ in 0..4 {
        let resp = client
            .get(&url)
            .header("x-api-key", TINY_KEY)
            .send()
            .await?;
        statuses.push(resp.status());
    }

    assert_eq!(
        statuses,
        vec![
            StatusCode::OK,
            StatusCode::OK,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::TOO_MANY_REQUESTS,
        ]
    );
    Ok(())
}

#[tokio::test]
async fn unknown_key_is_unauthorized() -> Result<()> {
    let server = ensure_server().await?;
    let client = reqwest::Client::new();
    let resp = client
        .get(format!(
            "{}/item?document=bible&language=en&translation=webp&id=001-001-001",
            server.base_url
        ))
        .header("x-api-key", "no-such-key")
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}
