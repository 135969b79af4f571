//! Error handling of the pixel: bad input, spam referrers, store outages.

use axum::http::StatusCode;
use ephemeral_store::EphemeralStore;
use integration_tests::fixtures::{self, SITE, SPAM_HOST};
use integration_tests::setup::{hit, set_token, TestContext};

#[tokio::test]
async fn test_missing_referer_is_rejected() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let response = server.get("/t.gif").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "INPUT_001");
    assert_eq!(ctx.ephemeral.appends(), 0);
}

#[tokio::test]
async fn test_malformed_referer_is_rejected() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let response = server
        .get("/t.gif")
        .add_header("Referer", "not a url")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_points_are_rejected() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    for points in ["0", "-3", "abc", "1.5"] {
        let response = server
            .get("/t.gif")
            .add_header("Referer", &fixtures::page_url("/"))
            .add_query_param("p", points)
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }
    assert_eq!(ctx.ephemeral.appends(), 0);
}

#[tokio::test]
async fn test_overlong_referrer_param_is_rejected() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let long = format!("https://x.com/{}", "a".repeat(3000));
    let response = hit(&server, "/", Some(&long), None).await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert!(body["details"].is_array());
}

#[tokio::test]
async fn test_spam_referrer_gets_neutered_cookie() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let spam = format!("https://{SPAM_HOST}/cheap-pills");
    let response = hit(&server, "/", Some(&spam), None).await;

    // Spammers still get an image, never an error.
    response.assert_status_ok();
    assert_eq!(response.headers()["content-type"], "image/gif");

    let token = set_token(&response).expect("neutered cookie");
    assert!(ctx.codec.is_neutered(&token));
    assert!(ctx.codec.decode(&token).is_err());
    assert_eq!(ctx.ephemeral.appends(), 0);
    assert_eq!(ctx.ephemeral.inner().session_count(), 0);
}

#[tokio::test]
async fn test_garbage_cookie_starts_fresh_session() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let response = hit(&server, "/", None, Some("definitely-not-a-token")).await;
    response.assert_status_ok();
    let session = ctx.codec.decode(&set_token(&response).unwrap()).unwrap();
    assert_eq!(session.offset, 1);
}

#[tokio::test]
async fn test_store_outage_serves_pixel_without_cookie() {
    let ctx = TestContext::new().await;
    let server = ctx.server();
    ctx.ephemeral.inner().set_offline(true);

    let response = hit(&server, "/", None, None).await;
    response.assert_status_ok();
    assert_eq!(response.as_bytes().len(), 43);
    assert!(set_token(&response).is_none());

    ctx.ephemeral.inner().set_offline(false);
    let response = hit(&server, "/", None, None).await;
    assert!(set_token(&response).is_some());
    assert_eq!(
        ctx.ephemeral
            .pending_domains(&fixtures::today_key())
            .await
            .unwrap(),
        vec![SITE.to_string()]
    );
}
