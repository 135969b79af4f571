//! End-to-end tests for the tracking pixel.
//!
//! Hits go through the real router and recorder into an in-memory ephemeral
//! store; the tests then read the session lists back.

use axum::http::StatusCode;
use futures::future::join_all;
use integration_tests::fixtures::{self, SITE};
use integration_tests::setup::{hit, set_token, TestContext};

#[tokio::test]
async fn test_pixel_serves_gif_and_sets_session() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let response = hit(&server, "/posts/1/?id=3", Some("https://news.site/item?id=9"), None).await;
    response.assert_status(StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/gif");
    assert_eq!(response.headers()["cache-control"], "no-cache, no-store, must-revalidate");
    assert_eq!(response.as_bytes().len(), 43);

    let token = set_token(&response).expect("session cookie");
    let session = ctx.codec.decode(&token).expect("valid token");
    assert_eq!(session.offset, 1);

    let list = ctx
        .ephemeral
        .inner()
        .session(&fixtures::today_key(), SITE, session.nonce)
        .expect("session list");
    assert_eq!(list, vec!["https://news.site/item?{id}", "p/posts/1?{id}"]);
    assert_eq!(ctx.ephemeral.appends(), 1);
}

#[tokio::test]
async fn test_session_continues_with_cookie() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let first = hit(&server, "/", Some("https://search.engine/"), None).await;
    let mut token = set_token(&first).unwrap();

    for path in ["/pricing", "/signup"] {
        // A later referrer never replaces the first one.
        let response = hit(&server, path, Some("https://elsewhere.org/"), Some(&token)).await;
        response.assert_status_ok();
        token = set_token(&response).unwrap();
    }

    let points = server
        .get("/t.gif")
        .add_header("Referer", &fixtures::page_url("/signup"))
        .add_header("Cookie", &fixtures::session_cookie(&token))
        .add_query_param("p", "25")
        .await;
    points.assert_status_ok();
    let session = ctx.codec.decode(&set_token(&points).unwrap()).unwrap();
    assert_eq!(session.offset, 4);

    let list = ctx
        .ephemeral
        .inner()
        .session(&fixtures::today_key(), SITE, session.nonce)
        .unwrap();
    assert_eq!(
        list,
        vec!["https://search.engine/", "p/", "p/pricing", "p/signup", "n25"]
    );
}

#[tokio::test]
async fn test_token_query_param_when_cookies_blocked() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let first = hit(&server, "/", None, None).await;
    let token = set_token(&first).unwrap();

    let second = server
        .get("/t.gif")
        .add_header("Referer", &fixtures::page_url("/about"))
        .add_query_param("s", &token)
        .await;
    second.assert_status_ok();
    assert_eq!(ctx.codec.decode(&set_token(&second).unwrap()).unwrap().offset, 2);
}

#[tokio::test]
async fn test_concurrent_hits_same_session() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let first = hit(&server, "/", None, None).await;
    let token = set_token(&first).unwrap();

    let paths: Vec<String> = (0..25).map(|i| format!("/p{i}")).collect();
    let requests = paths.iter().map(|path| hit(&server, path, None, Some(&token)));
    let responses = join_all(requests).await;

    let mut offsets: Vec<i64> = responses
        .iter()
        .map(|r| ctx.codec.decode(&set_token(r).unwrap()).unwrap().offset)
        .collect();
    offsets.sort_unstable();
    assert_eq!(offsets, (2..=26).collect::<Vec<i64>>());

    let nonce = ctx.codec.decode(&token).unwrap().nonce;
    let list = ctx
        .ephemeral
        .inner()
        .session(&fixtures::today_key(), SITE, nonce)
        .unwrap();
    assert_eq!(list.len(), 27);
}
