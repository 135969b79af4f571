//! Tests for health check endpoints.
//!
//! The health registry is process-wide, so every state change happens in a
//! single test.

use axum::http::StatusCode;
use integration_tests::setup::TestContext;
use worker::check_health;

#[tokio::test]
async fn test_health_follows_store_state() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    server.get("/health/live").await.assert_status_ok();

    check_health(ctx.ephemeral.as_ref(), ctx.durable.as_ref()).await;
    let response = server.get("/health").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["ephemeral_connected"], true);
    assert_eq!(body["durable_connected"], true);
    server.get("/health/ready").await.assert_status_ok();

    // ClickHouse down: still serving pixels.
    ctx.durable.set_offline(true);
    check_health(ctx.ephemeral.as_ref(), ctx.durable.as_ref()).await;
    let body: serde_json::Value = server.get("/health").await.json();
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["durable_connected"], false);
    server.get("/health/ready").await.assert_status_ok();

    // Redis down: not ready.
    ctx.ephemeral.inner().set_offline(true);
    check_health(ctx.ephemeral.as_ref(), ctx.durable.as_ref()).await;
    let body: serde_json::Value = server.get("/health").await.json();
    assert_eq!(body["status"], "unhealthy");
    server
        .get("/health/ready")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);
    server.get("/health/live").await.assert_status_ok();
}
