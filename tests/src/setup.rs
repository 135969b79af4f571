//! Common test setup functions.

use std::sync::Arc;

use api::{router, AppState, Recorder};
use axum::Router;
use axum_test::{TestResponse, TestServer};
use clickhouse_client::MemoryDurableStore;
use tracking_core::{Blacklist, MonthWindow, SessionCodec};
use worker::{JobsConfig, RunReport, WorkerScheduler};

use crate::fixtures;
use crate::mocks::CountingStore;

/// Test context with in-memory stores behind the real router.
///
/// The pixel, the jobs and the live view share the same store instances,
/// so a test can hit `/t.gif`, compile and reduce, then read results back.
pub struct TestContext {
    pub ephemeral: Arc<CountingStore>,
    pub durable: Arc<MemoryDurableStore>,
    pub codec: SessionCodec,
    pub scheduler: WorkerScheduler,
    pub router: Router,
}

impl TestContext {
    /// Create a new test context with all components initialized.
    pub async fn new() -> Self {
        Self::with_blacklist([fixtures::SPAM_HOST]).await
    }

    pub async fn with_blacklist<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ephemeral = Arc::new(CountingStore::new());
        let durable = Arc::new(MemoryDurableStore::new());

        let recorder = Recorder::new(
            ephemeral.clone(),
            SessionCodec::new(fixtures::SALT),
            Arc::new(Blacklist::new(hosts)),
        );
        let router = router(AppState::new(recorder, ephemeral.clone()));

        let scheduler = WorkerScheduler::new(
            JobsConfig {
                enabled: false,
                ..JobsConfig::default()
            },
            ephemeral.clone(),
            durable.clone(),
        );

        Self {
            ephemeral,
            durable,
            codec: SessionCodec::new(fixtures::SALT),
            scheduler,
            router,
        }
    }

    pub fn server(&self) -> TestServer {
        TestServer::new(self.router.clone()).expect("Failed to create test server")
    }

    /// Compiles today's session lists.
    pub async fn compile_today(&self) -> RunReport {
        self.scheduler
            .daily()
            .compile_day(fixtures::today())
            .await
            .expect("daily compile failed")
    }

    /// Reduces the month containing today.
    pub async fn reduce_this_month(&self) -> RunReport {
        self.scheduler
            .monthly()
            .reduce_month(MonthWindow::containing(fixtures::today()))
            .await
            .expect("monthly reduce failed")
    }
}

/// Sends one pixel hit for `path`, optionally continuing a session.
pub async fn hit(
    server: &TestServer,
    path: &str,
    referrer: Option<&str>,
    token: Option<&str>,
) -> TestResponse {
    let mut request = server
        .get("/t.gif")
        .add_header("Referer", &fixtures::page_url(path));
    if let Some(r) = referrer {
        request = request.add_query_param("r", r);
    }
    if let Some(t) = token {
        request = request.add_header("Cookie", &fixtures::session_cookie(t));
    }
    request.await
}

/// Token set by a pixel response, if any.
pub fn set_token(response: &TestResponse) -> Option<String> {
    response
        .headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .and_then(fixtures::token_from_set_cookie)
}
