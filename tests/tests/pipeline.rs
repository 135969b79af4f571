//! Full pipeline: pixel hits → daily compile → monthly reduce → views.

use chrono::Duration;
use clickhouse_client::DurableStore;
use ephemeral_store::EphemeralStore;
use integration_tests::fixtures::{self, SITE};
use integration_tests::setup::{hit, set_token, TestContext};
use tracking_core::compendium::{fill_days, sessions_by_referrer, SessionFilter};
use tracking_core::window::format_day;
use tracking_core::{Compendium, MonthWindow};
use worker::DomainOutcome;

/// Three visitors: a bounce from search, a reader from a newsletter who
/// converts, and a direct visitor who reads two pages.
async fn seed_traffic(ctx: &TestContext) {
    let server = ctx.server();

    hit(&server, "/", Some("https://search.engine/?q=rust"), None).await;

    let first = hit(&server, "/posts/1", Some("https://letter.io/issue/7/"), None).await;
    let token = set_token(&first).unwrap();
    let next = hit(&server, "/pricing", None, Some(&token)).await;
    let token = set_token(&next).unwrap();
    server
        .get("/t.gif")
        .add_header("Referer", &fixtures::page_url("/pricing"))
        .add_header("Cookie", &fixtures::session_cookie(&token))
        .add_query_param("p", "10")
        .await
        .assert_status_ok();

    let direct = hit(&server, "/", None, None).await;
    let token = set_token(&direct).unwrap();
    hit(&server, "/posts/1", None, Some(&token)).await;
}

#[tokio::test]
async fn test_compile_persists_day_and_evicts() {
    let ctx = TestContext::new().await;
    seed_traffic(&ctx).await;

    let report = ctx.compile_today().await;
    assert_eq!(report.outcomes[SITE], DomainOutcome::Persisted);

    let day = ctx.durable.day(SITE, &fixtures::today_key()).expect("compiled day");
    let stats = day.stats();
    assert_eq!(stats.sessions, 3);
    assert_eq!(stats.pageviews, 5);
    assert_eq!(stats.score, 15);
    assert_eq!(stats.bounces, 1);

    assert_eq!(ctx.ephemeral.inner().session_count(), 0);
    assert!(ctx
        .ephemeral
        .pending_domains(&fixtures::today_key())
        .await
        .unwrap()
        .is_empty());

    // Nothing left to compile; the stored day is untouched.
    let again = ctx.compile_today().await;
    assert!(again.outcomes.is_empty());
    assert_eq!(ctx.durable.day(SITE, &fixtures::today_key()), Some(day));
}

#[tokio::test]
async fn test_failed_persist_keeps_session_lists() {
    let ctx = TestContext::new().await;
    seed_traffic(&ctx).await;
    ctx.durable.fail_writes_for(SITE);

    let report = ctx.compile_today().await;
    assert!(report.outcomes[SITE].is_failed());
    assert_eq!(ctx.ephemeral.inner().session_count(), 3);
    assert_eq!(
        ctx.ephemeral
            .pending_domains(&fixtures::today_key())
            .await
            .unwrap(),
        vec![SITE.to_string()]
    );
}

#[tokio::test]
async fn test_reduce_month_and_views() {
    let ctx = TestContext::new().await;
    seed_traffic(&ctx).await;
    ctx.compile_today().await;

    let report = ctx.reduce_this_month().await;
    assert_eq!(report.outcomes[SITE], DomainOutcome::Persisted);

    let month_key = MonthWindow::containing(fixtures::today()).to_string();
    let month = ctx
        .durable
        .month(SITE, &month_key)
        .expect("reduced month");
    assert_eq!(month.total_sessions, 3);
    assert_eq!(month.total_pageviews, 5);
    assert_eq!(month.total_score, 15);
    assert_eq!(month.bounce_rate, 3333);
    let home = month.top_pages.iter().find(|e| e.address == "/").unwrap();
    assert_eq!(home.count, 2);
    assert_eq!(month.top_pages.len(), 3);
    assert_eq!(month.top_referrer_scores[0].address, "https://letter.io/issue/7");
    assert_eq!(month.top_referrer_scores[0].count, 12);

    // The compendium of the month equals the one rebuilt from its days.
    let today = fixtures::today();
    let days = ctx
        .durable
        .days_in_range(SITE, &format_day(today), &format_day(today))
        .await
        .unwrap();
    let from_days = Compendium::from_days(&days);
    assert_eq!(Compendium::from_month(&month).pages(), from_days.pages());

    let series = fill_days(&days, today - Duration::days(2), today);
    assert_eq!(series.len(), 3);
    assert_eq!(series[0].stats.sessions, 0);
    assert_eq!(series[2].stats.sessions, 3);

    let groups = sessions_by_referrer(
        &days,
        &SessionFilter {
            min_score: 2,
            ..SessionFilter::default()
        },
    );
    let referrers: Vec<&str> = groups.iter().map(|g| g.referrer.as_str()).collect();
    assert!(referrers.contains(&"https://letter.io/issue/7"));
    assert!(!referrers.contains(&"https://search.engine/?{q}"));
}

#[tokio::test]
async fn test_today_view_reads_live_sessions() {
    let ctx = TestContext::new().await;
    seed_traffic(&ctx).await;
    let server = ctx.server();

    let response = server.get(&format!("/today/{SITE}")).await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["sessions"], 3);
    assert_eq!(body["pageviews"], 5);
    assert_eq!(body["bounce_rate"], 3333);

    // Served from cache on the second call.
    let reads = ctx.ephemeral.reads();
    server.get(&format!("/today/{SITE}")).await.assert_status_ok();
    assert_eq!(ctx.ephemeral.reads(), reads);
}
