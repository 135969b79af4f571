//! The Redis and ClickHouse stores against real servers.

use std::sync::Arc;
use std::time::Duration;

use clickhouse_client::DurableStore;
use ephemeral_store::{EphemeralStore, Eviction, RedisConfig, SessionAppend};
use futures::future::join_all;
use integration_tests::containers::{unique_suffix, ClickHouseContainer, RedisContainer};
use tracking_core::rollup::reduce_month;
use tracking_core::window::parse_day;
use tracking_core::{Day, Event, RetentionPolicy, Session};
use worker::{DailyCompiler, DomainOutcome, RetentionWorker};

fn page(path: &str) -> Event {
    Event::Page(path.to_string())
}

fn append(day: &str, domain: &str, nonce: u32, event: Event, referrer: &str, continuing: bool) -> SessionAppend {
    SessionAppend {
        day: day.into(),
        domain: domain.into(),
        nonce,
        event,
        referrer: referrer.into(),
        continuing,
    }
}

fn unique_domain() -> String {
    format!("s{}.example", unique_suffix())
}

fn day_with(domain: &str, day: &str, ids: &[&str]) -> Day {
    let mut d = Day::new(domain, day);
    for id in ids {
        d.insert_session(*id, Session::new("https://r.com", vec![page("/")]));
    }
    d
}

#[tokio::test]
async fn test_redis_concurrent_appends_to_one_session() {
    let redis = RedisContainer::start().await;
    let store = Arc::new(redis.store(redis.config()).await);
    let domain = unique_domain();

    let hits = (0..50).map(|i| {
        let store = store.clone();
        let hit = append("20240301", &domain, 77, page(&format!("/p{i}")), "", i > 0);
        async move { store.append_and_len(&hit).await.unwrap() }
    });
    let mut offsets = join_all(hits).await;
    offsets.sort_unstable();
    assert_eq!(offsets, (1..=50).collect::<Vec<i64>>());

    let raw = store.read_day("20240301", &domain).await.unwrap();
    assert_eq!(raw.sessions.len(), 1);
    assert_eq!(raw.sessions[0].elements.len(), 51);
    assert_eq!(raw.generation, 50);
    assert!(store
        .pending_domains("20240301")
        .await
        .unwrap()
        .contains(&domain));
}

#[tokio::test]
async fn test_redis_continuing_session_reuses_first_referrer() {
    let redis = RedisContainer::start().await;
    let store = redis
        .store(RedisConfig {
            referrer_ttl_secs: 1,
            ..redis.config()
        })
        .await;
    let domain = unique_domain();

    store
        .append_and_len(&append("20240311", &domain, 5, page("/a"), "https://first.com/", false))
        .await
        .unwrap();
    store
        .append_and_len(&append("20240312", &domain, 5, page("/b"), "https://second.com/", true))
        .await
        .unwrap();
    let next = store.read_day("20240312", &domain).await.unwrap();
    assert_eq!(next.sessions[0].elements[0], "https://first.com/");

    // Let the first-referrer entry expire.
    tokio::time::sleep(Duration::from_millis(2100)).await;
    store
        .append_and_len(&append("20240313", &domain, 5, page("/c"), "https://second.com/", true))
        .await
        .unwrap();
    let later = store.read_day("20240313", &domain).await.unwrap();
    assert_eq!(later.sessions[0].elements[0], "https://second.com/");
}

#[tokio::test]
async fn test_redis_evict_keeps_day_that_grew_after_read() {
    let redis = RedisContainer::start().await;
    let store = redis.store(redis.config()).await;
    let domain = unique_domain();

    store
        .append_and_len(&append("20240321", &domain, 11, page("/a"), "", false))
        .await
        .unwrap();
    let raw = store.read_day("20240321", &domain).await.unwrap();

    store
        .append_and_len(&append("20240321", &domain, 11, page("/late"), "", true))
        .await
        .unwrap();
    store
        .append_and_len(&append("20240321", &domain, 12, page("/new"), "", false))
        .await
        .unwrap();

    assert_eq!(store.evict(&raw).await.unwrap(), Eviction::Changed);
    let again = store.read_day("20240321", &domain).await.unwrap();
    assert_eq!(again.sessions.len(), 2);
    assert_eq!(again.sessions[0].elements, vec!["", "p/a", "p/late"]);

    assert_eq!(store.evict(&again).await.unwrap(), Eviction::Evicted);
    assert!(store.read_day("20240321", &domain).await.unwrap().sessions.is_empty());
    assert!(!store
        .pending_domains("20240321")
        .await
        .unwrap()
        .contains(&domain));
}

#[tokio::test]
async fn test_redis_reads_ipv6_literal_domain() {
    let redis = RedisContainer::start().await;
    let store = redis.store(redis.config()).await;

    store
        .append_and_len(&append("20240302", "[::1]", 3, page("/"), "", false))
        .await
        .unwrap();

    let raw = store.read_day("20240302", "[::1]").await.unwrap();
    assert_eq!(raw.sessions.len(), 1);
    assert_eq!(raw.sessions[0].id, "3");
    assert_eq!(store.evict(&raw).await.unwrap(), Eviction::Evicted);
}

#[tokio::test]
async fn test_daily_compile_from_redis_into_clickhouse() {
    let redis = RedisContainer::start().await;
    let clickhouse = ClickHouseContainer::start().await;
    let ephemeral = Arc::new(redis.store(redis.config()).await);
    let durable = Arc::new(clickhouse.store().await);
    let domain = unique_domain();

    for (nonce, event, continuing) in [
        (1, page("/"), false),
        (1, Event::Points(4), true),
        (2, page("/about"), false),
    ] {
        ephemeral
            .append_and_len(&append("20240305", &domain, nonce, event, "https://r.com", continuing))
            .await
            .unwrap();
    }

    let compiler = DailyCompiler::new(ephemeral.clone(), durable.clone(), 2);
    let report = compiler.compile_day(parse_day("20240305").unwrap()).await.unwrap();
    assert_eq!(report.outcomes[&domain], DomainOutcome::Persisted);

    let days = durable.days_in_range(&domain, "20240305", "20240305").await.unwrap();
    assert_eq!(days.len(), 1);
    let stats = days[0].stats();
    assert_eq!(stats.sessions, 2);
    assert_eq!(stats.pageviews, 2);
    assert_eq!(stats.score, 6);
    assert_eq!(stats.bounces, 1);

    assert!(ephemeral.read_day("20240305", &domain).await.unwrap().sessions.is_empty());
}

#[tokio::test]
async fn test_clickhouse_upsert_replaces_day() {
    let clickhouse = ClickHouseContainer::start().await;
    let store = clickhouse.store().await;

    store.upsert_day(&day_with("a.com", "20240301", &["1"])).await.unwrap();
    let second = day_with("a.com", "20240301", &["1", "2"]);
    store.upsert_day(&second).await.unwrap();

    let days = store.days_in_range("a.com", "20240301", "20240331").await.unwrap();
    assert_eq!(days, vec![second]);
    assert_eq!(
        store.domains_with_days("20240301", "20240331").await.unwrap(),
        vec!["a.com"]
    );
}

#[tokio::test]
async fn test_clickhouse_month_rerun_reads_back_once() {
    let clickhouse = ClickHouseContainer::start().await;
    let store = clickhouse.store().await;

    let days = vec![
        day_with("a.com", "20240301", &["1", "2"]),
        day_with("a.com", "20240302", &["3"]),
    ];
    let month = reduce_month("a.com", "202403", &days);
    store.upsert_month(&month).await.unwrap();
    store.upsert_month(&month).await.unwrap();

    let months = store.months_in_range("a.com", "202401", "202412").await.unwrap();
    assert_eq!(months, vec![month]);
    assert_eq!(months[0].total_sessions, 3);
}

#[tokio::test]
async fn test_clickhouse_retention_deletes_reduced_days() {
    let clickhouse = ClickHouseContainer::start().await;
    let store = Arc::new(clickhouse.store().await);

    let january = day_with("a.com", "20240110", &["1"]);
    store.upsert_day(&january).await.unwrap();
    store.upsert_day(&day_with("a.com", "20240210", &["1"])).await.unwrap();
    store.upsert_day(&day_with("a.com", "20240601", &["1"])).await.unwrap();
    store
        .upsert_month(&reduce_month("a.com", "202401", &[january]))
        .await
        .unwrap();

    let worker = RetentionWorker::new(store.clone(), RetentionPolicy::new(100));
    let report = worker.sweep(parse_day("20240615").unwrap()).await.unwrap();
    assert_eq!(report.outcomes["a.com"], DomainOutcome::Deleted(1));

    let left: Vec<String> = store
        .days_in_range("a.com", "20240101", "20241231")
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.day)
        .collect();
    assert_eq!(left, vec!["20240210", "20240601"]);
}
