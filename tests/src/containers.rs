//! Testcontainer setup for Redis and ClickHouse.
//!
//! Set `TRACKING_TEST_REDIS_URL` or `TRACKING_TEST_CLICKHOUSE_URL` to run
//! against an existing instance instead of starting a container.

use std::time::Duration;

use chrono::Utc;
use clickhouse_client::{ClickHouseConfig, ClickHouseStore};
use ephemeral_store::{RedisConfig, RedisStore};
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};

fn env_override(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Suffix that keeps parallel tests apart on a shared instance.
pub fn unique_suffix() -> String {
    Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default()
        .to_string()
}

/// Redis container handle.
pub struct RedisContainer {
    #[allow(dead_code)]
    container: Option<ContainerAsync<GenericImage>>,
    pub url: String,
}

impl RedisContainer {
    pub async fn start() -> Self {
        if let Some(url) = env_override("TRACKING_TEST_REDIS_URL") {
            return Self {
                container: None,
                url,
            };
        }

        let image = GenericImage::new("redis", "7.2-alpine")
            .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"))
            .with_exposed_port(6379.tcp());

        let container = image.start().await.expect("Failed to start Redis");
        let port = container.get_host_port_ipv4(6379).await.unwrap();

        Self {
            container: Some(container),
            url: format!("redis://127.0.0.1:{}/0", port),
        }
    }

    pub fn config(&self) -> RedisConfig {
        RedisConfig {
            url: self.url.clone(),
            ..RedisConfig::default()
        }
    }

    pub async fn store(&self, config: RedisConfig) -> RedisStore {
        RedisStore::connect(config)
            .await
            .expect("Failed to connect to Redis")
    }
}

/// ClickHouse container handle.
pub struct ClickHouseContainer {
    #[allow(dead_code)]
    container: Option<ContainerAsync<GenericImage>>,
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ClickHouseContainer {
    pub async fn start() -> Self {
        if let Some(url) = env_override("TRACKING_TEST_CLICKHOUSE_URL") {
            return Self {
                container: None,
                url,
                username: std::env::var("TRACKING_TEST_CLICKHOUSE_USER").ok(),
                password: std::env::var("TRACKING_TEST_CLICKHOUSE_PASSWORD").ok(),
            };
        }

        // CLICKHOUSE_DEFAULT_ACCESS_MANAGEMENT=1 allows the passwordless default user
        let image = GenericImage::new("clickhouse/clickhouse-server", "24.3")
            .with_wait_for(WaitFor::seconds(5))
            .with_exposed_port(8123.tcp())
            .with_env_var("CLICKHOUSE_DEFAULT_ACCESS_MANAGEMENT", "1")
            .with_env_var("CLICKHOUSE_USER", "default")
            .with_env_var("CLICKHOUSE_PASSWORD", "");

        let container = image.start().await.expect("Failed to start ClickHouse");
        let port = container.get_host_port_ipv4(8123).await.unwrap();
        let url = format!("http://127.0.0.1:{}", port);

        wait_for_http(&url, Duration::from_secs(30)).await;

        Self {
            container: Some(container),
            url,
            username: Some("default".to_string()),
            password: None,
        }
    }

    /// A store over a fresh database, schema created.
    pub async fn store(&self) -> ClickHouseStore {
        let config = ClickHouseConfig {
            url: self.url.clone(),
            database: format!("tracking_test_{}", unique_suffix()),
            username: self.username.clone(),
            password: self.password.clone(),
            init_schema: true,
        };
        ClickHouseStore::connect(config)
            .await
            .expect("Failed to initialize ClickHouse schema")
    }
}

/// Wait for HTTP endpoint to respond.
async fn wait_for_http(url: &str, timeout: Duration) {
    let client = reqwest::Client::new();
    let start = std::time::Instant::now();

    while start.elapsed() < timeout {
        if let Ok(resp) = client.get(url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    panic!("HTTP endpoint {} not ready after {:?}", url, timeout);
}
