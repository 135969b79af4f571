//! ClickHouse configuration.

use serde::{Deserialize, Serialize};

/// ClickHouse client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickHouseConfig {
    /// ClickHouse HTTP URL
    #[serde(default = "default_url")]
    pub url: String,
    /// Database holding the `days` and `months` tables
    #[serde(default = "default_database")]
    pub database: String,
    /// Username (optional)
    pub username: Option<String>,
    /// Password (optional)
    pub password: Option<String>,
    /// Create the database and tables at startup
    #[serde(default = "default_init_schema")]
    pub init_schema: bool,
}

fn default_url() -> String {
    "http://localhost:8123".to_string()
}

fn default_database() -> String {
    "tracking".to_string()
}

fn default_init_schema() -> bool {
    true
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            database: default_database(),
            username: None,
            password: None,
            init_schema: default_init_schema(),
        }
    }
}
