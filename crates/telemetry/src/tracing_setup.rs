//! Tracing setup for structured logging.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Tracing configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Log level filter (e.g. "info", "worker=debug,api=info")
    pub filter: String,
    /// Whether to output JSON lines
    pub json: bool,
    /// Whether to log span open/close, useful around batch jobs
    pub span_events: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
            span_events: false,
        }
    }
}

impl TracingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    pub fn with_span_events(mut self, span_events: bool) -> Self {
        self.span_events = span_events;
        self
    }

    /// Reads `RUST_LOG`, `LOG_JSON` and `LOG_SPANS`.
    pub fn from_env() -> Self {
        let flag = |name: &str| {
            std::env::var(name)
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false)
        };

        Self::new()
            .with_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
            .with_json(flag("LOG_JSON"))
            .with_span_events(flag("LOG_SPANS"))
    }
}

/// Installs the global subscriber. A second call is a no-op, so one-shot CLI
/// jobs and tests can call it freely.
pub fn init_tracing(config: TracingConfig) {
    let env_filter = EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let installed = if config.json {
        let fmt_layer = fmt::layer()
            .json()
            .with_span_events(span_events)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
    } else {
        let fmt_layer = fmt::layer()
            .with_span_events(span_events)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
    };

    if installed.is_ok() {
        tracing::info!(filter = %config.filter, json = config.json, "Tracing initialized");
    }
}

/// Initialize tracing from environment variables.
pub fn init_tracing_from_env() {
    init_tracing(TracingConfig::from_env());
}
