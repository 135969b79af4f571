//! Unified error types for the tracking engine.
//!
//! Coded errors surface to HTTP callers:
//! - INPUT_001: Missing or invalid tracking parameters
//! - STORE_001: Ephemeral or durable store unavailable
//!
//! `InvalidToken` and `SpamDetected` never reach a caller. The recorder turns
//! the first into a new session and the second into a neutered response.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Client input error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputErrorCode {
    /// INPUT_001: Missing or malformed tracking parameter
    InvalidParameter,
}

impl InputErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidParameter => "INPUT_001",
        }
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> u16 {
        400
    }
}

/// Store error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorCode {
    /// STORE_001: Store unreachable or command failed
    Unavailable,
}

impl StoreErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unavailable => "STORE_001",
        }
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> u16 {
        503
    }
}

/// Which store an upstream error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Ephemeral,
    Durable,
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ephemeral => f.write_str("ephemeral"),
            Self::Durable => f.write_str("durable"),
        }
    }
}

/// Unified error type for the tracking engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid tracking parameters.
    #[error("[{code}] {message}")]
    ClientInput {
        code: &'static str,
        message: String,
        http_status: u16,
    },

    /// Ephemeral or durable store failure.
    #[error("[{code}] {store} store: {message}")]
    UpstreamStore {
        code: &'static str,
        store: StoreKind,
        message: String,
        http_status: u16,
    },

    #[error("invalid session token: {0}")]
    InvalidToken(String),

    #[error("spam referrer: {0}")]
    SpamDetected(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid window: {0}")]
    InvalidWindow(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a client input error.
    pub fn client_input(msg: impl Into<String>) -> Self {
        let code = InputErrorCode::InvalidParameter;
        Self::ClientInput {
            code: code.code(),
            message: msg.into(),
            http_status: code.http_status(),
        }
    }

    /// Create an ephemeral store error.
    pub fn ephemeral(msg: impl Into<String>) -> Self {
        Self::store(StoreKind::Ephemeral, msg)
    }

    /// Create a durable store error.
    pub fn durable(msg: impl Into<String>) -> Self {
        Self::store(StoreKind::Durable, msg)
    }

    fn store(store: StoreKind, msg: impl Into<String>) -> Self {
        let code = StoreErrorCode::Unavailable;
        Self::UpstreamStore {
            code: code.code(),
            store,
            message: msg.into(),
            http_status: code.http_status(),
        }
    }

    pub fn spam(host: impl Into<String>) -> Self {
        Self::SpamDetected(host.into())
    }

    pub fn invalid_token(msg: impl Into<String>) -> Self {
        Self::InvalidToken(msg.into())
    }

    pub fn invalid_window(msg: impl Into<String>) -> Self {
        Self::InvalidWindow(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Get the HTTP status code for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ClientInput { http_status, .. } => *http_status,
            Self::UpstreamStore { http_status, .. } => *http_status,
            Self::InvalidToken(_) => 400,
            Self::SpamDetected(_) => 200,
            Self::Serialization(_) => 500,
            Self::InvalidWindow(_) => 400,
            Self::Internal(_) => 500,
        }
    }

    /// Get the error code if this is a coded error.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::ClientInput { code, .. } => Some(code),
            Self::UpstreamStore { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Whether this error came from a store round trip.
    pub fn is_store_error(&self) -> bool {
        matches!(self, Self::UpstreamStore { .. })
    }
}
