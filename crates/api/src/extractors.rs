//! Request extractors.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use telemetry::metrics;
use tracking_core::limits::MAX_REFERRER_LEN;
use tracking_core::referrer::page_identifier;
use tracking_core::Error;
use url::Url;

use crate::response::ApiError;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "_tcs";

/// Site and page of a hit, taken from the `Referer` header.
///
/// The embedding page is whatever the browser says it is; the pixel never
/// trusts a domain passed as a parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelSource {
    pub domain: String,
    pub page: String,
}

impl PixelSource {
    pub fn from_referer(raw: &str) -> Result<Self, Error> {
        if raw.len() > MAX_REFERRER_LEN {
            return Err(Error::client_input(format!(
                "Referer longer than {MAX_REFERRER_LEN} bytes"
            )));
        }
        let url = Url::parse(raw.trim())
            .map_err(|e| Error::client_input(format!("invalid Referer {raw:?}: {e}")))?;
        let domain = url
            .host_str()
            .map(|h| h.trim_end_matches('.').to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::client_input(format!("Referer {raw:?} has no host")))?;

        Ok(Self {
            domain,
            page: page_identifier(&url),
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for PixelSource
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let result = parts
            .headers
            .get(header::REFERER)
            .ok_or_else(|| Error::client_input("missing Referer header"))
            .and_then(|h| {
                h.to_str()
                    .map_err(|_| Error::client_input("Referer header is not valid text"))
            })
            .and_then(PixelSource::from_referer);

        result.map_err(|e| {
            metrics().client_errors.inc();
            ApiError::from(e)
        })
    }
}

/// Value of the session cookie, if sent.
#[derive(Debug, Clone, Default)]
pub struct SessionCookie(pub Option<String>);

impl SessionCookie {
    /// Finds the session cookie in a `Cookie` header value.
    pub fn parse(header: &str) -> Option<String> {
        header.split(';').find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name.trim() == SESSION_COOKIE && !value.trim().is_empty())
                .then(|| value.trim().to_string())
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for SessionCookie
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|h| h.to_str().ok())
            .find_map(SessionCookie::parse);
        Ok(SessionCookie(token))
    }
}
