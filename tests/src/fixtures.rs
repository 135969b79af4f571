//! Test fixtures.

use chrono::{NaiveDate, Utc};
use tracking_core::window::format_day;

pub const SITE: &str = "blog.example.com";

pub const SALT: &str = "integration-salt";

/// Host every test denylist contains.
pub const SPAM_HOST: &str = "spam-referrer.net";

/// `Referer` header of a page on the test site.
pub fn page_url(path: &str) -> String {
    format!("https://{SITE}{path}")
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn today_key() -> String {
    format_day(today())
}

/// `Cookie` header carrying a session token.
pub fn session_cookie(token: &str) -> String {
    format!("_tcs={token}")
}

/// Pulls the token out of a `Set-Cookie` value.
pub fn token_from_set_cookie(value: &str) -> Option<String> {
    let first = value.split(';').next()?;
    let (name, token) = first.split_once('=')?;
    (name == "_tcs").then(|| token.to_string())
}
