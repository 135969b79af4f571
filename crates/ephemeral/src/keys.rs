//! Key layout.
//!
//! | Key | Type |
//! |---|---|
//! | `{day}:{domain}:s:{nonce}` | list: referrer, then tagged events |
//! | `rf:{domain}:{nonce}` | string: first referrer of the visitor |
//! | `{day}:pending` | hash: domain to append count for the day |

pub fn session_key(day: &str, domain: &str, nonce: u32) -> String {
    format!("{day}:{domain}:s:{nonce}")
}

/// Prefix shared by all session lists of one domain and day.
pub fn session_prefix(day: &str, domain: &str) -> String {
    format!("{day}:{domain}:s:")
}

/// SCAN pattern for all session lists of one domain and day.
pub fn session_pattern(day: &str, domain: &str) -> String {
    format!("{}*", glob_escape(&session_prefix(day, domain)))
}

/// Escapes glob metacharacters so `[::1]` matches literally.
fn glob_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '[' | ']' | '*' | '?' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub fn referrer_key(domain: &str, nonce: u32) -> String {
    format!("rf:{domain}:{nonce}")
}

pub fn pending_key(day: &str) -> String {
    format!("{day}:pending")
}

/// The session id (nonce) at the end of a session key.
pub fn session_id(key: &str) -> Option<&str> {
    key.rsplit_once(":s:").map(|(_, id)| id).filter(|id| !id.is_empty())
}
