//! Sticky-session cookie handling (§2, §4.2 step 13). Only a single named
//! cookie needs to be read or emitted on each side, so this hand-rolls the
//! parsing rather than pulling in a dedicated cookie crate — consistent
//! with this codebase's habit of doing small string transforms inline
//! rather than reaching for a dependency to save a few lines.

use http::HeaderMap;

const STICKY_COOKIE: &str = "__VCAP_ID__";
const SESSION_COOKIE: &str = "JSESSIONID";

/// Extract the sticky cookie's value from a request's `Cookie` header, if any.
pub fn sticky_value(headers: &HeaderMap) -> Option<String> {
    cookie_value(headers, "cookie", STICKY_COOKIE)
}

/// True if any upstream `Set-Cookie` header names the session-inducing cookie.
pub fn response_starts_session(headers: &HeaderMap) -> bool {
    headers
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| cookie_name(v) == Some(SESSION_COOKIE))
}

/// Build the `Set-Cookie: __VCAP_ID__=<id>; Path=/` header value.
pub fn sticky_set_cookie(private_instance_id: &str) -> String {
    format!("{}={}; Path=/", STICKY_COOKIE, private_instance_id)
}

fn cookie_value(headers: &HeaderMap, header_name: &str, name: &str) -> Option<String> {
    headers
        .get_all(header_name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|pair| {
            let pair = pair.trim();
            let (k, v) = pair.split_once('=')?;
            if k.trim() == name {
                Some(v.trim().to_string())
            } else {
                None
            }
        })
}

fn cookie_name(set_cookie_value: &str) -> Option<&str> {
    let first = set_cookie_value.split(';').next()?;
    let (name, _) = first.split_once('=')?;
    Some(name.trim())
}
