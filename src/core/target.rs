// src/core/target.rs

//! Converts a raw scan target into the two shapes the tools expect: a bare
//! host for enumeration and port scanning, a full URL for crawling and
//! templating. Both functions are total; malformed input passes through
//! best-effort and the tool invocation is left to reject it.

use url::Url;

/// Strips scheme, credentials, path, query and fragment, keeping `host[:port]`.
pub fn to_host(target: &str) -> String {
    let trimmed = target.trim();

    if trimmed.contains("://") {
        if let Ok(url) = Url::parse(trimmed) {
            if let Some(host) = url.host_str() {
                return match url.port() {
                    Some(port) => format!("{host}:{port}"),
                    None => host.to_string(),
                };
            }
        }
    }

    let rest = match trimmed.find("://") {
        Some(idx) => &trimmed[idx + 3..],
        None => trimmed,
    };
    let authority = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    let authority = authority.rsplit('@').next().unwrap_or(authority);

    if authority.is_empty() {
        rest.trim_end_matches('/').to_string()
    } else {
        authority.to_string()
    }
}

/// Returns the target unchanged when it already carries an http(s) scheme,
/// otherwise prefixes `https://`.
pub fn to_url(target: &str) -> String {
    if target.starts_with("http://") || target.starts_with("https://") {
        target.to_string()
    } else {
        format!("https://{target}")
    }
}
