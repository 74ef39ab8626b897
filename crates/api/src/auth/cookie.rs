//! Auth cookie handling
//!
//! The browser client authenticates both REST calls and the socket upgrade
//! with an HttpOnly cookie carrying the access token.

use axum::http::{header, HeaderMap};

/// Name of the cookie carrying the access token
pub const AUTH_COOKIE: &str = "supportly_token";

/// Extract a cookie value by name from the `Cookie` request headers
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key.trim() == name).then(|| value.trim().trim_matches('"').to_string())
        })
        .find(|value| !value.is_empty())
}

/// Extract a bearer token from the `Authorization` header
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Access token from the bearer header, falling back to the auth cookie
pub fn request_token(headers: &HeaderMap) -> Option<String> {
    bearer_token(headers).or_else(|| cookie_value(headers, AUTH_COOKIE))
}

/// `Set-Cookie` value that stores the access token
pub fn auth_cookie(token: &str, max_age_seconds: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{AUTH_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_seconds}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that clears the access token
pub fn clear_auth_cookie(secure: bool) -> String {
    auth_cookie("", 0, secure)
}
