//! CORS (Cross-Origin Resource Sharing) Configuration
//!
//! Browser callers are the product's own front end, so the policy allows the
//! configured app origin plus loopback origins for local development.
//!
//! # Policy
//!
//! - **Allowed Origins**: the `APP_URL` origin; `localhost`, `127.0.0.1` and
//!   `[::1]` on any port over http or https
//! - **Allowed Methods**: GET, POST, PUT, DELETE, OPTIONS (preflight)
//! - **Allowed Headers**: Content-Type, Authorization
//! - **Max Age**: 3600 seconds for preflight caching
//!
//! The webhook route is called server-to-server and is unaffected by CORS.

use std::net::Ipv4Addr;
use std::time::Duration;

use http::header::{HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use http::Method;
use tower_http::cors::{AllowOrigin, CorsLayer};
use url::{Host, Url};

/// Allowed request headers
pub const ALLOWED_HEADERS: [HeaderName; 2] = [CONTENT_TYPE, AUTHORIZATION];

/// Allowed methods
pub const ALLOWED_METHODS: [Method; 5] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::OPTIONS,
];

/// Default max age for preflight cache (1 hour)
pub const DEFAULT_MAX_AGE_SECS: u64 = 3600;

/// CORS layer allowing `app_url`'s origin and loopback origins
pub fn cors_layer(app_url: &Url) -> CorsLayer {
    let app_origin = app_url.origin().ascii_serialization();

    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin, _| {
            is_allowed_origin(origin, &app_origin)
        }))
        .allow_methods(ALLOWED_METHODS)
        .allow_headers(ALLOWED_HEADERS)
        .max_age(Duration::from_secs(DEFAULT_MAX_AGE_SECS))
}

/// Whether `origin` is the app origin or a loopback origin
pub fn is_allowed_origin(origin: &HeaderValue, app_origin: &str) -> bool {
    let Ok(origin) = origin.to_str() else {
        return false;
    };
    let Ok(parsed) = Url::parse(origin) else {
        return false;
    };

    parsed.origin().ascii_serialization() == app_origin || is_loopback(&parsed)
}

/// Checks if the given URL is an http(s) loopback origin.
///
/// `localhost`, `127.0.0.1` and `[::1]` qualify; lookalikes such as
/// `localhost.evil.com` or `127.0.0.1.nip.io` do not.
pub fn is_loopback(url: &Url) -> bool {
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip == Ipv4Addr::LOCALHOST,
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}
