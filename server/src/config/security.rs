use axum::http::{HeaderName, HeaderValue};
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;

/// Headers stamped on every API response. API responses are JSON only, so
/// the policy forbids everything a browser might render.
const SECURITY_HEADERS: &[(&str, &str)] = &[
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("x-xss-protection", "1; mode=block"),
    ("content-security-policy", "default-src 'none'; frame-ancestors 'none'"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
    ("permissions-policy", "geolocation=(), microphone=(), camera=()"),
];

const STRICT_TRANSPORT_SECURITY: &str = "strict-transport-security";
const HSTS_VALUE: &str = "max-age=31536000; includeSubDomains";

fn header_layer(name: &'static str, value: &'static str) -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::overriding(
        HeaderName::from_static(name),
        HeaderValue::from_static(value),
    )
}

/// HSTS is only sent in production (HTTPS environments).
pub fn apply_security_headers<S>(router: Router<S>, include_hsts: bool) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let mut router = SECURITY_HEADERS
        .iter()
        .fold(router, |router, &(name, value)| router.layer(header_layer(name, value)));

    if include_hsts {
        tracing::info!("Security: HSTS header enabled (production mode)");
        router = router.layer(header_layer(STRICT_TRANSPORT_SECURITY, HSTS_VALUE));
    } else {
        tracing::info!("Security: HSTS header disabled (development mode)");
    }

    router
}
