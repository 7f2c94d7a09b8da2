use axum::http::{header, HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

const PREFLIGHT_MAX_AGE_SECS: u64 = 86400;

pub fn create_cors_layer(configured: Option<&str>) -> CorsLayer {
    let allowed_origins = allowed_origins(configured.unwrap_or(DEFAULT_ALLOWED_ORIGINS));

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            header::ORIGIN,
            HeaderName::from_static("x-requested-with"),
            HeaderName::from_static("x-user-id"),
            HeaderName::from_static("x-user-role"),
        ])
        .expose_headers([
            header::CONTENT_LENGTH,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-request-id"),
        ])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(PREFLIGHT_MAX_AGE_SECS))
}

fn parse_origins(origins_str: &str) -> Vec<HeaderValue> {
    origins_str
        .split(',')
        .filter_map(|origin| {
            let trimmed = origin.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<HeaderValue>() {
                Ok(value) => {
                    tracing::debug!("CORS: Allowing origin: {}", trimmed);
                    Some(value)
                }
                Err(e) => {
                    tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                    None
                }
            }
        })
        .collect()
}

fn allowed_origins(origins_str: &str) -> AllowOrigin {
    let origins = parse_origins(origins_str);

    // Credentials rule out a wildcard, so fall back to the dev origins.
    if origins.is_empty() {
        tracing::warn!("CORS: No valid origins configured, using development defaults");
        AllowOrigin::list(parse_origins(DEFAULT_ALLOWED_ORIGINS))
    } else {
        tracing::info!("CORS: Configured with {} allowed origin(s)", origins.len());
        AllowOrigin::list(origins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_cors_layer() {
        let _layer = create_cors_layer(None);
        let _layer = create_cors_layer(Some("https://tickets.example.com"));
    }

    #[test]
    fn test_parse_origins_skips_blanks() {
        let origins = parse_origins("https://a.example.com, ,https://b.example.com,");
        assert_eq!(origins.len(), 2);
        assert_eq!(origins[1], "https://b.example.com");
    }

    #[test]
    fn test_default_origins_are_valid() {
        assert_eq!(
            parse_origins(DEFAULT_ALLOWED_ORIGINS).len(),
            DEFAULT_ALLOWED_ORIGINS.split(',').count()
        );
    }
}
