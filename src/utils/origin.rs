// src/utils/origin.rs

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use url::Url;

use crate::{error::AppError, state::AppState, utils::qr};

/// Scheme and host the client used to reach us, for building public links.
///
/// `PUBLIC_BASE_URL` wins when configured; otherwise the origin is taken from
/// `X-Forwarded-Proto` / `X-Forwarded-Host` / `Host`.
#[derive(Debug, Clone)]
pub struct PublicOrigin(pub Url);

impl PublicOrigin {
    pub fn result_url(&self, exam_number: &str) -> String {
        qr::result_url(&self.0, exam_number)
    }

    fn from_headers(headers: &HeaderMap) -> Result<Self, AppError> {
        let header_value = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.split(',').next())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };

        let scheme = header_value("x-forwarded-proto").unwrap_or("http");
        let host = header_value("x-forwarded-host")
            .or_else(|| header_value(header::HOST.as_str()))
            .unwrap_or("localhost");

        if !matches!(scheme, "http" | "https") {
            return Err(AppError::BadRequest(format!("Invalid forwarded scheme '{}'", scheme)));
        }
        // A host header carries only host[:port]; anything else would leak into public links.
        if host.contains(['/', '?', '#', '@', '\\']) || host.chars().any(char::is_whitespace) {
            return Err(AppError::BadRequest(format!("Invalid host '{}'", host)));
        }

        Url::parse(&format!("{}://{}", scheme, host))
            .map(Self)
            .map_err(|_| AppError::BadRequest(format!("Invalid host '{}'", host)))
    }
}

impl FromRequestParts<AppState> for PublicOrigin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match &state.config.public_base_url {
            Some(base) => Url::parse(base).map(Self).map_err(|e| {
                AppError::InternalServerError(format!("Invalid PUBLIC_BASE_URL '{}': {}", base, e))
            }),
            None => Self::from_headers(&parts.headers),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_origin_from_host_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("results.example:8080"));

        let origin = PublicOrigin::from_headers(&headers).unwrap();
        assert_eq!(
            origin.result_url("EX-2024-003"),
            "http://results.example:8080/result/EX-2024-003"
        );
    }

    #[test]
    fn test_forwarded_headers_take_priority() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("10.0.0.5:5000"));
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        headers.insert("x-forwarded-host", HeaderValue::from_static("results.example"));

        let origin = PublicOrigin::from_headers(&headers).unwrap();
        assert_eq!(origin.result_url("EX-1"), "https://results.example/result/EX-1");
    }

    #[test]
    fn test_host_with_path_or_userinfo_is_rejected() {
        for host in ["evil.example/x", "evil.example?q=1", "evil.example#frag", "user@evil.example"] {
            let mut headers = HeaderMap::new();
            headers.insert(header::HOST, HeaderValue::from_static("results.example"));
            headers.insert("x-forwarded-host", HeaderValue::from_str(host).unwrap());

            assert!(
                matches!(PublicOrigin::from_headers(&headers), Err(AppError::BadRequest(_))),
                "host {} should be rejected",
                host
            );
        }
    }

    #[test]
    fn test_unknown_forwarded_scheme_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("results.example"));
        headers.insert("x-forwarded-proto", HeaderValue::from_static("javascript"));

        assert!(PublicOrigin::from_headers(&headers).is_err());
    }

    #[test]
    fn test_missing_host_falls_back_to_localhost() {
        let origin = PublicOrigin::from_headers(&HeaderMap::new()).unwrap();
        assert_eq!(origin.result_url("EX-1"), "http://localhost/result/EX-1");
    }
}
