//! Bearer-token gate for admin routes.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::http::state::ProxyState;

/// Rejects requests whose bearer token does not match the configured secret.
pub async fn admin_auth_middleware(
    State(state): State<ProxyState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let secret = state.config.server.secret.as_bytes();
    let authorized = match bearer_token(request.headers()) {
        // An unset secret never authorizes anything.
        Some(token) => !secret.is_empty() && constant_time_eq(token.as_bytes(), secret),
        None => false,
    };

    if authorized {
        return next.run(request).await;
    }

    tracing::warn!(path = %request.uri().path(), "Admin request rejected");
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Bearer")],
        "Unauthorized",
    )
        .into_response()
}

/// Token from `Authorization: Bearer <token>`; the scheme is case-insensitive.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Compares without short-circuiting on the first differing byte.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn auth(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn scheme_is_case_insensitive() {
        assert_eq!(bearer_token(&auth("Bearer s3cret")), Some("s3cret"));
        assert_eq!(bearer_token(&auth("bearer s3cret")), Some("s3cret"));
        assert_eq!(bearer_token(&auth("BEARER s3cret")), Some("s3cret"));
    }

    #[test]
    fn malformed_headers_yield_nothing() {
        assert_eq!(bearer_token(&HeaderMap::new()), None);
        assert_eq!(bearer_token(&auth("Basic dXNlcjpwYXNz")), None);
        assert_eq!(bearer_token(&auth("Bearer")), None);
        assert_eq!(bearer_token(&auth("Bearer ")), None);
        assert_eq!(bearer_token(&auth("s3cret")), None);
    }

    #[test]
    fn comparison() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(constant_time_eq(b"", b""));
    }
}
