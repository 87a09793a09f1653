//! Inbound request validation.
//!
//! # Responsibilities
//! - Reject paths that cannot safely become part of a cache key
//! - Enforce the maximum request body size and read deadline
//!
//! # Design Decisions
//! - Declared `Content-Length` is checked before any body byte is read
//! - Violations are client errors: 400 for the path, 413 for the body,
//!   408 for a body that stalls past the request timeout

use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Uri};
use bytes::Bytes;

use crate::error::ProxyError;
use crate::http::body::{collect_limited, declared_length, BodyReadError};

/// Path-with-query to forward and key on.
pub fn validate_path(uri: &Uri) -> Result<String, ProxyError> {
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    if !path.starts_with('/') {
        return Err(ProxyError::InvalidPath(path.to_string()));
    }
    if path.chars().any(|c| c.is_ascii_control() || c.is_whitespace()) {
        return Err(ProxyError::InvalidPath(path.escape_debug().to_string()));
    }
    Ok(path.to_string())
}

/// Read the whole request body, up to `limit` bytes, within `deadline`.
pub async fn read_request_body(
    headers: &HeaderMap,
    body: Body,
    limit: usize,
    deadline: Duration,
) -> Result<Bytes, ProxyError> {
    if declared_length(headers).is_some_and(|len| len > limit as u64) {
        return Err(ProxyError::BodyTooLarge { limit });
    }

    match tokio::time::timeout(deadline, collect_limited(body, limit)).await {
        Ok(Ok(bytes)) => Ok(bytes),
        Ok(Err(BodyReadError::TooLarge)) => Err(ProxyError::BodyTooLarge { limit }),
        Ok(Err(BodyReadError::Read(msg))) => Err(ProxyError::RequestBody(msg)),
        Err(_) => Err(ProxyError::RequestTimeout(deadline)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, HeaderValue};

    const DEADLINE: Duration = Duration::from_secs(5);

    #[test]
    fn ordinary_paths_pass() {
        let uri: Uri = "/a/b?x=1&y=%20".parse().unwrap();
        assert_eq!(validate_path(&uri).unwrap(), "/a/b?x=1&y=%20");
    }

    #[test]
    fn absolute_form_uses_path_only() {
        let uri: Uri = "http://origin.test/p?q".parse().unwrap();
        assert_eq!(validate_path(&uri).unwrap(), "/p?q");
    }

    #[test]
    fn asterisk_form_is_rejected() {
        let uri: Uri = "*".parse().unwrap();
        assert!(matches!(validate_path(&uri), Err(ProxyError::InvalidPath(_))));
    }

    #[tokio::test]
    async fn declared_oversize_rejected_without_reading() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("9"));
        let err = read_request_body(&headers, Body::empty(), 8, DEADLINE).await.unwrap_err();
        assert_eq!(err, ProxyError::BodyTooLarge { limit: 8 });
    }

    #[tokio::test]
    async fn streamed_oversize_rejected() {
        let err = read_request_body(&HeaderMap::new(), Body::from(vec![0u8; 9]), 8, DEADLINE)
            .await
            .unwrap_err();
        assert_eq!(err, ProxyError::BodyTooLarge { limit: 8 });
    }

    #[tokio::test]
    async fn body_within_limit_is_returned() {
        let bytes = read_request_body(&HeaderMap::new(), Body::from("payload"), 8, DEADLINE)
            .await
            .unwrap();
        assert_eq!(bytes.as_ref(), b"payload");
    }

    #[tokio::test]
    async fn stalled_body_times_out() {
        use futures_util::{stream, StreamExt};

        // One byte arrives, then the client goes quiet.
        let chunks = stream::iter([Ok::<_, std::io::Error>(Bytes::from_static(b"a"))])
            .chain(stream::pending());
        let body = Body::from_stream(chunks);

        let deadline = Duration::from_millis(50);
        let err = read_request_body(&HeaderMap::new(), body, 8, deadline)
            .await
            .unwrap_err();
        assert_eq!(err, ProxyError::RequestTimeout(deadline));
    }
}
