//! Size-bounded body collection.

use std::fmt::Display;
use std::pin::pin;

use axum::http::{header, HeaderMap};
use bytes::{Bytes, BytesMut};
use http_body_util::BodyExt;
use hyper::body::Body as HttpBody;

/// Why a body could not be collected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyReadError {
    /// More than the allowed number of bytes arrived or were declared.
    TooLarge,
    /// The stream failed before completing.
    Read(String),
}

/// Declared `Content-Length`, if present and well-formed.
pub fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Drain `body` into memory, failing as soon as it exceeds `limit` bytes.
/// Never truncates.
pub async fn collect_limited<B>(body: B, limit: usize) -> Result<Bytes, BodyReadError>
where
    B: HttpBody<Data = Bytes>,
    B::Error: Display,
{
    let mut body = pin!(body);
    let mut buf = BytesMut::new();

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|e| BodyReadError::Read(e.to_string()))?;
        // Trailers carry no payload.
        if let Ok(data) = frame.into_data() {
            if buf.len() + data.len() > limit {
                return Err(BodyReadError::TooLarge);
            }
            buf.extend_from_slice(&data);
        }
    }

    Ok(buf.freeze())
}
