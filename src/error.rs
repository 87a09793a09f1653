//! Request-path error taxonomy.
//!
//! # Design Decisions
//! - `ProxyError` is `Clone` so one coalesced failure can be handed to every waiter
//! - Client-caused failures map to 4xx, origin failures to 502
//! - Store errors live in `cache::store`; they never reach a proxied client

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::coalesce::LeaderAborted;

/// Errors produced while handling a proxied request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProxyError {
    /// Path would corrupt key construction or cannot be forwarded.
    #[error("malformed request path: {0}")]
    InvalidPath(String),

    /// Inbound body exceeded the configured limit.
    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    /// Inbound body could not be read.
    #[error("failed to read request body: {0}")]
    RequestBody(String),

    /// Client did not finish sending its body within the request timeout.
    #[error("request body not received within {0:?}")]
    RequestTimeout(std::time::Duration),

    /// Transport failure or timeout talking to the origin.
    #[error("origin unreachable: {0}")]
    OriginUnreachable(String),

    /// Origin response body exceeded the configured limit.
    #[error("origin response exceeds {limit} bytes")]
    ResponseTooLarge { limit: usize },

    /// The coalesced leader task died before producing a result.
    #[error("origin fetch aborted: {0}")]
    LeaderAborted(String),
}

impl ProxyError {
    /// HTTP status returned to the client for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidPath(_) | ProxyError::RequestBody(_) => StatusCode::BAD_REQUEST,
            ProxyError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::RequestTimeout(_) => StatusCode::REQUEST_TIMEOUT,
            ProxyError::OriginUnreachable(_)
            | ProxyError::ResponseTooLarge { .. }
            | ProxyError::LeaderAborted(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<LeaderAborted> for ProxyError {
    fn from(err: LeaderAborted) -> Self {
        ProxyError::LeaderAborted(err.to_string())
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Origin details stay in the logs.
        let body = if status.is_server_error() {
            status.canonical_reason().unwrap_or("Bad Gateway").to_string()
        } else {
            self.to_string()
        };
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_4xx() {
        assert_eq!(ProxyError::InvalidPath("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ProxyError::BodyTooLarge { limit: 8 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ProxyError::RequestTimeout(std::time::Duration::from_secs(1)).status(),
            StatusCode::REQUEST_TIMEOUT
        );
    }

    #[test]
    fn origin_errors_are_bad_gateway() {
        assert_eq!(
            ProxyError::OriginUnreachable("refused".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ProxyError::ResponseTooLarge { limit: 8 }.status(),
            StatusCode::BAD_GATEWAY
        );
    }
}
