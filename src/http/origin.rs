//! Origin fetcher.
//!
//! # Responsibilities
//! - Forward method, path, sanitized headers and body to the origin
//! - Bound the whole exchange by the request timeout
//! - Drain the response under the size cap and package it as a `CacheEntry`
//!
//! # Design Decisions
//! - The body is passed through byte for byte; nothing is decoded
//! - Oversized responses fail instead of being truncated
//! - No retries; transport policy belongs to the pooled client

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderMap, Method, Request, StatusCode, Uri};
use bytes::Bytes;
use http_body_util::Full;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::{TokioExecutor, TokioTimer},
};

use crate::cache::CacheEntry;
use crate::config::{OriginConfig, ServerConfig};
use crate::error::ProxyError;
use crate::http::body::{collect_limited, declared_length, BodyReadError};
use crate::security::{canonical_name, sanitize_headers};

/// Everything needed to replay an inbound request against the origin.
#[derive(Debug, Clone)]
pub struct OriginRequest {
    pub method: Method,
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Pooled HTTP(S) client bound to one origin.
#[derive(Clone)]
pub struct OriginClient {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    base: Arc<str>,
    timeout: Duration,
    max_response_body: usize,
}

impl OriginClient {
    pub fn new(server: &ServerConfig, origin: &OriginConfig) -> Result<Self, rustls::Error> {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_nodelay(true);
        http.set_connect_timeout(Some(Duration::from_secs(origin.connect_timeout_secs)));

        let https = HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())?
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .wrap_connector(http);

        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(origin.pool_max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(origin.pool_idle_timeout_secs))
            .build(https);

        Ok(Self {
            client,
            base: Arc::from(server.origin_base()),
            timeout: server.request_timeout(),
            max_response_body: server.max_response_body,
        })
    }

    /// Origin base URL, without trailing slash.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Perform one origin exchange.
    pub async fn fetch(&self, request: OriginRequest) -> Result<CacheEntry, ProxyError> {
        let uri: Uri = format!("{}{}", self.base, request.path_and_query)
            .parse()
            .map_err(|_| ProxyError::InvalidPath(request.path_and_query.clone()))?;

        let mut headers = sanitize_headers(&request.headers);
        // The client derives Host from the origin URI.
        headers.remove(header::HOST);

        let mut outbound = Request::builder()
            .method(request.method)
            .uri(uri)
            .body(Full::new(request.body))
            .map_err(|e| ProxyError::OriginUnreachable(format!("cannot build request: {}", e)))?;
        *outbound.headers_mut() = headers;

        match tokio::time::timeout(self.timeout, self.exchange(outbound)).await {
            Ok(result) => result,
            Err(_) => Err(ProxyError::OriginUnreachable(format!(
                "no complete response within {:?}",
                self.timeout
            ))),
        }
    }

    async fn exchange(&self, request: Request<Full<Bytes>>) -> Result<CacheEntry, ProxyError> {
        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| ProxyError::OriginUnreachable(error_chain(&e)))?;

        let (parts, body) = response.into_parts();
        let limit = self.max_response_body;
        if declared_length(&parts.headers).is_some_and(|len| len > limit as u64) {
            return Err(ProxyError::ResponseTooLarge { limit });
        }

        let body = collect_limited(body, limit).await.map_err(|err| match err {
            BodyReadError::TooLarge => ProxyError::ResponseTooLarge { limit },
            BodyReadError::Read(msg) => ProxyError::OriginUnreachable(msg),
        })?;

        Ok(entry_from_parts(parts.status, &parts.headers, body))
    }
}

/// Package a drained response. Header names are canonicalized; values keep
/// their exact bytes.
pub fn entry_from_parts(status: StatusCode, headers: &HeaderMap, body: Bytes) -> CacheEntry {
    let mut entry = CacheEntry::new(status.as_u16(), Vec::with_capacity(headers.keys_len()), body);
    for (name, value) in headers.iter() {
        entry.append_header(&canonical_name(name.as_str()), value.as_bytes());
    }
    entry
}

fn error_chain(err: &dyn StdError) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
