//! Cache key derivation.

use std::fmt;

use axum::http::Method;

/// Deterministic identity of one cacheable unit of work:
/// `origin + ":" + METHOD + ":" + path-with-query`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(origin: &str, method: &Method, path_and_query: &str) -> Self {
        Self(format!(
            "{}:{}:{}",
            origin.trim_end_matches('/'),
            method.as_str(),
            path_and_query
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        let key = CacheKey::new("https://origin.test", &Method::GET, "/a/b?x=1");
        assert_eq!(key.as_str(), "https://origin.test:GET:/a/b?x=1");
    }

    #[test]
    fn trailing_slash_on_origin_is_ignored() {
        assert_eq!(
            CacheKey::new("http://o/", &Method::GET, "/p"),
            CacheKey::new("http://o", &Method::GET, "/p")
        );
    }

    #[test]
    fn method_and_query_distinguish_keys() {
        let get = CacheKey::new("http://o", &Method::GET, "/p");
        assert_ne!(get, CacheKey::new("http://o", &Method::HEAD, "/p"));
        assert_ne!(get, CacheKey::new("http://o", &Method::GET, "/p?v=2"));
    }
}
