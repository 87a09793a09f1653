mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use caching_proxy::cache::{CacheEntry, CacheKey, CacheStore, MemoryStore};
use common::{json_body, test_config, FailingStore, MockOrigin, RecordingStore, TestProxy};

#[tokio::test]
async fn second_request_is_served_from_cache() {
    let origin = MockOrigin::start().await;
    let proxy = TestProxy::start(test_config(&origin), Arc::new(MemoryStore::default())).await;
    let client = reqwest::Client::new();

    let first = client.get(proxy.url("/items?page=2")).send().await.unwrap();
    assert_eq!(first.status(), 200);
    assert_eq!(first.headers()["x-cache"], "MISS");
    assert_eq!(first.headers()["x-origin"], "mock");
    let first_body = json_body(first).await;
    assert_eq!(first_body["path"], "/items?page=2");

    let second = client.get(proxy.url("/items?page=2")).send().await.unwrap();
    assert_eq!(second.status(), 200);
    assert_eq!(second.headers()["x-cache"], "HIT");
    assert_eq!(second.headers()["set-cookie"], "a=1");
    assert_eq!(json_body(second).await, first_body);

    assert_eq!(origin.hits(), 1);
    proxy.stop().await;
}

#[tokio::test]
async fn query_and_method_are_part_of_the_key() {
    let origin = MockOrigin::start().await;
    let proxy = TestProxy::start(test_config(&origin), Arc::new(MemoryStore::default())).await;
    let client = reqwest::Client::new();

    client.get(proxy.url("/a?x=1")).send().await.unwrap();
    let other_query = client.get(proxy.url("/a?x=2")).send().await.unwrap();
    assert_eq!(other_query.headers()["x-cache"], "MISS");
    let other_method = client.post(proxy.url("/a?x=1")).send().await.unwrap();
    assert_eq!(other_method.headers()["x-cache"], "MISS");

    assert_eq!(origin.hits(), 3);
    proxy.stop().await;
}

#[tokio::test]
async fn concurrent_misses_share_one_origin_fetch() {
    let origin = MockOrigin::start().await;
    origin.set_delay(Duration::from_millis(300));
    let proxy = TestProxy::start(test_config(&origin), Arc::new(MemoryStore::default())).await;
    let client = reqwest::Client::new();

    let requests = (0..20).map(|_| {
        let client = client.clone();
        let url = proxy.url("/slow");
        tokio::spawn(async move {
            let response = client.get(url).send().await.unwrap();
            assert_eq!(response.status(), 200);
            response.text().await.unwrap()
        })
    });
    let bodies: Vec<String> = futures_util::future::join_all(requests)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    assert_eq!(origin.hits(), 1);
    assert!(bodies.iter().all(|body| body == &bodies[0]));
    proxy.stop().await;
}

#[tokio::test]
async fn blacklisted_paths_never_touch_the_store() {
    let origin = MockOrigin::start().await;
    let store = Arc::new(RecordingStore::default());

    let mut config = test_config(&origin);
    config.blacklist = vec!["^/private".to_string()];

    // Even a present entry must not be served.
    let key = CacheKey::new(&origin.url(), &reqwest::Method::GET, "/private/data");
    store
        .inner
        .set(key.as_str(), &CacheEntry::new(200, Vec::new(), &b"stale"[..]))
        .await
        .unwrap();

    let proxy = TestProxy::start(config, store.clone()).await;
    let client = reqwest::Client::new();

    for _ in 0..2 {
        let response = client.get(proxy.url("/private/data")).send().await.unwrap();
        assert_eq!(response.headers()["x-cache"], "BYPASS");
        let body = json_body(response).await;
        assert_eq!(body["path"], "/private/data");
    }

    assert_eq!(store.gets(), 0);
    assert_eq!(store.sets(), 0);
    assert_eq!(origin.hits(), 2);
    proxy.stop().await;
}

#[tokio::test]
async fn bypass_failures_are_tagged() {
    let mut config = test_config(&MockOrigin::start().await);
    // Nothing listens on port 9 of localhost.
    config.server.origin = "http://127.0.0.1:9".to_string();
    config.blacklist = vec!["^/nocache".to_string()];
    let store = Arc::new(RecordingStore::default());
    let proxy = TestProxy::start(config, store.clone()).await;

    let response = reqwest::get(proxy.url("/nocache")).await.unwrap();
    assert_eq!(response.status(), 502);
    assert_eq!(response.headers()["x-cache"], "BYPASS");
    assert_eq!(store.gets(), 0);
    proxy.stop().await;
}

#[tokio::test]
async fn store_failures_degrade_to_origin() {
    let origin = MockOrigin::start().await;
    let proxy = TestProxy::start(test_config(&origin), Arc::new(FailingStore)).await;

    for _ in 0..2 {
        let response = reqwest::get(proxy.url("/flaky-store")).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.headers()["x-cache"], "MISS");
    }
    assert_eq!(origin.hits(), 2);
    proxy.stop().await;
}

#[tokio::test]
async fn origin_status_is_replayed_and_cached() {
    let origin = MockOrigin::start().await;
    let proxy = TestProxy::start(test_config(&origin), Arc::new(MemoryStore::default())).await;

    let first = reqwest::get(proxy.url("/status/404")).await.unwrap();
    assert_eq!(first.status(), 404);
    let second = reqwest::get(proxy.url("/status/404")).await.unwrap();
    assert_eq!(second.status(), 404);
    assert_eq!(second.headers()["x-cache"], "HIT");
    assert_eq!(origin.hits(), 1);
    proxy.stop().await;
}

#[tokio::test]
async fn unreachable_origin_is_bad_gateway() {
    let mut config = test_config(&MockOrigin::start().await);
    config.server.origin = "http://127.0.0.1:9".to_string();
    let store = Arc::new(MemoryStore::default());
    let proxy = TestProxy::start(config, store.clone()).await;

    let response = reqwest::get(proxy.url("/anything")).await.unwrap();
    assert_eq!(response.status(), 502);
    assert_eq!(response.headers()["x-cache"], "MISS");
    assert!(store.is_empty());
    proxy.stop().await;
}

#[tokio::test]
async fn slow_origin_times_out() {
    let origin = MockOrigin::start().await;
    origin.set_delay(Duration::from_secs(3));
    let mut config = test_config(&origin);
    config.server.request_timeout_secs = 1;
    let proxy = TestProxy::start(config, Arc::new(MemoryStore::default())).await;

    let response = reqwest::get(proxy.url("/slow")).await.unwrap();
    assert_eq!(response.status(), 502);
    proxy.stop().await;
}

#[tokio::test]
async fn request_body_over_limit_is_rejected_before_origin() {
    let origin = MockOrigin::start().await;
    let mut config = test_config(&origin);
    config.server.max_request_body = 1024;
    let proxy = TestProxy::start(config, Arc::new(MemoryStore::default())).await;
    let client = reqwest::Client::new();

    let response = client
        .post(proxy.url("/upload"))
        .body(vec![b'a'; 1025])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 413);
    assert_eq!(origin.hits(), 0);

    let response = client
        .post(proxy.url("/upload"))
        .body(vec![b'a'; 1024])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body = json_body(response).await;
    assert_eq!(body["body"].as_str().unwrap().len(), 1024);
    assert_eq!(origin.hits(), 1);
    proxy.stop().await;
}

#[tokio::test]
async fn stalled_request_body_times_out() {
    let origin = MockOrigin::start().await;
    let mut config = test_config(&origin);
    config.server.request_timeout_secs = 1;
    config.server.header_read_timeout_secs = 1;
    let proxy = TestProxy::start(config, Arc::new(MemoryStore::default())).await;

    let mut stream = TcpStream::connect(proxy.addr).await.unwrap();
    let request = format!(
        "POST /upload HTTP/1.1\r\n\
         Host: {}\r\n\
         Content-Length: 10\r\n\
         \r\n\
         a",
        proxy.addr
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut head = [0u8; 64];
    let read = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut head))
        .await
        .expect("proxy kept waiting on the unfinished body")
        .unwrap();
    assert!(head[..read].starts_with(b"HTTP/1.1 408"));
    assert_eq!(origin.hits(), 0);

    drop(stream);
    proxy.stop().await;
}

#[tokio::test]
async fn response_body_over_limit_is_bad_gateway() {
    let origin = MockOrigin::start().await;
    let mut config = test_config(&origin);
    config.server.max_response_body = 2048;
    let store = Arc::new(MemoryStore::default());
    let proxy = TestProxy::start(config, store.clone()).await;

    let too_big = reqwest::get(proxy.url("/bytes/2049")).await.unwrap();
    assert_eq!(too_big.status(), 502);
    assert!(store.is_empty());

    let at_limit = reqwest::get(proxy.url("/bytes/2048")).await.unwrap();
    assert_eq!(at_limit.status(), 200);
    assert_eq!(at_limit.bytes().await.unwrap().len(), 2048);
    assert_eq!(store.len(), 1);
    proxy.stop().await;
}

#[tokio::test]
async fn hop_by_hop_headers_are_not_forwarded() {
    let origin = MockOrigin::start().await;
    let proxy = TestProxy::start(test_config(&origin), Arc::new(MemoryStore::default())).await;

    let mut stream = TcpStream::connect(proxy.addr).await.unwrap();
    let request = format!(
        "GET /headers HTTP/1.1\r\n\
         Host: {}\r\n\
         CoNnEcTiOn: close\r\n\
         Keep-Alive: timeout=5\r\n\
         Proxy-Authorization: Basic Zm9vOmJhcg==\r\n\
         TE: trailers\r\n\
         X-Custom: kept\r\n\
         \r\n",
        proxy.addr
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let raw = String::from_utf8(raw).unwrap();
    let (head, body) = raw.split_once("\r\n\r\n").unwrap();
    assert!(head.starts_with("HTTP/1.1 200"));

    let echoed: serde_json::Value = serde_json::from_str(body).unwrap();
    let headers = echoed["headers"].as_object().unwrap();
    assert_eq!(headers["x-custom"], "kept");
    for name in ["connection", "keep-alive", "proxy-authorization", "te"] {
        assert!(!headers.contains_key(name), "{} was forwarded", name);
    }
    // The origin sees its own authority, not the proxy's.
    assert_eq!(headers["host"], origin.addr.to_string());
    proxy.stop().await;
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let origin = MockOrigin::start().await;
    let proxy = TestProxy::start(test_config(&origin), Arc::new(MemoryStore::default())).await;
    let client = reqwest::Client::new();

    let generated = client.get(proxy.url("/id")).send().await.unwrap();
    let id = generated.headers()["x-request-id"].to_str().unwrap();
    assert_eq!(id.len(), 36);

    let supplied = client
        .get(proxy.url("/id"))
        .header("x-request-id", "client-chosen")
        .send()
        .await
        .unwrap();
    assert_eq!(supplied.headers()["x-request-id"], "client-chosen");
    proxy.stop().await;
}

#[tokio::test]
async fn rate_limit_rejects_excess_requests() {
    let origin = MockOrigin::start().await;
    let mut config = test_config(&origin);
    config.rate_limit.enabled = true;
    config.rate_limit.requests = 2;
    config.rate_limit.window_secs = 60;
    let proxy = TestProxy::start(config, Arc::new(MemoryStore::default())).await;
    let client = reqwest::Client::new();

    assert_eq!(client.get(proxy.url("/r")).send().await.unwrap().status(), 200);
    assert_eq!(client.get(proxy.url("/r")).send().await.unwrap().status(), 200);
    assert_eq!(client.get(proxy.url("/r")).send().await.unwrap().status(), 429);
    proxy.stop().await;
}
