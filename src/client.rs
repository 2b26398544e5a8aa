//! Upstream catalog fetch client.
//!
//! Every request goes through three layers, in order:
//! 1. the TTL cache, keyed by the fully resolved URL
//! 2. the in-flight registry, so concurrent callers for one URL share a single request
//! 3. the retry loop driven by [`RetryPolicy`]
//!
//! The request itself runs on its own task, so it completes, fills the cache
//! and leaves the registry even when every caller waiting on it goes away.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use reqwest::{Client, Url};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::TtlCache;
use crate::error::CatalogError;
use crate::retry::RetryPolicy;

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

type PendingFetch = Shared<BoxFuture<'static, Result<Value, CatalogError>>>;

#[derive(Clone)]
pub struct CatalogClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: Client,
    base_url: String,
    production_host: Option<String>,
    cache: TtlCache<Value>,
    inflight: DashMap<String, PendingFetch>,
    retry: RetryPolicy,
    default_ttl: Duration,
    upstream_requests: AtomicU64,
}

impl CatalogClient {
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        production_url: Option<&str>,
        cache: TtlCache<Value>,
        retry: RetryPolicy,
        default_ttl: Duration,
    ) -> Self {
        let production_host = production_url
            .and_then(|u| Url::parse(u).ok())
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase));

        Self {
            inner: Arc::new(ClientInner {
                http,
                base_url: base_url.into(),
                production_host,
                cache,
                inflight: DashMap::new(),
                retry,
                default_ttl,
                upstream_requests: AtomicU64::new(0),
            }),
        }
    }

    /// Resolve an endpoint path such as `/artworks?year=2024` against the base URL.
    ///
    /// When the base URL points at the production host, the `/api/` prefix is
    /// served from `/api/public/` instead.
    pub fn resolve(&self, endpoint: &str) -> String {
        let mut url = format!(
            "{}/{}",
            self.inner.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        );

        if self.targets_production() && !url.contains("/api/public/") {
            if let Some(idx) = url.find("/api/") {
                url.replace_range(idx..idx + "/api/".len(), "/api/public/");
            }
        }
        url
    }

    fn targets_production(&self) -> bool {
        let Some(production) = &self.inner.production_host else {
            return false;
        };
        Url::parse(&self.inner.base_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.eq_ignore_ascii_case(production)))
            .unwrap_or(false)
    }

    /// Fetch with the default TTL and retry policy.
    pub async fn fetch_json(&self, endpoint: &str) -> Result<Value, CatalogError> {
        self.fetch_json_with(endpoint, self.inner.default_ttl, self.inner.retry.max_retries)
            .await
    }

    pub async fn fetch_json_with(
        &self,
        endpoint: &str,
        ttl: Duration,
        max_retries: u32,
    ) -> Result<Value, CatalogError> {
        let url = self.resolve(endpoint);

        if let Some(hit) = self.inner.cache.get(&url) {
            tracing::debug!(%url, "catalog cache hit");
            return Ok(hit);
        }

        let pending = match self.inner.inflight.entry(url.clone()) {
            Entry::Occupied(entry) => {
                tracing::debug!(%url, "joining in-flight catalog request");
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                // A request may have completed between the first lookup and taking the entry.
                if let Some(hit) = self.inner.cache.get(&url) {
                    return Ok(hit);
                }
                let policy = self.inner.retry.with_max_retries(max_retries);
                let task = tokio::spawn(self.clone().run_request(url.clone(), ttl, policy));
                let fetch = async move {
                    task.await
                        .unwrap_or_else(|e| Err(CatalogError::Connectivity(e.to_string())))
                }
                .boxed()
                .shared();
                entry.insert(fetch.clone());
                fetch
            }
        };

        pending.await
    }

    /// Drop a cached response for an endpoint.
    pub fn invalidate(&self, endpoint: &str) -> bool {
        self.inner.cache.invalidate(&self.resolve(endpoint))
    }

    /// Number of URLs with a request currently in flight.
    pub fn pending_requests(&self) -> usize {
        self.inner.inflight.len()
    }

    /// Number of HTTP requests actually sent upstream.
    pub fn upstream_requests(&self) -> u64 {
        self.inner.upstream_requests.load(Ordering::Relaxed)
    }

    async fn run_request(
        self,
        url: String,
        ttl: Duration,
        policy: RetryPolicy,
    ) -> Result<Value, CatalogError> {
        let mut attempt = 0;
        let result = loop {
            match self.send_once(&url).await {
                Ok(value) => break Ok(value),
                Err(err) if policy.should_retry(&err, attempt) => {
                    let delay = policy.delay_for(attempt);
                    tracing::warn!(%url, attempt, ?delay, error = %err, "retrying catalog request");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::error!(%url, attempts = attempt + 1, error = %err, "catalog request failed");
                    break Err(match err {
                        CatalogError::Connectivity(_) | CatalogError::Timeout if attempt > 0 => {
                            CatalogError::Connectivity(format!(
                                "no response after {} attempts",
                                attempt + 1
                            ))
                        }
                        other => other,
                    });
                }
            }
        };

        if let Ok(value) = &result {
            self.inner.cache.set(url.clone(), value.clone(), ttl);
        }
        self.inner.inflight.remove(&url);
        result
    }

    async fn send_once(&self, url: &str) -> Result<Value, CatalogError> {
        self.inner.upstream_requests.fetch_add(1, Ordering::Relaxed);
        let resp = self.inner.http.get(url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(CatalogError::status(status.as_u16()));
        }

        resp.json::<Value>()
            .await
            .map_err(|e| CatalogError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_upstream;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn client_for(base: &str, production: Option<&str>) -> CatalogClient {
        CatalogClient::new(
            Client::new(),
            base,
            production,
            TtlCache::default(),
            RetryPolicy::new(2, Duration::from_millis(5)),
            DEFAULT_TTL,
        )
    }

    #[test]
    fn test_resolve_rewrites_api_path_for_production_host() {
        let client = client_for(
            "https://catalog.example.com/api",
            Some("https://catalog.example.com"),
        );
        assert_eq!(
            client.resolve("/artworks?year=2024"),
            "https://catalog.example.com/api/public/artworks?year=2024"
        );
    }

    #[test]
    fn test_resolve_leaves_dev_host_alone() {
        let client = client_for(
            "http://localhost:4000/api/",
            Some("https://catalog.example.com"),
        );
        assert_eq!(
            client.resolve("collections"),
            "http://localhost:4000/api/collections"
        );
        let no_prod = client_for("http://localhost:4000/api", None);
        assert_eq!(
            no_prod.resolve("/artworks"),
            "http://localhost:4000/api/artworks"
        );
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_request() {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/api/artworks",
                get(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Json(json!([{ "id": 1, "sku": "2024-JD-AG-0009" }]))
                }),
            )
            .with_state(hits.clone());
        let addr = spawn_upstream(router).await;
        let client = client_for(&format!("http://{addr}/api"), None);

        let calls = (0..10).map(|_| {
            let client = client.clone();
            async move { client.fetch_json("/artworks").await }
        });
        let results = futures_util::future::join_all(calls).await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(client.upstream_requests(), 1);
        let first = results[0].as_ref().expect("fetch succeeds").clone();
        for result in &results {
            assert_eq!(result.as_ref().expect("fetch succeeds"), &first);
        }

        // Served from cache afterwards.
        client.fetch_json("/artworks").await.expect("cached");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_server_errors_then_succeeds() {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/api/collections",
                get(|State(hits): State<Arc<AtomicUsize>>| async move {
                    if hits.fetch_add(1, Ordering::SeqCst) < 2 {
                        StatusCode::SERVICE_UNAVAILABLE.into_response()
                    } else {
                        Json(json!([{ "id": 1, "name": "Aurora" }])).into_response()
                    }
                }),
            )
            .with_state(hits.clone());
        let addr = spawn_upstream(router).await;
        let client = client_for(&format!("http://{addr}/api"), None);

        let value = client.fetch_json("/collections").await.expect("third attempt");
        assert_eq!(value[0]["name"], "Aurora");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_errors_fail_without_retry() {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/api/artworks/99",
                get(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    StatusCode::NOT_FOUND
                }),
            )
            .with_state(hits.clone());
        let addr = spawn_upstream(router).await;
        let client = client_for(&format!("http://{addr}/api"), None);

        let err = client.fetch_json("/artworks/99").await.expect_err("404");
        assert_eq!(err.http_status(), Some(404));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // Failures are not cached.
        client.fetch_json("/artworks/99").await.expect_err("404 again");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_report_status() {
        let router = Router::new().route(
            "/api/collections",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let addr = spawn_upstream(router).await;
        let client = client_for(&format!("http://{addr}/api"), None);

        let err = client
            .fetch_json_with("/collections", DEFAULT_TTL, 1)
            .await
            .expect_err("500");
        assert_eq!(err.http_status(), Some(500));
        assert_eq!(client.upstream_requests(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_connectivity_error() {
        // Bind then drop so nothing listens on the port.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client_for(&format!("http://{addr}/api"), None);
        let err = client.fetch_json("/collections").await.expect_err("refused");
        assert!(matches!(err, CatalogError::Connectivity(_)));
        assert_eq!(client.upstream_requests(), 3);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/api/collections",
                get(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Json(json!([]))
                }),
            )
            .with_state(hits.clone());
        let addr = spawn_upstream(router).await;
        let client = client_for(&format!("http://{addr}/api"), None);

        client.fetch_json("/collections").await.unwrap();
        assert!(client.invalidate("/collections"));
        client.fetch_json("/collections").await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_client_timeout_is_timeout_error() {
        let router = Router::new().route(
            "/api/collections",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Json(json!([]))
            }),
        );
        let addr = spawn_upstream(router).await;
        let http = Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .unwrap();
        let client = CatalogClient::new(
            http,
            format!("http://{addr}/api"),
            None,
            TtlCache::default(),
            RetryPolicy::new(0, Duration::from_millis(1)),
            DEFAULT_TTL,
        );

        let err = client.fetch_json("/collections").await.expect_err("timed out");
        assert!(matches!(err, CatalogError::Timeout), "got {err:?}");
        assert!(err.http_status().is_none());
        assert_eq!(client.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_request_still_completes() {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/api/artworks",
                get(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Json(json!([{ "id": 1 }]))
                }),
            )
            .with_state(hits.clone());
        let addr = spawn_upstream(router).await;
        let client = client_for(&format!("http://{addr}/api"), None);

        // The only caller gives up before the upstream answers.
        let gave_up = tokio::time::timeout(Duration::from_millis(10), client.fetch_json("/artworks")).await;
        assert!(gave_up.is_err());
        assert_eq!(client.pending_requests(), 1);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(client.pending_requests(), 0);

        let value = client.fetch_json("/artworks").await.expect("cached by the finished request");
        assert_eq!(value[0]["id"], 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
