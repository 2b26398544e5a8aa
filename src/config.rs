use anyhow::{Context, Result};
use clap::Args;
use reqwest::Client;
use std::time::Duration;

use crate::cache::TtlCache;
use crate::client::CatalogClient;
use crate::image_proxy::ImageProxy;
use crate::retry::RetryPolicy;

/// Upstream catalog and proxy settings shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct CatalogSettings {
    /// Base URL of the upstream catalog API
    #[arg(long, env = "CATALOG_API_URL", default_value = "http://localhost:4000/api")]
    pub api_url: String,

    /// Production catalog URL; when the API URL targets this host, `/api/` is served from `/api/public/`
    #[arg(long, env = "CATALOG_PRODUCTION_API_URL")]
    pub production_api_url: Option<String>,

    /// Hosts the image proxy may fetch from
    #[arg(
        long,
        env = "IMAGE_PROXY_HOSTS",
        value_delimiter = ',',
        default_value = "images.artcatalog.io"
    )]
    pub image_hosts: Vec<String>,

    /// Lifetime of cached catalog responses
    #[arg(long, env = "CATALOG_CACHE_TTL_SECS", default_value_t = 300)]
    pub cache_ttl_secs: u64,

    /// Maximum number of cached catalog responses
    #[arg(long, env = "CATALOG_CACHE_CAPACITY", default_value_t = 512)]
    pub cache_capacity: usize,

    /// Retries after a 5xx or network failure
    #[arg(long, env = "CATALOG_MAX_RETRIES", default_value_t = 2)]
    pub max_retries: u32,

    /// Base backoff between retries; attempt n waits n+1 times this
    #[arg(long, env = "CATALOG_RETRY_DELAY_MS", default_value_t = 1000)]
    pub retry_delay_ms: u64,

    /// Timeout for every outbound request
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value_t = 15)]
    pub timeout_secs: u64,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl CatalogSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_delay_ms))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn http_client(&self) -> Result<Client> {
        Client::builder()
            .timeout(self.timeout())
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")
    }

    pub fn build_client(&self, http: Client) -> CatalogClient {
        CatalogClient::new(
            http,
            self.api_url.clone(),
            self.production_api_url.as_deref(),
            TtlCache::new(self.cache_capacity),
            self.retry_policy(),
            self.cache_ttl(),
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn build_image_proxy(&self) -> Result<ImageProxy> {
        ImageProxy::new(self.image_hosts.clone(), self.timeout())
            .context("Failed to build image proxy client")
    }
}
