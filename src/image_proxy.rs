//! Same-origin image proxy restricted to an allowlist of hosts.
//!
//! The allowlist also applies to redirects: a hop to a host outside it is not
//! followed, and the redirect status reaches the caller like any other non-2xx.

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use reqwest::{redirect, Client, Url};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ApiError;

/// Upper bound for the forwarded width hint, in pixels.
pub const MAX_WIDTH: i64 = 4096;
pub const DEFAULT_CONTENT_TYPE: &str = "image/webp";
pub const IMAGE_CACHE_CONTROL: &str = "public, max-age=3600, stale-while-revalidate=7200";
/// Redirect hops followed before giving up, same as reqwest's default policy.
pub const MAX_REDIRECTS: usize = 10;

#[derive(Debug, Default, Deserialize)]
pub struct ImageQuery {
    pub url: Option<String>,
    pub w: Option<String>,
}

#[derive(Clone)]
pub struct ImageProxy {
    http: Client,
    allowed_hosts: Arc<[String]>,
}

/// Clamp a width hint to `(0, MAX_WIDTH]`. Non-positive or unparsable hints are dropped.
pub fn clamp_width(raw: Option<&str>) -> Option<i64> {
    let width = raw?.trim().parse::<i64>().ok()?;
    (width > 0).then(|| width.min(MAX_WIDTH))
}

fn host_allowed(allowed_hosts: &[String], url: &Url) -> bool {
    url.host_str()
        .map(|h| allowed_hosts.iter().any(|a| a.eq_ignore_ascii_case(h)))
        .unwrap_or(false)
}

impl ImageProxy {
    /// Build the proxy with its own HTTP client, whose redirect policy only
    /// follows hops that stay on `allowed_hosts`.
    pub fn new(allowed_hosts: Vec<String>, timeout: Duration) -> reqwest::Result<Self> {
        let allowed_hosts: Arc<[String]> = allowed_hosts
            .into_iter()
            .map(|h| h.trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .collect();

        let hosts = Arc::clone(&allowed_hosts);
        let policy = redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                attempt.stop()
            } else if host_allowed(&hosts, attempt.url()) {
                attempt.follow()
            } else {
                tracing::warn!(target_url = %attempt.url(), "image redirect leaves the allowlist");
                attempt.stop()
            }
        });

        let http = Client::builder()
            .timeout(timeout)
            .redirect(policy)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            allowed_hosts,
        })
    }

    pub fn is_allowed(&self, url: &Url) -> bool {
        host_allowed(&self.allowed_hosts, url)
    }

    /// Validate the query and build the upstream URL, width hint included.
    pub fn upstream_url(&self, query: &ImageQuery) -> Result<Url, ApiError> {
        let raw = query
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ApiError::bad_request("Missing 'url' parameter"))?;

        let mut url = Url::parse(raw).map_err(|_| ApiError::bad_request("Invalid image URL"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ApiError::bad_request("Invalid image URL"));
        }
        if !self.is_allowed(&url) {
            return Err(ApiError::forbidden("Image host not allowed"));
        }

        if let Some(width) = clamp_width(query.w.as_deref()) {
            let kept: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(k, _)| k != "w")
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            url.query_pairs_mut()
                .clear()
                .extend_pairs(kept)
                .append_pair("w", &width.to_string());
        }
        Ok(url)
    }

    pub async fn fetch(&self, query: &ImageQuery) -> Response {
        let url = match self.upstream_url(query) {
            Ok(url) => url,
            Err(err) => {
                tracing::debug!(reason = %err.message, "rejected image request");
                return err.into_response();
            }
        };

        let resp = match self.http.get(url.clone()).send().await {
            Ok(resp) => resp,
            Err(err) => {
                tracing::warn!(%url, error = %err, "image fetch failed");
                return ApiError::bad_gateway().into_response();
            }
        };

        let status = resp.status();
        if !status.is_success() {
            tracing::warn!(%url, %status, "image host returned error");
            let code = StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
            return (code, Body::empty()).into_response();
        }

        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| HeaderValue::from_str(v).ok())
            .unwrap_or(HeaderValue::from_static(DEFAULT_CONTENT_TYPE));

        (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, content_type),
                (
                    header::CACHE_CONTROL,
                    HeaderValue::from_static(IMAGE_CACHE_CONTROL),
                ),
            ],
            Body::from_stream(resp.bytes_stream()),
        )
            .into_response()
    }
}
