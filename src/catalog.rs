//! Catalog data layer shared by the proxy routes and page assembly.
//!
//! Filters the upstream understands (`collection`, `year`, `versions`, `sku`)
//! are forwarded; everything else (`limit`, `offset`, SKU sets) is applied
//! locally on the fetched list.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::client::CatalogClient;
use crate::error::{ApiError, CatalogError};
use crate::models::{artworks_from_value, collections_from_value, Artwork, Collection};

/// Number of artworks previewed per collection on the homepage.
pub const HOMEPAGE_PREVIEW: usize = 4;

/// Query accepted by the artwork list endpoint.
///
/// Numeric values stay strings so malformed input degrades to "not set"
/// instead of rejecting the request.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ArtworkQuery {
    pub collection: Option<String>,
    pub year: Option<String>,
    pub version: Option<String>,
    pub versions: Option<String>,
    pub sku: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct BatchQuery {
    pub skus: Option<String>,
    pub versions: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Default, Clone, Serialize, PartialEq)]
pub struct BatchResult {
    #[serde(rename = "bySkus")]
    pub by_skus: BTreeMap<String, Artwork>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artworks: Option<Vec<Artwork>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionPreview {
    #[serde(flatten)]
    pub collection: Collection,
    pub preview: Vec<Artwork>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HomepageData {
    pub collections: Vec<CollectionPreview>,
    #[serde(rename = "totalArtworks")]
    pub total_artworks: usize,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn parse_int(value: &Option<String>) -> Option<i64> {
    non_empty(value).and_then(|s| s.parse().ok())
}

/// Split a comma-separated parameter, dropping blanks.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Build `path?k=v&...` with percent-encoded values, skipping absent ones.
pub fn with_query(path: &str, params: &[(&str, Option<&str>)]) -> String {
    let query: Vec<String> = params
        .iter()
        .filter_map(|(k, v)| v.map(|v| format!("{}={}", k, urlencoding::encode(v))))
        .collect();
    if query.is_empty() {
        path.to_string()
    } else {
        format!("{}?{}", path, query.join("&"))
    }
}

/// Apply `offset`/`limit` locally. A missing offset is 0; a missing or
/// non-positive limit means no cap.
pub fn slice_window<T>(items: Vec<T>, offset: Option<i64>, limit: Option<i64>) -> Vec<T> {
    let offset = offset.unwrap_or(0).max(0) as usize;
    let iter = items.into_iter().skip(offset);
    match limit {
        Some(limit) if limit > 0 => iter.take(limit as usize).collect(),
        _ => iter.collect(),
    }
}

pub async fn list_artworks(
    client: &CatalogClient,
    query: &ArtworkQuery,
) -> Result<Vec<Artwork>, CatalogError> {
    let versions = non_empty(&query.versions).or(non_empty(&query.version));
    let endpoint = with_query(
        "/artworks",
        &[
            ("collection", non_empty(&query.collection)),
            ("year", non_empty(&query.year)),
            ("versions", versions),
            ("sku", non_empty(&query.sku)),
        ],
    );

    let artworks = artworks_from_value(client.fetch_json(&endpoint).await?);
    Ok(slice_window(
        artworks,
        parse_int(&query.offset),
        parse_int(&query.limit),
    ))
}

pub async fn get_artwork(client: &CatalogClient, id: &str) -> Result<Artwork, CatalogError> {
    let endpoint = format!("/artworks/{}", urlencoding::encode(id));
    match client.fetch_json(&endpoint).await? {
        Value::Object(fields) => Ok(Artwork::from(fields).normalize()),
        other => Err(CatalogError::Decode(format!(
            "expected an artwork object, got {}",
            other
        ))),
    }
}

/// Look up artworks by SKU set and/or version.
///
/// The upstream cannot filter by an arbitrary SKU set, so a `skus` request
/// fetches the unfiltered list and matches locally; the version filter is then
/// applied to that same list. A versions-only request is filtered upstream.
pub async fn batch_lookup(
    client: &CatalogClient,
    query: &BatchQuery,
) -> Result<BatchResult, ApiError> {
    let skus = non_empty(&query.skus).map(split_list).unwrap_or_default();
    let versions = non_empty(&query.versions).map(split_list).unwrap_or_default();

    if skus.is_empty() && versions.is_empty() {
        return Err(ApiError::bad_request(
            "Provide at least one of 'skus' or 'versions'",
        ));
    }

    let limit = parse_int(&query.limit);
    let mut result = BatchResult::default();

    if !skus.is_empty() {
        let all = artworks_from_value(client.fetch_json("/artworks").await?);

        for sku in &skus {
            if let Some(found) = all.iter().find(|a| a.sku() == Some(sku.as_str())) {
                result.by_skus.insert(sku.clone(), found.clone());
            }
        }

        if !versions.is_empty() {
            let filtered: Vec<Artwork> = all
                .into_iter()
                .filter(|a| a.version().is_some_and(|v| versions.iter().any(|w| w == v)))
                .collect();
            result.artworks = Some(slice_window(filtered, None, limit));
        }
    } else {
        let joined = versions.join(",");
        let endpoint = with_query("/artworks", &[("versions", Some(joined.as_str()))]);
        let filtered = artworks_from_value(client.fetch_json(&endpoint).await?);
        result.artworks = Some(slice_window(filtered, None, limit));
    }

    Ok(result)
}

pub async fn list_collections(client: &CatalogClient) -> Result<Vec<Collection>, CatalogError> {
    Ok(collections_from_value(client.fetch_json("/collections").await?))
}

/// Artworks of one collection. `raw_query` is forwarded to the upstream untouched.
pub async fn collection_artworks(
    client: &CatalogClient,
    name: &str,
    raw_query: Option<&str>,
) -> Result<Vec<Artwork>, CatalogError> {
    let mut endpoint = format!("/collections/{}/artworks", urlencoding::encode(name));
    if let Some(q) = raw_query.filter(|q| !q.is_empty()) {
        endpoint.push('?');
        endpoint.push_str(q);
    }
    Ok(artworks_from_value(client.fetch_json(&endpoint).await?))
}

/// Collections plus a short artwork preview for each, fetched concurrently.
pub async fn homepage(client: &CatalogClient) -> Result<HomepageData, CatalogError> {
    let unfiltered = ArtworkQuery::default();
    let (collections, artworks) = tokio::try_join!(
        list_collections(client),
        list_artworks(client, &unfiltered)
    )?;

    let collections = collections
        .into_iter()
        .map(|collection| {
            let preview = artworks
                .iter()
                .filter(|a| !a.is_untitled() && a.belongs_to(&collection))
                .take(HOMEPAGE_PREVIEW)
                .cloned()
                .collect();
            CollectionPreview {
                collection,
                preview,
            }
        })
        .collect();

    Ok(HomepageData {
        collections,
        total_artworks: artworks.len(),
    })
}
