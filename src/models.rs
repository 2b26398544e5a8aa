//! Catalog records.
//!
//! Records are kept as the upstream's JSON objects and re-served in the same
//! shape; only the image URL is rewritten. Accessors read the fields this
//! service interprets and treat missing or `null` values as absent.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::LazyLock;

use crate::normalize::normalize_image_url;

// YYYY-<ARTIST>-<COLLECTION>-<SEQ>, e.g. 2024-JD-AG-0009
static SKU_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-([A-Za-z0-9]+)-([A-Za-z0-9]+)-\d+$").expect("valid regex")
});

/// Keys the upstream may use for an artwork's image.
const IMAGE_KEYS: [&str; 2] = ["image_url", "imageUrl"];

fn str_field<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    fields.get(key).and_then(Value::as_str)
}

fn int_field(fields: &Map<String, Value>, key: &str) -> Option<i64> {
    match fields.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Artwork record as served by the upstream catalog.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct Artwork {
    pub fields: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct Collection {
    pub fields: Map<String, Value>,
}

/// Collection code encoded in the third segment of a SKU. `None` if the SKU
/// does not follow the `YYYY-ARTIST-COLLECTION-SEQ` layout.
pub fn collection_code(sku: &str) -> Option<&str> {
    SKU_PATTERN
        .captures(sku)
        .and_then(|c| c.get(2))
        .map(|m| m.as_str())
}

impl Artwork {
    pub fn sku(&self) -> Option<&str> {
        str_field(&self.fields, "sku")
    }

    pub fn title(&self) -> &str {
        str_field(&self.fields, "title").unwrap_or("")
    }

    pub fn year(&self) -> Option<i64> {
        int_field(&self.fields, "year")
    }

    pub fn collection(&self) -> Option<&str> {
        str_field(&self.fields, "collection").filter(|c| !c.is_empty())
    }

    pub fn version(&self) -> Option<&str> {
        str_field(&self.fields, "version")
    }

    pub fn image_url(&self) -> Option<&str> {
        IMAGE_KEYS.iter().find_map(|k| str_field(&self.fields, k))
    }

    /// Rewrite the image URL to its canonical form, under whichever key the upstream used.
    pub fn normalize(mut self) -> Self {
        for key in IMAGE_KEYS {
            if let Some(Value::String(url)) = self.fields.get_mut(key) {
                *url = normalize_image_url(url);
            }
        }
        self
    }

    pub fn collection_code(&self) -> Option<&str> {
        self.sku().and_then(collection_code)
    }

    /// Artworks name their collection directly; when they don't, the SKU's
    /// collection code is matched against the collection's short code.
    pub fn belongs_to(&self, collection: &Collection) -> bool {
        if let Some(name) = self.collection() {
            return name == collection.name();
        }
        match (self.collection_code(), collection.code()) {
            (Some(code), Some(expected)) => code.eq_ignore_ascii_case(expected),
            _ => false,
        }
    }

    pub fn is_untitled(&self) -> bool {
        self.title().to_lowercase().contains("untitled")
    }
}

impl Collection {
    pub fn name(&self) -> &str {
        str_field(&self.fields, "name").unwrap_or("")
    }

    pub fn code(&self) -> Option<&str> {
        str_field(&self.fields, "code")
    }
}

impl From<Map<String, Value>> for Artwork {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

impl From<Map<String, Value>> for Collection {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

/// Pull the record list out of a bare array or an object wrapping one under
/// `key`/`data`. Entries that are not JSON objects are dropped.
fn records(value: Value, key: &str) -> Vec<Map<String, Value>> {
    let list = match value {
        Value::Object(mut obj) => obj
            .remove(key)
            .or_else(|| obj.remove("data"))
            .unwrap_or(Value::Null),
        other => other,
    };
    match list {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(fields) => Some(fields),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Decode an upstream payload into artworks with canonical image URLs.
pub fn artworks_from_value(value: Value) -> Vec<Artwork> {
    records(value, "artworks")
        .into_iter()
        .map(|fields| Artwork::from(fields).normalize())
        .collect()
}

pub fn collections_from_value(value: Value) -> Vec<Collection> {
    records(value, "collections")
        .into_iter()
        .map(Collection::from)
        .collect()
}
