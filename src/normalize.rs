//! Catalog image URL canonicalization.
//!
//! Only the filename segment of the path is rewritten, and only when it looks
//! like an artwork asset. A filename is an artwork asset when it contains a
//! `__v<digits>` version marker or one of the literal tokens `__primary__` /
//! `__full__` (case-insensitive). For those filenames:
//!
//! * the exact marker `__v01` becomes `__v02`; other versions are kept
//! * every occurrence of `primary` becomes `full`
//! * a trailing `.png`, `.tif`, `.tiff`, `.jpg` or `.jpeg` becomes `.webp`
//!
//! Query string and fragment are carried over verbatim. Every rewrite maps to
//! a form the same rule no longer matches, so the function is idempotent.

use regex::Regex;
use std::sync::LazyLock;

static ASSET_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)__v\d+|__primary__|__full__").expect("valid regex"));

static VERSION_01: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)__v01").expect("valid regex"));

static PRIMARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)primary").expect("valid regex"));

static RASTER_EXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(png|tiff?|jpe?g)$").expect("valid regex"));

/// Returns true if the filename follows the artwork-asset naming convention.
pub fn is_artwork_asset(filename: &str) -> bool {
    ASSET_MARKER.is_match(filename)
}

/// Canonicalize a catalog image URL. Non-artwork URLs are returned unchanged.
pub fn normalize_image_url(url: &str) -> String {
    if url.is_empty() {
        return String::new();
    }

    // The suffix starts at whichever of `?` or `#` comes first.
    let split_at = url.find(['?', '#']).unwrap_or(url.len());
    let (path, suffix) = url.split_at(split_at);

    let name_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    let (dir, filename) = path.split_at(name_start);

    if !is_artwork_asset(filename) {
        return url.to_string();
    }

    let renamed = normalize_filename(filename);
    format!("{dir}{renamed}{suffix}")
}

/// Replace every `__v01` marker with `__v02`. A marker followed by another
/// digit is the prefix of a longer version such as `__v012` and is kept. The
/// following byte is only inspected, never consumed, so back-to-back markers
/// are all rewritten.
fn bump_version(filename: &str) -> String {
    let bytes = filename.as_bytes();
    let mut out = String::with_capacity(filename.len());
    let mut last = 0;
    for m in VERSION_01.find_iter(filename) {
        if bytes.get(m.end()).is_some_and(u8::is_ascii_digit) {
            continue;
        }
        out.push_str(&filename[last..m.start()]);
        out.push_str("__v02");
        last = m.end();
    }
    out.push_str(&filename[last..]);
    out
}

fn normalize_filename(filename: &str) -> String {
    let versioned = bump_version(filename);
    let full = PRIMARY.replace_all(&versioned, "full");
    RASTER_EXT.replace(&full, ".webp").into_owned()
}
