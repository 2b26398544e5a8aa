//! Collection Page Assembly
//!
//! Turns the raw artwork list of a collection into a sorted, paginated view
//! with navigation links.

use serde::{Serialize, Serializer};
use std::cmp::Ordering;

use crate::models::{Artwork, Collection};

/// Artworks shown per page
pub const PAGE_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    YearAsc,
    #[default]
    YearDesc,
    TitleAsc,
    TitleDesc,
}

impl SortKey {
    /// Parse a `sort` query value. Unknown values fall back to the default.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("year-asc") => Self::YearAsc,
            Some("year-desc") => Self::YearDesc,
            Some("title-asc") => Self::TitleAsc,
            Some("title-desc") => Self::TitleDesc,
            _ => Self::default(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::YearAsc => "year-asc",
            Self::YearDesc => "year-desc",
            Self::TitleAsc => "title-asc",
            Self::TitleDesc => "title-desc",
        }
    }

    fn compare(&self, a: &Artwork, b: &Artwork) -> Ordering {
        match self {
            Self::YearAsc => a.year().cmp(&b.year()),
            Self::YearDesc => b.year().cmp(&a.year()),
            Self::TitleAsc => a.title().to_lowercase().cmp(&b.title().to_lowercase()),
            Self::TitleDesc => b.title().to_lowercase().cmp(&a.title().to_lowercase()),
        }
    }
}

impl Serialize for SortKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One slot in the pagination bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageItem {
    Page(usize),
    Ellipsis,
}

impl Serialize for PageItem {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Page(n) => serializer.serialize_u64(*n as u64),
            Self::Ellipsis => serializer.serialize_str("…"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PageArtwork {
    pub slug: String,
    #[serde(flatten)]
    pub artwork: Artwork,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PageLinks {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionPage {
    pub collection: Collection,
    pub sort: SortKey,
    pub page: usize,
    pub total_pages: usize,
    pub total_items: usize,
    pub artworks: Vec<PageArtwork>,
    pub pages: Vec<PageItem>,
    pub links: PageLinks,
}

/// Lowercase, ASCII alphanumerics separated by single dashes.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

pub fn artwork_slug(artwork: &Artwork) -> String {
    let title = slugify(artwork.title());
    let sku = slugify(artwork.sku().unwrap_or(""));
    match (title.is_empty(), sku.is_empty()) {
        (false, false) => format!("{title}-{sku}"),
        (true, false) => sku,
        _ => title,
    }
}

/// Find the collection whose name slugifies to `slug`.
pub fn resolve_collection<'a>(collections: &'a [Collection], slug: &str) -> Option<&'a Collection> {
    let wanted = slugify(slug);
    collections.iter().find(|c| slugify(c.name()) == wanted)
}

/// Drop untitled artworks and sort the rest. The sort is stable, so equal
/// keys keep their upstream order.
pub fn sort_artworks(artworks: Vec<Artwork>, sort: SortKey) -> Vec<Artwork> {
    let mut visible: Vec<Artwork> = artworks.into_iter().filter(|a| !a.is_untitled()).collect();
    visible.sort_by(|a, b| sort.compare(a, b));
    visible
}

pub fn total_pages(count: usize) -> usize {
    count.div_ceil(PAGE_SIZE).max(1)
}

/// Clamp a requested page number into `[1, total]`. Unparsable input is page 1.
pub fn clamp_page(requested: Option<&str>, total: usize) -> usize {
    requested
        .and_then(|p| p.trim().parse::<i64>().ok())
        .unwrap_or(1)
        .clamp(1, total.max(1) as i64) as usize
}

pub fn page_link(page: usize, sort: SortKey) -> String {
    format!("?page={}&sort={}", page, sort.as_str())
}

/// Page numbers to display: first, last, and the neighbours of `current`,
/// with an ellipsis wherever consecutive numbers are more than one apart.
pub fn page_range(current: usize, total: usize) -> Vec<PageItem> {
    if total == 0 {
        return Vec::new();
    }
    let mut pages = vec![1, total, current.saturating_sub(1), current, current + 1];
    pages.retain(|p| (1..=total).contains(p));
    pages.sort_unstable();
    pages.dedup();

    let mut items = Vec::with_capacity(pages.len() * 2);
    let mut prev: Option<usize> = None;
    for page in pages {
        if let Some(p) = prev {
            if page - p > 1 {
                items.push(PageItem::Ellipsis);
            }
        }
        items.push(PageItem::Page(page));
        prev = Some(page);
    }
    items
}

pub fn assemble_page(
    collection: Collection,
    artworks: Vec<Artwork>,
    requested_page: Option<&str>,
    sort: SortKey,
) -> CollectionPage {
    let sorted = sort_artworks(artworks, sort);
    let total_items = sorted.len();
    let total_pages = total_pages(total_items);
    let page = clamp_page(requested_page, total_pages);

    let artworks = sorted
        .into_iter()
        .skip((page - 1) * PAGE_SIZE)
        .take(PAGE_SIZE)
        .map(|artwork| PageArtwork {
            slug: artwork_slug(&artwork),
            artwork,
        })
        .collect();

    let links = PageLinks {
        prev: (page > 1).then(|| page_link(page - 1, sort)),
        next: (page < total_pages).then(|| page_link(page + 1, sort)),
    };

    CollectionPage {
        collection,
        sort,
        page,
        total_pages,
        total_items,
        artworks,
        pages: page_range(page, total_pages),
        links,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn artwork(title: &str, year: i32) -> Artwork {
        serde_json::from_value(json!({ "title": title, "year": year })).unwrap()
    }

    fn collection(name: &str) -> Collection {
        serde_json::from_value(json!({ "name": name })).unwrap()
    }

    #[test]
    fn test_year_desc_is_stable() {
        let input = vec![artwork("A", 2020), artwork("B", 2024), artwork("C", 2020)];
        let sorted = sort_artworks(input, SortKey::YearDesc);
        let titles: Vec<_> = sorted.iter().map(|a| a.title()).collect();
        assert_eq!(titles, vec!["B", "A", "C"]);
    }

    #[test]
    fn test_title_sorts_ignore_case() {
        let input = vec![artwork("beta", 1), artwork("Alpha", 2), artwork("gamma", 3)];
        let asc = sort_artworks(input.clone(), SortKey::TitleAsc);
        assert_eq!(asc[0].title(), "Alpha");
        let desc = sort_artworks(input, SortKey::TitleDesc);
        assert_eq!(desc[0].title(), "gamma");
    }

    #[test]
    fn test_untitled_filtered_out() {
        let input = vec![artwork("Untitled #3", 2020), artwork("Dawn", 2021)];
        let sorted = sort_artworks(input, SortKey::YearAsc);
        assert_eq!(sorted.len(), 1);
        assert_eq!(sorted[0].title(), "Dawn");
    }

    #[test]
    fn test_sort_key_parse() {
        assert_eq!(SortKey::parse(Some("title-asc")), SortKey::TitleAsc);
        assert_eq!(SortKey::parse(Some("bogus")), SortKey::YearDesc);
        assert_eq!(SortKey::parse(None), SortKey::YearDesc);
    }

    #[test]
    fn test_page_range_middle() {
        use PageItem::*;
        assert_eq!(
            page_range(5, 10),
            vec![Page(1), Ellipsis, Page(4), Page(5), Page(6), Ellipsis, Page(10)]
        );
    }

    #[test]
    fn test_page_range_edges() {
        use PageItem::*;
        assert_eq!(page_range(1, 1), vec![Page(1)]);
        assert_eq!(page_range(1, 3), vec![Page(1), Page(2), Page(3)]);
        assert_eq!(page_range(2, 4), vec![Page(1), Page(2), Page(3), Page(4)]);
        assert_eq!(
            page_range(10, 10),
            vec![Page(1), Ellipsis, Page(9), Page(10)]
        );
    }

    #[test]
    fn test_clamp_page() {
        assert_eq!(clamp_page(Some("0"), 3), 1);
        assert_eq!(clamp_page(Some("-4"), 3), 1);
        assert_eq!(clamp_page(Some("99"), 3), 3);
        assert_eq!(clamp_page(Some("x"), 3), 1);
        assert_eq!(clamp_page(None, 0), 1);
    }

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(0), 1);
        assert_eq!(total_pages(16), 1);
        assert_eq!(total_pages(17), 2);
    }

    #[test]
    fn test_assemble_page_links_keep_sort() {
        let artworks: Vec<Artwork> = (0..40).map(|i| artwork(&format!("Work {i}"), 2000 + i)).collect();
        let page = assemble_page(collection("Aurora"), artworks, Some("2"), SortKey::YearAsc);
        assert_eq!(page.page, 2);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.total_items, 40);
        assert_eq!(page.artworks.len(), PAGE_SIZE);
        assert_eq!(page.artworks[0].artwork.year(), Some(2016));
        assert_eq!(page.links.prev.as_deref(), Some("?page=1&sort=year-asc"));
        assert_eq!(page.links.next.as_deref(), Some("?page=3&sort=year-asc"));
    }

    #[test]
    fn test_slugs() {
        assert_eq!(slugify("  Blue Hour: Nocturnes "), "blue-hour-nocturnes");
        let a: Artwork =
            serde_json::from_value(json!({ "title": "Dawn Light", "sku": "2024-JD-AG-0009" })).unwrap();
        assert_eq!(artwork_slug(&a), "dawn-light-2024-jd-ag-0009");
    }

    #[test]
    fn test_resolve_collection() {
        let collections = vec![collection("Blue Hour"), collection("Aurora")];
        assert_eq!(
            resolve_collection(&collections, "blue-hour").map(|c| c.name()),
            Some("Blue Hour")
        );
        assert!(resolve_collection(&collections, "missing").is_none());
    }
}
