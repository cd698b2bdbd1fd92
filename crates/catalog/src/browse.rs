//! Storefront browse pipeline: search, sort, and facet filtering over the
//! currently stocked catalog.
//!
//! Pure functions over listing snapshots; the storefront service feeds them
//! from its stock read model.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use bookstore_core::DomainError;

use crate::book::Book;

/// One browsable catalog row: a book and how many units are available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub book: Book,
    pub available: u32,
}

/// Sort order for browse results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortCriteria {
    /// Cheapest first.
    #[default]
    LowToHigh,
    /// Most expensive first.
    HighToLow,
    /// By title, A to Z.
    Alphabetical,
}

impl SortCriteria {
    pub fn label(&self) -> &'static str {
        match self {
            SortCriteria::LowToHigh => "low_to_high",
            SortCriteria::HighToLow => "high_to_low",
            SortCriteria::Alphabetical => "alphabetical",
        }
    }
}

impl FromStr for SortCriteria {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low_to_high" => Ok(SortCriteria::LowToHigh),
            "high_to_low" => Ok(SortCriteria::HighToLow),
            "alphabetical" => Ok(SortCriteria::Alphabetical),
            other => Err(DomainError::validation(format!(
                "unknown sort criteria: {other}"
            ))),
        }
    }
}

/// Browse request: free-text search, sort order, and selected facets.
///
/// Empty facet selections mean "no restriction".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrowseQuery {
    pub search: Option<String>,
    pub sort: SortCriteria,
    pub authors: Vec<String>,
    pub genres: Vec<String>,
    pub publishers: Vec<String>,
}

/// Browse response: matching listings plus the facet values available for
/// narrowing the current search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowsePage {
    pub listings: Vec<Listing>,
    pub authors: Vec<String>,
    pub genres: Vec<String>,
    pub publishers: Vec<String>,
}

/// Keep only listings with at least one unit available.
pub fn in_stock(listings: Vec<Listing>) -> Vec<Listing> {
    listings.into_iter().filter(|l| l.available > 0).collect()
}

/// Case-insensitive match against title or any author.
pub fn matches_search(book: &Book, query: &str) -> bool {
    let q = query.to_lowercase();
    book.title.to_lowercase().contains(&q)
        || book.authors.iter().any(|a| a.to_lowercase().contains(&q))
}

fn sort_listings(listings: &mut [Listing], sort: SortCriteria) {
    match sort {
        SortCriteria::LowToHigh => listings.sort_by(|a, b| a.book.price.cmp(&b.book.price)),
        SortCriteria::HighToLow => listings.sort_by(|a, b| b.book.price.cmp(&a.book.price)),
        SortCriteria::Alphabetical => listings.sort_by(|a, b| a.book.title.cmp(&b.book.title)),
    }
}

fn distinct_sorted(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = values.collect();
    out.sort();
    out.dedup();
    out
}

/// All distinct author names across the listings, sorted.
pub fn all_authors(listings: &[Listing]) -> Vec<String> {
    distinct_sorted(listings.iter().flat_map(|l| l.book.authors.iter().cloned()))
}

/// All distinct genres across the listings, sorted.
pub fn all_genres(listings: &[Listing]) -> Vec<String> {
    distinct_sorted(listings.iter().map(|l| l.book.genre.clone()))
}

/// All distinct publishers across the listings, sorted.
pub fn all_publishers(listings: &[Listing]) -> Vec<String> {
    distinct_sorted(listings.iter().map(|l| l.book.publisher.clone()))
}

fn facet_matches(selected: &[String], value: &str) -> bool {
    selected.is_empty() || selected.iter().any(|s| s == value)
}

/// Keep listings matching every selected facet group.
pub fn filter_by_facets(
    listings: Vec<Listing>,
    authors: &[String],
    genres: &[String],
    publishers: &[String],
) -> Vec<Listing> {
    listings
        .into_iter()
        .filter(|l| {
            let author_ok =
                authors.is_empty() || l.book.authors.iter().any(|a| authors.contains(a));
            author_ok
                && facet_matches(genres, &l.book.genre)
                && facet_matches(publishers, &l.book.publisher)
        })
        .collect()
}

/// Full browse pipeline: in-stock -> search -> sort -> facet extraction ->
/// facet filtering.
///
/// Facet values are extracted from the searched set (before facet filtering)
/// so the caller can render the remaining narrowing options.
pub fn browse(listings: Vec<Listing>, query: &BrowseQuery) -> BrowsePage {
    let mut current = in_stock(listings);

    if let Some(search) = query.search.as_deref() {
        if !search.is_empty() {
            current.retain(|l| matches_search(&l.book, search));
        }
    }

    sort_listings(&mut current, query.sort);

    let authors = all_authors(&current);
    let genres = all_genres(&current);
    let publishers = all_publishers(&current);

    let listings =
        filter_by_facets(current, &query.authors, &query.genres, &query.publishers);

    BrowsePage {
        listings,
        authors,
        genres,
        publishers,
    }
}
