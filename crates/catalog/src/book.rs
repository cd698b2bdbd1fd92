use core::hash::{Hash, Hasher};
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use bookstore_core::{DomainError, DomainResult, Price, ValueObject};

/// International Standard Book Number.
///
/// Kept as the raw catalog form (digits, optional dashes, optional trailing
/// check character `X`). This is the identity key for a [`Book`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Isbn(String);

impl Isbn {
    pub fn new(raw: impl Into<String>) -> DomainResult<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::invalid_id("ISBN cannot be empty"));
        }
        let valid = trimmed
            .chars()
            .all(|c| c.is_ascii_digit() || c == '-' || c == 'X' || c == 'x');
        if !valid {
            return Err(DomainError::invalid_id(format!(
                "ISBN contains invalid characters: {trimmed}"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Isbn {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl core::fmt::Display for Isbn {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl ValueObject for Isbn {}

/// Immutable catalog record for one book.
///
/// Equality and hashing are **by ISBN only**: two snapshots of the same
/// catalog entry are the same book even if descriptive fields drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub isbn: Isbn,
    pub title: String,
    pub authors: Vec<String>,
    pub price: Price,
    pub publisher: String,
    pub genre: String,
    pub description: String,
}

impl Book {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        isbn: Isbn,
        title: impl Into<String>,
        authors: Vec<String>,
        price: Price,
        publisher: impl Into<String>,
        genre: impl Into<String>,
        description: impl Into<String>,
    ) -> DomainResult<Self> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(DomainError::validation("title cannot be empty"));
        }
        Ok(Self {
            isbn,
            title,
            authors,
            price,
            publisher: publisher.into(),
            genre: genre.into(),
            description: description.into(),
        })
    }
}

impl PartialEq for Book {
    fn eq(&self, other: &Self) -> bool {
        self.isbn == other.isbn
    }
}

impl Eq for Book {}

impl Hash for Book {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.isbn.hash(state);
    }
}

impl ValueObject for Book {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn book(isbn: &str, title: &str) -> Book {
        Book::new(
            Isbn::new(isbn).unwrap(),
            title,
            vec!["Some Author".to_string()],
            Price::from_cents(1299),
            "Some Publisher",
            "Fiction",
            "",
        )
        .unwrap()
    }

    #[test]
    fn isbn_accepts_catalog_forms() {
        assert!(Isbn::new("0446310786").is_ok());
        assert!(Isbn::new("978-0-06-240985-0").is_ok());
        assert!(Isbn::new("155404295X").is_ok());
    }

    #[test]
    fn isbn_rejects_empty_and_garbage() {
        assert!(Isbn::new("").is_err());
        assert!(Isbn::new("   ").is_err());
        assert!(Isbn::new("not an isbn").is_err());
    }

    #[test]
    fn book_requires_a_title() {
        let err = Book::new(
            Isbn::new("0446310786").unwrap(),
            "  ",
            vec![],
            Price::ZERO,
            "",
            "",
            "",
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn equality_and_hashing_follow_the_isbn() {
        let a = book("0446310786", "To Kill a Mockingbird");
        let b = book("0446310786", "To Kill a Mockingbird (reprint)");
        let c = book("1573222453", "The Kite Runner");

        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut set = HashSet::new();
        set.insert(a);
        set.insert(b);
        set.insert(c);
        assert_eq!(set.len(), 2);
    }
}
