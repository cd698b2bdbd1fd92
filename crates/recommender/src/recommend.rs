use std::collections::HashSet;

use bookstore_catalog::Book;
use bookstore_core::UserId;

use crate::jaccard::jaccard_distance;
use crate::snapshot::{BookSetSource, UserBookSet};

/// Capability interface for book recommendation strategies.
///
/// Callers depend on this trait, not on the batch implementation, so a
/// smarter (indexed, approximate) strategy can be swapped in without
/// touching them.
pub trait SimilarityRecommender {
    /// Books suggested for `target`, as an unordered set.
    ///
    /// An unknown target yields an empty set, never an error.
    fn recommend(&self, target: UserId, source: &dyn BookSetSource) -> HashSet<Book>;
}

/// Batch nearest-neighbor recommender over Jaccard distance.
///
/// Walks every other user's book set: nearest neighbors first (ascending
/// distance, stable for ties so the source's enumeration order decides),
/// accumulating the books each neighbor has that the target does not.
#[derive(Debug, Default, Clone, Copy)]
pub struct JaccardRecommender;

impl JaccardRecommender {
    pub fn new() -> Self {
        Self
    }
}

impl SimilarityRecommender for JaccardRecommender {
    fn recommend(&self, target: UserId, source: &dyn BookSetSource) -> HashSet<Book> {
        let sets = source.book_sets();

        let Some(target_books) = sets
            .iter()
            .find(|s| s.user_id == target)
            .map(|s| s.books.clone())
        else {
            return HashSet::new();
        };

        let mut neighbors: Vec<(f64, &UserBookSet)> = sets
            .iter()
            .filter(|s| s.user_id != target)
            .map(|s| (jaccard_distance(&target_books, &s.books), s))
            .collect();

        // Stable: equally-distant neighbors keep their enumeration order.
        neighbors.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut suggestions = HashSet::new();
        for (_, neighbor) in neighbors {
            suggestions.extend(neighbor.books.difference(&target_books).cloned());
        }
        suggestions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookstore_catalog::Isbn;
    use bookstore_core::Price;

    fn book(isbn: &str) -> Book {
        Book::new(
            Isbn::new(isbn).unwrap(),
            "Some Title",
            vec![],
            Price::from_cents(999),
            "",
            "Fiction",
            "",
        )
        .unwrap()
    }

    fn books(isbns: &[&str]) -> HashSet<Book> {
        isbns.iter().map(|i| book(i)).collect()
    }

    #[test]
    fn collects_set_differences_nearest_neighbor_first() {
        let target = UserId::new();
        let neighbor1 = UserId::new();
        let neighbor2 = UserId::new();

        // target {X,Y}; neighbor1 {X,Y,Z} at distance 1/3; neighbor2 {W} at
        // distance 1. Suggestions: Z from neighbor1, W from neighbor2.
        let source = vec![
            UserBookSet::new(target, books(&["1111111111", "2222222222"])),
            UserBookSet::new(
                neighbor1,
                books(&["1111111111", "2222222222", "3333333333"]),
            ),
            UserBookSet::new(neighbor2, books(&["4444444444"])),
        ];

        let suggestions = JaccardRecommender::new().recommend(target, &source);
        assert_eq!(suggestions, books(&["3333333333", "4444444444"]));
    }

    #[test]
    fn books_the_target_already_has_are_never_suggested() {
        let target = UserId::new();
        let other = UserId::new();

        let source = vec![
            UserBookSet::new(target, books(&["1111111111"])),
            UserBookSet::new(other, books(&["1111111111", "2222222222"])),
        ];

        let suggestions = JaccardRecommender::new().recommend(target, &source);
        assert_eq!(suggestions, books(&["2222222222"]));
    }

    #[test]
    fn unknown_target_yields_an_empty_set() {
        let source = vec![UserBookSet::new(UserId::new(), books(&["1111111111"]))];
        let suggestions = JaccardRecommender::new().recommend(UserId::new(), &source);
        assert!(suggestions.is_empty());
    }

    #[test]
    fn lonely_target_gets_everything_the_peers_have() {
        let target = UserId::new();
        let a = UserId::new();
        let b = UserId::new();

        let source = vec![
            UserBookSet::new(target, books(&[])),
            UserBookSet::new(a, books(&["1111111111"])),
            UserBookSet::new(b, books(&["2222222222"])),
        ];

        let suggestions = JaccardRecommender::new().recommend(target, &source);
        assert_eq!(suggestions, books(&["1111111111", "2222222222"]));
    }

    #[test]
    fn no_peers_means_no_suggestions() {
        let target = UserId::new();
        let source = vec![UserBookSet::new(target, books(&["1111111111"]))];
        let suggestions = JaccardRecommender::new().recommend(target, &source);
        assert!(suggestions.is_empty());
    }
}
