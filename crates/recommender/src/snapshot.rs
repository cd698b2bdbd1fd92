use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use bookstore_catalog::Book;
use bookstore_core::UserId;

/// Snapshot of one user's recommendation-relevant books (current cart plus
/// past purchases, as the source defines it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserBookSet {
    pub user_id: UserId,
    pub books: HashSet<Book>,
}

impl UserBookSet {
    pub fn new(user_id: UserId, books: impl IntoIterator<Item = Book>) -> Self {
        Self {
            user_id,
            books: books.into_iter().collect(),
        }
    }
}

/// User-enumeration capability: every known user with their book set.
///
/// The enumeration order is the tie-break order for equally-distant
/// neighbors, so implementations should enumerate deterministically.
pub trait BookSetSource {
    fn book_sets(&self) -> Vec<UserBookSet>;
}

impl BookSetSource for Vec<UserBookSet> {
    fn book_sets(&self) -> Vec<UserBookSet> {
        self.clone()
    }
}

impl BookSetSource for [UserBookSet] {
    fn book_sets(&self) -> Vec<UserBookSet> {
        self.to_vec()
    }
}
