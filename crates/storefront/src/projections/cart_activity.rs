use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use serde_json::Value as JsonValue;
use thiserror::Error;

use bookstore_cart::{CartId, ShoppingCartEvent};
use bookstore_catalog::{Book, Isbn};
use bookstore_core::{AggregateId, UserId};
use bookstore_events::EventEnvelope;
use bookstore_recommender::{BookSetSource, UserBookSet};

use crate::read_model::ReadModelStore;

/// Stream type tag for shopping cart aggregates.
pub const CART_AGGREGATE_TYPE: &str = "cart.shopping_cart";

/// Per-cart recommendation source data: who owns the cart, what is in it
/// right now, and what its owner has checked out before.
///
/// The recommendation-relevant set for a user is `in_cart ∪ purchased`:
/// checked-out books keep feeding recommendations after the cart resets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CartActivity {
    pub owner: Option<UserId>,
    /// Current cart contents, with quantities so a drained entry leaves the
    /// set exactly when it leaves the cart.
    pub in_cart: HashMap<Isbn, (Book, u32)>,
    /// Books from confirmed checkouts.
    pub purchased: HashSet<Book>,
}

impl CartActivity {
    /// The owner's recommendation-relevant book set.
    pub fn book_set(&self) -> HashSet<Book> {
        let mut books: HashSet<Book> =
            self.in_cart.values().map(|(book, _)| book.clone()).collect();
        books.extend(self.purchased.iter().cloned());
        books
    }
}

#[derive(Debug, Error)]
pub enum CartProjectionError {
    #[error("failed to deserialize cart event: {0}")]
    Deserialize(String),

    #[error("stream mismatch: {0}")]
    StreamMismatch(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Cart activity projection.
///
/// Maintains each user's book set for the recommender. Disposable and
/// rebuildable from the cart streams; idempotent under at-least-once
/// delivery.
#[derive(Debug)]
pub struct CartActivityProjection<S>
where
    S: ReadModelStore<CartId, CartActivity>,
{
    store: S,
    cursors: RwLock<HashMap<AggregateId, u64>>,
}

impl<S> CartActivityProjection<S>
where
    S: ReadModelStore<CartId, CartActivity>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    /// Activity for one cart.
    pub fn get(&self, cart_id: &CartId) -> Option<CartActivity> {
        self.store.get(cart_id)
    }

    /// The recommendation-relevant book set of one user, if known.
    pub fn book_set_of(&self, user_id: UserId) -> Option<HashSet<Book>> {
        self.store
            .list()
            .into_iter()
            .find(|a| a.owner == Some(user_id))
            .map(|a| a.book_set())
    }

    /// Apply a published envelope into the projection.
    ///
    /// - Envelopes from other aggregate types are ignored
    /// - Enforces monotonic sequence per aggregate stream
    /// - Idempotent for at-least-once delivery (replays <= cursor are ignored)
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), CartProjectionError> {
        if envelope.aggregate_type() != CART_AGGREGATE_TYPE {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if let Ok(mut cursors) = self.cursors.write() {
            let last = *cursors.get(&aggregate_id).unwrap_or(&0);

            if seq == 0 {
                return Err(CartProjectionError::NonMonotonicSequence { last, found: seq });
            }

            if seq <= last {
                // Duplicate or replay; safe to ignore.
                return Ok(());
            }

            if last != 0 && seq != last + 1 {
                return Err(CartProjectionError::NonMonotonicSequence { last, found: seq });
            }

            let event: ShoppingCartEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| CartProjectionError::Deserialize(e.to_string()))?;

            let cart_id = match &event {
                ShoppingCartEvent::CartOpened(e) => e.cart_id,
                ShoppingCartEvent::OwnerAttached(e) => e.cart_id,
                ShoppingCartEvent::BookAdded(e) => e.cart_id,
                ShoppingCartEvent::BookRemoved(e) => e.cart_id,
                ShoppingCartEvent::CheckedOut(e) => e.cart_id,
            };

            if cart_id.0 != aggregate_id {
                return Err(CartProjectionError::StreamMismatch(
                    "event cart_id does not match envelope aggregate_id".to_string(),
                ));
            }

            let mut activity = self.store.get(&cart_id).unwrap_or_default();

            match event {
                ShoppingCartEvent::CartOpened(_) => {
                    activity = CartActivity::default();
                }
                ShoppingCartEvent::OwnerAttached(e) => {
                    activity.owner = Some(e.user_id);
                }
                ShoppingCartEvent::BookAdded(e) => {
                    let entry = activity
                        .in_cart
                        .entry(e.book.isbn.clone())
                        .or_insert_with(|| (e.book.clone(), 0));
                    entry.1 = entry.1.saturating_add(e.quantity);
                }
                ShoppingCartEvent::BookRemoved(e) => {
                    if let Some(entry) = activity.in_cart.get_mut(&e.isbn) {
                        entry.1 = entry.1.saturating_sub(e.quantity);
                        if entry.1 == 0 {
                            activity.in_cart.remove(&e.isbn);
                        }
                    }
                }
                ShoppingCartEvent::CheckedOut(_) => {
                    let bought: Vec<Book> = activity
                        .in_cart
                        .drain()
                        .map(|(_, (book, _))| book)
                        .collect();
                    activity.purchased.extend(bought);
                }
            }

            self.store.upsert(cart_id, activity);

            // Advance cursor after successful apply.
            cursors.insert(aggregate_id, seq);
        }

        Ok(())
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), CartProjectionError> {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
        }
        self.store.clear();

        // Deterministic replay order: aggregate, then sequence.
        let mut envs: Vec<_> = envelopes.into_iter().collect();
        envs.sort_by_key(|e| (*e.aggregate_id().as_uuid().as_bytes(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}

impl<S> BookSetSource for CartActivityProjection<S>
where
    S: ReadModelStore<CartId, CartActivity>,
{
    fn book_sets(&self) -> Vec<UserBookSet> {
        let mut sets: Vec<UserBookSet> = self
            .store
            .list()
            .into_iter()
            .filter_map(|activity| {
                let owner = activity.owner?;
                Some(UserBookSet {
                    user_id: owner,
                    books: activity.book_set(),
                })
            })
            .collect();

        // Deterministic enumeration: equal-distance neighbors tie-break by
        // this order downstream.
        sets.sort_by_key(|s| *s.user_id.as_uuid().as_bytes());
        sets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read_model::InMemoryReadModelStore;
    use bookstore_cart::{
        BookAdded, BookRemoved, CartOpened, CheckedOut, ConfirmationId, OwnerAttached,
    };
    use bookstore_core::Price;
    use chrono::Utc;
    use std::sync::Arc;
    use uuid::Uuid;

    fn projection() -> CartActivityProjection<Arc<InMemoryReadModelStore<CartId, CartActivity>>> {
        CartActivityProjection::new(Arc::new(InMemoryReadModelStore::new()))
    }

    fn test_book(isbn: &str) -> Book {
        Book::new(
            Isbn::new(isbn).unwrap(),
            "Some Title",
            vec!["Some Author".to_string()],
            Price::from_cents(1299),
            "Some Publisher",
            "Fiction",
            "",
        )
        .unwrap()
    }

    fn envelope(cart_id: CartId, seq: u64, event: ShoppingCartEvent) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            cart_id.0,
            CART_AGGREGATE_TYPE,
            seq,
            serde_json::to_value(&event).unwrap(),
        )
    }

    fn opened_cart(projection: &CartActivityProjection<Arc<InMemoryReadModelStore<CartId, CartActivity>>>, user_id: UserId) -> CartId {
        let cart_id = CartId::new(AggregateId::new());
        projection
            .apply_envelope(&envelope(
                cart_id,
                1,
                ShoppingCartEvent::CartOpened(CartOpened {
                    cart_id,
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap();
        projection
            .apply_envelope(&envelope(
                cart_id,
                2,
                ShoppingCartEvent::OwnerAttached(OwnerAttached {
                    cart_id,
                    user_id,
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap();
        cart_id
    }

    #[test]
    fn cart_contents_feed_the_book_set() {
        let projection = projection();
        let user_id = UserId::new();
        let cart_id = opened_cart(&projection, user_id);

        projection
            .apply_envelope(&envelope(
                cart_id,
                3,
                ShoppingCartEvent::BookAdded(BookAdded {
                    cart_id,
                    book: test_book("0446310786"),
                    quantity: 2,
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap();

        let set = projection.book_set_of(user_id).unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn a_drained_entry_leaves_the_set_but_a_partial_removal_does_not() {
        let projection = projection();
        let user_id = UserId::new();
        let cart_id = opened_cart(&projection, user_id);
        let book = test_book("0446310786");

        projection
            .apply_envelope(&envelope(
                cart_id,
                3,
                ShoppingCartEvent::BookAdded(BookAdded {
                    cart_id,
                    book: book.clone(),
                    quantity: 2,
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap();

        projection
            .apply_envelope(&envelope(
                cart_id,
                4,
                ShoppingCartEvent::BookRemoved(BookRemoved {
                    cart_id,
                    isbn: book.isbn.clone(),
                    quantity: 1,
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap();
        assert_eq!(projection.book_set_of(user_id).unwrap().len(), 1);

        projection
            .apply_envelope(&envelope(
                cart_id,
                5,
                ShoppingCartEvent::BookRemoved(BookRemoved {
                    cart_id,
                    isbn: book.isbn.clone(),
                    quantity: 1,
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap();
        assert!(projection.book_set_of(user_id).unwrap().is_empty());
    }

    #[test]
    fn checkout_moves_cart_contents_into_purchases() {
        let projection = projection();
        let user_id = UserId::new();
        let cart_id = opened_cart(&projection, user_id);
        let book = test_book("0446310786");

        projection
            .apply_envelope(&envelope(
                cart_id,
                3,
                ShoppingCartEvent::BookAdded(BookAdded {
                    cart_id,
                    book: book.clone(),
                    quantity: 1,
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap();
        projection
            .apply_envelope(&envelope(
                cart_id,
                4,
                ShoppingCartEvent::CheckedOut(CheckedOut {
                    cart_id,
                    confirmation: ConfirmationId::new(),
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap();

        // Cart is empty, but the purchase still feeds recommendations.
        let activity = projection.get(&cart_id).unwrap();
        assert!(activity.in_cart.is_empty());
        assert_eq!(activity.purchased.len(), 1);
        assert_eq!(projection.book_set_of(user_id).unwrap().len(), 1);
    }

    #[test]
    fn unowned_carts_are_not_enumerated() {
        let projection = projection();
        let cart_id = CartId::new(AggregateId::new());
        projection
            .apply_envelope(&envelope(
                cart_id,
                1,
                ShoppingCartEvent::CartOpened(CartOpened {
                    cart_id,
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap();

        assert!(projection.book_sets().is_empty());
    }

    #[test]
    fn enumeration_order_is_deterministic() {
        let projection = projection();
        let users: Vec<UserId> = (0..4).map(|_| UserId::new()).collect();
        for user_id in &users {
            opened_cart(&projection, *user_id);
        }

        let first = projection.book_sets();
        let second = projection.book_sets();
        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
    }
}
