//! Checkout: the per-session `Shopping -> Confirmed` state machine.
//!
//! One `CheckoutProcess` exists per checkout session and is consumed by it.
//! The state lives here, never in shared storage, so concurrent sessions
//! cannot observe or flip each other's checkout mode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bookstore_core::{DomainError, DomainResult, Price};

use crate::cart::{Checkout, ShoppingCart};

/// Opaque order confirmation token.
///
/// Only uniqueness matters; the format is incidental.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfirmationId(Uuid);

impl ConfirmationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConfirmationId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for ConfirmationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Checkout session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutState {
    /// Cart mutations are allowed; the session can still be confirmed.
    Shopping,
    /// Terminal. The session produced this confirmation; the cart has been
    /// cleared and further shopping belongs to a new session.
    Confirmed(ConfirmationId),
}

/// One-shot checkout controller for a single shopping session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutProcess {
    state: CheckoutState,
}

impl CheckoutProcess {
    pub fn new() -> Self {
        Self {
            state: CheckoutState::Shopping,
        }
    }

    pub fn state(&self) -> &CheckoutState {
        &self.state
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self.state, CheckoutState::Confirmed(_))
    }

    /// Order total: sum of `quantity x unit price` over all entries.
    ///
    /// Pure; exact in cents, so entry order cannot change the result.
    pub fn compute_total(cart: &ShoppingCart) -> Price {
        cart.entries()
            .iter()
            .map(|e| e.book.price.times(e.quantity))
            .sum()
    }

    /// Confirm the session: `Shopping -> Confirmed`, one-shot.
    ///
    /// Fails with [`DomainError::EmptyCart`] when there is nothing to check
    /// out, and with a conflict when the session was already confirmed.
    /// On success the returned [`Checkout`] command carries a fresh unique
    /// confirmation; applying the resulting event clears the cart. Stock is
    /// not touched here - it was reserved when entries were added.
    pub fn confirm(
        &mut self,
        cart: &ShoppingCart,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<Checkout> {
        if self.is_confirmed() {
            return Err(DomainError::conflict("checkout already confirmed"));
        }

        if cart.is_empty() {
            return Err(DomainError::EmptyCart);
        }

        let confirmation = ConfirmationId::new();
        self.state = CheckoutState::Confirmed(confirmation.clone());

        Ok(Checkout {
            cart_id: cart.id_typed(),
            confirmation,
            occurred_at,
        })
    }
}

impl Default for CheckoutProcess {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::{AddBook, CartId, OpenCart, ShoppingCartCommand};
    use bookstore_catalog::{Book, Isbn};
    use bookstore_core::{Aggregate, AggregateId};

    fn test_book(isbn: &str, cents: u64) -> Book {
        Book::new(
            Isbn::new(isbn).unwrap(),
            "Some Title",
            vec!["Some Author".to_string()],
            bookstore_core::Price::from_cents(cents),
            "Some Publisher",
            "Fiction",
            "",
        )
        .unwrap()
    }

    fn cart_with(entries: &[(&str, u64, u32)]) -> ShoppingCart {
        let cart_id = CartId::new(AggregateId::new());
        let mut cart = ShoppingCart::empty(cart_id);
        let events = cart
            .handle(&ShoppingCartCommand::OpenCart(OpenCart {
                cart_id,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        cart.apply(&events[0]);

        for (isbn, cents, quantity) in entries {
            let events = cart
                .handle(&ShoppingCartCommand::AddBook(AddBook {
                    cart_id,
                    book: test_book(isbn, *cents),
                    quantity: *quantity,
                    occurred_at: Utc::now(),
                }))
                .unwrap();
            cart.apply(&events[0]);
        }
        cart
    }

    #[test]
    fn total_matches_the_storefront_example() {
        // 2 x 12.99 + 1 x 22.00 = 47.98
        let cart = cart_with(&[("0446310786", 1299, 2), ("1573222453", 2200, 1)]);
        assert_eq!(CheckoutProcess::compute_total(&cart).cents(), 4798);
        assert_eq!(CheckoutProcess::compute_total(&cart).to_string(), "47.98");
    }

    #[test]
    fn total_is_invariant_under_entry_reordering() {
        let forward = cart_with(&[("0446310786", 1299, 2), ("1573222453", 2200, 1)]);
        let reversed = cart_with(&[("1573222453", 2200, 1), ("0446310786", 1299, 2)]);
        assert_eq!(
            CheckoutProcess::compute_total(&forward),
            CheckoutProcess::compute_total(&reversed)
        );
    }

    #[test]
    fn total_of_an_empty_cart_is_zero() {
        let cart = cart_with(&[]);
        assert_eq!(CheckoutProcess::compute_total(&cart), bookstore_core::Price::ZERO);
    }

    #[test]
    fn confirm_transitions_to_confirmed_and_clears_the_cart() {
        let mut cart = cart_with(&[("0446310786", 1299, 2)]);
        let mut process = CheckoutProcess::new();
        assert_eq!(process.state(), &CheckoutState::Shopping);

        let cmd = process.confirm(&cart, Utc::now()).unwrap();
        assert!(process.is_confirmed());

        let events = cart
            .handle(&ShoppingCartCommand::Checkout(cmd))
            .unwrap();
        cart.apply(&events[0]);
        assert!(cart.entries().is_empty());
    }

    #[test]
    fn confirm_is_one_shot() {
        let mut cart = cart_with(&[("0446310786", 1299, 2)]);
        let mut process = CheckoutProcess::new();

        let cmd = process.confirm(&cart, Utc::now()).unwrap();
        let events = cart.handle(&ShoppingCartCommand::Checkout(cmd)).unwrap();
        cart.apply(&events[0]);

        let err = process.confirm(&cart, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn confirm_of_an_empty_cart_is_rejected_and_state_unchanged() {
        let cart = cart_with(&[]);
        let mut process = CheckoutProcess::new();

        let err = process.confirm(&cart, Utc::now()).unwrap_err();
        assert_eq!(err, DomainError::EmptyCart);
        assert_eq!(process.state(), &CheckoutState::Shopping);
    }

    #[test]
    fn confirmations_are_unique_per_session() {
        let cart_a = cart_with(&[("0446310786", 1299, 1)]);
        let cart_b = cart_with(&[("0446310786", 1299, 1)]);

        let a = CheckoutProcess::new().confirm(&cart_a, Utc::now()).unwrap();
        let b = CheckoutProcess::new().confirm(&cart_b, Utc::now()).unwrap();
        assert_ne!(a.confirmation, b.confirmation);
    }
}
