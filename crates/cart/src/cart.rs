use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bookstore_catalog::{Book, Isbn};
use bookstore_core::{Aggregate, AggregateId, AggregateRoot, DomainError, UserId};
use bookstore_events::Event;

use crate::checkout::ConfirmationId;

/// Shopping cart identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CartId(pub AggregateId);

impl CartId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CartId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// One line in a cart: a book and how many copies of it.
///
/// An entry never persists at quantity zero; removal that drains an entry
/// deletes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartEntry {
    pub book: Book,
    pub quantity: u32,
}

/// Aggregate root: ShoppingCart.
///
/// One cart per user. Entries are keyed by ISBN (one entry per distinct
/// book, order irrelevant). The cart outlives checkout: a confirmed
/// checkout clears the entries and shopping continues on the same
/// aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct ShoppingCart {
    id: CartId,
    owner: Option<UserId>,
    entries: Vec<CartEntry>,
    version: u64,
    created: bool,
}

impl ShoppingCart {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: CartId) -> Self {
        Self {
            id,
            owner: None,
            entries: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> CartId {
        self.id
    }

    pub fn owner(&self) -> Option<UserId> {
        self.owner
    }

    pub fn entries(&self) -> &[CartEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all entry quantities.
    pub fn total_quantity(&self) -> u32 {
        self.entries.iter().map(|e| e.quantity).sum()
    }

    /// Quantity of one book in the cart (0 when absent).
    pub fn quantity_of(&self, isbn: &Isbn) -> u32 {
        self.entries
            .iter()
            .find(|e| &e.book.isbn == isbn)
            .map(|e| e.quantity)
            .unwrap_or(0)
    }

    /// The distinct books currently in the cart.
    pub fn books(&self) -> HashSet<Book> {
        self.entries.iter().map(|e| e.book.clone()).collect()
    }
}

impl AggregateRoot for ShoppingCart {
    type Id = CartId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenCart — carts exist before their owners do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenCart {
    pub cart_id: CartId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AttachOwner — bind the cart to its user at registration time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachOwner {
    pub cart_id: CartId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddBook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddBook {
    pub cart_id: CartId,
    pub book: Book,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveBook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveBook {
    pub cart_id: CartId,
    pub isbn: Isbn,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Checkout — finalize the current shopping cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkout {
    pub cart_id: CartId,
    pub confirmation: ConfirmationId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShoppingCartCommand {
    OpenCart(OpenCart),
    AttachOwner(AttachOwner),
    AddBook(AddBook),
    RemoveBook(RemoveBook),
    Checkout(Checkout),
}

/// Event: CartOpened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartOpened {
    pub cart_id: CartId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OwnerAttached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerAttached {
    pub cart_id: CartId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BookAdded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookAdded {
    pub cart_id: CartId,
    pub book: Book,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BookRemoved.
///
/// `quantity` is the amount actually removed (requests are clamped to the
/// entry quantity), so downstream stock releases match exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookRemoved {
    pub cart_id: CartId,
    pub isbn: Isbn,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CheckedOut.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckedOut {
    pub cart_id: CartId,
    pub confirmation: ConfirmationId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShoppingCartEvent {
    CartOpened(CartOpened),
    OwnerAttached(OwnerAttached),
    BookAdded(BookAdded),
    BookRemoved(BookRemoved),
    CheckedOut(CheckedOut),
}

impl Event for ShoppingCartEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ShoppingCartEvent::CartOpened(_) => "cart.opened",
            ShoppingCartEvent::OwnerAttached(_) => "cart.owner_attached",
            ShoppingCartEvent::BookAdded(_) => "cart.book_added",
            ShoppingCartEvent::BookRemoved(_) => "cart.book_removed",
            ShoppingCartEvent::CheckedOut(_) => "cart.checked_out",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ShoppingCartEvent::CartOpened(e) => e.occurred_at,
            ShoppingCartEvent::OwnerAttached(e) => e.occurred_at,
            ShoppingCartEvent::BookAdded(e) => e.occurred_at,
            ShoppingCartEvent::BookRemoved(e) => e.occurred_at,
            ShoppingCartEvent::CheckedOut(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ShoppingCart {
    type Command = ShoppingCartCommand;
    type Event = ShoppingCartEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ShoppingCartEvent::CartOpened(e) => {
                self.id = e.cart_id;
                self.owner = None;
                self.entries.clear();
                self.created = true;
            }
            ShoppingCartEvent::OwnerAttached(e) => {
                self.owner = Some(e.user_id);
            }
            ShoppingCartEvent::BookAdded(e) => {
                match self
                    .entries
                    .iter_mut()
                    .find(|entry| entry.book.isbn == e.book.isbn)
                {
                    Some(entry) => entry.quantity = entry.quantity.saturating_add(e.quantity),
                    None => self.entries.push(CartEntry {
                        book: e.book.clone(),
                        quantity: e.quantity,
                    }),
                }
            }
            ShoppingCartEvent::BookRemoved(e) => {
                if let Some(entry) = self
                    .entries
                    .iter_mut()
                    .find(|entry| entry.book.isbn == e.isbn)
                {
                    entry.quantity = entry.quantity.saturating_sub(e.quantity);
                }
                // Zero-quantity entries never persist.
                self.entries.retain(|entry| entry.quantity > 0);
            }
            ShoppingCartEvent::CheckedOut(_) => {
                // Stock was reserved at add time; finalizing only clears the
                // cart for the next cycle.
                self.entries.clear();
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ShoppingCartCommand::OpenCart(cmd) => self.handle_open(cmd),
            ShoppingCartCommand::AttachOwner(cmd) => self.handle_attach(cmd),
            ShoppingCartCommand::AddBook(cmd) => self.handle_add(cmd),
            ShoppingCartCommand::RemoveBook(cmd) => self.handle_remove(cmd),
            ShoppingCartCommand::Checkout(cmd) => self.handle_checkout(cmd),
        }
    }
}

impl ShoppingCart {
    fn ensure_cart_id(&self, cart_id: CartId) -> Result<(), DomainError> {
        if self.id != cart_id {
            return Err(DomainError::invariant("cart_id mismatch"));
        }
        Ok(())
    }

    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn handle_open(&self, cmd: &OpenCart) -> Result<Vec<ShoppingCartEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("cart already exists"));
        }

        Ok(vec![ShoppingCartEvent::CartOpened(CartOpened {
            cart_id: cmd.cart_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_attach(&self, cmd: &AttachOwner) -> Result<Vec<ShoppingCartEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_cart_id(cmd.cart_id)?;

        if self.owner.is_some() {
            return Err(DomainError::conflict("cart already has an owner"));
        }

        Ok(vec![ShoppingCartEvent::OwnerAttached(OwnerAttached {
            cart_id: cmd.cart_id,
            user_id: cmd.user_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add(&self, cmd: &AddBook) -> Result<Vec<ShoppingCartEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_cart_id(cmd.cart_id)?;

        // Adding nothing is a no-op, not an error.
        if cmd.quantity == 0 {
            return Ok(vec![]);
        }

        Ok(vec![ShoppingCartEvent::BookAdded(BookAdded {
            cart_id: cmd.cart_id,
            book: cmd.book.clone(),
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove(&self, cmd: &RemoveBook) -> Result<Vec<ShoppingCartEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_cart_id(cmd.cart_id)?;

        // Removing an absent book is a no-op.
        let in_cart = self.quantity_of(&cmd.isbn);
        let actual = cmd.quantity.min(in_cart);
        if actual == 0 {
            return Ok(vec![]);
        }

        Ok(vec![ShoppingCartEvent::BookRemoved(BookRemoved {
            cart_id: cmd.cart_id,
            isbn: cmd.isbn.clone(),
            quantity: actual,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_checkout(&self, cmd: &Checkout) -> Result<Vec<ShoppingCartEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_cart_id(cmd.cart_id)?;

        if self.entries.is_empty() {
            return Err(DomainError::EmptyCart);
        }

        Ok(vec![ShoppingCartEvent::CheckedOut(CheckedOut {
            cart_id: cmd.cart_id,
            confirmation: cmd.confirmation.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookstore_core::Price;

    fn test_cart_id() -> CartId {
        CartId::new(AggregateId::new())
    }

    fn test_book(isbn: &str, title: &str, cents: u64) -> Book {
        Book::new(
            Isbn::new(isbn).unwrap(),
            title,
            vec!["Some Author".to_string()],
            Price::from_cents(cents),
            "Some Publisher",
            "Fiction",
            "",
        )
        .unwrap()
    }

    fn open_cart() -> ShoppingCart {
        let cart_id = test_cart_id();
        let mut cart = ShoppingCart::empty(cart_id);
        let events = cart
            .handle(&ShoppingCartCommand::OpenCart(OpenCart {
                cart_id,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        cart.apply(&events[0]);
        cart
    }

    fn add(cart: &mut ShoppingCart, book: Book, quantity: u32) {
        let events = cart
            .handle(&ShoppingCartCommand::AddBook(AddBook {
                cart_id: cart.id_typed(),
                book,
                quantity,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        for e in &events {
            cart.apply(e);
        }
    }

    fn remove(cart: &mut ShoppingCart, isbn: &Isbn, quantity: u32) -> u32 {
        let events = cart
            .handle(&ShoppingCartCommand::RemoveBook(RemoveBook {
                cart_id: cart.id_typed(),
                isbn: isbn.clone(),
                quantity,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        let mut actual = 0;
        for e in &events {
            if let ShoppingCartEvent::BookRemoved(r) = e {
                actual = r.quantity;
            }
            cart.apply(e);
        }
        actual
    }

    #[test]
    fn owner_is_attached_once() {
        let mut cart = open_cart();
        let user_id = UserId::new();
        let events = cart
            .handle(&ShoppingCartCommand::AttachOwner(AttachOwner {
                cart_id: cart.id_typed(),
                user_id,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        cart.apply(&events[0]);
        assert_eq!(cart.owner(), Some(user_id));

        let err = cart
            .handle(&ShoppingCartCommand::AttachOwner(AttachOwner {
                cart_id: cart.id_typed(),
                user_id: UserId::new(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn adding_the_same_book_merges_into_one_entry() {
        let mut cart = open_cart();
        let book = test_book("0446310786", "To Kill a Mockingbird", 1299);

        add(&mut cart, book.clone(), 2);
        add(&mut cart, book.clone(), 3);

        assert_eq!(cart.entries().len(), 1);
        assert_eq!(cart.quantity_of(&book.isbn), 5);
        assert_eq!(cart.total_quantity(), 5);
    }

    #[test]
    fn adding_zero_is_a_no_op() {
        let cart = open_cart();
        let events = cart
            .handle(&ShoppingCartCommand::AddBook(AddBook {
                cart_id: cart.id_typed(),
                book: test_book("0446310786", "To Kill a Mockingbird", 1299),
                quantity: 0,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn removal_clamps_to_the_entry_quantity() {
        let mut cart = open_cart();
        let book = test_book("0446310786", "To Kill a Mockingbird", 1299);
        add(&mut cart, book.clone(), 2);

        let actual = remove(&mut cart, &book.isbn, 5);
        assert_eq!(actual, 2);
        assert!(cart.is_empty());
        assert_eq!(cart.quantity_of(&book.isbn), 0);
    }

    #[test]
    fn removing_an_absent_book_is_a_no_op() {
        let cart = open_cart();
        let events = cart
            .handle(&ShoppingCartCommand::RemoveBook(RemoveBook {
                cart_id: cart.id_typed(),
                isbn: Isbn::new("0446310786").unwrap(),
                quantity: 1,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn drained_entries_are_deleted_not_kept_at_zero() {
        let mut cart = open_cart();
        let kept = test_book("1573222453", "The Kite Runner", 2200);
        let drained = test_book("0446310786", "To Kill a Mockingbird", 1299);
        add(&mut cart, kept.clone(), 1);
        add(&mut cart, drained.clone(), 2);

        remove(&mut cart, &drained.isbn, 2);

        assert_eq!(cart.entries().len(), 1);
        assert_eq!(cart.entries()[0].book, kept);
    }

    #[test]
    fn the_book_set_view_is_keyed_by_isbn() {
        let mut cart = open_cart();
        let a = test_book("0446310786", "To Kill a Mockingbird", 1299);
        let b = test_book("1573222453", "The Kite Runner", 2200);
        add(&mut cart, a.clone(), 2);
        add(&mut cart, b.clone(), 1);
        add(&mut cart, a.clone(), 1);

        let books = cart.books();
        assert_eq!(books.len(), 2);
        assert!(books.contains(&a));
        assert!(books.contains(&b));
    }

    #[test]
    fn checkout_clears_entries_for_the_next_cycle() {
        let mut cart = open_cart();
        add(&mut cart, test_book("0446310786", "To Kill a Mockingbird", 1299), 3);

        let events = cart
            .handle(&ShoppingCartCommand::Checkout(Checkout {
                cart_id: cart.id_typed(),
                confirmation: ConfirmationId::new(),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        cart.apply(&events[0]);

        assert!(cart.is_empty());
        assert_eq!(cart.total_quantity(), 0);
        assert!(cart.entries().is_empty());

        // The same aggregate keeps shopping.
        add(&mut cart, test_book("1573222453", "The Kite Runner", 2200), 1);
        assert_eq!(cart.total_quantity(), 1);
    }

    #[test]
    fn checkout_of_an_empty_cart_is_rejected() {
        let cart = open_cart();
        let err = cart
            .handle(&ShoppingCartCommand::Checkout(Checkout {
                cart_id: cart.id_typed(),
                confirmation: ConfirmationId::new(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::EmptyCart);
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let mut cart = open_cart();
        add(&mut cart, test_book("0446310786", "To Kill a Mockingbird", 1299), 1);
        let before = cart.clone();

        let cmd = ShoppingCartCommand::AddBook(AddBook {
            cart_id: cart.id_typed(),
            book: test_book("1573222453", "The Kite Runner", 2200),
            quantity: 1,
            occurred_at: Utc::now(),
        });
        let events1 = cart.handle(&cmd).unwrap();
        let events2 = cart.handle(&cmd).unwrap();

        assert_eq!(cart, before);
        assert_eq!(events1, events2);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: adding then removing the same amount leaves the cart
            /// exactly as it was (the fresh entry disappears).
            #[test]
            fn add_then_remove_round_trips(n in 1u32..1_000) {
                let mut cart = open_cart();
                let book = test_book("0446310786", "To Kill a Mockingbird", 1299);

                add(&mut cart, book.clone(), n);
                prop_assert_eq!(cart.quantity_of(&book.isbn), n);

                let actual = remove(&mut cart, &book.isbn, n);
                prop_assert_eq!(actual, n);
                prop_assert!(cart.is_empty());
            }

            /// Property: removal never drives an entry negative; the removed
            /// amount is always min(requested, in cart).
            #[test]
            fn removal_is_clamped(present in 1u32..1_000, requested in 1u32..2_000) {
                let mut cart = open_cart();
                let book = test_book("0446310786", "To Kill a Mockingbird", 1299);
                add(&mut cart, book.clone(), present);

                let actual = remove(&mut cart, &book.isbn, requested);
                prop_assert_eq!(actual, requested.min(present));
                prop_assert_eq!(cart.quantity_of(&book.isbn), present - actual);
            }
        }
    }
}
