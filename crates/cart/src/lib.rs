//! Shopping cart domain module (event-sourced).
//!
//! A cart belongs to exactly one user and lives across checkout cycles:
//! confirming a checkout clears the entries and the same aggregate carries
//! on as a fresh cart. Stock guarding happens one layer up - the storefront
//! reserves inventory before a cart entry is ever created.

pub mod cart;
pub mod checkout;

pub use cart::{
    AddBook, AttachOwner, BookAdded, BookRemoved, CartEntry, CartId, CartOpened, CheckedOut,
    Checkout, OpenCart, OwnerAttached, RemoveBook, ShoppingCart, ShoppingCartCommand,
    ShoppingCartEvent,
};
pub use checkout::{CheckoutProcess, CheckoutState, ConfirmationId};
