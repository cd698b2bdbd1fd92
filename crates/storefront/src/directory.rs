//! User/session collaborator interface.
//!
//! The storefront does not authenticate anyone; it only needs to resolve a
//! caller identity to that user's cart. Registration exists because carts
//! are attached at user-creation time.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use bookstore_cart::CartId;
use bookstore_core::{DomainError, DomainResult, UserId};

/// User -> cart resolution, provided by the surrounding user service.
pub trait UserDirectory: Send + Sync {
    /// The user's cart handle, if the user exists.
    fn cart_of(&self, user_id: UserId) -> Option<CartId>;

    /// Bind a user to their (already opened) cart.
    ///
    /// Fails with a conflict when the user is already registered.
    fn register(&self, user_id: UserId, cart_id: CartId) -> DomainResult<()>;
}

impl<D> UserDirectory for Arc<D>
where
    D: UserDirectory + ?Sized,
{
    fn cart_of(&self, user_id: UserId) -> Option<CartId> {
        (**self).cart_of(user_id)
    }

    fn register(&self, user_id: UserId, cart_id: CartId) -> DomainResult<()> {
        (**self).register(user_id, cart_id)
    }
}

/// In-memory directory for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    inner: RwLock<HashMap<UserId, CartId>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn cart_of(&self, user_id: UserId) -> Option<CartId> {
        self.inner.read().ok()?.get(&user_id).copied()
    }

    fn register(&self, user_id: UserId, cart_id: CartId) -> DomainResult<()> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| DomainError::conflict("user directory lock poisoned"))?;
        if map.contains_key(&user_id) {
            return Err(DomainError::conflict("user is already registered"));
        }
        map.insert(user_id, cart_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookstore_core::AggregateId;

    #[test]
    fn registration_is_one_to_one() {
        let directory = InMemoryUserDirectory::new();
        let user_id = UserId::new();
        let cart_id = CartId::new(AggregateId::new());

        assert!(directory.cart_of(user_id).is_none());
        directory.register(user_id, cart_id).unwrap();
        assert_eq!(directory.cart_of(user_id), Some(cart_id));

        let err = directory
            .register(user_id, CartId::new(AggregateId::new()))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }
}
