//! The storefront application facade.
//!
//! Synchronous, request-per-operation: every public method runs its
//! collaborator calls to completion (in the order that preserves observable
//! consistency) and returns before the caller proceeds. The (external)
//! request layer renders whatever plain data comes back; nothing here
//! formats output.
//!
//! Ordering rules the cart/stock invariant depends on:
//! - **add**: reserve stock first, then append the cart entry. A failed
//!   reservation means the cart is never touched; a failed cart append
//!   releases the reservation again (compensation).
//! - **remove**: shrink the cart first (clamped to what is actually there),
//!   then release exactly the removed amount back to stock.
//! - **checkout**: clears the cart only; stock was already reserved at add
//!   time, so confirming changes no stock.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use bookstore_cart::{
    AddBook, AttachOwner, CartEntry, CartId, CheckoutProcess, ConfirmationId, OpenCart,
    RemoveBook, ShoppingCart, ShoppingCartCommand, ShoppingCartEvent,
};
use bookstore_catalog::{Book, BrowsePage, BrowseQuery, Isbn, browse};
use bookstore_core::{AggregateId, DomainError, Price, UserId};
use bookstore_events::{EventBus, EventEnvelope};
use bookstore_inventory::{Release, Replenish, Reserve, StockBook, StockItem, StockItemCommand, StockItemId};
use bookstore_recommender::{JaccardRecommender, SimilarityRecommender};

use crate::directory::UserDirectory;
use crate::dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{EventStore, StoredEvent};
use crate::projections::{
    CART_AGGREGATE_TYPE, CartActivity, CartActivityProjection, STOCK_ITEM_AGGREGATE_TYPE,
    StockLevel, StockLevelsProjection,
};
use crate::read_model::InMemoryReadModelStore;
use crate::stock_guard::StockGuard;

type Shared<K, V> = Arc<InMemoryReadModelStore<K, V>>;

/// Cart contents and total as shown on the checkout page.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSummary {
    pub entries: Vec<CartEntry>,
    pub total: Price,
}

/// Application facade over carts, stock, checkout, browse, and
/// recommendations.
///
/// Owns its read models (applied synchronously after each dispatch, so
/// queries observe a mutation as soon as it returns) and publishes every
/// committed event on the bus for external consumers.
pub struct Storefront<S, B, D>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    D: UserDirectory,
{
    dispatcher: CommandDispatcher<S, B>,
    directory: D,
    stock_levels: StockLevelsProjection<Shared<StockItemId, StockLevel>>,
    activity: CartActivityProjection<Shared<CartId, CartActivity>>,
    guard: StockGuard,
    recommender: Box<dyn SimilarityRecommender + Send + Sync>,
}

impl<S, B, D> Storefront<S, B, D>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    D: UserDirectory,
{
    pub fn new(store: S, bus: B, directory: D) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store, bus),
            directory,
            stock_levels: StockLevelsProjection::new(Arc::new(InMemoryReadModelStore::new())),
            activity: CartActivityProjection::new(Arc::new(InMemoryReadModelStore::new())),
            guard: StockGuard::default(),
            recommender: Box::new(JaccardRecommender::new()),
        }
    }

    /// Select the concurrency strategy for stock mutations.
    pub fn with_stock_guard(mut self, guard: StockGuard) -> Self {
        self.guard = guard;
        self
    }

    /// Swap the recommendation strategy.
    pub fn with_recommender(
        mut self,
        recommender: Box<dyn SimilarityRecommender + Send + Sync>,
    ) -> Self {
        self.recommender = recommender;
        self
    }

    /// Open a cart and bind it to a new user (carts are attached at
    /// user-creation time).
    pub fn register_user(&self, user_id: UserId) -> Result<CartId, DispatchError> {
        if self.directory.cart_of(user_id).is_some() {
            return Err(DomainError::conflict("user is already registered").into());
        }

        let cart_id = CartId::new(AggregateId::new());
        let now = Utc::now();

        let committed = self.dispatch_cart(
            cart_id,
            ShoppingCartCommand::OpenCart(OpenCart {
                cart_id,
                occurred_at: now,
            }),
        )?;
        self.run_projections(&committed);

        let committed = self.dispatch_cart(
            cart_id,
            ShoppingCartCommand::AttachOwner(AttachOwner {
                cart_id,
                user_id,
                occurred_at: now,
            }),
        )?;
        self.run_projections(&committed);

        self.directory.register(user_id, cart_id)?;
        info!(%user_id, %cart_id, "registered user with a fresh cart");
        Ok(cart_id)
    }

    /// Put a catalog book on the shelf.
    pub fn stock_book(&self, book: Book, initial_quantity: u32) -> Result<StockItemId, DispatchError> {
        if self.stock_levels.find_by_isbn(&book.isbn).is_some() {
            return Err(DomainError::conflict("book is already stocked").into());
        }

        let item_id = StockItemId::new(AggregateId::new());
        let committed = self.guard.execute(
            &self.dispatcher,
            item_id,
            StockItemCommand::StockBook(StockBook {
                item_id,
                book: book.clone(),
                initial_quantity,
                occurred_at: Utc::now(),
            }),
        )?;
        self.run_projections(&committed);
        info!(isbn = %book.isbn, initial_quantity, "stocked book");
        Ok(item_id)
    }

    /// Owner-initiated restock.
    pub fn replenish(&self, isbn: &Isbn, quantity: u32) -> Result<u32, DispatchError> {
        let level = self.level_of(isbn)?;
        let committed = self.guard.execute(
            &self.dispatcher,
            level.item_id,
            StockItemCommand::Replenish(Replenish {
                item_id: level.item_id,
                quantity,
                occurred_at: Utc::now(),
            }),
        )?;
        self.run_projections(&committed);
        Ok(self.stock_levels.available(isbn))
    }

    /// Units currently available for one book (read model; 0 when unknown).
    pub fn available(&self, isbn: &Isbn) -> u32 {
        self.stock_levels.available(isbn)
    }

    /// Rehydrated stock item (source of truth, bypasses the read model).
    pub fn stock_item(&self, isbn: &Isbn) -> Result<StockItem, DispatchError> {
        let level = self.level_of(isbn)?;
        self.dispatcher
            .hydrate(level.item_id.0, |id| StockItem::empty(StockItemId::new(id)))
    }

    /// Put `quantity` copies of a book into the user's cart.
    ///
    /// Stock is reserved first; if that fails (insufficient stock, unknown
    /// book), the cart is untouched.
    pub fn add_to_cart(
        &self,
        user_id: UserId,
        isbn: &Isbn,
        quantity: u32,
    ) -> Result<(), DispatchError> {
        if quantity == 0 {
            return Ok(());
        }

        let cart_id = self.cart_id_of(user_id)?;
        let level = self.level_of(isbn)?;
        let now = Utc::now();

        debug!(%user_id, %isbn, quantity, "reserving stock for cart add");
        let committed = self.guard.execute(
            &self.dispatcher,
            level.item_id,
            StockItemCommand::Reserve(Reserve {
                item_id: level.item_id,
                quantity,
                occurred_at: now,
            }),
        )?;
        self.run_projections(&committed);

        let add = ShoppingCartCommand::AddBook(AddBook {
            cart_id,
            book: level.book.clone(),
            quantity,
            occurred_at: now,
        });
        match self.dispatch_cart(cart_id, add) {
            Ok(committed) => {
                self.run_projections(&committed);
                debug!(%user_id, %isbn, quantity, "added to cart");
                Ok(())
            }
            Err(err) => {
                // Put the reserved units back so a failed add leaves both
                // sides unchanged.
                let release = StockItemCommand::Release(Release {
                    item_id: level.item_id,
                    quantity,
                    occurred_at: Utc::now(),
                });
                match self.guard.execute(&self.dispatcher, level.item_id, release) {
                    Ok(committed) => self.run_projections(&committed),
                    Err(release_err) => {
                        warn!(%isbn, quantity, error = %release_err,
                            "failed to release reservation after cart add failure");
                    }
                }
                Err(err)
            }
        }
    }

    /// Take up to `quantity` copies of a book out of the user's cart.
    ///
    /// Removal clamps to what the cart actually holds; exactly the removed
    /// amount is released back to stock. Removing an absent book is a no-op.
    pub fn remove_from_cart(
        &self,
        user_id: UserId,
        isbn: &Isbn,
        quantity: u32,
    ) -> Result<(), DispatchError> {
        if quantity == 0 {
            return Ok(());
        }

        let cart_id = self.cart_id_of(user_id)?;
        let now = Utc::now();

        let committed = self.dispatch_cart(
            cart_id,
            ShoppingCartCommand::RemoveBook(RemoveBook {
                cart_id,
                isbn: isbn.clone(),
                quantity,
                occurred_at: now,
            }),
        )?;
        let removed = removed_quantity(&committed);
        self.run_projections(&committed);

        if removed > 0 {
            debug!(%user_id, %isbn, removed, "releasing stock after cart removal");
            let level = self.level_of(isbn)?;
            let committed = self.guard.execute(
                &self.dispatcher,
                level.item_id,
                StockItemCommand::Release(Release {
                    item_id: level.item_id,
                    quantity: removed,
                    occurred_at: now,
                }),
            )?;
            self.run_projections(&committed);
        }

        Ok(())
    }

    /// Sum of all entry quantities in the user's cart.
    pub fn total_in_cart(&self, user_id: UserId) -> Result<u32, DispatchError> {
        Ok(self.hydrate_cart(user_id)?.total_quantity())
    }

    /// Current cart entries for display.
    pub fn cart_entries(&self, user_id: UserId) -> Result<Vec<CartEntry>, DispatchError> {
        Ok(self.hydrate_cart(user_id)?.entries().to_vec())
    }

    /// What the checkout page shows: entries and the exact total.
    pub fn checkout_summary(&self, user_id: UserId) -> Result<CheckoutSummary, DispatchError> {
        let cart = self.hydrate_cart(user_id)?;
        Ok(CheckoutSummary {
            total: CheckoutProcess::compute_total(&cart),
            entries: cart.entries().to_vec(),
        })
    }

    /// Confirm the user's checkout: one-shot per shopping session.
    ///
    /// Fails with [`DomainError::EmptyCart`] when there is nothing to check
    /// out. On success the cart is cleared (stock stays as reserved) and the
    /// unique confirmation is returned.
    pub fn confirm_checkout(&self, user_id: UserId) -> Result<ConfirmationId, DispatchError> {
        let cart_id = self.cart_id_of(user_id)?;
        let cart = self
            .dispatcher
            .hydrate(cart_id.0, |id| ShoppingCart::empty(CartId::new(id)))?;

        let mut process = CheckoutProcess::new();
        let checkout = process.confirm(&cart, Utc::now())?;
        let confirmation = checkout.confirmation.clone();

        let committed = self.dispatch_cart(cart_id, ShoppingCartCommand::Checkout(checkout))?;
        self.run_projections(&committed);

        info!(%user_id, %confirmation, "order completed");
        Ok(confirmation)
    }

    /// Books suggested for this user based on cart overlap with peers.
    pub fn recommend_books(&self, user_id: UserId) -> HashSet<Book> {
        self.recommender.recommend(user_id, &self.activity)
    }

    /// Browse the stocked catalog: search, sort, facets.
    pub fn browse(&self, query: &BrowseQuery) -> BrowsePage {
        browse::browse(self.stock_levels.listings(), query)
    }

    fn cart_id_of(&self, user_id: UserId) -> Result<CartId, DispatchError> {
        self.directory
            .cart_of(user_id)
            .ok_or(DispatchError::Domain(DomainError::NotFound))
    }

    fn level_of(&self, isbn: &Isbn) -> Result<StockLevel, DispatchError> {
        self.stock_levels
            .find_by_isbn(isbn)
            .ok_or(DispatchError::Domain(DomainError::NotFound))
    }

    fn hydrate_cart(&self, user_id: UserId) -> Result<ShoppingCart, DispatchError> {
        let cart_id = self.cart_id_of(user_id)?;
        self.dispatcher
            .hydrate(cart_id.0, |id| ShoppingCart::empty(CartId::new(id)))
    }

    fn dispatch_cart(
        &self,
        cart_id: CartId,
        command: ShoppingCartCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        self.dispatcher.dispatch::<ShoppingCart>(
            cart_id.0,
            CART_AGGREGATE_TYPE,
            command,
            |id| ShoppingCart::empty(CartId::new(id)),
        )
    }

    /// Feed committed events into the read models.
    ///
    /// Projections are idempotent and rebuildable, so a failed apply only
    /// lags the read model; the event streams stay authoritative.
    fn run_projections(&self, committed: &[StoredEvent]) {
        for stored in committed {
            let envelope = stored.to_envelope();
            match stored.aggregate_type.as_str() {
                STOCK_ITEM_AGGREGATE_TYPE => {
                    if let Err(err) = self.stock_levels.apply_envelope(&envelope) {
                        warn!(error = %err, "stock projection apply failed");
                    }
                }
                CART_AGGREGATE_TYPE => {
                    if let Err(err) = self.activity.apply_envelope(&envelope) {
                        warn!(error = %err, "cart activity projection apply failed");
                    }
                }
                other => {
                    debug!(aggregate_type = other, "no projection for aggregate type");
                }
            }
        }
    }
}

/// Total quantity actually removed, read off the committed events.
fn removed_quantity(committed: &[StoredEvent]) -> u32 {
    committed
        .iter()
        .filter_map(|stored| {
            serde_json::from_value::<ShoppingCartEvent>(stored.payload.clone()).ok()
        })
        .map(|event| match event {
            ShoppingCartEvent::BookRemoved(e) => e.quantity,
            _ => 0,
        })
        .sum()
}
