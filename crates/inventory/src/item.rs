use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bookstore_catalog::{Book, Isbn};
use bookstore_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use bookstore_events::Event;

/// Stock item identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockItemId(pub AggregateId);

impl StockItemId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for StockItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: StockItem.
///
/// Tracks the available quantity of one catalog book. Quantity is `u32`:
/// it can never be observed negative, and a reservation that would overdraw
/// is rejected at decision time.
#[derive(Debug, Clone, PartialEq)]
pub struct StockItem {
    id: StockItemId,
    book: Option<Book>,
    quantity: u32,
    version: u64,
    created: bool,
}

impl StockItem {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: StockItemId) -> Self {
        Self {
            id,
            book: None,
            quantity: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> StockItemId {
        self.id
    }

    pub fn book(&self) -> Option<&Book> {
        self.book.as_ref()
    }

    pub fn isbn(&self) -> Option<&Isbn> {
        self.book.as_ref().map(|b| &b.isbn)
    }

    /// Units currently available for reservation.
    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn is_in_stock(&self) -> bool {
        self.quantity > 0
    }
}

impl AggregateRoot for StockItem {
    type Id = StockItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: StockBook — put a catalog book on the shelf with an initial
/// quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockBook {
    pub item_id: StockItemId,
    pub book: Book,
    pub initial_quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Reserve — take units off the shelf for a cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reserve {
    pub item_id: StockItemId,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Release — put units back when they leave a cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub item_id: StockItemId,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Replenish — owner-initiated restock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Replenish {
    pub item_id: StockItemId,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StockItemCommand {
    StockBook(StockBook),
    Reserve(Reserve),
    Release(Release),
    Replenish(Replenish),
}

/// Event: BookStocked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookStocked {
    pub item_id: StockItemId,
    pub book: Book,
    pub initial_quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockReserved {
    pub item_id: StockItemId,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReleased.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockReleased {
    pub item_id: StockItemId,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReplenished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockReplenished {
    pub item_id: StockItemId,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StockItemEvent {
    BookStocked(BookStocked),
    StockReserved(StockReserved),
    StockReleased(StockReleased),
    StockReplenished(StockReplenished),
}

impl Event for StockItemEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockItemEvent::BookStocked(_) => "inventory.book.stocked",
            StockItemEvent::StockReserved(_) => "inventory.stock.reserved",
            StockItemEvent::StockReleased(_) => "inventory.stock.released",
            StockItemEvent::StockReplenished(_) => "inventory.stock.replenished",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockItemEvent::BookStocked(e) => e.occurred_at,
            StockItemEvent::StockReserved(e) => e.occurred_at,
            StockItemEvent::StockReleased(e) => e.occurred_at,
            StockItemEvent::StockReplenished(e) => e.occurred_at,
        }
    }
}

impl Aggregate for StockItem {
    type Command = StockItemCommand;
    type Event = StockItemEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StockItemEvent::BookStocked(e) => {
                self.id = e.item_id;
                self.book = Some(e.book.clone());
                self.quantity = e.initial_quantity;
                self.created = true;
            }
            StockItemEvent::StockReserved(e) => {
                self.quantity = self.quantity.saturating_sub(e.quantity);
            }
            StockItemEvent::StockReleased(e) => {
                self.quantity = self.quantity.saturating_add(e.quantity);
            }
            StockItemEvent::StockReplenished(e) => {
                self.quantity = self.quantity.saturating_add(e.quantity);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StockItemCommand::StockBook(cmd) => self.handle_stock(cmd),
            StockItemCommand::Reserve(cmd) => self.handle_reserve(cmd),
            StockItemCommand::Release(cmd) => self.handle_release(cmd),
            StockItemCommand::Replenish(cmd) => self.handle_replenish(cmd),
        }
    }
}

impl StockItem {
    fn ensure_item_id(&self, item_id: StockItemId) -> Result<(), DomainError> {
        if self.id != item_id {
            return Err(DomainError::invariant("item_id mismatch"));
        }
        Ok(())
    }

    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn handle_stock(&self, cmd: &StockBook) -> Result<Vec<StockItemEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("book is already stocked"));
        }

        Ok(vec![StockItemEvent::BookStocked(BookStocked {
            item_id: cmd.item_id,
            book: cmd.book.clone(),
            initial_quantity: cmd.initial_quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reserve(&self, cmd: &Reserve) -> Result<Vec<StockItemEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_item_id(cmd.item_id)?;

        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity cannot be zero"));
        }

        if cmd.quantity > self.quantity {
            return Err(DomainError::insufficient_stock(cmd.quantity, self.quantity));
        }

        Ok(vec![StockItemEvent::StockReserved(StockReserved {
            item_id: cmd.item_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_release(&self, cmd: &Release) -> Result<Vec<StockItemEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_item_id(cmd.item_id)?;

        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity cannot be zero"));
        }

        // No upper bound: releases restock whatever left the shelf.
        Ok(vec![StockItemEvent::StockReleased(StockReleased {
            item_id: cmd.item_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_replenish(&self, cmd: &Replenish) -> Result<Vec<StockItemEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_item_id(cmd.item_id)?;

        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity cannot be zero"));
        }

        Ok(vec![StockItemEvent::StockReplenished(StockReplenished {
            item_id: cmd.item_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }
}
