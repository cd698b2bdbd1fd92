//! Storefront infrastructure and application facade.
//!
//! Persistence follows the event-sourcing shape end to end: aggregates decide
//! events, the append-only [`event_store`] persists them with optimistic
//! concurrency, the bus broadcasts them, and disposable [`projections`] serve
//! queries. [`service::Storefront`] is the synchronous application facade the
//! (external) request layer calls into.

pub mod directory;
pub mod dispatcher;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod service;
pub mod stock_guard;

pub use directory::{InMemoryUserDirectory, UserDirectory};
pub use dispatcher::{CommandDispatcher, DispatchError};
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent, UncommittedEvent};
pub use read_model::{InMemoryReadModelStore, ReadModelStore};
pub use service::{CheckoutSummary, Storefront};
pub use stock_guard::StockGuard;
