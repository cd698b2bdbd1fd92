//! Concurrency strategies for stock mutation.
//!
//! Availability checks and stock writes are two steps; without a guard, two
//! concurrent adds for the last copy could both pass the check. The guard
//! closes that window, selectable per storefront instance:
//!
//! - [`StockGuard::PerItemLock`] serializes mutations per stock item behind
//!   a keyed mutex.
//! - [`StockGuard::OptimisticRetry`] leans on the event store's
//!   [`ExpectedVersion`](bookstore_core::ExpectedVersion) compare-and-swap
//!   and re-dispatches on conflict, up to an attempt budget. The losing
//!   writer rehydrates fresh state, so an overdraw turns into
//!   `InsufficientStock` instead of negative stock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value as JsonValue;
use tracing::debug;

use bookstore_events::{EventBus, EventEnvelope};
use bookstore_inventory::{StockItem, StockItemCommand, StockItemId};

use crate::dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{EventStore, StoredEvent};
use crate::projections::STOCK_ITEM_AGGREGATE_TYPE;

/// Keyed mutexes, one per stock item.
#[derive(Debug, Default)]
pub struct ItemLocks {
    locks: Mutex<HashMap<StockItemId, Arc<Mutex<()>>>>,
}

impl ItemLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn acquire(&self, item_id: StockItemId) -> Result<Arc<Mutex<()>>, DispatchError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| DispatchError::Concurrency("stock lock table poisoned".to_string()))?;
        Ok(locks.entry(item_id).or_default().clone())
    }
}

/// Strategy for executing stock item commands under contention.
#[derive(Debug)]
pub enum StockGuard {
    /// Serialize all mutations of one item behind a mutex keyed by its id.
    PerItemLock(ItemLocks),
    /// Compare-and-swap via the store's expected version; retry on conflict
    /// up to `max_attempts` total attempts.
    OptimisticRetry { max_attempts: u32 },
}

impl StockGuard {
    pub fn per_item_lock() -> Self {
        StockGuard::PerItemLock(ItemLocks::new())
    }

    pub fn optimistic_retry(max_attempts: u32) -> Self {
        StockGuard::OptimisticRetry {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Dispatch a stock item command under this guard.
    pub fn execute<S, B>(
        &self,
        dispatcher: &CommandDispatcher<S, B>,
        item_id: StockItemId,
        command: StockItemCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        S: EventStore,
        B: EventBus<EventEnvelope<JsonValue>>,
    {
        let dispatch = |command: StockItemCommand| {
            dispatcher.dispatch::<StockItem>(
                item_id.0,
                STOCK_ITEM_AGGREGATE_TYPE,
                command,
                |id| StockItem::empty(StockItemId::new(id)),
            )
        };

        match self {
            StockGuard::PerItemLock(locks) => {
                let lock = locks.acquire(item_id)?;
                let _guard = lock
                    .lock()
                    .map_err(|_| DispatchError::Concurrency("stock lock poisoned".to_string()))?;
                dispatch(command)
            }
            StockGuard::OptimisticRetry { max_attempts } => {
                let mut attempt = 1;
                loop {
                    match dispatch(command.clone()) {
                        Err(DispatchError::Concurrency(msg)) if attempt < *max_attempts => {
                            debug!(%item_id, attempt, %msg, "stock write conflict, retrying");
                            attempt += 1;
                        }
                        other => return other,
                    }
                }
            }
        }
    }
}

impl Default for StockGuard {
    fn default() -> Self {
        StockGuard::optimistic_retry(3)
    }
}
