use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;
use thiserror::Error;

use bookstore_catalog::{Book, Isbn, Listing};
use bookstore_core::AggregateId;
use bookstore_events::EventEnvelope;
use bookstore_inventory::{StockItemEvent, StockItemId};

use crate::read_model::ReadModelStore;

/// Stream type tag for stock item aggregates.
pub const STOCK_ITEM_AGGREGATE_TYPE: &str = "inventory.stock_item";

/// Queryable stock read model: current availability per stocked book.
#[derive(Debug, Clone, PartialEq)]
pub struct StockLevel {
    pub item_id: StockItemId,
    pub book: Book,
    pub quantity: u32,
}

#[derive(Debug, Error)]
pub enum StockProjectionError {
    #[error("failed to deserialize stock event: {0}")]
    Deserialize(String),

    #[error("stream mismatch: {0}")]
    StreamMismatch(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Stock levels projection.
///
/// Consumes published envelopes (JSON payloads) and maintains the
/// availability read model. Disposable and rebuildable from the event
/// stream; idempotent under at-least-once delivery.
#[derive(Debug)]
pub struct StockLevelsProjection<S>
where
    S: ReadModelStore<StockItemId, StockLevel>,
{
    store: S,
    cursors: RwLock<HashMap<AggregateId, u64>>,
}

impl<S> StockLevelsProjection<S>
where
    S: ReadModelStore<StockItemId, StockLevel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    /// Read model for one stock item.
    pub fn get(&self, item_id: &StockItemId) -> Option<StockLevel> {
        self.store.get(item_id)
    }

    /// Stock item carrying the given book.
    pub fn find_by_isbn(&self, isbn: &Isbn) -> Option<StockLevel> {
        self.store.list().into_iter().find(|l| &l.book.isbn == isbn)
    }

    /// Units currently available for one book (0 when unknown).
    pub fn available(&self, isbn: &Isbn) -> u32 {
        self.find_by_isbn(isbn).map(|l| l.quantity).unwrap_or(0)
    }

    /// All stocked books.
    pub fn list(&self) -> Vec<StockLevel> {
        self.store.list()
    }

    /// Browse listings view over the whole read model.
    pub fn listings(&self) -> Vec<Listing> {
        self.store
            .list()
            .into_iter()
            .map(|l| Listing {
                book: l.book,
                available: l.quantity,
            })
            .collect()
    }

    /// Apply a published envelope into the projection.
    ///
    /// - Envelopes from other aggregate types are ignored
    /// - Enforces monotonic sequence per aggregate stream
    /// - Idempotent for at-least-once delivery (replays <= cursor are ignored)
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), StockProjectionError> {
        if envelope.aggregate_type() != STOCK_ITEM_AGGREGATE_TYPE {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if let Ok(mut cursors) = self.cursors.write() {
            let last = *cursors.get(&aggregate_id).unwrap_or(&0);

            if seq == 0 {
                return Err(StockProjectionError::NonMonotonicSequence { last, found: seq });
            }

            if seq <= last {
                // Duplicate or replay; safe to ignore.
                return Ok(());
            }

            if last != 0 && seq != last + 1 {
                return Err(StockProjectionError::NonMonotonicSequence { last, found: seq });
            }

            let event: StockItemEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| StockProjectionError::Deserialize(e.to_string()))?;

            let item_id = match &event {
                StockItemEvent::BookStocked(e) => e.item_id,
                StockItemEvent::StockReserved(e) => e.item_id,
                StockItemEvent::StockReleased(e) => e.item_id,
                StockItemEvent::StockReplenished(e) => e.item_id,
            };

            if item_id.0 != aggregate_id {
                return Err(StockProjectionError::StreamMismatch(
                    "event item_id does not match envelope aggregate_id".to_string(),
                ));
            }

            match event {
                StockItemEvent::BookStocked(e) => {
                    self.store.upsert(
                        e.item_id,
                        StockLevel {
                            item_id: e.item_id,
                            book: e.book,
                            quantity: e.initial_quantity,
                        },
                    );
                }
                StockItemEvent::StockReserved(e) => {
                    if let Some(mut level) = self.store.get(&e.item_id) {
                        level.quantity = level.quantity.saturating_sub(e.quantity);
                        self.store.upsert(e.item_id, level);
                    }
                }
                StockItemEvent::StockReleased(e) => {
                    if let Some(mut level) = self.store.get(&e.item_id) {
                        level.quantity = level.quantity.saturating_add(e.quantity);
                        self.store.upsert(e.item_id, level);
                    }
                }
                StockItemEvent::StockReplenished(e) => {
                    if let Some(mut level) = self.store.get(&e.item_id) {
                        level.quantity = level.quantity.saturating_add(e.quantity);
                        self.store.upsert(e.item_id, level);
                    }
                }
            }

            // Advance cursor after successful apply.
            cursors.insert(aggregate_id, seq);
        }

        Ok(())
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), StockProjectionError> {
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
