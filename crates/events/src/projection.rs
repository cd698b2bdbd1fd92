use crate::{Event, EventEnvelope};

/// A projection builds a read model from an append-only event stream.
///
/// Projections transform events (the write model) into queryable state (the
/// read model). Read models are **disposable**: they can be deleted and
/// rebuilt from events at any time, since events remain the source of truth.
///
/// Implementations must be **idempotent** - applying the same event twice
/// produces the same result - because the bus only guarantees at-least-once
/// delivery. Tracking the last-seen sequence number per stream and skipping
/// duplicates is the usual strategy.
///
/// How read models are stored is an infrastructure concern and lives outside
/// this crate.
pub trait Projection {
    type Ev: Event;

    /// Apply a single event to the projection, updating the read model.
    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>);
}
