//! Inventory domain module (event-sourced).
//!
//! This crate contains business rules for stock levels, implemented purely
//! as deterministic domain logic (no IO, no HTTP, no storage). Available
//! quantity per book is the single source of truth for purchasability and
//! only moves through explicit commands.

pub mod item;

pub use item::{
    BookStocked, Release, Replenish, Reserve, StockBook, StockItem, StockItemCommand,
    StockItemEvent, StockItemId, StockReleased, StockReplenished, StockReserved,
};
