//! Disposable read models fed by committed event envelopes.

pub mod cart_activity;
pub mod stock_levels;

pub use cart_activity::{CART_AGGREGATE_TYPE, CartActivity, CartActivityProjection};
pub use stock_levels::{STOCK_ITEM_AGGREGATE_TYPE, StockLevel, StockLevelsProjection};
