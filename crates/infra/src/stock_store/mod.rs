//! Quantity store and movement log boundary.
//!
//! The store keeps each product's authoritative `current_stock` together with
//! the append-only log of movements that produced it. Stock only changes
//! inside a [`StockTransaction`], which locks the product row, stages the new
//! quantity and the movement, and makes both visible at commit.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::{InMemoryStockStore, StockFault};
pub use postgres::PostgresStockStore;
pub use r#trait::{MovementFilter, MovementView, StockStore, StockStoreError, StockTransaction};
