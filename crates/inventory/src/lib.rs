//! Inventory domain module: the rules of the stock ledger.
//!
//! This crate contains business rules for stock movements, implemented purely
//! as deterministic domain logic (no IO, no HTTP, no storage). The quantity a
//! product holds is a projection of its movements; everything here exists to
//! keep that projection non-negative and conserved.

pub mod movement;
pub mod product;
pub mod rules;

pub use movement::{MovementKind, NewMovement, StockMovement, conserved_stock};
pub use product::{NewProduct, Product, ProductPatch};
pub use rules::{MovementRejection, MovementRequest, StockChange, quantity_requirement};
