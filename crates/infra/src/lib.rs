//! Infrastructure layer: stock store, ledger orchestration, audit trail, response cache.

pub mod audit;
pub mod cache;
pub mod catalog;
pub mod ledger;
pub mod stock_store;

mod integration_tests;

pub use catalog::{CatalogError, ProductCatalog};
pub use ledger::{ErrorCategory, LedgerError, MovementReceipt, StockLedger};
