//! Read-through response cache with prefix invalidation.

pub mod response_cache;

pub use response_cache::{
    CachedResponse, InMemoryResponseCache, LOGS_PREFIX, PRODUCTS_PREFIX, ResponseCache,
    STOCK_TRANSACTIONS_PREFIX, product_detail_key,
};
