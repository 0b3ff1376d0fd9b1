use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use stockroom_core::ProductId;

/// Every product read (list and detail) lives under this prefix.
pub const PRODUCTS_PREFIX: &str = "/api/products";
/// Movement listings, including the per-product view.
pub const STOCK_TRANSACTIONS_PREFIX: &str = "/api/stock/transactions";
/// Audit log listings.
pub const LOGS_PREFIX: &str = "/api/logs";

/// Exact key of a product detail view.
pub fn product_detail_key(id: ProductId) -> String {
    format!("{PRODUCTS_PREFIX}/{id}")
}

/// A cached read response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Process-wide read-through cache keyed by request path + query.
///
/// Entries have no TTL; they leave only through `invalidate` or
/// `invalidate_prefix`. Every invalidation advances the cache generation. A
/// reader captures `generation()` before computing a response and passes it
/// to `insert_if_fresh`, which refuses the fill if anything was invalidated
/// in between. A read that raced a write therefore cannot repopulate the
/// cache with pre-write data.
pub trait ResponseCache: Send + Sync {
    fn get(&self, key: &str) -> Option<CachedResponse>;

    fn generation(&self) -> u64;

    /// Store `response` unless the cache was invalidated after `generation`.
    /// Returns whether the entry was stored.
    fn insert_if_fresh(&self, key: String, response: CachedResponse, generation: u64) -> bool;

    /// Remove one exact key. Returns whether it was present.
    fn invalidate(&self, key: &str) -> bool;

    /// Remove every key starting with `prefix`. Returns how many were removed.
    fn invalidate_prefix(&self, prefix: &str) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<C> ResponseCache for Arc<C>
where
    C: ResponseCache + ?Sized,
{
    fn get(&self, key: &str) -> Option<CachedResponse> {
        (**self).get(key)
    }

    fn generation(&self) -> u64 {
        (**self).generation()
    }

    fn insert_if_fresh(&self, key: String, response: CachedResponse, generation: u64) -> bool {
        (**self).insert_if_fresh(key, response, generation)
    }

    fn invalidate(&self, key: &str) -> bool {
        (**self).invalidate(key)
    }

    fn invalidate_prefix(&self, prefix: &str) -> usize {
        (**self).invalidate_prefix(prefix)
    }

    fn len(&self) -> usize {
        (**self).len()
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: BTreeMap<String, CachedResponse>,
    generation: u64,
}

/// In-process [`ResponseCache`].
///
/// Keys are kept ordered so a prefix invalidation is a range scan. No
/// coordination across processes.
#[derive(Debug, Default)]
pub struct InMemoryResponseCache {
    state: RwLock<CacheState>,
}

impl InMemoryResponseCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResponseCache for InMemoryResponseCache {
    fn get(&self, key: &str) -> Option<CachedResponse> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.entries.get(key).cloned()
    }

    fn generation(&self) -> u64 {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .generation
    }

    fn insert_if_fresh(&self, key: String, response: CachedResponse, generation: u64) -> bool {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.generation != generation {
            tracing::debug!(%key, "discarding cache fill started before an invalidation");
            return false;
        }
        state.entries.insert(key, response);
        true
    }

    fn invalidate(&self, key: &str) -> bool {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.generation += 1;
        state.entries.remove(key).is_some()
    }

    fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.generation += 1;

        let doomed: Vec<String> = state
            .entries
            .range::<str, _>((std::ops::Bound::Included(prefix), std::ops::Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            state.entries.remove(key);
        }
        doomed.len()
    }

    fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }
}
