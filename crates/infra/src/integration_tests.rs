//! Integration tests for the full stock pipeline.
//!
//! Tests: StockLedger → StockStore transaction → AuditTrail → ResponseCache
//!
//! Verifies:
//! - Stock is conserved and never negative
//! - A failure at any step of the transaction leaves no partial state
//! - Concurrent stock-outs on one product serialize
//! - Reads after a write never see a stale cache entry
//! - An audit outage never fails or rolls back a committed movement

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use proptest::prelude::*;

    use stockroom_auth::{Actor, Role};
    use stockroom_core::{ProductId, UserId};
    use stockroom_inventory::{MovementKind, MovementRequest, NewProduct, conserved_stock};

    use crate::audit::{AuditStats, AuditStore, AuditTrail, InMemoryAuditStore, RequestMeta, RetryPolicy};
    use crate::cache::{CachedResponse, InMemoryResponseCache, ResponseCache, product_detail_key};
    use crate::ledger::{LedgerError, StockLedger};
    use crate::stock_store::{InMemoryStockStore, MovementFilter, StockFault, StockStore};

    type Ledger = StockLedger<InMemoryStockStore, Arc<InMemoryResponseCache>>;

    struct Harness {
        ledger: Arc<Ledger>,
        store: InMemoryStockStore,
        cache: Arc<InMemoryResponseCache>,
        audit_store: Arc<InMemoryAuditStore>,
        trail: AuditTrail,
    }

    fn setup(policy: RetryPolicy) -> Harness {
        let store = InMemoryStockStore::new();
        let cache = Arc::new(InMemoryResponseCache::new());
        let audit_store = Arc::new(InMemoryAuditStore::new());
        let (trail, _worker) = AuditTrail::spawn(64, audit_store.clone(), cache.clone(), policy);
        let ledger = Arc::new(StockLedger::new(store.clone(), cache.clone(), trail.clone()));
        Harness {
            ledger,
            store,
            cache,
            audit_store,
            trail,
        }
    }

    fn staff() -> Actor {
        Actor::new(UserId::new(7), "sam", Role::STAFF)
    }

    fn meta() -> RequestMeta {
        RequestMeta::new(Some("127.0.0.1".to_string()), Some("integration-test".to_string()))
    }

    async fn seed(h: &Harness, code: &str, stock: i64) -> ProductId {
        let product = h
            .store
            .create_product(NewProduct {
                code: code.to_string(),
                name: format!("Product {code}"),
                price_cents: 1000,
            })
            .await
            .unwrap();
        if stock > 0 {
            h.ledger.record_in(product.id, stock, &staff(), &meta()).await.unwrap();
        }
        product.id
    }

    async fn stock_of(h: &Harness, id: ProductId) -> i64 {
        h.store.get_product(id).await.unwrap().unwrap().current_stock
    }

    async fn movement_count(h: &Harness, id: ProductId) -> usize {
        h.store
            .list_movements(MovementFilter::for_product(id))
            .await
            .unwrap()
            .len()
    }

    async fn assert_conserved(h: &Harness, id: ProductId) {
        let log = h
            .store
            .list_movements(MovementFilter::for_product(id))
            .await
            .unwrap();
        let expected = conserved_stock(log.iter().map(|v| &v.movement));
        assert_eq!(stock_of(h, id).await, expected, "stock must equal the movement sum");
    }

    async fn settle<F: Fn(AuditStats) -> bool>(trail: &AuditTrail, done: F) -> AuditStats {
        for _ in 0..400 {
            let stats = trail.stats();
            if done(stats) {
                return stats;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("audit outbox did not settle: {:?}", trail.stats());
    }

    fn cache_fill(cache: &InMemoryResponseCache, key: &str) {
        let generation = cache.generation();
        cache.insert_if_fresh(
            key.to_string(),
            CachedResponse {
                content_type: Some("application/json".to_string()),
                body: b"[]".to_vec(),
            },
            generation,
        );
    }

    #[tokio::test]
    async fn out_then_adjust_down_to_zero() {
        let h = setup(RetryPolicy::no_retry());
        let id = seed(&h, "A", 10).await;

        let receipt = h.ledger.record_out(id, 7, &staff(), &meta()).await.unwrap();
        assert_eq!((receipt.previous_stock, receipt.new_stock), (10, 3));
        assert_eq!(receipt.movement.source_destination, "Unknown Customer");

        let err = h.ledger.record_out(id, 5, &staff(), &meta()).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientStock { available: 3, requested: 5, .. }));
        assert_eq!(stock_of(&h, id).await, 3);

        let receipt = h.ledger.record_adjustment(id, -3, &staff(), &meta()).await.unwrap();
        assert_eq!(receipt.new_stock, 0);
        assert_eq!(receipt.movement.notes, "Stock decreased due to adjustment");

        let err = h.ledger.record_adjustment(id, -1, &staff(), &meta()).await.unwrap_err();
        assert!(matches!(err, LedgerError::NegativeStockAdjustment { current: 0, adjustment: -1, .. }));

        assert_eq!(stock_of(&h, id).await, 0);
        assert_eq!(movement_count(&h, id).await, 3);
        assert_conserved(&h, id).await;
    }

    #[tokio::test]
    async fn invalid_requests_and_unknown_products_touch_nothing() {
        let h = setup(RetryPolicy::no_retry());
        let id = seed(&h, "A", 4).await;

        for (kind, quantity) in [(MovementKind::In, 0), (MovementKind::Out, -2), (MovementKind::Adjustment, 0)] {
            let err = h
                .ledger
                .record(MovementRequest::new(id, kind, quantity), &staff(), &meta())
                .await
                .unwrap_err();
            assert!(matches!(err, LedgerError::InvalidQuantity { .. }));
        }

        let err = h
            .ledger
            .record_in(ProductId::new(999), 1, &staff(), &meta())
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::ProductNotFound { product_id: ProductId::new(999) });

        assert_eq!(stock_of(&h, id).await, 4);
        assert_eq!(movement_count(&h, id).await, 1);
    }

    #[tokio::test]
    async fn a_fault_at_any_step_rolls_back_everything() {
        for fault in [StockFault::StockWrite, StockFault::MovementAppend, StockFault::Commit] {
            let h = setup(RetryPolicy::no_retry());
            let id = seed(&h, "A", 5).await;
            settle(&h.trail, |s| s.delivered == 1).await;
            cache_fill(&h.cache, "/api/stock/transactions");

            h.store.inject_fault(fault);
            let err = h.ledger.record_out(id, 2, &staff(), &meta()).await.unwrap_err();
            assert!(matches!(err, LedgerError::Store(_)), "{fault:?} surfaced as {err:?}");

            assert_eq!(stock_of(&h, id).await, 5, "{fault:?} left an orphaned quantity change");
            assert_eq!(movement_count(&h, id).await, 1, "{fault:?} left an orphaned movement");
            assert_conserved(&h, id).await;

            // Nothing committed, so nothing is audited or invalidated.
            assert_eq!(h.trail.stats().enqueued, 1);
            assert!(h.cache.get("/api/stock/transactions").is_some());

            // The row lock was released by the rollback.
            h.ledger.record_out(id, 2, &staff(), &meta()).await.unwrap();
            assert_eq!(stock_of(&h, id).await, 3);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_outs_never_oversell() {
        const N: usize = 24;
        const Q: i64 = 3;
        const K: usize = 7;

        let h = setup(RetryPolicy::no_retry());
        let id = seed(&h, "HOT", K as i64 * Q).await;

        let mut tasks = Vec::with_capacity(N);
        for _ in 0..N {
            let ledger = Arc::clone(&h.ledger);
            tasks.push(tokio::spawn(async move {
                ledger.record_out(id, Q, &staff(), &meta()).await
            }));
        }

        let mut successes = 0;
        let mut insufficient = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => successes += 1,
                Err(LedgerError::InsufficientStock { .. }) => insufficient += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(successes, K);
        assert_eq!(insufficient, N - K);
        assert_eq!(stock_of(&h, id).await, 0);
        assert_eq!(movement_count(&h, id).await, K + 1);
        assert_conserved(&h, id).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_movements_on_many_products_stay_conserved() {
        let h = setup(RetryPolicy::no_retry());
        let mut ids = Vec::new();
        for i in 0..4 {
            ids.push(seed(&h, &format!("P{i}"), 50).await);
        }

        let mut tasks = Vec::new();
        for round in 0..40i64 {
            let ledger = Arc::clone(&h.ledger);
            let id = ids[(round % 4) as usize];
            tasks.push(tokio::spawn(async move {
                let request = match round % 3 {
                    0 => MovementRequest::new(id, MovementKind::In, 2),
                    1 => MovementRequest::new(id, MovementKind::Out, 5),
                    _ => MovementRequest::new(id, MovementKind::Adjustment, -4),
                };
                ledger.record(request, &staff(), &meta()).await
            }));
        }
        for task in tasks {
            let _ = task.await.unwrap();
        }

        for id in ids {
            assert!(stock_of(&h, id).await >= 0);
            assert_conserved(&h, id).await;
        }
    }

    #[tokio::test]
    async fn reads_after_a_write_are_never_stale() {
        let h = setup(RetryPolicy::no_retry());
        let id = seed(&h, "A", 1).await;

        cache_fill(&h.cache, "/api/products");
        cache_fill(&h.cache, &product_detail_key(id));
        cache_fill(&h.cache, "/api/stock/transactions");
        cache_fill(&h.cache, &format!("/api/stock/transactions/product/{id}"));
        cache_fill(&h.cache, "/api/logs");

        // A reader that started before the write...
        let in_flight = h.cache.generation();

        h.ledger.record_in(id, 2, &staff(), &meta()).await.unwrap();

        assert!(h.cache.get("/api/products").is_none());
        assert!(h.cache.get(&product_detail_key(id)).is_none());
        assert!(h.cache.get("/api/stock/transactions").is_none());
        assert!(h.cache.get(&format!("/api/stock/transactions/product/{id}")).is_none());

        // ...cannot put its pre-write view back.
        assert!(!h.cache.insert_if_fresh(
            "/api/stock/transactions".to_string(),
            CachedResponse {
                content_type: None,
                body: b"stale".to_vec(),
            },
            in_flight,
        ));

        let log = h.store.list_movements(MovementFilter::all()).await.unwrap();
        assert_eq!(log[0].movement.quantity, 2);
    }

    #[tokio::test]
    async fn audit_outage_does_not_fail_the_movement() {
        let h = setup(RetryPolicy::fixed(3, Duration::from_millis(1)));
        let id = seed(&h, "A", 0).await;
        h.audit_store.set_available(false);

        let receipt = h.ledger.record_in(id, 8, &staff(), &meta()).await.unwrap();
        assert_eq!(receipt.new_stock, 8);

        let stats = settle(&h.trail, |s| s.dropped == 1).await;
        assert_eq!(stats.delivered, 0);

        h.audit_store.set_available(true);
        assert_eq!(stock_of(&h, id).await, 8);
        assert!(h.audit_store.recent(10).await.unwrap().is_empty(), "the lost entry stays lost");
    }

    #[tokio::test]
    async fn audit_entry_arrives_once_the_store_recovers() {
        let h = setup(RetryPolicy::fixed(200, Duration::from_millis(5)));
        let id = seed(&h, "A", 0).await;
        h.audit_store.set_available(false);

        h.ledger.record_in(id, 3, &staff(), &meta()).await.unwrap();
        settle(&h.trail, |s| s.retried >= 2).await;
        h.audit_store.set_available(true);

        let stats = settle(&h.trail, |s| s.delivered == 1).await;
        assert_eq!(stats.dropped, 0);

        let entries = h.audit_store.for_user(UserId::new(7), 50).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "Stock In");
        assert_eq!(entries[0].details["newStock"], 3);
        assert_eq!(entries[0].details["previousStock"], 0);
        assert_eq!(entries[0].ip_address.as_deref(), Some("127.0.0.1"));
    }

    fn arb_step() -> impl Strategy<Value = (MovementKind, i64)> {
        prop_oneof![
            (1i64..20).prop_map(|q| (MovementKind::In, q)),
            (1i64..20).prop_map(|q| (MovementKind::Out, q)),
            (-20i64..20).prop_map(|q| (MovementKind::Adjustment, q)),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 48,
            ..ProptestConfig::default()
        })]

        /// Property: whatever sequence of movements is attempted through the
        /// ledger, the stored quantity equals the sum of the stored log and
        /// never drops below zero.
        #[test]
        fn ledger_conserves_stock(steps in prop::collection::vec(arb_step(), 1..40)) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            rt.block_on(async {
                let h = setup(RetryPolicy::no_retry());
                let id = seed(&h, "PROP", 0).await;

                for (kind, quantity) in steps {
                    let before = stock_of(&h, id).await;
                    let result = h
                        .ledger
                        .record(MovementRequest::new(id, kind, quantity), &staff(), &meta())
                        .await;
                    let after = stock_of(&h, id).await;

                    match result {
                        Ok(receipt) => {
                            assert_eq!(receipt.previous_stock, before);
                            assert_eq!(receipt.new_stock, after);
                        }
                        Err(_) => assert_eq!(before, after, "a rejected movement changed stock"),
                    }
                    assert!(after >= 0);
                }
                assert_conserved(&h, id).await;
            });
        }
    }
}
