//! Integration tests for the order-creation pipeline.
//!
//! Tests: CreateOrder → OrderAssembler → TransactionCoordinator → store scope → committed state
//!
//! Verifies:
//! - Orders commit with snapshot prices and exact totals
//! - Any failing line, persist or commit leaves stock and orders untouched
//! - Concurrent orders never oversell a product
//! - Abandoned and timed-out scopes release their rows and discard their reservations

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;

    use pos_catalog::{CreateCustomer, CreateProduct, ContactInfo, UpdateProduct};
    use pos_core::{CustomerId, DomainError, Money, OrderId, ProductId, Quantity};
    use pos_sales::{CreateOrder, LineRequest, Order, OrderDraft, OrderError};

    use crate::assembler::OrderAssembler;
    use crate::store::{
        CatalogLookup, CatalogStore, FulfillmentStore, InMemoryScope, InMemoryStore, OrderReader, OrderScope,
        Reservation, StoreError,
    };

    fn money(cents: i64) -> Money {
        Money::from_cents(cents).unwrap()
    }

    fn qty(n: i64) -> Quantity {
        Quantity::new(n).unwrap()
    }

    async fn add_product(store: &InMemoryStore, price_cents: i64, stock: i64) -> ProductId {
        store
            .create_product(CreateProduct {
                name: format!("product-{price_cents}"),
                price: money(price_cents),
                stock,
            })
            .await
            .unwrap()
            .id
    }

    async fn add_customer(store: &InMemoryStore) -> CustomerId {
        store
            .create_customer(CreateCustomer {
                name: "Walk-in".to_string(),
                contact: ContactInfo::default(),
            })
            .await
            .unwrap()
            .id
    }

    async fn stock_of(store: &InMemoryStore, id: ProductId) -> i64 {
        store.get_product(id).await.unwrap().unwrap().stock
    }

    fn order_for(customer_id: CustomerId, lines: &[(ProductId, i64)]) -> CreateOrder {
        CreateOrder {
            customer_id,
            items: lines
                .iter()
                .map(|&(product_id, n)| LineRequest {
                    product_id,
                    quantity: qty(n),
                })
                .collect(),
        }
    }

    fn setup_with(store: InMemoryStore) -> (Arc<InMemoryStore>, OrderAssembler<InMemoryStore>) {
        pos_observability::init_for_tests();
        let store = Arc::new(store);
        let assembler = OrderAssembler::new(store.clone());
        (store, assembler)
    }

    fn setup() -> (Arc<InMemoryStore>, OrderAssembler<InMemoryStore>) {
        setup_with(InMemoryStore::new())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Fault-injecting store: counts reservations, fails persist or commit.
    // ─────────────────────────────────────────────────────────────────────

    #[derive(Clone, Copy, Default)]
    struct Faults {
        fail_persist: bool,
        fail_commit: bool,
    }

    struct FaultyStore {
        inner: InMemoryStore,
        reservations: Arc<AtomicUsize>,
        faults: Faults,
    }

    struct FaultyScope {
        inner: InMemoryScope,
        reservations: Arc<AtomicUsize>,
        faults: Faults,
    }

    #[async_trait]
    impl OrderScope for FaultyScope {
        async fn try_reserve(&mut self, product_id: ProductId, quantity: Quantity) -> Result<Reservation, StoreError> {
            self.reservations.fetch_add(1, Ordering::SeqCst);
            self.inner.try_reserve(product_id, quantity).await
        }

        async fn persist(&mut self, order: &Order) -> Result<OrderId, StoreError> {
            if self.faults.fail_persist {
                return Err(StoreError::backend("disk full"));
            }
            self.inner.persist(order).await
        }

        async fn commit(self) -> Result<(), StoreError> {
            if self.faults.fail_commit {
                return Err(StoreError::transient("connection reset during commit"));
            }
            self.inner.commit().await
        }

        async fn rollback(self) -> Result<(), StoreError> {
            self.inner.rollback().await
        }
    }

    #[async_trait]
    impl FulfillmentStore for FaultyStore {
        type Scope = FaultyScope;

        async fn begin(&self) -> Result<FaultyScope, StoreError> {
            Ok(FaultyScope {
                inner: self.inner.begin().await?,
                reservations: self.reservations.clone(),
                faults: self.faults,
            })
        }
    }

    #[async_trait]
    impl CatalogLookup for FaultyStore {
        async fn get_product(&self, id: ProductId) -> Result<Option<pos_catalog::Product>, StoreError> {
            self.inner.get_product(id).await
        }

        async fn customer_exists(&self, id: CustomerId) -> Result<bool, StoreError> {
            self.inner.customer_exists(id).await
        }
    }

    #[async_trait]
    impl OrderReader for FaultyStore {
        async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
            self.inner.get_order(id).await
        }

        async fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
            self.inner.list_orders().await
        }
    }

    fn faulty(inner: &InMemoryStore, faults: Faults) -> (Arc<AtomicUsize>, OrderAssembler<FaultyStore>) {
        let reservations = Arc::new(AtomicUsize::new(0));
        let store = FaultyStore {
            inner: inner.clone(),
            reservations: reservations.clone(),
            faults,
        };
        (reservations, OrderAssembler::new(Arc::new(store)))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Scenarios
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn single_line_order_commits_total_and_decrements_stock() {
        let (store, assembler) = setup();
        let customer = add_customer(&store).await;
        let p = add_product(&store, 1000, 5).await;

        let order = assembler.create_order(order_for(customer, &[(p, 3)])).await.unwrap();

        assert_eq!(order.total(), money(3000));
        assert_eq!(order.total().to_string(), "30.00");
        assert_eq!(order.customer_id(), customer);
        assert_eq!(order.lines().len(), 1);
        assert_eq!(order.lines()[0].unit_price, money(1000));
        assert_eq!(stock_of(&store, p).await, 2);

        let stored = assembler.get_order(order.id()).await.unwrap().unwrap();
        assert_eq!(stored, order);
        assert_eq!(assembler.list_orders().await.unwrap(), vec![order]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_orders_for_last_units_exactly_one_wins() {
        let (store, assembler) = setup();
        let customer = add_customer(&store).await;
        let p = add_product(&store, 500, 2).await;

        let a = {
            let assembler = assembler.clone();
            tokio::spawn(async move { assembler.create_order(order_for(customer, &[(p, 2)])).await })
        };
        let b = {
            let assembler = assembler.clone();
            tokio::spawn(async move { assembler.create_order(order_for(customer, &[(p, 2)])).await })
        };
        let results = [a.await.unwrap(), b.await.unwrap()];

        let committed = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(committed, 1);
        let rejected: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
        assert_eq!(
            rejected,
            vec![&OrderError::InsufficientStock {
                product_id: p,
                requested: 2,
                available: 0
            }]
        );
        assert_eq!(stock_of(&store, p).await, 0);
        assert_eq!(assembler.list_orders().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failing_second_line_rolls_back_first_line() {
        let (store, assembler) = setup();
        let customer = add_customer(&store).await;
        let p1 = add_product(&store, 100, 10).await;
        let p2 = add_product(&store, 200, 5).await;

        let err = assembler
            .create_order(order_for(customer, &[(p1, 1), (p2, 100)]))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            OrderError::InsufficientStock {
                product_id: p2,
                requested: 100,
                available: 5
            }
        );
        assert_eq!(stock_of(&store, p1).await, 10);
        assert_eq!(stock_of(&store, p2).await, 5);
        assert!(assembler.list_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_customer_fails_before_any_reservation() {
        let inner = InMemoryStore::new();
        let p = add_product(&inner, 100, 3).await;
        let (reservations, assembler) = faulty(&inner, Faults::default());

        let ghost = CustomerId::new();
        let err = assembler.create_order(order_for(ghost, &[(p, 1)])).await.unwrap_err();

        assert_eq!(err, OrderError::CustomerNotFound(ghost));
        assert_eq!(reservations.load(Ordering::SeqCst), 0);
        assert_eq!(stock_of(&inner, p).await, 3);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Atomicity and snapshots
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn unknown_product_rolls_back_earlier_lines() {
        let (store, assembler) = setup();
        let customer = add_customer(&store).await;
        let p = add_product(&store, 100, 4).await;
        let ghost = ProductId::new();

        let err = assembler
            .create_order(order_for(customer, &[(p, 2), (ghost, 1)]))
            .await
            .unwrap_err();

        assert_eq!(err, OrderError::ProductNotFound(ghost));
        assert_eq!(stock_of(&store, p).await, 4);
        assert!(assembler.list_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn persist_failure_rolls_back_every_reservation() {
        let inner = InMemoryStore::new();
        let customer = add_customer(&inner).await;
        let p1 = add_product(&inner, 100, 4).await;
        let p2 = add_product(&inner, 300, 4).await;
        let (reservations, assembler) = faulty(
            &inner,
            Faults {
                fail_persist: true,
                ..Faults::default()
            },
        );

        let err = assembler
            .create_order(order_for(customer, &[(p1, 2), (p2, 4)]))
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::PersistenceFailure { transient: false, .. }));
        assert_eq!(reservations.load(Ordering::SeqCst), 2);
        assert_eq!(stock_of(&inner, p1).await, 4);
        assert_eq!(stock_of(&inner, p2).await, 4);
        assert!(inner.list_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn commit_failure_rolls_back_and_is_transient() {
        let inner = InMemoryStore::new();
        let customer = add_customer(&inner).await;
        let p = add_product(&inner, 100, 4).await;
        let (_, assembler) = faulty(
            &inner,
            Faults {
                fail_commit: true,
                ..Faults::default()
            },
        );

        let err = assembler.create_order(order_for(customer, &[(p, 1)])).await.unwrap_err();

        assert!(err.is_transient());
        assert_eq!(stock_of(&inner, p).await, 4);
        assert!(inner.list_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn persist_of_order_for_missing_customer_is_rejected() {
        let store = InMemoryStore::new();
        let p = add_product(&store, 100, 4).await;

        let mut draft = OrderDraft::new(OrderId::new(), CustomerId::new());
        draft.add_line(p, qty(1), money(100)).unwrap();
        let order = draft.finish(Utc::now()).unwrap();

        let mut scope = store.begin().await.unwrap();
        scope.try_reserve(p, qty(1)).await.unwrap();
        let err = scope.persist(&order).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        scope.rollback().await.unwrap();

        assert_eq!(stock_of(&store, p).await, 4);
    }

    #[tokio::test]
    async fn later_price_change_does_not_touch_committed_orders() {
        let (store, assembler) = setup();
        let customer = add_customer(&store).await;
        let p = add_product(&store, 1000, 10).await;

        let order = assembler.create_order(order_for(customer, &[(p, 2)])).await.unwrap();

        store
            .update_product(
                p,
                UpdateProduct {
                    name: "repriced".to_string(),
                    price: money(2500),
                    stock: 8,
                },
            )
            .await
            .unwrap();

        let stored = assembler.get_order(order.id()).await.unwrap().unwrap();
        assert_eq!(stored.lines()[0].unit_price, money(1000));
        assert_eq!(stored.total(), money(2000));

        let next = assembler.create_order(order_for(customer, &[(p, 1)])).await.unwrap();
        assert_eq!(next.lines()[0].unit_price, money(2500));
    }

    #[tokio::test]
    async fn same_product_on_two_lines_is_reserved_cumulatively() {
        let (store, assembler) = setup();
        let customer = add_customer(&store).await;
        let p = add_product(&store, 100, 5).await;

        let err = assembler
            .create_order(order_for(customer, &[(p, 3), (p, 3)]))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            OrderError::InsufficientStock {
                product_id: p,
                requested: 3,
                available: 2
            }
        );
        assert_eq!(stock_of(&store, p).await, 5);

        let order = assembler
            .create_order(order_for(customer, &[(p, 3), (p, 2)]))
            .await
            .unwrap();
        assert_eq!(order.lines().len(), 2);
        assert_eq!(order.total(), money(500));
        assert_eq!(stock_of(&store, p).await, 0);
        let sold: i64 = assembler
            .list_orders()
            .await
            .unwrap()
            .iter()
            .map(|o| o.quantity_of(p))
            .sum();
        assert_eq!(sold, 5);
    }

    #[tokio::test]
    async fn empty_order_is_invalid() {
        let (store, assembler) = setup();
        let customer = add_customer(&store).await;

        let err = assembler.create_order(order_for(customer, &[])).await.unwrap_err();
        assert!(matches!(err, OrderError::InvalidRequest(_)));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Isolation, cancellation, lock timeouts
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn uncommitted_scope_is_invisible_to_readers() {
        let store = InMemoryStore::new();
        let customer = add_customer(&store).await;
        let p = add_product(&store, 100, 4).await;

        let mut draft = OrderDraft::new(OrderId::new(), customer);
        let mut scope = store.begin().await.unwrap();
        let r = scope.try_reserve(p, qty(3)).await.unwrap();
        draft.add_line(p, qty(3), r.unit_price).unwrap();
        let order = draft.finish(Utc::now()).unwrap();
        scope.persist(&order).await.unwrap();

        assert_eq!(stock_of(&store, p).await, 4);
        assert!(store.get_order(order.id()).await.unwrap().is_none());
        assert!(store.list_orders().await.unwrap().is_empty());

        scope.commit().await.unwrap();

        assert_eq!(stock_of(&store, p).await, 1);
        assert_eq!(store.get_order(order.id()).await.unwrap(), Some(order));
    }

    #[tokio::test]
    async fn abandoned_request_releases_rows_and_discards_reservations() {
        let (store, assembler) = setup();
        let customer = add_customer(&store).await;
        let p1 = add_product(&store, 100, 5).await;
        let p2 = add_product(&store, 100, 5).await;

        // Another scope holds p2, so the request stalls after reserving p1.
        let mut blocker = store.begin().await.unwrap();
        blocker.try_reserve(p2, qty(1)).await.unwrap();

        let stalled = tokio::time::timeout(
            Duration::from_millis(100),
            assembler.create_order(order_for(customer, &[(p1, 2), (p2, 1)])),
        )
        .await;
        assert!(stalled.is_err(), "request should still be waiting on p2");

        blocker.rollback().await.unwrap();

        assert_eq!(stock_of(&store, p1).await, 5);
        assert_eq!(stock_of(&store, p2).await, 5);
        let order = tokio::time::timeout(
            Duration::from_secs(1),
            assembler.create_order(order_for(customer, &[(p1, 5)])),
        )
        .await
        .expect("p1 row lock must have been released")
        .unwrap();
        assert_eq!(order.total(), money(500));
    }

    #[tokio::test]
    async fn dropped_scope_discards_reservations() {
        let store = InMemoryStore::new();
        let p = add_product(&store, 100, 2).await;

        {
            let mut scope = store.begin().await.unwrap();
            scope.try_reserve(p, qty(2)).await.unwrap();
        }

        let mut scope = store.begin().await.unwrap();
        assert!(scope.try_reserve(p, qty(2)).await.is_ok());
        scope.commit().await.unwrap();
        assert_eq!(stock_of(&store, p).await, 0);
    }

    #[tokio::test]
    async fn row_lock_timeout_is_a_transient_persistence_failure() {
        let (store, assembler) = setup_with(InMemoryStore::with_lock_timeout(Duration::from_millis(50)));
        let customer = add_customer(&store).await;
        let p = add_product(&store, 100, 5).await;

        let mut blocker = store.begin().await.unwrap();
        blocker.try_reserve(p, qty(1)).await.unwrap();

        let err = assembler.create_order(order_for(customer, &[(p, 1)])).await.unwrap_err();
        assert!(matches!(err, OrderError::PersistenceFailure { transient: true, .. }));

        blocker.rollback().await.unwrap();
        assert_eq!(stock_of(&store, p).await, 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn opposite_line_order_never_hangs_or_leaks_stock() {
        let (store, assembler) = setup_with(InMemoryStore::with_lock_timeout(Duration::from_millis(100)));
        let customer = add_customer(&store).await;
        let a = add_product(&store, 100, 10).await;
        let b = add_product(&store, 100, 10).await;

        let mut handles = Vec::new();
        for i in 0..8 {
            let assembler = assembler.clone();
            let lines = if i % 2 == 0 { [(a, 1), (b, 1)] } else { [(b, 1), (a, 1)] };
            handles.push(tokio::spawn(async move {
                assembler.create_order(order_for(customer, &lines)).await
            }));
        }

        let mut committed = 0;
        for h in handles {
            match tokio::time::timeout(Duration::from_secs(5), h).await.unwrap().unwrap() {
                Ok(_) => committed += 1,
                Err(err) => assert!(err.is_transient(), "unexpected error: {err}"),
            }
        }

        assert_eq!(stock_of(&store, a).await, 10 - committed);
        assert_eq!(stock_of(&store, b).await, 10 - committed);
        assert_eq!(assembler.list_orders().await.unwrap().len() as i64, committed);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Referential integrity of catalog deletes
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn referenced_records_cannot_be_deleted() {
        let (store, assembler) = setup();
        let customer = add_customer(&store).await;
        let sold = add_product(&store, 100, 5).await;
        let unsold = add_product(&store, 100, 5).await;

        assembler.create_order(order_for(customer, &[(sold, 1)])).await.unwrap();

        assert!(matches!(
            store.delete_product(sold).await,
            Err(StoreError::Domain(DomainError::Conflict(_)))
        ));
        assert!(matches!(
            store.delete_customer(customer).await,
            Err(StoreError::Domain(DomainError::Conflict(_)))
        ));
        store.delete_product(unsold).await.unwrap();
        assert!(store.get_product(unsold).await.unwrap().is_none());
    }

    // ─────────────────────────────────────────────────────────────────────
    // Property: concurrent batches never oversell
    // ─────────────────────────────────────────────────────────────────────

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 48,
                ..ProptestConfig::default()
            })]

            /// Property: committed quantities never exceed initial stock, and the
            /// final stock is exactly initial minus what was committed.
            #[test]
            fn concurrent_orders_never_oversell(
                initial in 0i64..20,
                requests in prop::collection::vec(1i64..6, 1..12)
            ) {
                let rt = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(4)
                    .enable_all()
                    .build()
                    .unwrap();

                let (committed, final_stock, orders) = rt.block_on(async {
                    let (store, assembler) = setup();
                    let customer = add_customer(&store).await;
                    let p = add_product(&store, 250, initial).await;

                    let handles: Vec<_> = requests
                        .iter()
                        .map(|&n| {
                            let assembler = assembler.clone();
                            tokio::spawn(async move {
                                assembler.create_order(order_for(customer, &[(p, n)])).await
                            })
                        })
                        .collect();

                    let mut committed = 0i64;
                    for h in handles {
                        match h.await.unwrap() {
                            Ok(order) => committed += order.quantity_of(p),
                            Err(OrderError::InsufficientStock { .. }) => {}
                            Err(other) => panic!("unexpected error: {other}"),
                        }
                    }
                    let orders = assembler.list_orders().await.unwrap();
                    (committed, stock_of(&store, p).await, orders)
                });

                prop_assert!(committed <= initial);
                prop_assert!(final_stock >= 0);
                prop_assert_eq!(final_stock, initial - committed);
                for order in &orders {
                    let expected: i64 = order
                        .lines()
                        .iter()
                        .map(|l| l.quantity.get() * l.unit_price.cents())
                        .sum();
                    prop_assert_eq!(order.total().cents(), expected);
                }
            }
        }
    }
}
