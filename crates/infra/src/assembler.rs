//! Order assembly: validate a request, reserve every line inside one atomic
//! scope, price the lines from the reservations, persist.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tracing::{Span, instrument};

use pos_core::OrderId;
use pos_sales::{CreateOrder, Order, OrderDraft, OrderError, OrderPhase};

use crate::coordinator::TransactionCoordinator;
use crate::store::{CatalogLookup, FulfillmentStore, OrderReader, OrderScope};

/// Tracks one creation attempt through its phases and logs each transition.
#[derive(Clone)]
struct PhaseTracker {
    order_id: OrderId,
    current: Arc<Mutex<OrderPhase>>,
}

impl PhaseTracker {
    fn new(order_id: OrderId) -> Self {
        Self {
            order_id,
            current: Arc::new(Mutex::new(OrderPhase::Started)),
        }
    }

    fn current(&self) -> OrderPhase {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn advance(&self, next: OrderPhase) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current.can_transition_to(next) {
            tracing::debug!(order_id = %self.order_id, from = %*current, to = %next, "order phase");
        } else {
            tracing::warn!(order_id = %self.order_id, from = %*current, to = %next, "unexpected order phase transition");
        }
        *current = next;
    }
}

/// Creates orders against the stock ledger and serves order reads.
pub struct OrderAssembler<S> {
    store: Arc<S>,
    coordinator: TransactionCoordinator<S>,
}

impl<S> Clone for OrderAssembler<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            coordinator: self.coordinator.clone(),
        }
    }
}

impl<S> OrderAssembler<S>
where
    S: FulfillmentStore + CatalogLookup + OrderReader + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            coordinator: TransactionCoordinator::new(store.clone()),
            store,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Create an order, all or nothing.
    ///
    /// The customer is checked before any scope is opened. Lines are reserved
    /// in the order given; the first failing line aborts the whole order and
    /// every earlier reservation is rolled back.
    #[instrument(
        skip(self, cmd),
        fields(
            customer_id = %cmd.customer_id,
            line_count = cmd.items.len(),
            order_id = tracing::field::Empty
        )
    )]
    pub async fn create_order(&self, cmd: CreateOrder) -> Result<Order, OrderError> {
        cmd.validate()?;

        let order_id = OrderId::new();
        Span::current().record("order_id", tracing::field::display(order_id));
        let phase = PhaseTracker::new(order_id);

        phase.advance(OrderPhase::ValidatingCustomer);
        match self.store.customer_exists(cmd.customer_id).await {
            Ok(true) => {}
            Ok(false) => {
                phase.advance(OrderPhase::CustomerInvalid);
                tracing::info!("order rejected: customer not found");
                return Err(OrderError::CustomerNotFound(cmd.customer_id));
            }
            Err(err) => {
                phase.advance(OrderPhase::PersistFailed);
                tracing::warn!(error = %err, "customer lookup failed");
                return Err(err.into());
            }
        }

        let CreateOrder { customer_id, items } = cmd;
        let tracker = phase.clone();

        let result = self
            .coordinator
            .run_atomic(move |scope| {
                Box::pin(async move {
                    let mut draft = OrderDraft::new(order_id, customer_id);

                    for line in &items {
                        tracker.advance(OrderPhase::ReservingLines);
                        let reservation = match scope.try_reserve(line.product_id, line.quantity).await {
                            Ok(reservation) => reservation,
                            Err(err) => {
                                tracker.advance(OrderPhase::LineFailed);
                                return Err(OrderError::from(err));
                            }
                        };
                        if let Err(err) = draft.add_line(line.product_id, line.quantity, reservation.unit_price) {
                            tracker.advance(OrderPhase::LineFailed);
                            return Err(err);
                        }
                        tracker.advance(OrderPhase::LineReserved);
                        tracing::debug!(
                            product_id = %line.product_id,
                            quantity = line.quantity.get(),
                            unit_price = reservation.unit_price.cents(),
                            remaining = reservation.remaining,
                            "line reserved"
                        );
                    }

                    tracker.advance(OrderPhase::AllReserved);
                    let order = draft.finish(Utc::now())?;

                    tracker.advance(OrderPhase::Persisting);
                    if let Err(err) = scope.persist(&order).await {
                        tracker.advance(OrderPhase::PersistFailed);
                        return Err(OrderError::from(err));
                    }
                    Ok(order)
                })
            })
            .await;

        match result {
            Ok(order) => {
                phase.advance(OrderPhase::Committed);
                tracing::info!(
                    total = order.total().cents(),
                    lines = order.lines().len(),
                    "order committed"
                );
                Ok(order)
            }
            Err(err) => {
                // A failed commit leaves the tracker in `Persisting`.
                if !phase.current().is_terminal() {
                    phase.advance(OrderPhase::PersistFailed);
                }
                let ended_in = phase.current();
                if ended_in.requires_rollback() {
                    tracing::debug!(phase = %ended_in, "reservations rolled back");
                }
                if err.is_client_error() {
                    tracing::info!(code = err.code(), error = %err, "order rejected");
                } else {
                    tracing::warn!(code = err.code(), error = %err, transient = err.is_transient(), "order failed");
                }
                Err(err)
            }
        }
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    pub async fn get_order(&self, id: OrderId) -> Result<Option<Order>, OrderError> {
        Ok(self.store.get_order(id).await?)
    }

    pub async fn list_orders(&self) -> Result<Vec<Order>, OrderError> {
        Ok(self.store.list_orders().await?)
    }
}
