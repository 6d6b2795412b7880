//! Atomic unit-of-work wrapper around a fulfillment store scope.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::store::{FulfillmentStore, OrderScope, StoreError};

/// Runs a unit of work inside one store scope, all or nothing.
///
/// The work receives the scope by mutable reference and may reserve stock and
/// persist an order through it. `Ok` commits, `Err` rolls back. If the
/// returned future is dropped before completion the scope is dropped with it,
/// which discards every reservation made so far.
pub struct TransactionCoordinator<S> {
    store: Arc<S>,
}

impl<S> Clone for TransactionCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S> TransactionCoordinator<S>
where
    S: FulfillmentStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub async fn run_atomic<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut S::Scope) -> BoxFuture<'c, Result<T, E>> + Send,
        E: From<StoreError> + std::fmt::Display + Send,
        T: Send,
    {
        let mut scope = self.store.begin().await?;

        match work(&mut scope).await {
            Ok(value) => {
                if let Err(err) = scope.commit().await {
                    tracing::warn!(error = %err, "commit failed; scope rolled back");
                    return Err(err.into());
                }
                Ok(value)
            }
            Err(err) => {
                tracing::debug!(error = %err, "unit of work failed; rolling back");
                if let Err(rollback_err) = scope.rollback().await {
                    // The scope is gone either way; the backend discards it.
                    tracing::warn!(error = %rollback_err, "rollback reported an error");
                }
                Err(err)
            }
        }
    }
}
