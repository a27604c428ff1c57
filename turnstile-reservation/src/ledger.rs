use std::sync::Arc;
use turnstile_core::repository::TransactionStore;
use turnstile_core::{StoreError, Transaction};

use crate::error::{ReservationError, ReservationResult, ValidationError};

/// Read side of the transaction audit trail, plus the administrative
/// delete-if-pending path.
#[derive(Clone)]
pub struct PaymentLedger {
    transactions: Arc<dyn TransactionStore>,
}

impl PaymentLedger {
    pub fn new(transactions: Arc<dyn TransactionStore>) -> Self {
        Self { transactions }
    }

    pub async fn list_for_user(&self, user_id: i64) -> ReservationResult<Vec<Transaction>> {
        Ok(self.transactions.list_by_user(user_id).await?)
    }

    pub async fn list_for_event(&self, user_id: i64, event_id: i64) -> ReservationResult<Vec<Transaction>> {
        Ok(self.transactions.list_by_event(user_id, event_id).await?)
    }

    pub async fn find(&self, order_id: &str) -> ReservationResult<Transaction> {
        self.transactions
            .find_by_order_id(order_id)
            .await?
            .ok_or_else(|| ReservationError::NotFound(format!("transaction {}", order_id)))
    }

    pub async fn delete_pending(&self, id: i64, user_id: i64) -> ReservationResult<()> {
        match self.transactions.delete_pending(id, user_id).await {
            Ok(()) => {
                tracing::info!(transaction_id = id, user_id, "Pending transaction deleted");
                Ok(())
            }
            Err(StoreError::NotPending { .. }) => Err(ValidationError::TransactionNotPending(id).into()),
            Err(other) => Err(other.into()),
        }
    }
}
