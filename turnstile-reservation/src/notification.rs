use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use turnstile_core::{Registration, Transaction, TransactionStatus};
use turnstile_shared::ReservationEvent;

use crate::error::{ReservationError, ReservationResult, ValidationError};
use crate::orchestrator::ReservationOrchestrator;

/// Asynchronous callback from the payment gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentNotification {
    pub order_id: String,
    pub transaction_status: String,
    #[serde(default)]
    pub payment_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NotificationOutcome {
    /// Transaction status updated; no registration side effects.
    Recorded { transaction: Transaction },
    /// Would have moved a terminal transaction backwards.
    Ignored { transaction: Transaction },
    Confirmed {
        transaction: Transaction,
        registration: Registration,
    },
    /// Money was taken but no ticket could be issued.
    ReconciliationRequired {
        transaction: Transaction,
        reason: String,
    },
}

enum StatusWrite {
    Applied(Transaction),
    /// Would have regressed a terminal status; carries the stored row.
    Ignored(Transaction),
}

/// Pending -> Failed -> Settled is the longest chain of forward moves, so a
/// writer racing other deliveries re-reads at most this many times.
const STATUS_WRITE_ATTEMPTS: usize = 3;

/// Terminal transactions never move backwards; a late capture after a local
/// failure is still recorded.
fn supersedes(current: TransactionStatus, incoming: TransactionStatus) -> bool {
    match current {
        TransactionStatus::Pending => true,
        TransactionStatus::Settled => incoming == TransactionStatus::Settled,
        TransactionStatus::Failed => incoming != TransactionStatus::Pending,
    }
}

impl ReservationOrchestrator {
    /// Records a gateway notification and, for a settlement, confirms the linked
    /// registration. Repeated deliveries are safe: the status update is idempotent
    /// and confirmation does nothing for an already-paid registration.
    pub async fn handle_notification(
        &self,
        notification: &PaymentNotification,
    ) -> ReservationResult<NotificationOutcome> {
        let order_id = notification.order_id.as_str();
        let status = TransactionStatus::from_gateway(&notification.transaction_status)
            .map_err(|_| {
                ValidationError::UnknownGatewayStatus(notification.transaction_status.clone())
            })?;

        let transaction = match self
            .record_gateway_status(order_id, status, notification.payment_type.as_deref())
            .await?
        {
            StatusWrite::Applied(transaction) => transaction,
            StatusWrite::Ignored(current) => {
                return Ok(NotificationOutcome::Ignored { transaction: current })
            }
        };

        info!(order_id = %order_id, status = %status, "Payment notification recorded");
        self.emit(ReservationEvent::NotificationRecorded {
            order_id: order_id.to_string(),
            status: status.to_string(),
            at: Utc::now(),
        });

        if status != TransactionStatus::Settled {
            return Ok(NotificationOutcome::Recorded { transaction });
        }

        if transaction.registration_id.is_none() {
            error!(
                order_id = %order_id,
                user_id = transaction.user_id,
                event_id = transaction.event_id,
                "Settlement for a cancelled registration, manual reconciliation required"
            );
            return Ok(NotificationOutcome::ReconciliationRequired {
                reason: "registration was cancelled before payment settled".to_string(),
                transaction,
            });
        }

        match self
            .confirm_payment(transaction.user_id, transaction.event_id)
            .await
        {
            Ok(registration) => Ok(NotificationOutcome::Confirmed {
                transaction,
                registration,
            }),
            Err(err @ ReservationError::InventoryExhausted { .. }) => {
                Ok(NotificationOutcome::ReconciliationRequired {
                    reason: err.to_string(),
                    transaction,
                })
            }
            Err(ReservationError::NotFound(what)) => {
                warn!(order_id = %order_id, "Settled charge has no registration: {}", what);
                Ok(NotificationOutcome::ReconciliationRequired {
                    reason: format!("{} not found", what),
                    transaction,
                })
            }
            Err(other) => Err(other),
        }
    }

    /// Applies `status` unless it would regress the stored one. The write is a
    /// compare-and-set against the status just read; when a concurrent delivery
    /// got there first the row is re-read and the decision made again.
    async fn record_gateway_status(
        &self,
        order_id: &str,
        status: TransactionStatus,
        payment_method: Option<&str>,
    ) -> ReservationResult<StatusWrite> {
        for _ in 0..STATUS_WRITE_ATTEMPTS {
            let current = self
                .stores()
                .transactions
                .find_by_order_id(order_id)
                .await?
                .ok_or_else(|| ReservationError::NotFound(format!("transaction {}", order_id)))?;

            if !supersedes(current.status, status) {
                info!(
                    order_id = %order_id,
                    current = %current.status,
                    incoming = %status,
                    "Ignoring notification that would regress a terminal transaction"
                );
                return Ok(StatusWrite::Ignored(current));
            }

            if let Some(updated) = self
                .stores()
                .transactions
                .update_status_if(order_id, current.status, status, payment_method)
                .await?
            {
                return Ok(StatusWrite::Applied(updated));
            }
            debug!(order_id = %order_id, "Transaction status changed concurrently, re-reading");
        }

        Err(ReservationError::ConcurrencyConflict(format!(
            "transaction {} kept changing while recording {}",
            order_id, status
        )))
    }
}
