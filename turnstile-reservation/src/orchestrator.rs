use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use turnstile_core::models::{generate_order_id, generate_ticket_code};
use turnstile_core::repository::UnitOfWork;
use turnstile_core::{
    ChargeRequest, Event, NewRegistration, NewTransaction, PaymentGateway, PaymentStatus,
    Registration, ReservationStores, StoreError, TicketType, TransactionStatus,
};
use turnstile_shared::ReservationEvent;

use crate::error::{ReservationError, ReservationResult, ValidationError};
use crate::lifecycle;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub user_id: i64,
    pub event_id: i64,
    pub ticket_type_id: Option<i64>,
    pub rsvp_status: String,
}

/// Where the customer goes to pay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentSession {
    pub order_id: String,
    pub amount: i64,
    pub redirect_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Registered {
    pub registration: Registration,
    /// Present for paid events.
    pub payment: Option<PaymentSession>,
}

/// Coordinates inventory, registrations and the payment gateway across the
/// registration -> payment confirmation -> cancellation lifecycle.
///
/// Quota is only consumed in `confirm_payment`, inside one unit of work that
/// holds the ticket-type row lock. Everything before that is an optimistic check.
pub struct ReservationOrchestrator {
    stores: ReservationStores,
    gateway: Arc<dyn PaymentGateway>,
    events: broadcast::Sender<ReservationEvent>,
}

impl ReservationOrchestrator {
    pub fn new(stores: ReservationStores, gateway: Arc<dyn PaymentGateway>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            stores,
            gateway,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReservationEvent> {
        self.events.subscribe()
    }

    pub fn stores(&self) -> &ReservationStores {
        &self.stores
    }

    pub(crate) fn emit(&self, event: ReservationEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub async fn register(&self, request: RegisterRequest) -> ReservationResult<Registered> {
        let RegisterRequest {
            user_id,
            event_id,
            ticket_type_id,
            rsvp_status,
        } = request;

        let rsvp_status = lifecycle::rsvp_for_registration(&rsvp_status)?;

        if self.stores.registrations.find(user_id, event_id).await?.is_some() {
            return Err(ValidationError::AlreadyRegistered { user_id, event_id }.into());
        }

        let event = self.stores.events.find_event(event_id).await?;
        let ticket_type = match ticket_type_id {
            Some(id) => {
                let ticket_type = self.stores.inventory.get_ticket_type(id).await?;
                lifecycle::check_ticket_type(&ticket_type, event_id)?;
                Some(ticket_type)
            }
            None if event.is_paid => return Err(ValidationError::MissingTicketType.into()),
            None => None,
        };

        let payment_status = lifecycle::initial_payment_status(&event);
        let registration = self
            .stores
            .registrations
            .create(NewRegistration {
                user_id,
                event_id,
                ticket_type_id,
                rsvp_status,
                rsvp_at: Utc::now(),
                payment_status,
            })
            .await
            .map_err(|e| match e {
                // Lost a race with a concurrent Register for the same pair.
                StoreError::Duplicate { .. } => {
                    ValidationError::AlreadyRegistered { user_id, event_id }.into()
                }
                other => ReservationError::from(other),
            })?;

        info!(
            user_id,
            event_id,
            registration_id = registration.id,
            payment_status = %registration.payment_status,
            "Registration created"
        );
        self.emit(ReservationEvent::RegistrationCreated {
            user_id,
            event_id,
            ticket_type_id,
            payment_status: registration.payment_status.to_string(),
            at: Utc::now(),
        });

        let ticket_type = match ticket_type {
            Some(ticket_type) if event.is_paid => ticket_type,
            _ => {
                return Ok(Registered {
                    registration,
                    payment: None,
                })
            }
        };

        // The registration stays even if the charge cannot be started; the user
        // retries payment against it instead of losing their place.
        match self.start_charge(&registration, &event, &ticket_type).await {
            Ok(session) => Ok(Registered {
                registration,
                payment: Some(session),
            }),
            Err(source) => Err(ReservationError::PaymentNotStarted {
                registration: Box::new(registration),
                source: Box::new(source),
            }),
        }
    }

    /// Creates the transaction row first, so the order identifier exists before
    /// the gateway ever sees it.
    async fn start_charge(
        &self,
        registration: &Registration,
        event: &Event,
        ticket_type: &TicketType,
    ) -> ReservationResult<PaymentSession> {
        let transaction = self
            .stores
            .transactions
            .create(NewTransaction {
                user_id: registration.user_id,
                event_id: registration.event_id,
                registration_id: Some(registration.id),
                amount: ticket_type.price,
                order_id: generate_order_id(),
                items: format!("{} x1", ticket_type.label),
                notes: Some(event.name.clone()),
            })
            .await?;

        let charge = ChargeRequest {
            order_id: transaction.order_id.clone(),
            amount: transaction.amount,
            description: format!("{} - {}", event.name, ticket_type.label),
            customer: format!("user-{}", registration.user_id),
        };

        let session = match self.gateway.initiate(&charge).await {
            Ok(session) => session,
            Err(err) => {
                self.abandon_charge(registration, &transaction.order_id, &err).await;
                return Err(err.into());
            }
        };

        if let Err(err) = self
            .stores
            .transactions
            .set_redirect_url(&transaction.order_id, &session.redirect_url)
            .await
        {
            // Nobody could find this link again; withdraw the charge.
            if let Err(e) = self.gateway.cancel(&transaction.order_id).await {
                warn!(
                    order_id = %transaction.order_id,
                    error = %e,
                    "Gateway cancel of unrecorded charge failed"
                );
            }
            self.abandon_charge(registration, &transaction.order_id, &err).await;
            return Err(err.into());
        }

        info!(
            user_id = registration.user_id,
            event_id = registration.event_id,
            order_id = %transaction.order_id,
            amount = transaction.amount,
            "Payment initiated"
        );
        self.emit(ReservationEvent::PaymentInitiated {
            user_id: registration.user_id,
            event_id: registration.event_id,
            order_id: transaction.order_id.clone(),
            amount: transaction.amount,
            at: Utc::now(),
        });

        Ok(PaymentSession {
            order_id: transaction.order_id,
            amount: transaction.amount,
            redirect_url: session.redirect_url,
        })
    }

    async fn abandon_charge(
        &self,
        registration: &Registration,
        order_id: &str,
        err: &(dyn std::fmt::Display + Sync),
    ) {
        warn!(
            user_id = registration.user_id,
            event_id = registration.event_id,
            order_id = %order_id,
            error = %err,
            "Payment could not be started"
        );
        self.fail_pending_charge(order_id).await;
        self.emit(ReservationEvent::PaymentInitiationFailed {
            user_id: registration.user_id,
            event_id: registration.event_id,
            order_id: order_id.to_string(),
            reason: err.to_string(),
            at: Utc::now(),
        });
    }

    /// Marks a charge failed unless a gateway notification already moved it on.
    async fn fail_pending_charge(&self, order_id: &str) {
        match self
            .stores
            .transactions
            .update_status_if(order_id, TransactionStatus::Pending, TransactionStatus::Failed, None)
            .await
        {
            Ok(Some(_)) => {}
            Ok(None) => info!(order_id = %order_id, "Charge already left pending, status kept"),
            Err(e) => warn!(order_id = %order_id, error = %e, "Failed to mark charge as failed"),
        }
    }

    /// Consumes one unit of quota for a pending registration. Safe to repeat: an
    /// already-confirmed registration is returned unchanged.
    pub async fn confirm_payment(&self, user_id: i64, event_id: i64) -> ReservationResult<Registration> {
        match self.try_confirm_payment(user_id, event_id).await {
            Err(err) if err.is_retryable() => {
                warn!(user_id, event_id, error = %err, "Confirmation conflicted, retrying once");
                self.try_confirm_payment(user_id, event_id).await
            }
            result => result,
        }
    }

    async fn try_confirm_payment(&self, user_id: i64, event_id: i64) -> ReservationResult<Registration> {
        let registration = self
            .stores
            .registrations
            .find(user_id, event_id)
            .await?
            .ok_or_else(|| registration_not_found(user_id, event_id))?;

        let ticket_type_id = precheck_confirmation(&registration)?;
        let ticket_type_id = match ticket_type_id {
            Some(id) => id,
            None => return Ok(registration),
        };

        let mut unit = self.stores.units.begin().await?;
        let ticket_type = unit.ticket_type_for_update(ticket_type_id).await?;

        // Re-read under the lock; another confirmation may have finished meanwhile.
        let mut registration = unit
            .find_registration(user_id, event_id)
            .await?
            .ok_or_else(|| {
                ReservationError::ConcurrencyConflict(format!(
                    "registration for user {} event {} was deleted during confirmation",
                    user_id, event_id
                ))
            })?;
        if precheck_confirmation(&registration)?.is_none() {
            unit.rollback().await?;
            return Ok(registration);
        }

        if !ticket_type.has_quota() {
            return Err(self.reject_oversell(unit, registration, ticket_type_id).await);
        }
        match unit.decrement_quota(ticket_type_id).await {
            Ok(()) => {}
            Err(StoreError::QuotaExhausted(_)) => {
                return Err(self.reject_oversell(unit, registration, ticket_type_id).await)
            }
            Err(other) => return Err(other.into()),
        }

        lifecycle::transition(&mut registration, PaymentStatus::Paid)?;
        registration.ticket_code = Some(generate_ticket_code());
        registration.rsvp_at = Some(Utc::now());
        unit.update_registration(&registration)
            .await
            .map_err(deleted_is_conflict)?;
        unit.commit().await?;

        info!(
            user_id,
            event_id,
            ticket_type_id,
            remaining_quota = ticket_type.quota - 1,
            "Payment confirmed, ticket issued"
        );
        self.emit(ReservationEvent::PaymentConfirmed {
            user_id,
            event_id,
            ticket_type_id,
            at: Utc::now(),
        });
        Ok(registration)
    }

    /// Moves the registration to `failed_no_quota` inside the same unit of work
    /// and reports the exhaustion. Money may already be captured.
    async fn reject_oversell(
        &self,
        mut unit: Box<dyn UnitOfWork>,
        mut registration: Registration,
        ticket_type_id: i64,
    ) -> ReservationError {
        let user_id = registration.user_id;
        let event_id = registration.event_id;
        let exhausted = ReservationError::InventoryExhausted {
            user_id,
            event_id,
            ticket_type_id,
        };

        if let Err(e) = lifecycle::transition(&mut registration, PaymentStatus::FailedNoQuota) {
            return e.into();
        }
        if let Err(e) = unit.update_registration(&registration).await {
            return deleted_is_conflict(e);
        }
        if let Err(e) = unit.commit().await {
            return e.into();
        }

        error!(
            user_id,
            event_id,
            ticket_type_id,
            registration_id = registration.id,
            "Oversell prevented: payment confirmed after quota ran out, manual reconciliation required"
        );
        self.emit(ReservationEvent::OversellPrevented {
            user_id,
            event_id,
            ticket_type_id,
            at: Utc::now(),
        });
        exhausted
    }

    /// Removes a registration that is not paid. A pending charge is cancelled at
    /// the gateway on a best-effort basis and recorded as failed.
    pub async fn cancel_registration(&self, user_id: i64, event_id: i64) -> ReservationResult<()> {
        let registration = self
            .stores
            .registrations
            .find(user_id, event_id)
            .await?
            .ok_or_else(|| registration_not_found(user_id, event_id))?;
        lifecycle::ensure_cancellable(&registration)?;

        let active = self
            .stores
            .transactions
            .find_active_for_registration(registration.id)
            .await?;

        let mut unit = self.stores.units.begin().await?;
        let locked = unit
            .find_registration(user_id, event_id)
            .await?
            .ok_or_else(|| registration_not_found(user_id, event_id))?;
        lifecycle::ensure_cancellable(&locked)?;
        unit.delete_registration(locked.id).await?;
        unit.commit().await?;

        if let Some(transaction) = active {
            if let Err(e) = self.gateway.cancel(&transaction.order_id).await {
                warn!(
                    order_id = %transaction.order_id,
                    error = %e,
                    "Gateway cancel failed; charge marked failed locally"
                );
            }
            self.fail_pending_charge(&transaction.order_id).await;
        }

        info!(user_id, event_id, "Registration cancelled");
        self.emit(ReservationEvent::RegistrationCancelled {
            user_id,
            event_id,
            at: Utc::now(),
        });
        Ok(())
    }

    pub async fn update_rsvp_status(
        &self,
        user_id: i64,
        event_id: i64,
        rsvp_status: &str,
    ) -> ReservationResult<Registration> {
        let rsvp_status = lifecycle::rsvp_for_update(rsvp_status)?;

        // Locked re-read, so a concurrent confirmation's payment fields survive.
        let mut unit = self.stores.units.begin().await?;
        let mut registration = unit
            .find_registration(user_id, event_id)
            .await?
            .ok_or_else(|| registration_not_found(user_id, event_id))?;

        registration.rsvp_status = rsvp_status;
        registration.rsvp_at = Some(Utc::now());
        unit.update_registration(&registration).await?;
        unit.commit().await?;

        info!(user_id, event_id, rsvp_status = %rsvp_status, "RSVP updated");
        Ok(registration)
    }

    /// Payment link for a pending registration: the open charge if there is one,
    /// otherwise a new charge under a fresh order identifier.
    pub async fn retry_payment(&self, user_id: i64, event_id: i64) -> ReservationResult<PaymentSession> {
        let registration = self.get_registration(user_id, event_id).await?;
        let event = self.stores.events.find_event(event_id).await?;
        if !event.is_paid {
            return Err(ValidationError::PaymentNotRequired(event_id).into());
        }
        if registration.payment_status != PaymentStatus::Pending {
            return Err(ValidationError::InvalidTransition {
                from: registration.payment_status,
                to: PaymentStatus::Paid,
            }
            .into());
        }

        if let Some(transaction) = self
            .stores
            .transactions
            .find_active_for_registration(registration.id)
            .await?
        {
            if let Some(redirect_url) = transaction.redirect_url {
                return Ok(PaymentSession {
                    order_id: transaction.order_id,
                    amount: transaction.amount,
                    redirect_url,
                });
            }
        }

        let ticket_type_id = registration
            .ticket_type_id
            .ok_or(ValidationError::MissingTicketType)?;
        let ticket_type = self.stores.inventory.get_ticket_type(ticket_type_id).await?;
        if !ticket_type.has_quota() {
            return Err(ValidationError::SoldOut(ticket_type_id).into());
        }

        self.start_charge(&registration, &event, &ticket_type).await
    }

    pub async fn get_registration(&self, user_id: i64, event_id: i64) -> ReservationResult<Registration> {
        self.stores
            .registrations
            .find(user_id, event_id)
            .await?
            .ok_or_else(|| registration_not_found(user_id, event_id))
    }

    pub async fn list_attendees(&self, event_id: i64) -> ReservationResult<Vec<Registration>> {
        Ok(self.stores.registrations.list_by_event(event_id).await?)
    }

    pub async fn list_user_registrations(&self, user_id: i64) -> ReservationResult<Vec<Registration>> {
        Ok(self.stores.registrations.list_by_user(user_id).await?)
    }

    pub async fn favorite_category(&self, user_id: i64) -> ReservationResult<Option<String>> {
        Ok(self.stores.registrations.favorite_category(user_id).await?)
    }
}

fn registration_not_found(user_id: i64, event_id: i64) -> ReservationError {
    ReservationError::NotFound(format!("registration for user {} event {}", user_id, event_id))
}

fn deleted_is_conflict(err: StoreError) -> ReservationError {
    if err.is_not_found() {
        ReservationError::ConcurrencyConflict(err.to_string())
    } else {
        err.into()
    }
}

/// `Ok(None)` means already confirmed; `Ok(Some(id))` is the ticket type to lock.
fn precheck_confirmation(registration: &Registration) -> ReservationResult<Option<i64>> {
    if registration.is_confirmed() {
        return Ok(None);
    }
    match registration.payment_status {
        PaymentStatus::FailedNoQuota => Err(ReservationError::InventoryExhausted {
            user_id: registration.user_id,
            event_id: registration.event_id,
            ticket_type_id: registration.ticket_type_id.unwrap_or_default(),
        }),
        PaymentStatus::Pending => registration
            .ticket_type_id
            .map(Some)
            .ok_or_else(|| ValidationError::MissingTicketType.into()),
        from => Err(ValidationError::InvalidTransition {
            from,
            to: PaymentStatus::Paid,
        }
        .into()),
    }
}
