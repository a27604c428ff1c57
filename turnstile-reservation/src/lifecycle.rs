//! Pure guards for the registration state machine:
//! `NEW -> {UNPAID, PENDING} -> {PAID | FAILED_NO_QUOTA}`, with cancellation
//! reachable from every state except PAID.

use turnstile_core::{Event, PaymentStatus, Registration, RsvpStatus, TicketType};

use crate::error::ValidationError;

/// RSVP answer accepted by Register.
pub fn rsvp_for_registration(raw: &str) -> Result<RsvpStatus, ValidationError> {
    raw.parse::<RsvpStatus>()
        .ok()
        .filter(RsvpStatus::allowed_at_registration)
        .ok_or_else(|| ValidationError::InvalidRsvpStatus(raw.to_string()))
}

/// RSVP answer accepted by UpdateRSVPStatus; the full vocabulary applies.
pub fn rsvp_for_update(raw: &str) -> Result<RsvpStatus, ValidationError> {
    raw.parse::<RsvpStatus>()
        .map_err(|_| ValidationError::InvalidRsvpStatus(raw.to_string()))
}

pub fn initial_payment_status(event: &Event) -> PaymentStatus {
    if event.is_paid {
        PaymentStatus::Pending
    } else {
        PaymentStatus::Unpaid
    }
}

/// Optimistic pre-check at registration time. Reserves nothing.
pub fn check_ticket_type(ticket_type: &TicketType, event_id: i64) -> Result<(), ValidationError> {
    if ticket_type.event_id != event_id {
        return Err(ValidationError::TicketTypeMismatch {
            ticket_type_id: ticket_type.id,
            event_id,
        });
    }
    if !ticket_type.has_quota() {
        return Err(ValidationError::SoldOut(ticket_type.id));
    }
    if !ticket_type.available {
        return Err(ValidationError::Unavailable(ticket_type.id));
    }
    Ok(())
}

pub fn transition(registration: &mut Registration, to: PaymentStatus) -> Result<(), ValidationError> {
    if !registration.payment_status.can_transition_to(to) {
        return Err(ValidationError::InvalidTransition {
            from: registration.payment_status,
            to,
        });
    }
    registration.payment_status = to;
    Ok(())
}

pub fn ensure_cancellable(registration: &Registration) -> Result<(), ValidationError> {
    if registration.payment_status == PaymentStatus::Paid {
        return Err(ValidationError::PaidRegistration);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn registration(status: PaymentStatus) -> Registration {
        Registration {
            id: 1,
            user_id: 5,
            event_id: 9,
            ticket_type_id: Some(3),
            rsvp_status: RsvpStatus::Attending,
            rsvp_at: None,
            payment_status: status,
            ticket_code: None,
        }
    }

    fn ticket_type(quota: i32, available: bool) -> TicketType {
        TicketType {
            id: 3,
            event_id: 9,
            label: "VIP".into(),
            price: 150_000,
            quota,
            available,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_registration_rejects_update_only_answers() {
        assert_eq!(rsvp_for_registration("maybe").unwrap(), RsvpStatus::Maybe);
        assert_eq!(
            rsvp_for_registration("going").unwrap_err(),
            ValidationError::InvalidRsvpStatus("going".into())
        );
        assert_eq!(rsvp_for_update("going").unwrap(), RsvpStatus::Going);
        assert!(rsvp_for_update("definitely").is_err());
    }

    #[test]
    fn test_ticket_type_pre_check_order() {
        assert_eq!(
            check_ticket_type(&ticket_type(5, true), 10).unwrap_err(),
            ValidationError::TicketTypeMismatch { ticket_type_id: 3, event_id: 10 }
        );
        assert_eq!(
            check_ticket_type(&ticket_type(0, true), 9).unwrap_err(),
            ValidationError::SoldOut(3)
        );
        assert_eq!(
            check_ticket_type(&ticket_type(5, false), 9).unwrap_err(),
            ValidationError::Unavailable(3)
        );
        check_ticket_type(&ticket_type(1, true), 9).unwrap();
    }

    #[test]
    fn test_forward_path_only() {
        let mut pending = registration(PaymentStatus::Pending);
        transition(&mut pending, PaymentStatus::Paid).unwrap();
        assert_eq!(pending.payment_status, PaymentStatus::Paid);

        let mut paid = registration(PaymentStatus::Paid);
        assert!(transition(&mut paid, PaymentStatus::Pending).is_err());

        let mut failed = registration(PaymentStatus::FailedNoQuota);
        assert!(transition(&mut failed, PaymentStatus::Paid).is_err());

        let mut free = registration(PaymentStatus::Unpaid);
        assert!(transition(&mut free, PaymentStatus::Paid).is_err());
    }

    #[test]
    fn test_paid_registrations_are_not_cancellable() {
        assert!(ensure_cancellable(&registration(PaymentStatus::Paid)).is_err());
        ensure_cancellable(&registration(PaymentStatus::Pending)).unwrap();
        ensure_cancellable(&registration(PaymentStatus::FailedNoQuota)).unwrap();
    }
}
