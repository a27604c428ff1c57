//! Runs against a live database: `DATABASE_URL=postgres://... cargo test -- --ignored`

use chrono::Utc;
use std::time::Duration;
use turnstile_core::models::generate_order_id;
use turnstile_core::{
    NewRegistration, NewTransaction, PaymentStatus, RsvpStatus, StoreError, TransactionStatus,
};
use turnstile_store::DbClient;

async fn connect() -> DbClient {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for Postgres tests");
    let db = DbClient::new(&url, 10, Duration::from_secs(3)).await.unwrap();
    db.migrate().await.unwrap();
    db
}

async fn seed_ticket_type(db: &DbClient, quota: i32) -> (i64, i64) {
    let event_id: i64 = sqlx::query_scalar(
        "INSERT INTO events (name, category, is_paid) VALUES ('Launch', 'tech', TRUE) RETURNING id",
    )
    .fetch_one(&db.pool)
    .await
    .unwrap();

    let ticket_type_id: i64 = sqlx::query_scalar(
        "INSERT INTO ticket_types (event_id, label, price, quota) VALUES ($1, 'GA', 50000, $2) RETURNING id",
    )
    .bind(event_id)
    .bind(quota)
    .fetch_one(&db.pool)
    .await
    .unwrap();

    (event_id, ticket_type_id)
}

#[tokio::test]
#[ignore]
async fn test_decrement_never_goes_negative() {
    let db = connect().await;
    let stores = db.stores(Duration::from_secs(5));
    let (_, ticket_type_id) = seed_ticket_type(&db, 2).await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let inventory = stores.inventory.clone();
        handles.push(tokio::spawn(async move {
            inventory.decrement_quota(ticket_type_id).await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => succeeded += 1,
            Err(err) => assert_eq!(err, StoreError::QuotaExhausted(ticket_type_id)),
        }
    }

    assert_eq!(succeeded, 2);
    assert_eq!(stores.inventory.get_ticket_type(ticket_type_id).await.unwrap().quota, 0);
}

#[tokio::test]
#[ignore]
async fn test_lock_wait_is_bounded() {
    let db = connect().await;
    let stores = db.stores(Duration::from_millis(200));
    let (_, ticket_type_id) = seed_ticket_type(&db, 1).await;

    let mut holder = stores.units.begin().await.unwrap();
    holder.ticket_type_for_update(ticket_type_id).await.unwrap();

    let mut waiter = stores.units.begin().await.unwrap();
    let err = waiter.ticket_type_for_update(ticket_type_id).await.unwrap_err();
    assert_eq!(err, StoreError::LockTimeout(ticket_type_id));

    holder.rollback().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_duplicate_registration_is_classified() {
    let db = connect().await;
    let stores = db.stores(Duration::from_secs(5));
    let (event_id, ticket_type_id) = seed_ticket_type(&db, 1).await;

    let registration = || NewRegistration {
        user_id: 5,
        event_id,
        ticket_type_id: Some(ticket_type_id),
        rsvp_status: RsvpStatus::Pending,
        rsvp_at: Utc::now(),
        payment_status: PaymentStatus::Pending,
    };

    stores.registrations.create(registration()).await.unwrap();
    let err = stores.registrations.create(registration()).await.unwrap_err();
    assert!(matches!(err, StoreError::Duplicate { entity: "registration", .. }));
}

#[tokio::test]
#[ignore]
async fn test_status_write_is_conditional_on_current_status() {
    let db = connect().await;
    let stores = db.stores(Duration::from_secs(5));
    let (event_id, _) = seed_ticket_type(&db, 1).await;

    let transaction = stores
        .transactions
        .create(NewTransaction {
            user_id: 5,
            event_id,
            registration_id: None,
            amount: 50_000,
            order_id: generate_order_id(),
            items: "GA x1".into(),
            notes: None,
        })
        .await
        .unwrap();
    let order_id = transaction.order_id.as_str();

    let settled = stores
        .transactions
        .update_status_if(order_id, TransactionStatus::Pending, TransactionStatus::Settled, Some("qris"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(settled.status, TransactionStatus::Settled);

    // A writer still holding the pending read loses.
    let stale = stores
        .transactions
        .update_status_if(order_id, TransactionStatus::Pending, TransactionStatus::Pending, None)
        .await
        .unwrap();
    assert!(stale.is_none());
    let stored = stores.transactions.find_by_order_id(order_id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Settled);
    assert_eq!(stored.payment_method.as_deref(), Some("qris"));

    let err = stores.transactions.delete_pending(transaction.id, 5).await.unwrap_err();
    assert!(matches!(err, StoreError::NotPending { entity: "transaction", .. }));

    let err = stores
        .transactions
        .update_status_if("ORDER-missing", TransactionStatus::Pending, TransactionStatus::Failed, None)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}
