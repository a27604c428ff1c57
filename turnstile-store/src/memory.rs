//! In-process backend with the same locking contract as Postgres.
//!
//! Every ticket type and registration has its own async row lock. A unit of work
//! holds the locks it took until commit or rollback, stages its writes, and applies
//! them in one step on commit. Lock waits are bounded by the configured timeout.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use turnstile_core::repository::{
    EventCatalog, InventoryStore, RegistrationStore, ReservationStores, TransactionStore,
    TransactionalStore, UnitOfWork,
};
use turnstile_core::{
    Event, NewRegistration, NewTransaction, Registration, StoreError, StoreResult, TicketType,
    Transaction, TransactionStatus,
};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RowKey {
    TicketType(i64),
    Registration(i64),
}

impl RowKey {
    fn timeout_error(self) -> StoreError {
        match self {
            RowKey::TicketType(id) => StoreError::LockTimeout(id),
            RowKey::Registration(id) => {
                StoreError::Conflict(format!("timed out waiting for registration {}", id))
            }
        }
    }
}

#[derive(Default)]
struct Tables {
    events: HashMap<i64, Event>,
    ticket_types: HashMap<i64, TicketType>,
    registrations: BTreeMap<i64, Registration>,
    transactions: BTreeMap<i64, Transaction>,
    row_locks: HashMap<RowKey, Arc<Mutex<()>>>,
    next_registration_id: i64,
    next_transaction_id: i64,
}

impl Tables {
    fn row_lock(&mut self, key: RowKey) -> Arc<Mutex<()>> {
        self.row_locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn registration_by_pair(&self, user_id: i64, event_id: i64) -> Option<&Registration> {
        self.registrations
            .values()
            .find(|r| r.user_id == user_id && r.event_id == event_id)
    }

    fn transaction_by_order_id(&mut self, order_id: &str) -> Option<&mut Transaction> {
        self.transactions
            .values_mut()
            .find(|t| t.order_id == order_id)
    }
}

#[derive(Clone)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    lock_timeout: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            lock_timeout,
        }
    }

    /// Bundles this store as every collaborator of the orchestrator.
    pub fn stores(&self) -> ReservationStores {
        let store = Arc::new(self.clone());
        ReservationStores {
            events: store.clone(),
            inventory: store.clone(),
            registrations: store.clone(),
            transactions: store.clone(),
            units: store,
        }
    }

    pub async fn insert_event(&self, event: Event) {
        self.tables.lock().await.events.insert(event.id, event);
    }

    pub async fn insert_ticket_type(&self, ticket_type: TicketType) {
        self.tables
            .lock()
            .await
            .ticket_types
            .insert(ticket_type.id, ticket_type);
    }

    /// Committed quota of a ticket type.
    pub async fn quota(&self, ticket_type_id: i64) -> Option<i32> {
        self.tables
            .lock()
            .await
            .ticket_types
            .get(&ticket_type_id)
            .map(|t| t.quota)
    }

    async fn acquire(&self, key: RowKey) -> StoreResult<OwnedMutexGuard<()>> {
        let lock = self.tables.lock().await.row_lock(key);
        tokio::time::timeout(self.lock_timeout, lock.lock_owned())
            .await
            .map_err(|_| key.timeout_error())
    }
}

#[async_trait]
impl EventCatalog for MemoryStore {
    async fn find_event(&self, id: i64) -> StoreResult<Event> {
        self.tables
            .lock()
            .await
            .events
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("event", id))
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn get_ticket_type(&self, id: i64) -> StoreResult<TicketType> {
        self.tables
            .lock()
            .await
            .ticket_types
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("ticket type", id))
    }

    async fn decrement_quota(&self, id: i64) -> StoreResult<()> {
        let _row = self.acquire(RowKey::TicketType(id)).await?;
        let mut tables = self.tables.lock().await;
        let ticket_type = tables
            .ticket_types
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("ticket type", id))?;

        if ticket_type.quota <= 0 {
            return Err(StoreError::QuotaExhausted(id));
        }
        ticket_type.quota -= 1;
        Ok(())
    }
}

#[async_trait]
impl RegistrationStore for MemoryStore {
    async fn create(&self, registration: NewRegistration) -> StoreResult<Registration> {
        let mut tables = self.tables.lock().await;
        if tables
            .registration_by_pair(registration.user_id, registration.event_id)
            .is_some()
        {
            return Err(StoreError::Duplicate {
                entity: "registration",
                key: format!(
                    "user {} event {}",
                    registration.user_id, registration.event_id
                ),
            });
        }

        tables.next_registration_id += 1;
        let created = Registration {
            id: tables.next_registration_id,
            user_id: registration.user_id,
            event_id: registration.event_id,
            ticket_type_id: registration.ticket_type_id,
            rsvp_status: registration.rsvp_status,
            rsvp_at: Some(registration.rsvp_at),
            payment_status: registration.payment_status,
            ticket_code: None,
        };
        tables.registrations.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find(&self, user_id: i64, event_id: i64) -> StoreResult<Option<Registration>> {
        Ok(self
            .tables
            .lock()
            .await
            .registration_by_pair(user_id, event_id)
            .cloned())
    }

    async fn update(&self, registration: &Registration) -> StoreResult<()> {
        let _row = self.acquire(RowKey::Registration(registration.id)).await?;
        let mut tables = self.tables.lock().await;
        match tables.registrations.get_mut(&registration.id) {
            Some(existing) => {
                *existing = registration.clone();
                Ok(())
            }
            None => Err(StoreError::not_found("registration", registration.id)),
        }
    }

    async fn delete(&self, user_id: i64, event_id: i64) -> StoreResult<()> {
        let not_found =
            || StoreError::not_found("registration", format!("user {} event {}", user_id, event_id));

        let id = {
            let tables = self.tables.lock().await;
            tables
                .registration_by_pair(user_id, event_id)
                .map(|r| r.id)
                .ok_or_else(not_found)?
        };

        let _row = self.acquire(RowKey::Registration(id)).await?;
        let mut tables = self.tables.lock().await;
        if tables.registrations.remove(&id).is_none() {
            return Err(not_found());
        }
        for transaction in tables.transactions.values_mut() {
            if transaction.registration_id == Some(id) {
                transaction.registration_id = None;
            }
        }
        Ok(())
    }

    async fn list_by_event(&self, event_id: i64) -> StoreResult<Vec<Registration>> {
        Ok(self
            .tables
            .lock()
            .await
            .registrations
            .values()
            .filter(|r| r.event_id == event_id)
            .cloned()
            .collect())
    }

    async fn list_by_user(&self, user_id: i64) -> StoreResult<Vec<Registration>> {
        Ok(self
            .tables
            .lock()
            .await
            .registrations
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn favorite_category(&self, user_id: i64) -> StoreResult<Option<String>> {
        let tables = self.tables.lock().await;
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for registration in tables.registrations.values().filter(|r| r.user_id == user_id) {
            if let Some(event) = tables.events.get(&registration.event_id) {
                *counts.entry(event.category.as_str()).or_default() += 1;
            }
        }

        // Highest count wins; ties go to the alphabetically first category.
        let mut best: Option<(&str, usize)> = None;
        for (category, count) in counts {
            if best.map_or(true, |(_, top)| count > top) {
                best = Some((category, count));
            }
        }
        Ok(best.map(|(category, _)| category.to_string()))
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn create(&self, transaction: NewTransaction) -> StoreResult<Transaction> {
        let mut tables = self.tables.lock().await;
        if tables
            .transactions
            .values()
            .any(|t| t.order_id == transaction.order_id)
        {
            return Err(StoreError::Duplicate {
                entity: "transaction",
                key: transaction.order_id,
            });
        }

        tables.next_transaction_id += 1;
        let now = Utc::now();
        let created = Transaction {
            id: tables.next_transaction_id,
            user_id: transaction.user_id,
            event_id: transaction.event_id,
            registration_id: transaction.registration_id,
            amount: transaction.amount,
            order_id: transaction.order_id,
            status: TransactionStatus::Pending,
            payment_method: None,
            redirect_url: None,
            items: transaction.items,
            notes: transaction.notes,
            created_at: now,
            updated_at: now,
        };
        tables.transactions.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_order_id(&self, order_id: &str) -> StoreResult<Option<Transaction>> {
        Ok(self
            .tables
            .lock()
            .await
            .transaction_by_order_id(order_id)
            .map(|t| t.clone()))
    }

    async fn find_active_for_registration(
        &self,
        registration_id: i64,
    ) -> StoreResult<Option<Transaction>> {
        Ok(self
            .tables
            .lock()
            .await
            .transactions
            .values()
            .rev()
            .find(|t| {
                t.registration_id == Some(registration_id)
                    && t.status == TransactionStatus::Pending
            })
            .cloned())
    }

    async fn set_redirect_url(&self, order_id: &str, redirect_url: &str) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        let transaction = tables
            .transaction_by_order_id(order_id)
            .ok_or_else(|| StoreError::not_found("transaction", order_id))?;
        transaction.redirect_url = Some(redirect_url.to_string());
        transaction.updated_at = Utc::now();
        Ok(())
    }

    async fn update_status_if(
        &self,
        order_id: &str,
        expected: TransactionStatus,
        status: TransactionStatus,
        payment_method: Option<&str>,
    ) -> StoreResult<Option<Transaction>> {
        let mut tables = self.tables.lock().await;
        let transaction = tables
            .transaction_by_order_id(order_id)
            .ok_or_else(|| StoreError::not_found("transaction", order_id))?;

        if transaction.status != expected {
            return Ok(None);
        }
        transaction.status = status;
        if let Some(method) = payment_method {
            transaction.payment_method = Some(method.to_string());
        }
        transaction.updated_at = Utc::now();
        Ok(Some(transaction.clone()))
    }

    async fn list_by_user(&self, user_id: i64) -> StoreResult<Vec<Transaction>> {
        Ok(self
            .tables
            .lock()
            .await
            .transactions
            .values()
            .rev()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_by_event(&self, user_id: i64, event_id: i64) -> StoreResult<Vec<Transaction>> {
        Ok(self
            .tables
            .lock()
            .await
            .transactions
            .values()
            .rev()
            .filter(|t| t.user_id == user_id && t.event_id == event_id)
            .cloned()
            .collect())
    }

    async fn delete_pending(&self, id: i64, user_id: i64) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        let status = tables
            .transactions
            .get(&id)
            .filter(|t| t.user_id == user_id)
            .map(|t| t.status)
            .ok_or_else(|| StoreError::not_found("transaction", id))?;

        if status != TransactionStatus::Pending {
            return Err(StoreError::NotPending {
                entity: "transaction",
                key: id.to_string(),
                status: status.to_string(),
            });
        }
        tables.transactions.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl TransactionalStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        Ok(Box::new(MemoryUnitOfWork {
            store: self.clone(),
            held: HashMap::new(),
            decrements: HashMap::new(),
            updates: HashMap::new(),
            deletes: HashSet::new(),
        }))
    }
}

/// Staged writes plus the row locks taken so far. Dropping it releases the locks
/// and discards the writes.
pub struct MemoryUnitOfWork {
    store: MemoryStore,
    held: HashMap<RowKey, OwnedMutexGuard<()>>,
    decrements: HashMap<i64, i32>,
    updates: HashMap<i64, Registration>,
    deletes: HashSet<i64>,
}

impl MemoryUnitOfWork {
    async fn lock_row(&mut self, key: RowKey) -> StoreResult<()> {
        if !self.held.contains_key(&key) {
            let guard = self.store.acquire(key).await?;
            self.held.insert(key, guard);
        }
        Ok(())
    }

    fn staged_decrements(&self, id: i64) -> i32 {
        self.decrements.get(&id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn ticket_type_for_update(&mut self, id: i64) -> StoreResult<TicketType> {
        self.lock_row(RowKey::TicketType(id)).await?;
        let mut ticket_type = self.store.get_ticket_type(id).await?;
        ticket_type.quota -= self.staged_decrements(id);
        Ok(ticket_type)
    }

    async fn decrement_quota(&mut self, id: i64) -> StoreResult<()> {
        self.lock_row(RowKey::TicketType(id)).await?;
        let committed = self.store.get_ticket_type(id).await?.quota;
        if committed - self.staged_decrements(id) <= 0 {
            return Err(StoreError::QuotaExhausted(id));
        }
        *self.decrements.entry(id).or_default() += 1;
        Ok(())
    }

    async fn find_registration(
        &mut self,
        user_id: i64,
        event_id: i64,
    ) -> StoreResult<Option<Registration>> {
        let id = match self.store.find(user_id, event_id).await? {
            Some(registration) => registration.id,
            None => return Ok(None),
        };

        self.lock_row(RowKey::Registration(id)).await?;
        if self.deletes.contains(&id) {
            return Ok(None);
        }
        if let Some(staged) = self.updates.get(&id) {
            return Ok(Some(staged.clone()));
        }
        // Re-read under the lock; the row may have changed or gone while we waited.
        Ok(self
            .store
            .tables
            .lock()
            .await
            .registrations
            .get(&id)
            .cloned())
    }

    async fn update_registration(&mut self, registration: &Registration) -> StoreResult<()> {
        self.lock_row(RowKey::Registration(registration.id)).await?;
        let exists = self
            .store
            .tables
            .lock()
            .await
            .registrations
            .contains_key(&registration.id);
        if !exists || self.deletes.contains(&registration.id) {
            return Err(StoreError::not_found("registration", registration.id));
        }
        self.updates.insert(registration.id, registration.clone());
        Ok(())
    }

    async fn delete_registration(&mut self, id: i64) -> StoreResult<()> {
        self.lock_row(RowKey::Registration(id)).await?;
        let exists = self.store.tables.lock().await.registrations.contains_key(&id);
        if !exists || !self.deletes.insert(id) {
            return Err(StoreError::not_found("registration", id));
        }
        self.updates.remove(&id);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let mut tables = self.store.tables.lock().await;

        for id in self.updates.keys().chain(self.deletes.iter()) {
            if !tables.registrations.contains_key(id) {
                return Err(StoreError::not_found("registration", *id));
            }
        }
        for (id, count) in &self.decrements {
            match tables.ticket_types.get(id) {
                Some(ticket_type) if ticket_type.quota >= *count => {}
                Some(_) => return Err(StoreError::QuotaExhausted(*id)),
                None => return Err(StoreError::not_found("ticket type", *id)),
            }
        }

        for (id, count) in &self.decrements {
            if let Some(ticket_type) = tables.ticket_types.get_mut(id) {
                ticket_type.quota -= count;
            }
        }
        for (id, registration) in &self.updates {
            tables.registrations.insert(*id, registration.clone());
        }
        for id in &self.deletes {
            tables.registrations.remove(id);
            for transaction in tables.transactions.values_mut() {
                if transaction.registration_id == Some(*id) {
                    transaction.registration_id = None;
                }
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turnstile_core::{PaymentStatus, RsvpStatus};

    async fn seeded(quota: i32) -> MemoryStore {
        let store = MemoryStore::with_lock_timeout(Duration::from_millis(100));
        store
            .insert_event(Event {
                id: 1,
                name: "Rust Meetup".into(),
                category: "tech".into(),
                is_paid: true,
            })
            .await;
        store
            .insert_ticket_type(TicketType {
                id: 10,
                event_id: 1,
                label: "General".into(),
                price: 50_000,
                quota,
                available: true,
                created_at: Utc::now(),
            })
            .await;
        store
    }

    fn pending(user_id: i64) -> NewRegistration {
        NewRegistration {
            user_id,
            event_id: 1,
            ticket_type_id: Some(10),
            rsvp_status: RsvpStatus::Attending,
            rsvp_at: Utc::now(),
            payment_status: PaymentStatus::Pending,
        }
    }

    #[tokio::test]
    async fn test_decrement_stops_at_zero() {
        let store = seeded(1).await;

        InventoryStore::decrement_quota(&store, 10).await.unwrap();
        let err = InventoryStore::decrement_quota(&store, 10).await.unwrap_err();

        assert_eq!(err, StoreError::QuotaExhausted(10));
        assert_eq!(store.quota(10).await, Some(0));
    }

    #[tokio::test]
    async fn test_decrement_unknown_ticket_type() {
        let store = seeded(1).await;
        let err = InventoryStore::decrement_quota(&store, 99).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let store = seeded(5).await;
        RegistrationStore::create(&store, pending(7)).await.unwrap();

        let err = RegistrationStore::create(&store, pending(7)).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn test_dropped_unit_of_work_discards_writes() {
        let store = seeded(3).await;
        RegistrationStore::create(&store, pending(7)).await.unwrap();

        {
            let mut unit = store.begin().await.unwrap();
            unit.ticket_type_for_update(10).await.unwrap();
            unit.decrement_quota(10).await.unwrap();
            let mut registration = unit.find_registration(7, 1).await.unwrap().unwrap();
            registration.payment_status = PaymentStatus::Paid;
            unit.update_registration(&registration).await.unwrap();
        }

        assert_eq!(store.quota(10).await, Some(3));
        let registration = store.find(7, 1).await.unwrap().unwrap();
        assert_eq!(registration.payment_status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn test_commit_applies_staged_writes() {
        let store = seeded(3).await;
        RegistrationStore::create(&store, pending(7)).await.unwrap();

        let mut unit = store.begin().await.unwrap();
        let locked = unit.ticket_type_for_update(10).await.unwrap();
        assert_eq!(locked.quota, 3);
        unit.decrement_quota(10).await.unwrap();
        assert_eq!(unit.ticket_type_for_update(10).await.unwrap().quota, 2);

        let mut registration = unit.find_registration(7, 1).await.unwrap().unwrap();
        registration.payment_status = PaymentStatus::Paid;
        unit.update_registration(&registration).await.unwrap();
        unit.commit().await.unwrap();

        assert_eq!(store.quota(10).await, Some(2));
        let registration = store.find(7, 1).await.unwrap().unwrap();
        assert_eq!(registration.payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn test_delete_is_staged_until_commit() {
        let store = seeded(3).await;
        let registration = RegistrationStore::create(&store, pending(7)).await.unwrap();

        let mut unit = store.begin().await.unwrap();
        unit.delete_registration(registration.id).await.unwrap();
        assert!(unit.find_registration(7, 1).await.unwrap().is_none());
        assert!(store.find(7, 1).await.unwrap().is_some());

        unit.commit().await.unwrap();
        assert!(store.find(7, 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_locker_times_out() {
        let store = seeded(3).await;

        let mut first = store.begin().await.unwrap();
        first.ticket_type_for_update(10).await.unwrap();

        let mut second = store.begin().await.unwrap();
        let err = second.ticket_type_for_update(10).await.unwrap_err();
        assert_eq!(err, StoreError::LockTimeout(10));

        first.rollback().await.unwrap();
        second.ticket_type_for_update(10).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_fails_when_registration_deleted() {
        let store = seeded(3).await;
        let registration = RegistrationStore::create(&store, pending(7)).await.unwrap();

        let mut unit = store.begin().await.unwrap();
        unit.decrement_quota(10).await.unwrap();
        RegistrationStore::delete(&store, 7, 1).await.unwrap();

        let err = unit.update_registration(&registration).await.unwrap_err();
        assert!(err.is_not_found());
        drop(unit);

        assert_eq!(store.quota(10).await, Some(3));
    }

    #[tokio::test]
    async fn test_delete_unlinks_transactions() {
        let store = seeded(3).await;
        let registration = RegistrationStore::create(&store, pending(7)).await.unwrap();
        TransactionStore::create(
            &store,
            NewTransaction {
                user_id: 7,
                event_id: 1,
                registration_id: Some(registration.id),
                amount: 50_000,
                order_id: "order-1".into(),
                items: "General".into(),
                notes: None,
            },
        )
        .await
        .unwrap();

        RegistrationStore::delete(&store, 7, 1).await.unwrap();

        let transaction = store.find_by_order_id("order-1").await.unwrap().unwrap();
        assert_eq!(transaction.registration_id, None);
    }

    #[tokio::test]
    async fn test_favorite_category_breaks_ties_alphabetically() {
        let store = seeded(3).await;
        store
            .insert_event(Event {
                id: 2,
                name: "Jazz Night".into(),
                category: "music".into(),
                is_paid: false,
            })
            .await;
        store
            .insert_event(Event {
                id: 3,
                name: "Art Walk".into(),
                category: "art".into(),
                is_paid: false,
            })
            .await;

        for event_id in [1, 2, 3] {
            let mut registration = pending(7);
            registration.event_id = event_id;
            registration.ticket_type_id = None;
            RegistrationStore::create(&store, registration).await.unwrap();
        }

        assert_eq!(
            store.favorite_category(7).await.unwrap().as_deref(),
            Some("art")
        );
        assert_eq!(store.favorite_category(8).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_pending_rejects_settled() {
        let store = seeded(3).await;
        let transaction = TransactionStore::create(
            &store,
            NewTransaction {
                user_id: 7,
                event_id: 1,
                registration_id: None,
                amount: 50_000,
                order_id: "order-2".into(),
                items: "General".into(),
                notes: None,
            },
        )
        .await
        .unwrap();
        store
            .update_status_if(
                "order-2",
                TransactionStatus::Pending,
                TransactionStatus::Settled,
                Some("gopay"),
            )
            .await
            .unwrap()
            .unwrap();

        let err = store.delete_pending(transaction.id, 7).await.unwrap_err();
        assert!(matches!(err, StoreError::NotPending { .. }));

        let err = store.delete_pending(transaction.id, 8).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_status_update_skips_when_status_moved_on() {
        let store = seeded(3).await;
        TransactionStore::create(
            &store,
            NewTransaction {
                user_id: 7,
                event_id: 1,
                registration_id: None,
                amount: 50_000,
                order_id: "order-3".into(),
                items: "General".into(),
                notes: None,
            },
        )
        .await
        .unwrap();

        let settled = store
            .update_status_if("order-3", TransactionStatus::Pending, TransactionStatus::Settled, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(settled.status, TransactionStatus::Settled);

        // A writer that read `pending` before the settlement must not overwrite it.
        let stale = store
            .update_status_if("order-3", TransactionStatus::Pending, TransactionStatus::Pending, Some("qris"))
            .await
            .unwrap();
        assert!(stale.is_none());

        let current = store.find_by_order_id("order-3").await.unwrap().unwrap();
        assert_eq!(current.status, TransactionStatus::Settled);
        assert_eq!(current.payment_method, None);

        let err = store
            .update_status_if("order-404", TransactionStatus::Pending, TransactionStatus::Settled, None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
