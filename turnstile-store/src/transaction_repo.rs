use async_trait::async_trait;
use sqlx::PgPool;
use turnstile_core::repository::TransactionStore;
use turnstile_core::{NewTransaction, StoreError, StoreResult, Transaction, TransactionStatus};

use crate::errors::{classify, classify_insert};
use crate::rows::{self, TransactionRow, TRANSACTION_COLUMNS};

pub struct PgTransactionRepository {
    pool: PgPool,
}

impl PgTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_by(&self, filter: &str, key: &str) -> StoreResult<Option<Transaction>> {
        let sql = format!("SELECT {} FROM transactions WHERE {}", TRANSACTION_COLUMNS, filter);
        let row = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;

        row.map(Transaction::try_from).transpose()
    }
}

#[async_trait]
impl TransactionStore for PgTransactionRepository {
    async fn create(&self, transaction: NewTransaction) -> StoreResult<Transaction> {
        let sql = format!(
            r#"
            INSERT INTO transactions (user_id, event_id, registration_id, amount, order_id, status, items, notes)
            VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7)
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        );

        let row = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(transaction.user_id)
            .bind(transaction.event_id)
            .bind(transaction.registration_id)
            .bind(transaction.amount)
            .bind(&transaction.order_id)
            .bind(&transaction.items)
            .bind(transaction.notes.as_deref())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| classify_insert("transaction", transaction.order_id.clone(), e))?;

        Transaction::try_from(row)
    }

    async fn find_by_order_id(&self, order_id: &str) -> StoreResult<Option<Transaction>> {
        self.fetch_one_by("order_id = $1", order_id).await
    }

    async fn find_active_for_registration(
        &self,
        registration_id: i64,
    ) -> StoreResult<Option<Transaction>> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE registration_id = $1 AND status = 'pending' ORDER BY id DESC LIMIT 1",
            TRANSACTION_COLUMNS
        );
        let row = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(registration_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;

        row.map(Transaction::try_from).transpose()
    }

    async fn set_redirect_url(&self, order_id: &str, redirect_url: &str) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE transactions SET redirect_url = $2, updated_at = NOW() WHERE order_id = $1",
        )
        .bind(order_id)
        .bind(redirect_url)
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("transaction", order_id));
        }
        Ok(())
    }

    async fn update_status_if(
        &self,
        order_id: &str,
        expected: TransactionStatus,
        status: TransactionStatus,
        payment_method: Option<&str>,
    ) -> StoreResult<Option<Transaction>> {
        let sql = format!(
            r#"
            UPDATE transactions
            SET status = $2, payment_method = COALESCE($3, payment_method), updated_at = NOW()
            WHERE order_id = $1 AND status = $4
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        );

        let row = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(order_id)
            .bind(status.as_str())
            .bind(payment_method)
            .bind(expected.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;

        if let Some(row) = row {
            return Transaction::try_from(row).map(Some);
        }

        // Zero rows: either the order is unknown or its status moved on.
        match self.find_by_order_id(order_id).await? {
            Some(_) => Ok(None),
            None => Err(StoreError::not_found("transaction", order_id)),
        }
    }

    async fn list_by_user(&self, user_id: i64) -> StoreResult<Vec<Transaction>> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
            TRANSACTION_COLUMNS
        );
        let rows = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;

        rows::transactions(rows)
    }

    async fn list_by_event(&self, user_id: i64, event_id: i64) -> StoreResult<Vec<Transaction>> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE user_id = $1 AND event_id = $2 ORDER BY created_at DESC, id DESC",
            TRANSACTION_COLUMNS
        );
        let rows = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(user_id)
            .bind(event_id)
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;

        rows::transactions(rows)
    }

    async fn delete_pending(&self, id: i64, user_id: i64) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(classify)?;

        let status = sqlx::query_scalar::<_, String>(
            "SELECT status FROM transactions WHERE id = $1 AND user_id = $2 FOR UPDATE",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(classify)?
        .ok_or_else(|| StoreError::not_found("transaction", id))?;

        if status != TransactionStatus::Pending.as_str() {
            return Err(StoreError::NotPending {
                entity: "transaction",
                key: id.to_string(),
                status,
            });
        }

        sqlx::query("DELETE FROM transactions WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(classify)?;

        tx.commit().await.map_err(classify)?;
        Ok(())
    }
}
