// db/ledger.rs
//
// Multi-row writes for the task/bid/payment state machine. Every mutation is a
// conditional update against the expected prior state, so a lost race shows up
// as `None` (or zero rows) instead of a silent overwrite.
use async_trait::async_trait;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use super::{db::DBClient, error::StoreError, status_names};
use crate::models::{paymentmodel::*, taskmodel::*};

#[async_trait]
pub trait LedgerTx: Send {
    /// Reads the task and holds its row lock until the transaction ends.
    async fn lock_task(&mut self, task_id: Uuid) -> Result<Option<Task>, StoreError>;

    /// Re-reads the bid under a row lock, so edits by its tasker wait for us.
    async fn lock_bid(&mut self, bid_id: Uuid) -> Result<Option<Bid>, StoreError>;

    /// Claims the payment row until the transaction ends. Gateway calls made
    /// while holding it cannot interleave with another settlement.
    async fn lock_payment(&mut self, payment_id: Uuid) -> Result<Option<Payment>, StoreError>;

    async fn insert_payment(&mut self, payment: NewPayment) -> Result<Payment, StoreError>;

    async fn accept_bid_if_pending(&mut self, bid_id: Uuid) -> Result<Option<Bid>, StoreError>;

    async fn assign_task_if_open(
        &mut self,
        task_id: Uuid,
        tasker_id: Uuid,
        payment_ref: &str,
    ) -> Result<Option<Task>, StoreError>;

    /// Rejects every other pending bid on the task and returns them.
    async fn reject_competing_bids(
        &mut self,
        task_id: Uuid,
        accepted_bid_id: Uuid,
    ) -> Result<Vec<Bid>, StoreError>;

    async fn transition_payment(
        &mut self,
        payment_id: Uuid,
        from: &[PaymentStatus],
        to: PaymentStatus,
        update: PaymentUpdate,
    ) -> Result<Option<Payment>, StoreError>;

    async fn transition_bid(
        &mut self,
        bid_id: Uuid,
        from: BidStatus,
        to: BidStatus,
    ) -> Result<Option<Bid>, StoreError>;

    async fn transition_task(
        &mut self,
        task_id: Uuid,
        from: &[TaskStatus],
        to: TaskStatus,
    ) -> Result<Option<Task>, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait LedgerExt {
    async fn begin_ledger_tx(&self) -> Result<Box<dyn LedgerTx>, StoreError>;
}

/// Dropping a `PgLedgerTx` without calling `commit` rolls it back.
pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerExt for DBClient {
    async fn begin_ledger_tx(&self) -> Result<Box<dyn LedgerTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgLedgerTx { tx }))
    }
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn lock_task(&mut self, task_id: Uuid) -> Result<Option<Task>, StoreError> {
        let task = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1 FOR UPDATE")
            .bind(task_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(task)
    }

    async fn lock_bid(&mut self, bid_id: Uuid) -> Result<Option<Bid>, StoreError> {
        let bid = sqlx::query_as::<_, Bid>("SELECT * FROM bids WHERE id = $1 FOR UPDATE")
            .bind(bid_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(bid)
    }

    async fn lock_payment(&mut self, payment_id: Uuid) -> Result<Option<Payment>, StoreError> {
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1 FOR UPDATE")
            .bind(payment_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(payment)
    }

    async fn insert_payment(&mut self, payment: NewPayment) -> Result<Payment, StoreError> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments
            (task_id, bid_id, poster_id, tasker_id, amount, platform_fee, tasker_amount,
             currency, external_intent_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(payment.task_id)
        .bind(payment.bid_id)
        .bind(payment.poster_id)
        .bind(payment.tasker_id)
        .bind(payment.amount)
        .bind(payment.platform_fee)
        .bind(payment.tasker_amount)
        .bind(payment.currency)
        .bind(payment.external_intent_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(payment)
    }

    async fn accept_bid_if_pending(&mut self, bid_id: Uuid) -> Result<Option<Bid>, StoreError> {
        let bid = sqlx::query_as::<_, Bid>(
            r#"
            UPDATE bids SET status = 'accepted'::bid_status, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'::bid_status
            RETURNING *
            "#,
        )
        .bind(bid_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(bid)
    }

    async fn assign_task_if_open(
        &mut self,
        task_id: Uuid,
        tasker_id: Uuid,
        payment_ref: &str,
    ) -> Result<Option<Task>, StoreError> {
        let task = sqlx::query_as::<_, Task>(
            r#"
            UPDATE tasks
            SET status = 'in_progress'::task_status, assigned_tasker_id = $2,
                payment_ref = $3, updated_at = NOW()
            WHERE id = $1 AND status = 'open'::task_status
            RETURNING *
            "#,
        )
        .bind(task_id)
        .bind(tasker_id)
        .bind(payment_ref)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(task)
    }

    async fn reject_competing_bids(
        &mut self,
        task_id: Uuid,
        accepted_bid_id: Uuid,
    ) -> Result<Vec<Bid>, StoreError> {
        let rejected = sqlx::query_as::<_, Bid>(
            r#"
            UPDATE bids SET status = 'rejected'::bid_status, updated_at = NOW()
            WHERE task_id = $1 AND id <> $2 AND status = 'pending'::bid_status
            RETURNING *
            "#,
        )
        .bind(task_id)
        .bind(accepted_bid_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rejected)
    }

    async fn transition_payment(
        &mut self,
        payment_id: Uuid,
        from: &[PaymentStatus],
        to: PaymentStatus,
        update: PaymentUpdate,
    ) -> Result<Option<Payment>, StoreError> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET status = $2,
                refund_reason = COALESCE($4, refund_reason),
                external_transfer_id = COALESCE($5, external_transfer_id),
                updated_at = NOW()
            WHERE id = $1 AND status::text = ANY($3)
            RETURNING *
            "#,
        )
        .bind(payment_id)
        .bind(to)
        .bind(status_names(from, PaymentStatus::to_str))
        .bind(update.refund_reason)
        .bind(update.external_transfer_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(payment)
    }

    async fn transition_bid(
        &mut self,
        bid_id: Uuid,
        from: BidStatus,
        to: BidStatus,
    ) -> Result<Option<Bid>, StoreError> {
        let bid = sqlx::query_as::<_, Bid>(
            r#"
            UPDATE bids SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(bid_id)
        .bind(from)
        .bind(to)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(bid)
    }

    async fn transition_task(
        &mut self,
        task_id: Uuid,
        from: &[TaskStatus],
        to: TaskStatus,
    ) -> Result<Option<Task>, StoreError> {
        let task = sqlx::query_as::<_, Task>(
            r#"
            UPDATE tasks SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status::text = ANY($3)
            RETURNING *
            "#,
        )
        .bind(task_id)
        .bind(to)
        .bind(status_names(from, TaskStatus::to_str))
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(task)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
