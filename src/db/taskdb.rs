// db/taskdb.rs
use async_trait::async_trait;
use sqlx::types::BigDecimal;
use uuid::Uuid;

use super::{db::DBClient, error::StoreError, status_names};
use crate::models::taskmodel::*;

#[async_trait]
pub trait TaskExt {
    async fn create_task(&self, task: NewTask) -> Result<Task, StoreError>;

    async fn get_task(&self, task_id: Uuid) -> Result<Option<Task>, StoreError>;

    /// Single-statement conditional status change; `None` when the task is
    /// missing or not in one of the `from` states.
    async fn transition_task(
        &self,
        task_id: Uuid,
        from: &[TaskStatus],
        to: TaskStatus,
    ) -> Result<Option<Task>, StoreError>;

    /// Inserts the bid only while its task is open; `None` otherwise.
    async fn create_bid(&self, bid: NewBid) -> Result<Option<Bid>, StoreError>;

    async fn get_bid(&self, bid_id: Uuid) -> Result<Option<Bid>, StoreError>;

    async fn get_task_bids(&self, task_id: Uuid) -> Result<Vec<Bid>, StoreError>;

    /// Edits a bid only while it is pending and owned by `tasker_id`.
    async fn update_pending_bid(
        &self,
        bid_id: Uuid,
        tasker_id: Uuid,
        amount: Option<BigDecimal>,
        message: Option<String>,
    ) -> Result<Option<Bid>, StoreError>;

    async fn delete_pending_bid(&self, bid_id: Uuid, tasker_id: Uuid) -> Result<bool, StoreError>;
}

#[async_trait]
impl TaskExt for DBClient {
    async fn create_task(&self, task: NewTask) -> Result<Task, StoreError> {
        let task = sqlx::query_as::<_, Task>(
            r#"
            INSERT INTO tasks (poster_id, category_id, title, description, location, budget)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(task.poster_id)
        .bind(task.category_id)
        .bind(task.title)
        .bind(task.description)
        .bind(task.location)
        .bind(task.budget)
        .fetch_one(&self.pool)
        .await?;

        Ok(task)
    }

    async fn get_task(&self, task_id: Uuid) -> Result<Option<Task>, StoreError> {
        let task = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(task)
    }

    async fn transition_task(
        &self,
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
        .fetch_optional(&self.pool)
        .await?;

        Ok(task)
    }

    async fn create_bid(&self, bid: NewBid) -> Result<Option<Bid>, StoreError> {
        // FOR SHARE conflicts with the acceptance's FOR UPDATE on the task, so
        // a bid either lands before the acceptance rejects it or sees the task
        // already taken.
        let bid = sqlx::query_as::<_, Bid>(
            r#"
            WITH open_task AS (
                SELECT id FROM tasks
                WHERE id = $1 AND status = 'open'::task_status
                FOR SHARE
            )
            INSERT INTO bids (task_id, tasker_id, amount, message)
            SELECT id, $2, $3, $4 FROM open_task
            RETURNING *
            "#,
        )
        .bind(bid.task_id)
        .bind(bid.tasker_id)
        .bind(bid.amount)
        .bind(bid.message)
        .fetch_optional(&self.pool)
        .await?;

        Ok(bid)
    }

    async fn get_bid(&self, bid_id: Uuid) -> Result<Option<Bid>, StoreError> {
        let bid = sqlx::query_as::<_, Bid>("SELECT * FROM bids WHERE id = $1")
            .bind(bid_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(bid)
    }

    async fn get_task_bids(&self, task_id: Uuid) -> Result<Vec<Bid>, StoreError> {
        let bids = sqlx::query_as::<_, Bid>(
            "SELECT * FROM bids WHERE task_id = $1 ORDER BY created_at ASC",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(bids)
    }

    async fn update_pending_bid(
        &self,
        bid_id: Uuid,
        tasker_id: Uuid,
        amount: Option<BigDecimal>,
        message: Option<String>,
    ) -> Result<Option<Bid>, StoreError> {
        let bid = sqlx::query_as::<_, Bid>(
            r#"
            UPDATE bids
            SET amount = COALESCE($3, amount),
                message = COALESCE($4, message),
                updated_at = NOW()
            WHERE id = $1 AND tasker_id = $2 AND status = 'pending'::bid_status
            RETURNING *
            "#,
        )
        .bind(bid_id)
        .bind(tasker_id)
        .bind(amount)
        .bind(message)
        .fetch_optional(&self.pool)
        .await?;

        Ok(bid)
    }

    async fn delete_pending_bid(&self, bid_id: Uuid, tasker_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM bids
            WHERE id = $1 AND tasker_id = $2 AND status = 'pending'::bid_status
            "#,
        )
        .bind(bid_id)
        .bind(tasker_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
