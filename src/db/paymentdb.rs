// db/paymentdb.rs
use async_trait::async_trait;
use uuid::Uuid;

use super::{db::DBClient, error::StoreError, status_names};
use crate::models::paymentmodel::*;

#[async_trait]
pub trait PaymentExt {
    async fn get_payment(&self, payment_id: Uuid) -> Result<Option<Payment>, StoreError>;

    async fn get_payment_by_bid(&self, bid_id: Uuid) -> Result<Option<Payment>, StoreError>;

    async fn get_payment_by_intent(&self, intent_id: &str) -> Result<Option<Payment>, StoreError>;

    async fn get_payment_by_task(&self, task_id: Uuid) -> Result<Option<Payment>, StoreError>;

    async fn count_outstanding_payments(&self, tasker_id: Uuid) -> Result<i64, StoreError>;

    async fn get_payment_account(&self, user_id: Uuid) -> Result<Option<PaymentAccount>, StoreError>;

    async fn insert_payment_account(
        &self,
        user_id: Uuid,
        gateway_account_id: &str,
        capabilities: AccountCapabilities,
    ) -> Result<PaymentAccount, StoreError>;

    /// Overwrites the stored capability flags; `None` when no local row
    /// matches the gateway account.
    async fn update_account_capabilities(
        &self,
        gateway_account_id: &str,
        capabilities: AccountCapabilities,
    ) -> Result<Option<PaymentAccount>, StoreError>;

    async fn delete_payment_account(&self, user_id: Uuid) -> Result<bool, StoreError>;
}

#[async_trait]
impl PaymentExt for DBClient {
    async fn get_payment(&self, payment_id: Uuid) -> Result<Option<Payment>, StoreError> {
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
            .bind(payment_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(payment)
    }

    async fn get_payment_by_bid(&self, bid_id: Uuid) -> Result<Option<Payment>, StoreError> {
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE bid_id = $1")
            .bind(bid_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(payment)
    }

    async fn get_payment_by_intent(&self, intent_id: &str) -> Result<Option<Payment>, StoreError> {
        let payment = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE external_intent_id = $1",
        )
        .bind(intent_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    async fn get_payment_by_task(&self, task_id: Uuid) -> Result<Option<Payment>, StoreError> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            SELECT * FROM payments WHERE task_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    async fn count_outstanding_payments(&self, tasker_id: Uuid) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM payments
            WHERE tasker_id = $1 AND status::text = ANY($2)
            "#,
        )
        .bind(tasker_id)
        .bind(status_names(&PaymentStatus::OUTSTANDING, PaymentStatus::to_str))
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn get_payment_account(&self, user_id: Uuid) -> Result<Option<PaymentAccount>, StoreError> {
        let account = sqlx::query_as::<_, PaymentAccount>(
            "SELECT * FROM payment_accounts WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn insert_payment_account(
        &self,
        user_id: Uuid,
        gateway_account_id: &str,
        capabilities: AccountCapabilities,
    ) -> Result<PaymentAccount, StoreError> {
        let account = sqlx::query_as::<_, PaymentAccount>(
            r#"
            INSERT INTO payment_accounts
            (user_id, gateway_account_id, onboarding_completed, charges_enabled, payouts_enabled)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(gateway_account_id)
        .bind(capabilities.onboarding_completed)
        .bind(capabilities.charges_enabled)
        .bind(capabilities.payouts_enabled)
        .fetch_one(&self.pool)
        .await?;

        Ok(account)
    }

    async fn update_account_capabilities(
        &self,
        gateway_account_id: &str,
        capabilities: AccountCapabilities,
    ) -> Result<Option<PaymentAccount>, StoreError> {
        let account = sqlx::query_as::<_, PaymentAccount>(
            r#"
            UPDATE payment_accounts
            SET onboarding_completed = $2, charges_enabled = $3, payouts_enabled = $4,
                updated_at = NOW()
            WHERE gateway_account_id = $1
            RETURNING *
            "#,
        )
        .bind(gateway_account_id)
        .bind(capabilities.onboarding_completed)
        .bind(capabilities.charges_enabled)
        .bind(capabilities.payouts_enabled)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn delete_payment_account(&self, user_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM payment_accounts WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}
