// service/account_service.rs
use std::sync::Arc;

use uuid::Uuid;

use crate::{
    config::Config,
    db::{Ledger, PaymentExt, StoreError},
    models::paymentmodel::PaymentAccount,
    service::{
        error::ServiceError,
        payment_gateway::{AccountLink, PaymentGateway},
    },
};

/// Connected accounts taskers are paid out to.
#[derive(Clone)]
pub struct AccountService {
    ledger: Arc<dyn Ledger>,
    gateway: Arc<dyn PaymentGateway>,
    app_url: String,
}

impl AccountService {
    pub fn new(ledger: Arc<dyn Ledger>, gateway: Arc<dyn PaymentGateway>, config: &Config) -> Self {
        Self {
            ledger,
            gateway,
            app_url: config.app_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn create_account(&self, user_id: Uuid, email: &str) -> Result<PaymentAccount, ServiceError> {
        if let Some(existing) = self.ledger.get_payment_account(user_id).await? {
            return Ok(existing);
        }

        let remote = self.gateway.create_connected_account(user_id, email).await?;
        match self
            .ledger
            .insert_payment_account(user_id, &remote.id, remote.capabilities())
            .await
        {
            Ok(account) => {
                tracing::info!("Connected account {} created for {}", account.gateway_account_id, user_id);
                Ok(account)
            }
            // a concurrent request stored one first; the gateway call was idempotent
            Err(StoreError::UniqueViolation(_)) => self.get_account(user_id).await,
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_account(&self, user_id: Uuid) -> Result<PaymentAccount, ServiceError> {
        self.ledger
            .get_payment_account(user_id)
            .await?
            .ok_or(ServiceError::PaymentAccountNotFound(user_id))
    }

    pub async fn onboarding_link(&self, user_id: Uuid) -> Result<AccountLink, ServiceError> {
        let account = self.get_account(user_id).await?;

        let refresh_url = format!("{}/account/onboarding/refresh", self.app_url);
        let return_url = format!("{}/account/onboarding/complete", self.app_url);
        let link = self
            .gateway
            .create_onboarding_link(&account.gateway_account_id, &refresh_url, &return_url)
            .await?;

        Ok(link)
    }

    /// Pulls the capability flags from the gateway, for when a webhook was missed.
    pub async fn refresh_account(&self, user_id: Uuid) -> Result<PaymentAccount, ServiceError> {
        let account = self.get_account(user_id).await?;
        let remote = self.gateway.retrieve_account(&account.gateway_account_id).await?;

        self.ledger
            .update_account_capabilities(&account.gateway_account_id, remote.capabilities())
            .await?
            .ok_or(ServiceError::PaymentAccountNotFound(user_id))
    }

    pub async fn delete_account(&self, user_id: Uuid) -> Result<(), ServiceError> {
        let account = self.get_account(user_id).await?;

        if self.ledger.count_outstanding_payments(user_id).await? > 0 {
            return Err(ServiceError::AccountHasOutstandingPayments(user_id));
        }

        self.gateway.delete_account(&account.gateway_account_id).await?;
        self.ledger.delete_payment_account(user_id).await?;

        tracing::info!("Connected account {} deleted for {}", account.gateway_account_id, user_id);
        Ok(())
    }
}
