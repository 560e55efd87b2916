// service/bid_service.rs
use std::sync::Arc;

use uuid::Uuid;
use validator::Validate;

use crate::{
    db::{Ledger, LedgerExt, PaymentExt, StoreError, TaskExt},
    dtos::taskdtos::{PlaceBidDto, UpdateBidDto},
    models::{paymentmodel::Payment, taskmodel::*, usermodel::AuthUser},
    service::{
        error::ServiceError,
        escrow_service::EscrowService,
        notification_service::{self, notify_best_effort, NotificationDispatcher},
    },
};

#[derive(Debug, Clone)]
pub struct AcceptBidResult {
    pub bid: Bid,
    pub task: Task,
    pub payment: Payment,
    pub client_secret: Option<String>,
}

#[derive(Clone)]
pub struct BidService {
    ledger: Arc<dyn Ledger>,
    escrow_service: Arc<EscrowService>,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl BidService {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        escrow_service: Arc<EscrowService>,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            ledger,
            escrow_service,
            notifier,
        }
    }

    /// Accepts a bid, puts its amount in escrow and closes the task to other
    /// bidders. All writes commit together or not at all.
    pub async fn accept_bid(&self, bid_id: Uuid, poster_id: Uuid) -> Result<AcceptBidResult, ServiceError> {
        let bid = self
            .ledger
            .get_bid(bid_id)
            .await?
            .ok_or(ServiceError::BidNotFound(bid_id))?;

        let task = self
            .ledger
            .get_task(bid.task_id)
            .await?
            .ok_or(ServiceError::TaskNotFound(bid.task_id))?;

        if task.poster_id != poster_id {
            return Err(ServiceError::UnauthorizedTaskAccess(poster_id, task.id));
        }
        if bid.status != BidStatus::Pending {
            return Err(ServiceError::BidAlreadyProcessed(bid_id));
        }
        if task.status != TaskStatus::Open {
            return Err(ServiceError::TaskNotOpen(task.id));
        }

        let account = self
            .ledger
            .get_payment_account(bid.tasker_id)
            .await?
            .filter(|a| a.is_payment_ready())
            .ok_or(ServiceError::TaskerAccountNotReady(bid.tasker_id))?;

        if self.ledger.get_payment_by_bid(bid_id).await?.is_some() {
            return Err(ServiceError::DuplicatePayment(bid_id));
        }

        let mut tx = self.ledger.begin_ledger_tx().await?;

        let locked = tx
            .lock_task(task.id)
            .await?
            .ok_or(ServiceError::TaskNotFound(task.id))?;
        if locked.status != TaskStatus::Open {
            return Err(ServiceError::TaskNotOpen(task.id));
        }

        // The poster accepted the bid as they read it; an edit since then
        // must not be escrowed silently.
        let bid = tx
            .lock_bid(bid_id)
            .await?
            .filter(|current| current.status == BidStatus::Pending && current.amount == bid.amount)
            .ok_or(ServiceError::BidProcessedConcurrently(bid_id))?;

        let (payment, client_secret) = self
            .escrow_service
            .create_held_payment(tx.as_mut(), &locked, &bid, &account)
            .await?;

        let accepted = tx
            .accept_bid_if_pending(bid_id)
            .await
            .map_err(|e| match e {
                StoreError::UniqueViolation(_) => ServiceError::BidProcessedConcurrently(bid_id),
                other => other.into(),
            })?
            .ok_or(ServiceError::BidProcessedConcurrently(bid_id))?;

        let assigned = tx
            .assign_task_if_open(task.id, bid.tasker_id, &payment.external_intent_id)
            .await?
            .ok_or(ServiceError::TaskNotOpen(task.id))?;

        let rejected = tx.reject_competing_bids(task.id, bid_id).await?;

        tx.commit().await?;

        tracing::info!(
            "Bid {} accepted on task {} by {}; {} competing bids rejected",
            bid_id,
            task.id,
            poster_id,
            rejected.len()
        );

        notify_best_effort(
            self.notifier.as_ref(),
            notification_service::bid_accepted(&accepted, &assigned),
        )
        .await;
        for other in &rejected {
            notify_best_effort(
                self.notifier.as_ref(),
                notification_service::bid_rejected(other, &assigned),
            )
            .await;
        }

        Ok(AcceptBidResult {
            bid: accepted,
            task: assigned,
            payment,
            client_secret,
        })
    }

    pub async fn place_bid(
        &self,
        task_id: Uuid,
        tasker_id: Uuid,
        body: PlaceBidDto,
    ) -> Result<Bid, ServiceError> {
        body.validate()
            .map_err(|e| ServiceError::Validation(e.to_string()))?;

        let task = self
            .ledger
            .get_task(task_id)
            .await?
            .ok_or(ServiceError::TaskNotFound(task_id))?;

        if task.poster_id == tasker_id {
            return Err(ServiceError::UnauthorizedTaskAccess(tasker_id, task_id));
        }
        if task.status != TaskStatus::Open {
            return Err(ServiceError::TaskNotOpen(task_id));
        }

        let bid = self
            .ledger
            .create_bid(NewBid {
                task_id,
                tasker_id,
                amount: body.amount,
                message: body.message,
            })
            .await
            .map_err(|e| match e {
                StoreError::UniqueViolation(_) => ServiceError::DuplicateBid(task_id),
                other => other.into(),
            })?
            .ok_or(ServiceError::TaskNotOpen(task_id))?;

        tracing::info!("Tasker {} bid {} on task {}", tasker_id, bid.amount, task_id);
        Ok(bid)
    }

    pub async fn update_bid(
        &self,
        bid_id: Uuid,
        tasker_id: Uuid,
        body: UpdateBidDto,
    ) -> Result<Bid, ServiceError> {
        body.validate()
            .map_err(|e| ServiceError::Validation(e.to_string()))?;

        self.owned_pending_bid(bid_id, tasker_id).await?;

        self.ledger
            .update_pending_bid(bid_id, tasker_id, body.amount, body.message)
            .await?
            .ok_or(ServiceError::BidProcessedConcurrently(bid_id))
    }

    pub async fn withdraw_bid(&self, bid_id: Uuid, tasker_id: Uuid) -> Result<(), ServiceError> {
        self.owned_pending_bid(bid_id, tasker_id).await?;

        if !self.ledger.delete_pending_bid(bid_id, tasker_id).await? {
            return Err(ServiceError::BidProcessedConcurrently(bid_id));
        }
        tracing::info!("Tasker {} withdrew bid {}", tasker_id, bid_id);
        Ok(())
    }

    /// The poster (and admins) see every bid; anyone else only their own.
    pub async fn list_task_bids(&self, task_id: Uuid, caller: &AuthUser) -> Result<Vec<Bid>, ServiceError> {
        let task = self
            .ledger
            .get_task(task_id)
            .await?
            .ok_or(ServiceError::TaskNotFound(task_id))?;

        let bids = self.ledger.get_task_bids(task_id).await?;
        if task.poster_id == caller.id || caller.is_admin() {
            return Ok(bids);
        }
        Ok(bids.into_iter().filter(|b| b.tasker_id == caller.id).collect())
    }

    async fn owned_pending_bid(&self, bid_id: Uuid, tasker_id: Uuid) -> Result<Bid, ServiceError> {
        let bid = self
            .ledger
            .get_bid(bid_id)
            .await?
            .ok_or(ServiceError::BidNotFound(bid_id))?;

        if bid.tasker_id != tasker_id {
            return Err(ServiceError::UnauthorizedBidAccess(tasker_id, bid_id));
        }
        if bid.status != BidStatus::Pending {
            return Err(ServiceError::BidAlreadyProcessed(bid_id));
        }
        Ok(bid)
    }
}
