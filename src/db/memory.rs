// db/memory.rs
//
// In-process ledger for tests. A transaction takes the store lock for its whole
// lifetime and works on a staged copy, which gives serializable isolation and
// all-or-nothing commits. Unique indexes of the schema are enforced on write.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::BigDecimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{
    error::StoreError, ledger::LedgerExt, ledger::LedgerTx, notificationdb::NotificationExt,
    paymentdb::PaymentExt, taskdb::TaskExt,
};
use crate::models::{notificationmodel::*, paymentmodel::*, taskmodel::*};

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub tasks: HashMap<Uuid, Task>,
    pub bids: HashMap<Uuid, Bid>,
    pub payments: HashMap<Uuid, Payment>,
    pub accounts: HashMap<Uuid, PaymentAccount>,
    pub notifications: Vec<StoredNotification>,
}

impl MemoryState {
    fn insert_bid(&mut self, bid: Bid) -> Result<Bid, StoreError> {
        let duplicate = self
            .bids
            .values()
            .any(|b| b.id != bid.id && b.task_id == bid.task_id && b.tasker_id == bid.tasker_id);
        if duplicate {
            return Err(StoreError::UniqueViolation("uq_bids_task_tasker".to_string()));
        }
        self.bids.insert(bid.id, bid.clone());
        Ok(bid)
    }

    fn insert_payment(&mut self, payment: Payment) -> Result<Payment, StoreError> {
        if self.payments.values().any(|p| p.bid_id == payment.bid_id) {
            return Err(StoreError::UniqueViolation("uq_payments_bid".to_string()));
        }
        if self
            .payments
            .values()
            .any(|p| p.external_intent_id == payment.external_intent_id)
        {
            return Err(StoreError::UniqueViolation("uq_payments_intent".to_string()));
        }
        self.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    fn transition_task(&mut self, task_id: Uuid, from: &[TaskStatus], to: TaskStatus) -> Option<Task> {
        let task = self.tasks.get_mut(&task_id)?;
        if !from.contains(&task.status) {
            return None;
        }
        task.status = to;
        task.updated_at = Utc::now();
        Some(task.clone())
    }
}

type Interleaved = Box<dyn FnOnce(&mut MemoryState) + Send>;

#[derive(Clone, Default)]
pub struct MemoryLedger {
    state: Arc<Mutex<MemoryState>>,
    unavailable: Arc<AtomicBool>,
    interleaved: Arc<StdMutex<Option<Interleaved>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `begin_ledger_tx` fail, as if the pool were exhausted.
    pub fn make_unavailable(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    /// Applies `change` to the committed state right before the next bid insert
    /// or transaction start, like a concurrent request that won the race.
    pub fn interleave(&self, change: impl FnOnce(&mut MemoryState) + Send + 'static) {
        if let Ok(mut slot) = self.interleaved.lock() {
            *slot = Some(Box::new(change));
        }
    }

    fn run_interleaved(&self, state: &mut MemoryState) {
        let change = self.interleaved.lock().ok().and_then(|mut slot| slot.take());
        if let Some(change) = change {
            change(state);
        }
    }

    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }

    pub async fn put_account(&self, user_id: Uuid, gateway_account_id: &str, ready: bool) -> PaymentAccount {
        let now = Utc::now();
        let account = PaymentAccount {
            id: Uuid::new_v4(),
            user_id,
            gateway_account_id: gateway_account_id.to_string(),
            onboarding_completed: ready,
            charges_enabled: ready,
            payouts_enabled: ready,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().await.accounts.insert(user_id, account.clone());
        account
    }
}

#[async_trait]
impl TaskExt for MemoryLedger {
    async fn create_task(&self, task: NewTask) -> Result<Task, StoreError> {
        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            poster_id: task.poster_id,
            category_id: task.category_id,
            title: task.title,
            description: task.description,
            location: task.location,
            budget: task.budget,
            assigned_tasker_id: None,
            payment_ref: None,
            status: TaskStatus::Open,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().await.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn get_task(&self, task_id: Uuid) -> Result<Option<Task>, StoreError> {
        Ok(self.state.lock().await.tasks.get(&task_id).cloned())
    }

    async fn transition_task(
        &self,
        task_id: Uuid,
        from: &[TaskStatus],
        to: TaskStatus,
    ) -> Result<Option<Task>, StoreError> {
        Ok(self.state.lock().await.transition_task(task_id, from, to))
    }

    async fn create_bid(&self, bid: NewBid) -> Result<Option<Bid>, StoreError> {
        let mut state = self.state.lock().await;
        self.run_interleaved(&mut state);
        let open = state
            .tasks
            .get(&bid.task_id)
            .map(|t| t.status == TaskStatus::Open)
            .unwrap_or(false);
        if !open {
            return Ok(None);
        }

        let now = Utc::now();
        let bid = Bid {
            id: Uuid::new_v4(),
            task_id: bid.task_id,
            tasker_id: bid.tasker_id,
            amount: bid.amount,
            message: bid.message,
            status: BidStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        state.insert_bid(bid).map(Some)
    }

    async fn get_bid(&self, bid_id: Uuid) -> Result<Option<Bid>, StoreError> {
        Ok(self.state.lock().await.bids.get(&bid_id).cloned())
    }

    async fn get_task_bids(&self, task_id: Uuid) -> Result<Vec<Bid>, StoreError> {
        let state = self.state.lock().await;
        let mut bids: Vec<Bid> = state
            .bids
            .values()
            .filter(|b| b.task_id == task_id)
            .cloned()
            .collect();
        bids.sort_by_key(|b| b.created_at);
        Ok(bids)
    }

    async fn update_pending_bid(
        &self,
        bid_id: Uuid,
        tasker_id: Uuid,
        amount: Option<BigDecimal>,
        message: Option<String>,
    ) -> Result<Option<Bid>, StoreError> {
        let mut state = self.state.lock().await;
        let Some(bid) = state.bids.get_mut(&bid_id) else {
            return Ok(None);
        };
        if bid.tasker_id != tasker_id || bid.status != BidStatus::Pending {
            return Ok(None);
        }
        if let Some(amount) = amount {
            bid.amount = amount;
        }
        if let Some(message) = message {
            bid.message = message;
        }
        bid.updated_at = Utc::now();
        Ok(Some(bid.clone()))
    }

    async fn delete_pending_bid(&self, bid_id: Uuid, tasker_id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let deletable = state
            .bids
            .get(&bid_id)
            .map(|b| b.tasker_id == tasker_id && b.status == BidStatus::Pending)
            .unwrap_or(false);
        if deletable {
            state.bids.remove(&bid_id);
        }
        Ok(deletable)
    }
}

#[async_trait]
impl PaymentExt for MemoryLedger {
    async fn get_payment(&self, payment_id: Uuid) -> Result<Option<Payment>, StoreError> {
        Ok(self.state.lock().await.payments.get(&payment_id).cloned())
    }

    async fn get_payment_by_bid(&self, bid_id: Uuid) -> Result<Option<Payment>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.payments.values().find(|p| p.bid_id == bid_id).cloned())
    }

    async fn get_payment_by_intent(&self, intent_id: &str) -> Result<Option<Payment>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .payments
            .values()
            .find(|p| p.external_intent_id == intent_id)
            .cloned())
    }

    async fn get_payment_by_task(&self, task_id: Uuid) -> Result<Option<Payment>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .payments
            .values()
            .filter(|p| p.task_id == task_id)
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn count_outstanding_payments(&self, tasker_id: Uuid) -> Result<i64, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .payments
            .values()
            .filter(|p| p.tasker_id == tasker_id && p.status.is_outstanding())
            .count() as i64)
    }

    async fn get_payment_account(&self, user_id: Uuid) -> Result<Option<PaymentAccount>, StoreError> {
        Ok(self.state.lock().await.accounts.get(&user_id).cloned())
    }

    async fn insert_payment_account(
        &self,
        user_id: Uuid,
        gateway_account_id: &str,
        capabilities: AccountCapabilities,
    ) -> Result<PaymentAccount, StoreError> {
        let mut state = self.state.lock().await;
        if state.accounts.contains_key(&user_id) {
            return Err(StoreError::UniqueViolation("payment_accounts_user_id_key".to_string()));
        }
        let now = Utc::now();
        let account = PaymentAccount {
            id: Uuid::new_v4(),
            user_id,
            gateway_account_id: gateway_account_id.to_string(),
            onboarding_completed: capabilities.onboarding_completed,
            charges_enabled: capabilities.charges_enabled,
            payouts_enabled: capabilities.payouts_enabled,
            created_at: now,
            updated_at: now,
        };
        state.accounts.insert(user_id, account.clone());
        Ok(account)
    }

    async fn update_account_capabilities(
        &self,
        gateway_account_id: &str,
        capabilities: AccountCapabilities,
    ) -> Result<Option<PaymentAccount>, StoreError> {
        let mut state = self.state.lock().await;
        let Some(account) = state
            .accounts
            .values_mut()
            .find(|a| a.gateway_account_id == gateway_account_id)
        else {
            return Ok(None);
        };
        account.onboarding_completed = capabilities.onboarding_completed;
        account.charges_enabled = capabilities.charges_enabled;
        account.payouts_enabled = capabilities.payouts_enabled;
        account.updated_at = Utc::now();
        Ok(Some(account.clone()))
    }

    async fn delete_payment_account(&self, user_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.state.lock().await.accounts.remove(&user_id).is_some())
    }
}

#[async_trait]
impl NotificationExt for MemoryLedger {
    async fn save_notification(
        &self,
        notification: &Notification,
    ) -> Result<StoredNotification, StoreError> {
        let stored = StoredNotification {
            id: Uuid::new_v4(),
            receiver_id: notification.receiver_id,
            kind: notification.kind,
            title: notification.title.clone(),
            text: notification.text.clone(),
            reference_id: notification.reference_id,
            is_read: false,
            created_at: Utc::now(),
        };
        self.state.lock().await.notifications.push(stored.clone());
        Ok(stored)
    }

    async fn get_user_notifications(
        &self,
        receiver_id: Uuid,
        limit: i64,
    ) -> Result<Vec<StoredNotification>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .notifications
            .iter()
            .rev()
            .filter(|n| n.receiver_id == receiver_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

pub struct MemoryLedgerTx {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

#[async_trait]
impl LedgerExt for MemoryLedger {
    async fn begin_ledger_tx(&self) -> Result<Box<dyn LedgerTx>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut guard = self.state.clone().lock_owned().await;
        self.run_interleaved(&mut guard);
        let staged = guard.clone();
        Ok(Box::new(MemoryLedgerTx { guard, staged }))
    }
}

#[async_trait]
impl LedgerTx for MemoryLedgerTx {
    async fn lock_task(&mut self, task_id: Uuid) -> Result<Option<Task>, StoreError> {
        Ok(self.staged.tasks.get(&task_id).cloned())
    }

    async fn lock_bid(&mut self, bid_id: Uuid) -> Result<Option<Bid>, StoreError> {
        Ok(self.staged.bids.get(&bid_id).cloned())
    }

    async fn lock_payment(&mut self, payment_id: Uuid) -> Result<Option<Payment>, StoreError> {
        Ok(self.staged.payments.get(&payment_id).cloned())
    }

    async fn insert_payment(&mut self, payment: NewPayment) -> Result<Payment, StoreError> {
        let now = Utc::now();
        self.staged.insert_payment(Payment {
            id: Uuid::new_v4(),
            task_id: payment.task_id,
            bid_id: payment.bid_id,
            poster_id: payment.poster_id,
            tasker_id: payment.tasker_id,
            amount: payment.amount,
            platform_fee: payment.platform_fee,
            tasker_amount: payment.tasker_amount,
            currency: payment.currency,
            external_intent_id: payment.external_intent_id,
            external_transfer_id: None,
            status: PaymentStatus::Pending,
            refund_reason: None,
            created_at: now,
            updated_at: now,
        })
    }

    async fn accept_bid_if_pending(&mut self, bid_id: Uuid) -> Result<Option<Bid>, StoreError> {
        let Some(task_id) = self.staged.bids.get(&bid_id).map(|b| b.task_id) else {
            return Ok(None);
        };
        let already_won = self.staged.bids.values().any(|b| {
            b.task_id == task_id
                && b.id != bid_id
                && matches!(b.status, BidStatus::Accepted | BidStatus::Completed)
        });
        let Some(bid) = self.staged.bids.get_mut(&bid_id) else {
            return Ok(None);
        };
        if bid.status != BidStatus::Pending {
            return Ok(None);
        }
        if already_won {
            return Err(StoreError::UniqueViolation("uq_bids_one_accepted_per_task".to_string()));
        }
        bid.status = BidStatus::Accepted;
        bid.updated_at = Utc::now();
        Ok(Some(bid.clone()))
    }

    async fn assign_task_if_open(
        &mut self,
        task_id: Uuid,
        tasker_id: Uuid,
        payment_ref: &str,
    ) -> Result<Option<Task>, StoreError> {
        let Some(task) = self.staged.tasks.get_mut(&task_id) else {
            return Ok(None);
        };
        if task.status != TaskStatus::Open {
            return Ok(None);
        }
        task.status = TaskStatus::InProgress;
        task.assigned_tasker_id = Some(tasker_id);
        task.payment_ref = Some(payment_ref.to_string());
        task.updated_at = Utc::now();
        Ok(Some(task.clone()))
    }

    async fn reject_competing_bids(
        &mut self,
        task_id: Uuid,
        accepted_bid_id: Uuid,
    ) -> Result<Vec<Bid>, StoreError> {
        let now = Utc::now();
        let mut rejected = Vec::new();
        for bid in self.staged.bids.values_mut() {
            if bid.task_id == task_id && bid.id != accepted_bid_id && bid.status == BidStatus::Pending {
                bid.status = BidStatus::Rejected;
                bid.updated_at = now;
                rejected.push(bid.clone());
            }
        }
        Ok(rejected)
    }

    async fn transition_payment(
        &mut self,
        payment_id: Uuid,
        from: &[PaymentStatus],
        to: PaymentStatus,
        update: PaymentUpdate,
    ) -> Result<Option<Payment>, StoreError> {
        let Some(payment) = self.staged.payments.get_mut(&payment_id) else {
            return Ok(None);
        };
        if !from.contains(&payment.status) {
            return Ok(None);
        }
        payment.status = to;
        if update.refund_reason.is_some() {
            payment.refund_reason = update.refund_reason;
        }
        if update.external_transfer_id.is_some() {
            payment.external_transfer_id = update.external_transfer_id;
        }
        payment.updated_at = Utc::now();
        Ok(Some(payment.clone()))
    }

    async fn transition_bid(
        &mut self,
        bid_id: Uuid,
        from: BidStatus,
        to: BidStatus,
    ) -> Result<Option<Bid>, StoreError> {
        let Some(bid) = self.staged.bids.get_mut(&bid_id) else {
            return Ok(None);
        };
        if bid.status != from {
            return Ok(None);
        }
        bid.status = to;
        bid.updated_at = Utc::now();
        Ok(Some(bid.clone()))
    }

    async fn transition_task(
        &mut self,
        task_id: Uuid,
        from: &[TaskStatus],
        to: TaskStatus,
    ) -> Result<Option<Task>, StoreError> {
        Ok(self.staged.transition_task(task_id, from, to))
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryLedgerTx { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }
}
