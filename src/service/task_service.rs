// service/task_service.rs
use std::sync::Arc;

use uuid::Uuid;

use crate::{
    db::{Ledger, TaskExt},
    dtos::taskdtos::CreateTaskDto,
    models::{taskmodel::*, usermodel::AuthUser},
    service::{
        error::ServiceError,
        notification_service::{self, notify_best_effort, NotificationDispatcher},
    },
};

#[derive(Clone)]
pub struct TaskService {
    ledger: Arc<dyn Ledger>,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl TaskService {
    pub fn new(ledger: Arc<dyn Ledger>, notifier: Arc<dyn NotificationDispatcher>) -> Self {
        Self { ledger, notifier }
    }

    pub async fn create_task(&self, poster_id: Uuid, body: CreateTaskDto) -> Result<Task, ServiceError> {
        let task = self
            .ledger
            .create_task(NewTask {
                poster_id,
                category_id: body.category_id,
                title: body.title.trim().to_string(),
                description: body.description,
                location: body.location,
                budget: body.budget,
            })
            .await?;

        tracing::info!("Task {} created by {}", task.id, poster_id);
        Ok(task)
    }

    pub async fn get_task(&self, task_id: Uuid) -> Result<Task, ServiceError> {
        self.ledger
            .get_task(task_id)
            .await?
            .ok_or(ServiceError::TaskNotFound(task_id))
    }

    /// The assigned tasker marks the work as done.
    pub async fn submit_for_review(&self, task_id: Uuid, tasker_id: Uuid) -> Result<Task, ServiceError> {
        let task = self.get_task(task_id).await?;

        if task.assigned_tasker_id != Some(tasker_id) {
            return Err(ServiceError::UnauthorizedTaskAccess(tasker_id, task_id));
        }

        let task = self
            .ledger
            .transition_task(task_id, &[TaskStatus::InProgress], TaskStatus::UnderReview)
            .await?
            .ok_or(ServiceError::InvalidTaskStatus(task_id, task.status))?;

        tracing::info!("Task {} submitted for review by {}", task_id, tasker_id);
        notify_best_effort(
            self.notifier.as_ref(),
            notification_service::task_submitted_for_review(&task),
        )
        .await;

        Ok(task)
    }

    /// Freezes the escrowed payment until an admin settles it.
    pub async fn open_dispute(&self, task_id: Uuid, caller: &AuthUser) -> Result<Task, ServiceError> {
        let task = self.get_task(task_id).await?;

        let counterparty = if task.poster_id == caller.id {
            task.assigned_tasker_id
        } else if task.assigned_tasker_id == Some(caller.id) {
            Some(task.poster_id)
        } else {
            return Err(ServiceError::UnauthorizedTaskAccess(caller.id, task_id));
        };
        if !task.status.is_settleable() {
            return Err(ServiceError::InvalidTaskStatus(task_id, task.status));
        }

        let task = self
            .ledger
            .transition_task(task_id, &TaskStatus::SETTLEABLE, TaskStatus::Disputed)
            .await?
            .ok_or(ServiceError::InvalidTaskStatus(task_id, task.status))?;

        tracing::warn!("Dispute opened on task {} by {}", task_id, caller.id);
        if let Some(receiver_id) = counterparty {
            notify_best_effort(
                self.notifier.as_ref(),
                notification_service::task_disputed(&task, receiver_id),
            )
            .await;
        }

        Ok(task)
    }
}
