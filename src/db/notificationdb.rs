// db/notificationdb.rs
use async_trait::async_trait;
use uuid::Uuid;

use super::{db::DBClient, error::StoreError};
use crate::models::notificationmodel::*;

#[async_trait]
pub trait NotificationExt {
    async fn save_notification(
        &self,
        notification: &Notification,
    ) -> Result<StoredNotification, StoreError>;

    async fn get_user_notifications(
        &self,
        receiver_id: Uuid,
        limit: i64,
    ) -> Result<Vec<StoredNotification>, StoreError>;
}

#[async_trait]
impl NotificationExt for DBClient {
    async fn save_notification(
        &self,
        notification: &Notification,
    ) -> Result<StoredNotification, StoreError> {
        let stored = sqlx::query_as::<_, StoredNotification>(
            r#"
            INSERT INTO notifications (receiver_id, kind, title, text, reference_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(notification.receiver_id)
        .bind(notification.kind)
        .bind(&notification.title)
        .bind(&notification.text)
        .bind(notification.reference_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(stored)
    }

    async fn get_user_notifications(
        &self,
        receiver_id: Uuid,
        limit: i64,
    ) -> Result<Vec<StoredNotification>, StoreError> {
        let notifications = sqlx::query_as::<_, StoredNotification>(
            r#"
            SELECT * FROM notifications
            WHERE receiver_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(receiver_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(notifications)
    }
}
