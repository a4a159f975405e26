use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    api::realtime::{ChangeEvent, ChangeOp, RealtimeHub, Table},
    error::{AppError, AppResult},
    models::{NewReminder, Reminder, ReminderChanges, ReminderFilter},
    storage::Store,
};

pub struct ReminderService {
    store: Arc<dyn Store>,
    realtime: Arc<RealtimeHub>,
}

impl ReminderService {
    pub fn new(store: Arc<dyn Store>, realtime: Arc<RealtimeHub>) -> Self {
        Self { store, realtime }
    }

    pub async fn list(&self, user_id: Uuid, filter: &ReminderFilter) -> AppResult<Vec<Reminder>> {
        self.store.list_reminders(user_id, filter).await
    }

    pub async fn get(&self, user_id: Uuid, id: Uuid) -> AppResult<Reminder> {
        self.store
            .get_reminder(user_id, id)
            .await?
            .ok_or(AppError::ReminderNotFound)
    }

    pub async fn create(&self, user_id: Uuid, reminder: NewReminder) -> AppResult<Reminder> {
        let reminder = reminder.validated().map_err(AppError::Validation)?;

        // Target device must belong to the caller
        self.store
            .get_device(user_id, reminder.device_id)
            .await?
            .ok_or(AppError::DeviceNotFound)?;

        let created = self.store.create_reminder(user_id, &reminder).await?;
        tracing::debug!("Reminder {} created for device {}", created.id, created.device_id);

        self.publish(user_id, ChangeOp::Insert, &created).await;
        Ok(created)
    }

    pub async fn update(
        &self,
        user_id: Uuid,
        id: Uuid,
        changes: ReminderChanges,
    ) -> AppResult<Reminder> {
        if changes.is_empty() {
            return Err(AppError::BadRequest("No fields to update".to_string()));
        }

        let current = self.get(user_id, id).await?;
        let next = changes.apply(&current).map_err(AppError::Validation)?;

        let saved = self
            .store
            .save_reminder(&next)
            .await?
            .ok_or(AppError::ReminderNotFound)?;

        self.publish(user_id, ChangeOp::Update, &saved).await;
        Ok(saved)
    }

    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> AppResult<()> {
        if !self.store.delete_reminder(user_id, id).await? {
            return Err(AppError::ReminderNotFound);
        }

        self.realtime
            .publish(user_id, ChangeEvent::deleted(Table::Reminders, id))
            .await;
        Ok(())
    }

    /// Dismisses the current occurrence; recurring reminders roll forward.
    pub async fn dismiss(&self, user_id: Uuid, id: Uuid) -> AppResult<Reminder> {
        let current = self.get(user_id, id).await?;
        let next = current.dismissed(Utc::now());

        let saved = self
            .store
            .save_reminder(&next)
            .await?
            .ok_or(AppError::ReminderNotFound)?;

        self.publish(user_id, ChangeOp::Update, &saved).await;
        Ok(saved)
    }

    async fn publish(&self, user_id: Uuid, op: ChangeOp, reminder: &Reminder) {
        self.realtime
            .publish(user_id, ChangeEvent::new(Table::Reminders, op, reminder))
            .await;
    }
}
