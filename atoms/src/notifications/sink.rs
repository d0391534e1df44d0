use async_trait::async_trait;
use std::sync::Arc;

use super::model::Notification;
use crate::backend::collections;
use crate::error::{KlusError, StoreError};
use crate::store::{to_data, DocumentStore};

/// Append-only per-user message log.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver a notification. Appending the same id twice must be a no-op.
    async fn append(&self, notification: Notification) -> Result<(), KlusError>;
}

/// Writes notifications into the `notifications` collection of a document store.
pub struct StoreNotificationSink {
    store: Arc<dyn DocumentStore>,
}

impl StoreNotificationSink {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl NotificationSink for StoreNotificationSink {
    async fn append(&self, notification: Notification) -> Result<(), KlusError> {
        let id = notification.id.clone();
        let data = to_data(&notification)?;
        match self
            .store
            .create(collections::NOTIFICATIONS, data, Some(id.clone()))
            .await
        {
            Ok(_) => Ok(()),
            Err(StoreError::Conflict { .. }) => {
                tracing::debug!("notification {} already delivered", id);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
