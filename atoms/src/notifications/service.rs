use crate::backend::{collections, Backend};
use crate::bids::{AcceptedBid, Bid};
use crate::error::{KlusError, Result, StoreError};
use crate::retry::with_retry;
use crate::session::Session;
use crate::store::{from_document, load_required, to_data, Direction, Filter, Query, Write};
use crate::tasks::Task;

use super::model::Notification;

/// Hand a notification to the sink. Delivery is best effort: a failure is
/// logged and never surfaces to the caller, whose state change already
/// committed.
pub async fn emit(backend: &Backend, notification: Notification) {
    let id = notification.id.clone();
    let recipient = notification.user_id.clone();
    match backend.notifications.append(notification).await {
        Ok(()) => tracing::debug!("Notification {} sent to {}", id, recipient),
        Err(e) => tracing::warn!("Failed to send notification {} to {}: {}", id, recipient, e),
    }
}

pub async fn notify_bid_received(backend: &Backend, task: &Task, bid: &Bid) {
    emit(backend, Notification::bid_received(task, bid, backend.clock.now())).await
}

pub async fn notify_bid_accepted(backend: &Backend, task: &Task, accepted: &AcceptedBid) {
    emit(
        backend,
        Notification::bid_accepted(task, accepted, backend.clock.now()),
    )
    .await
}

pub async fn notify_task_completed(
    backend: &Backend,
    task: &Task,
    recipient: &str,
    completed_by: &str,
) {
    emit(
        backend,
        Notification::task_completed(task, recipient, completed_by, backend.clock.now()),
    )
    .await
}

fn inbox(session: &Session, unread_only: bool) -> Query {
    let mut query = Query::new().filter(Filter::eq("userId", session.uid()));
    if unread_only {
        query = query.filter(Filter::eq("read", false));
    }
    query.order_by("createdAt", Direction::Descending)
}

/// The caller's notifications, newest first.
pub async fn list_notifications(
    backend: &Backend,
    session: &Session,
    unread_only: bool,
    limit: Option<usize>,
) -> Result<Vec<Notification>> {
    let query = inbox(session, unread_only).limit(limit);
    let docs = backend
        .store
        .query(collections::NOTIFICATIONS, &query)
        .await?;
    docs.into_iter()
        .map(|doc| from_document::<Notification>(collections::NOTIFICATIONS, doc).map(|v| v.value))
        .collect()
}

pub async fn unread_count(backend: &Backend, session: &Session) -> Result<usize> {
    let docs = backend
        .store
        .query(collections::NOTIFICATIONS, &inbox(session, true))
        .await?;
    Ok(docs.len())
}

/// Mark one of the caller's notifications as read.
pub async fn mark_read(
    backend: &Backend,
    session: &Session,
    notification_id: &str,
) -> Result<Notification> {
    with_retry(&backend.retry, "mark_read", || async {
        let current = load_required::<Notification>(
            backend.store.as_ref(),
            collections::NOTIFICATIONS,
            "notification",
            notification_id,
        )
        .await?;
        let revision = current.revision();
        let mut notification = current.value;
        if notification.user_id != session.uid() {
            return Err(KlusError::Forbidden(
                "notification belongs to another user".into(),
            ));
        }
        if notification.read {
            return Ok(notification);
        }
        notification.read = true;
        backend
            .store
            .commit(vec![Write::put(
                collections::NOTIFICATIONS,
                notification_id,
                to_data(&notification)?,
                revision,
            )])
            .await?;
        Ok(notification)
    })
    .await
}

/// Mark everything in the caller's inbox as read; returns how many changed.
pub async fn mark_all_read(backend: &Backend, session: &Session) -> Result<usize> {
    let docs = backend
        .store
        .query(collections::NOTIFICATIONS, &inbox(session, true))
        .await?;

    let mut marked = 0;
    for doc in docs {
        let id = doc.id.clone();
        let current = from_document::<Notification>(collections::NOTIFICATIONS, doc)?;
        let revision = current.revision();
        let mut notification = current.value;
        notification.read = true;
        let write = Write::put(
            collections::NOTIFICATIONS,
            &id,
            to_data(&notification)?,
            revision,
        );
        match backend.store.commit(vec![write]).await {
            Ok(()) => marked += 1,
            // Only `read` ever changes, so a lost race means it is read already.
            Err(StoreError::Conflict { .. }) => {}
            Err(e) => return Err(e.into()),
        }
    }

    tracing::info!("Marked {} notifications read for {}", marked, session.uid());
    Ok(marked)
}
