use crate::backend::{collections, Backend};
use crate::error::{KlusError, Result};
use crate::guard::{self, Action};
use crate::notifications;
use crate::retry::with_retry;
use crate::session::Session;
use crate::store::load;
use crate::tasks::service::{load_task, modify_task, put_task};
use crate::tasks::Task;
use crate::users::{self, ActiveTask, ActiveTaskStatus, User};

use super::model::{AcceptedBid, Bid, BidPayload};

async fn load_bidder(backend: &Backend, session: &Session) -> Result<User> {
    load::<User>(backend.store.as_ref(), collections::USERS, session.uid())
        .await?
        .map(|v| v.value)
        .ok_or_else(|| KlusError::Forbidden("complete your profile before bidding".into()))
}

/// Place a pending bid on an open task.
///
/// The bid is appended under a version check on the task, so concurrent
/// submissions are serialized instead of overwriting each other. The owner
/// is notified afterwards; a failed notification does not undo the bid.
pub async fn submit_bid(
    backend: &Backend,
    session: &Session,
    task_id: &str,
    payload: BidPayload,
) -> Result<(Task, Bid)> {
    payload.validate()?;
    let bidder = load_bidder(backend, session).await?;

    let (task, bid) = modify_task(backend, task_id, "submit_bid", |task| {
        guard::authorize(session, task, &Action::SubmitBid { bidder: &bidder })?;
        task.add_bid(session, &payload, backend.clock.now())
    })
    .await?;

    tracing::info!(
        "Bid {} of {:.2} placed on task {} by {}",
        bid.id,
        bid.amount,
        task_id,
        session.uid()
    );
    notifications::notify_bid_received(backend, &task, &bid).await;
    Ok((task, bid))
}

/// Change amount and message of the caller's own pending bid.
pub async fn edit_bid(
    backend: &Backend,
    session: &Session,
    task_id: &str,
    bid_id: &str,
    payload: BidPayload,
) -> Result<(Task, Bid)> {
    payload.validate()?;

    let (task, bid) = modify_task(backend, task_id, "edit_bid", |task| {
        guard::authorize(session, task, &Action::EditBid { bid_id })?;
        task.edit_bid(bid_id, &payload, backend.clock.now())
    })
    .await?;

    tracing::info!("Bid {} on task {} edited", bid_id, task_id);
    Ok((task, bid))
}

/// Remove the caller's own pending bid.
pub async fn withdraw_bid(
    backend: &Backend,
    session: &Session,
    task_id: &str,
    bid_id: &str,
) -> Result<Task> {
    let (task, _removed) = modify_task(backend, task_id, "withdraw_bid", |task| {
        guard::authorize(session, task, &Action::WithdrawBid { bid_id })?;
        task.remove_bid(bid_id)
    })
    .await?;

    tracing::info!("Bid {} on task {} withdrawn", bid_id, task_id);
    Ok(task)
}

/// Accept one bid: it becomes `accepted`, every other bid `rejected`, the
/// task `assigned`. The provider's work list entry is written in the same
/// atomic batch as the task, unless their profile is unreadable, in which
/// case the task is assigned alone. The acceptance notification is sent after.
pub async fn accept_bid(
    backend: &Backend,
    session: &Session,
    task_id: &str,
    bid_id: &str,
) -> Result<(Task, AcceptedBid)> {
    let (task, accepted) = with_retry(&backend.retry, "accept_bid", || async {
        let current = load_task(backend, task_id).await?;
        let revision = current.revision();
        let mut task = current.value;
        guard::authorize(session, &task, &Action::AcceptBid { bid_id })?;

        let now = backend.clock.now();
        let accepted = task.accept_bid(bid_id, now)?;
        task.updated_at = now;

        let entry = ActiveTask {
            task_id: task.id.clone(),
            title: task.title().to_string(),
            customer_name: task.customer_name.clone(),
            amount: accepted.amount,
            accepted_at: now,
            status: ActiveTaskStatus::Active,
        };
        let mut writes = vec![put_task(&task, revision)?];
        let profile_write =
            users::service::active_tasks_write(backend, &accepted.klusser_id, now, |profile| {
                profile.put_active_task(entry);
                true
            })
            .await?;
        writes.extend(profile_write);

        backend.store.commit(writes).await?;
        Ok((task, accepted))
    })
    .await?;

    tracing::info!(
        "Bid {} accepted on task {}; assigned to {}",
        bid_id,
        task_id,
        accepted.klusser_id
    );
    notifications::notify_bid_accepted(backend, &task, &accepted).await;
    Ok((task, accepted))
}

/// Reject a single pending bid; the task stays open.
pub async fn reject_bid(
    backend: &Backend,
    session: &Session,
    task_id: &str,
    bid_id: &str,
) -> Result<(Task, Bid)> {
    let (task, bid) = modify_task(backend, task_id, "reject_bid", |task| {
        guard::authorize(session, task, &Action::RejectBid { bid_id })?;
        task.reject_bid(bid_id)
    })
    .await?;

    tracing::info!("Bid {} on task {} rejected", bid_id, task_id);
    Ok((task, bid))
}
