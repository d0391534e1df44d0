use crate::backend::{collections, Backend};
use crate::error::{KlusError, Result};
use crate::guard::{self, Action};
use crate::notifications;
use crate::retry::with_retry;
use crate::session::Session;
use crate::store::{from_document, load_required, to_data, Direction, Filter, Query, Revision, Versioned, Write};
use crate::users::{self, ActiveTaskStatus};

use super::model::{CreateTaskPayload, Task, UpdateTaskPayload};
use super::state::TaskStatus;

/// Load a task together with the version it was read at.
pub async fn load_task(backend: &Backend, task_id: &str) -> Result<Versioned<Task>> {
    load_required(backend.store.as_ref(), collections::TASKS, "task", task_id).await
}

pub(crate) fn put_task(task: &Task, revision: Revision) -> Result<Write> {
    debug_assert!(task.check_invariants().is_ok(), "{:?}", task.check_invariants());
    Ok(Write::put(collections::TASKS, &task.id, to_data(task)?, revision))
}

/// Read-modify-write a single task under a version check, retrying lost races.
///
/// `change` runs against the freshly loaded task on every attempt and must be
/// free of side effects; it returns whatever the caller wants back.
pub(crate) async fn modify_task<T, F>(
    backend: &Backend,
    task_id: &str,
    operation: &str,
    change: F,
) -> Result<(Task, T)>
where
    F: Fn(&mut Task) -> Result<T>,
{
    with_retry(&backend.retry, operation, || async {
        let current = load_task(backend, task_id).await?;
        let mut task = current.value;
        let out = change(&mut task)?;
        task.updated_at = backend.clock.now();
        backend
            .store
            .commit(vec![put_task(&task, Revision::Exactly(current.version))?])
            .await?;
        Ok((task, out))
    })
    .await
}

/// Create a new open task owned by the caller.
pub async fn create_task(
    backend: &Backend,
    session: &Session,
    payload: CreateTaskPayload,
) -> Result<Task> {
    payload.validate()?;

    let task_id = uuid::Uuid::new_v4().to_string();
    let now = backend.clock.now();
    let task = Task::new(task_id, session.uid(), session.display_name(), payload, now);

    with_retry(&backend.retry, "create_task", || async {
        backend
            .store
            .commit(vec![put_task(&task, Revision::New)?])
            .await
            .map_err(KlusError::from)
    })
    .await?;

    tracing::info!("Task {} created by {}", task.id, session.uid());
    Ok(task)
}

/// Get a specific task
pub async fn get_task(backend: &Backend, task_id: &str) -> Result<Task> {
    Ok(load_task(backend, task_id).await?.value)
}

/// Update task attributes; owner only, while open. Last writer wins per field.
pub async fn update_task(
    backend: &Backend,
    session: &Session,
    task_id: &str,
    payload: UpdateTaskPayload,
) -> Result<Task> {
    if payload.is_empty() {
        return Err(KlusError::Validation("nothing to update".into()));
    }

    let (task, ()) = modify_task(backend, task_id, "update_task", |task| {
        guard::authorize(session, task, &Action::EditTask)?;
        task.details.apply(&payload);
        task.details.validate()
    })
    .await?;

    tracing::info!("Task {} updated", task_id);
    Ok(task)
}

/// Delete a task and everything embedded in it.
///
/// A task cancelled after assignment still appears in the provider's work
/// list; that entry is removed in the same batch.
pub async fn delete_task(backend: &Backend, session: &Session, task_id: &str) -> Result<()> {
    with_retry(&backend.retry, "delete_task", || async {
        let current = load_task(backend, task_id).await?;
        let task = current.value;
        guard::authorize(session, &task, &Action::DeleteTask)?;

        let mut writes = vec![Write::delete(
            collections::TASKS,
            task_id,
            Some(current.version),
        )];
        if let Some(klusser_id) = &task.klusser_id {
            let now = backend.clock.now();
            let cleanup = users::service::active_tasks_write(backend, klusser_id, now, |profile| {
                profile.remove_active_task(task_id)
            })
            .await?;
            writes.extend(cleanup);
        }
        backend.store.commit(writes).await?;
        Ok(())
    })
    .await?;

    tracing::info!("Task {} deleted by {}", task_id, session.uid());
    Ok(())
}

async fn list(backend: &Backend, query: Query) -> Result<Vec<Task>> {
    let docs = backend.store.query(collections::TASKS, &query).await?;
    docs.into_iter()
        .map(|doc| from_document::<Task>(collections::TASKS, doc).map(|v| v.value))
        .collect()
}

fn newest_first(filter: Filter, limit: Option<usize>) -> Query {
    Query::new()
        .filter(filter)
        .order_by("createdAt", Direction::Descending)
        .limit(limit)
}

/// Tasks posted by the caller, newest first.
pub async fn list_tasks_for_owner(
    backend: &Backend,
    session: &Session,
    limit: Option<usize>,
) -> Result<Vec<Task>> {
    list(backend, newest_first(Filter::eq("userId", session.uid()), limit)).await
}

/// The providers' work feed: all open tasks, newest first.
pub async fn list_open_tasks(backend: &Backend, limit: Option<usize>) -> Result<Vec<Task>> {
    list(
        backend,
        newest_first(Filter::eq("status", TaskStatus::Open.as_str()), limit),
    )
    .await
}

/// Tasks assigned to the caller as provider, newest first.
pub async fn list_tasks_for_klusser(
    backend: &Backend,
    session: &Session,
    limit: Option<usize>,
) -> Result<Vec<Task>> {
    list(backend, newest_first(Filter::eq("klusserId", session.uid()), limit)).await
}

/// Apply a status transition and mirror it into the provider's work list in
/// one atomic batch.
async fn transition(
    backend: &Backend,
    session: &Session,
    task_id: &str,
    action: Action<'static>,
    next: TaskStatus,
    operation: &str,
) -> Result<Task> {
    with_retry(&backend.retry, operation, || async {
        let current = load_task(backend, task_id).await?;
        let mut task = current.value;
        guard::authorize(session, &task, &action)?;

        let now = backend.clock.now();
        task.status = task.status.transition(next)?;
        if next == TaskStatus::Cancelled {
            task.reject_pending_bids();
        }
        task.updated_at = now;

        let mut writes = vec![put_task(&task, Revision::Exactly(current.version))?];
        if let (Some(klusser_id), Some(entry_status)) =
            (&task.klusser_id, ActiveTaskStatus::for_task(next))
        {
            let sync = users::service::active_tasks_write(backend, klusser_id, now, |profile| {
                profile.set_active_task_status(task_id, entry_status)
            })
            .await?;
            writes.extend(sync);
        }
        backend.store.commit(writes).await?;
        Ok(task)
    })
    .await
}

/// Assigned klusser starts the work.
pub async fn start_task(backend: &Backend, session: &Session, task_id: &str) -> Result<Task> {
    let task = transition(
        backend,
        session,
        task_id,
        Action::StartTask,
        TaskStatus::InProgress,
        "start_task",
    )
    .await?;
    tracing::info!("Task {} started by {}", task_id, session.uid());
    Ok(task)
}

/// Owner or assigned klusser marks the work done; the other party is notified.
pub async fn complete_task(backend: &Backend, session: &Session, task_id: &str) -> Result<Task> {
    let task = transition(
        backend,
        session,
        task_id,
        Action::CompleteTask,
        TaskStatus::Completed,
        "complete_task",
    )
    .await?;
    tracing::info!("Task {} completed by {}", task_id, session.uid());

    let recipient = if task.is_owner(session.uid()) {
        task.klusser_id.clone()
    } else {
        Some(task.user_id.clone())
    };
    if let Some(recipient) = recipient {
        notifications::notify_task_completed(backend, &task, &recipient, session.display_name())
            .await;
    }
    Ok(task)
}

/// Owner cancels an open or assigned task. Pending bids are rejected.
pub async fn cancel_task(backend: &Backend, session: &Session, task_id: &str) -> Result<Task> {
    let task = transition(
        backend,
        session,
        task_id,
        Action::CancelTask,
        TaskStatus::Cancelled,
        "cancel_task",
    )
    .await?;
    tracing::info!("Task {} cancelled by {}", task_id, session.uid());
    Ok(task)
}
