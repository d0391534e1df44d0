use chrono::{DateTime, Utc};

use crate::backend::{collections, Backend};
use crate::error::{KlusError, Result, StoreError};
use crate::identity::{ProfileUpdate, SignUp};
use crate::media;
use crate::retry::with_retry;
use crate::session::{Identity, Session};
use crate::store::{load, load_required, to_data, Revision, Versioned, Write};
use crate::tasks::Task;

use super::model::{ActiveTaskStatus, KlusserProfile, RegisterPayload, Role, UpdateUserPayload, User};

async fn load_user(backend: &Backend, uid: &str) -> Result<Versioned<User>> {
    load_required(backend.store.as_ref(), collections::USERS, "user", uid).await
}

/// Read-modify-write the caller's profile under a version check.
async fn modify_user<F>(backend: &Backend, uid: &str, operation: &str, change: F) -> Result<User>
where
    F: Fn(&mut User) -> Result<()>,
{
    with_retry(&backend.retry, operation, || async {
        let current = load_user(backend, uid).await?;
        let mut user = current.value;
        change(&mut user)?;
        user.updated_at = backend.clock.now();
        backend
            .store
            .commit(vec![Write::put(
                collections::USERS,
                uid,
                to_data(&user)?,
                Revision::Exactly(current.version),
            )])
            .await?;
        Ok(user)
    })
    .await
}

/// Like [`modify_active_tasks`], but a profile that cannot be read or mapped
/// only costs the work list entry: the task change is committed without it
/// and `reconcile_active_tasks` can repair the list later. Retryable errors
/// still propagate so the whole batch is retried.
pub(crate) async fn active_tasks_write<F>(
    backend: &Backend,
    klusser_id: &str,
    now: DateTime<Utc>,
    change: F,
) -> Result<Option<Write>>
where
    F: FnOnce(&mut KlusserProfile) -> bool,
{
    match modify_active_tasks(backend, klusser_id, now, change).await {
        Err(e) if !e.is_retryable() => {
            tracing::warn!(
                "Work list of klusser {} not updated: {}",
                klusser_id,
                e
            );
            Ok(None)
        }
        result => result,
    }
}

/// Build the write that updates a provider's work list, to be committed in the
/// same batch as the task change it mirrors.
///
/// Returns `None` when the provider has no stored profile or `change` reports
/// that nothing changed.
async fn modify_active_tasks<F>(
    backend: &Backend,
    klusser_id: &str,
    now: DateTime<Utc>,
    change: F,
) -> Result<Option<Write>>
where
    F: FnOnce(&mut KlusserProfile) -> bool,
{
    let Some(current) = load::<User>(backend.store.as_ref(), collections::USERS, klusser_id).await?
    else {
        tracing::warn!("No profile for klusser {}; work list not updated", klusser_id);
        return Ok(None);
    };
    let mut user = current.value;
    let profile = user.klusser_profile.get_or_insert_with(KlusserProfile::default);
    if !change(profile) {
        return Ok(None);
    }
    user.updated_at = now;
    Ok(Some(Write::put(
        collections::USERS,
        klusser_id,
        to_data(&user)?,
        Revision::Exactly(current.version),
    )))
}

/// Sign up with the identity provider and create the application profile.
///
/// An account whose profile write failed earlier finishes registering when
/// the same credentials are submitted again.
pub async fn register(backend: &Backend, payload: RegisterPayload) -> Result<User> {
    if payload.sign_up.display_name.trim().is_empty() {
        return Err(KlusError::Validation("display name is required".into()));
    }
    let identity = match backend.identity.sign_up(&payload.sign_up).await {
        Ok(identity) => identity,
        Err(KlusError::AccountExists { email }) => {
            unfinished_identity(backend, &payload.sign_up, email).await?
        }
        Err(e) => return Err(e),
    };

    let now = backend.clock.now();
    let mut user = User::new(
        &identity.uid,
        &identity.display_name,
        &identity.email,
        payload.role,
        now,
    );
    let phone = payload
        .phone
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty());
    match (payload.role, user.klusser_profile.as_mut()) {
        (Role::Klusser, Some(profile)) => profile.phone = phone.unwrap_or_default(),
        _ => user.phone = phone,
    }

    with_retry(&backend.retry, "register", || async {
        let write = Write::put(collections::USERS, &user.id, to_data(&user)?, Revision::New);
        match backend.store.commit(vec![write]).await {
            Ok(()) => Ok(()),
            // Another registration with these credentials got there first.
            Err(StoreError::Conflict { .. }) => Err(KlusError::AccountExists {
                email: user.email.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    })
    .await?;

    tracing::info!("User {} registered as {:?}", user.id, user.role);
    Ok(user)
}

/// The identity behind an existing account, if the credentials match and
/// the account never got an application profile.
async fn unfinished_identity(backend: &Backend, sign_up: &SignUp, email: String) -> Result<Identity> {
    let session = match backend.identity.sign_in(&sign_up.email, &sign_up.password).await {
        Ok(session) => session,
        Err(KlusError::Unauthenticated) => return Err(KlusError::AccountExists { email }),
        Err(e) => return Err(e),
    };
    if load::<User>(backend.store.as_ref(), collections::USERS, session.uid())
        .await?
        .is_some()
    {
        return Err(KlusError::AccountExists { email });
    }
    tracing::warn!("Account {} has no profile; resuming registration", session.uid());
    Ok(session.identity)
}

/// Get a user profile
pub async fn get_user(backend: &Backend, uid: &str) -> Result<User> {
    Ok(load_user(backend, uid).await?.value)
}

/// Apply a profile patch. A new display name is pushed to the identity
/// provider first, since that is where bid snapshots read it from.
pub async fn update_profile(
    backend: &Backend,
    session: &Session,
    patch: UpdateUserPayload,
) -> Result<User> {
    patch.validate()?;

    if let Some(name) = &patch.display_name {
        backend
            .identity
            .update_profile(
                session,
                &ProfileUpdate {
                    display_name: Some(name.trim().to_string()),
                    photo_url: None,
                },
            )
            .await?;
    }

    modify_user(backend, session.uid(), "update_profile", |user| user.apply(&patch)).await
}

/// Replace the caller's profile photo.
pub async fn set_profile_photo(backend: &Backend, session: &Session, bytes: &[u8]) -> Result<User> {
    let url = media::store_profile_photo(backend.blobs.as_ref(), session.uid(), bytes).await?;
    backend
        .identity
        .update_profile(
            session,
            &ProfileUpdate {
                display_name: None,
                photo_url: Some(Some(url.clone())),
            },
        )
        .await?;

    modify_user(backend, session.uid(), "set_profile_photo", |user| {
        user.photo_url = Some(url.clone());
        Ok(())
    })
    .await
}

pub async fn remove_profile_photo(backend: &Backend, session: &Session) -> Result<User> {
    media::delete_profile_photo(backend.blobs.as_ref(), session.uid()).await?;
    backend
        .identity
        .update_profile(
            session,
            &ProfileUpdate {
                display_name: None,
                photo_url: Some(None),
            },
        )
        .await?;

    modify_user(backend, session.uid(), "remove_profile_photo", |user| {
        user.photo_url = None;
        Ok(())
    })
    .await
}

/// Bring the caller's work list back in line with the tasks it points at.
///
/// Entries for deleted tasks, or tasks no longer assigned to the caller, are
/// dropped; the remaining entries take the status of their task.
pub async fn reconcile_active_tasks(backend: &Backend, session: &Session) -> Result<User> {
    let uid = session.uid();
    let user = get_user(backend, uid).await?;
    let Some(profile) = &user.klusser_profile else {
        return Ok(user);
    };

    let mut statuses = Vec::with_capacity(profile.active_tasks.len());
    for entry in &profile.active_tasks {
        let task = load::<Task>(backend.store.as_ref(), collections::TASKS, &entry.task_id)
            .await?
            .map(|v| v.value);
        let status = task
            .filter(|t| t.is_assigned_to(uid))
            .and_then(|t| ActiveTaskStatus::for_task(t.status));
        statuses.push((entry.task_id.clone(), status));
    }

    let user = modify_user(backend, uid, "reconcile_active_tasks", |user| {
        if let Some(profile) = user.klusser_profile.as_mut() {
            profile.active_tasks.retain_mut(|entry| {
                match statuses.iter().find(|(id, _)| *id == entry.task_id) {
                    Some((_, Some(status))) => {
                        entry.status = *status;
                        true
                    }
                    Some((_, None)) => false,
                    // Added after we looked; leave it alone.
                    None => true,
                }
            });
        }
        Ok(())
    })
    .await?;

    tracing::info!("Reconciled work list of {}", uid);
    Ok(user)
}
