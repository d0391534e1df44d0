use lambda_http::{http::StatusCode, Body, Error, Response};
use serde::Serialize;

use doeklus_atoms::notifications::{self, Notification};
use doeklus_atoms::{Backend, KlusError, Session};

use crate::response::respond;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Inbox {
    notifications: Vec<Notification>,
    unread_count: usize,
}

pub async fn list_notifications(
    backend: &Backend,
    session: &Session,
    unread_only: bool,
    limit: Option<usize>,
) -> Result<Response<Body>, Error> {
    let result = async {
        let items = notifications::list_notifications(backend, session, unread_only, limit).await?;
        let unread_count = notifications::unread_count(backend, session).await?;
        Ok::<_, KlusError>(Inbox {
            notifications: items,
            unread_count,
        })
    }
    .await;
    respond(StatusCode::OK, result)
}

pub async fn mark_read(backend: &Backend, session: &Session, notification_id: &str) -> Result<Response<Body>, Error> {
    respond(
        StatusCode::OK,
        notifications::mark_read(backend, session, notification_id).await,
    )
}

pub async fn mark_all_read(backend: &Backend, session: &Session) -> Result<Response<Body>, Error> {
    let result = notifications::mark_all_read(backend, session)
        .await
        .map(|marked| serde_json::json!({ "marked": marked }));
    respond(StatusCode::OK, result)
}
