use lambda_http::{http::StatusCode, Body, Error, Response};

use doeklus_atoms::tasks::{self, CreateTaskPayload, UpdateTaskPayload};
use doeklus_atoms::{Backend, KlusError, Session};

use crate::response::{self, parse_body, respond};

/// Create a new task
pub async fn create_task(backend: &Backend, session: &Session, body: &[u8]) -> Result<Response<Body>, Error> {
    let result = match parse_body::<CreateTaskPayload>(body) {
        Ok(payload) => tasks::create_task(backend, session, payload).await,
        Err(e) => Err(e),
    };
    respond(StatusCode::CREATED, result)
}

pub async fn get_task(backend: &Backend, task_id: &str) -> Result<Response<Body>, Error> {
    respond(StatusCode::OK, tasks::get_task(backend, task_id).await)
}

pub async fn update_task(
    backend: &Backend,
    session: &Session,
    task_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let result = match parse_body::<UpdateTaskPayload>(body) {
        Ok(payload) => tasks::update_task(backend, session, task_id, payload).await,
        Err(e) => Err(e),
    };
    respond(StatusCode::OK, result)
}

pub async fn delete_task(backend: &Backend, session: &Session, task_id: &str) -> Result<Response<Body>, Error> {
    match tasks::delete_task(backend, session, task_id).await {
        Ok(()) => response::no_content(),
        Err(e) => response::from_error(e),
    }
}

/// `GET /tasks?scope=mine|open|assigned`. Defaults to the open feed.
pub async fn list_tasks(
    backend: &Backend,
    session: &Session,
    scope: Option<&str>,
    limit: Option<usize>,
) -> Result<Response<Body>, Error> {
    let result = match scope.unwrap_or("open") {
        "open" => tasks::list_open_tasks(backend, limit).await,
        "mine" => tasks::list_tasks_for_owner(backend, session, limit).await,
        "assigned" => tasks::list_tasks_for_klusser(backend, session, limit).await,
        other => Err(KlusError::Validation(format!("unknown scope: {}", other))),
    };
    respond(StatusCode::OK, result)
}

pub async fn start_task(backend: &Backend, session: &Session, task_id: &str) -> Result<Response<Body>, Error> {
    respond(StatusCode::OK, tasks::start_task(backend, session, task_id).await)
}

pub async fn complete_task(backend: &Backend, session: &Session, task_id: &str) -> Result<Response<Body>, Error> {
    respond(StatusCode::OK, tasks::complete_task(backend, session, task_id).await)
}

pub async fn cancel_task(backend: &Backend, session: &Session, task_id: &str) -> Result<Response<Body>, Error> {
    respond(StatusCode::OK, tasks::cancel_task(backend, session, task_id).await)
}
