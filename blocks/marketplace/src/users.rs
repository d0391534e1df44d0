use lambda_http::{http::StatusCode, Body, Error, Response};
use serde::{Deserialize, Serialize};

use doeklus_atoms::users::{self, RegisterPayload, UpdateUserPayload, User};
use doeklus_atoms::{Backend, KlusError, Session};

use crate::response::{parse_body, respond};

#[derive(Deserialize)]
struct LoginPayload {
    email: String,
    password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    access_token: String,
    user: User,
}

pub async fn signup(backend: &Backend, body: &[u8]) -> Result<Response<Body>, Error> {
    let result = match parse_body::<RegisterPayload>(body) {
        Ok(payload) => users::register(backend, payload).await,
        Err(e) => Err(e),
    };
    respond(StatusCode::CREATED, result)
}

pub async fn login(backend: &Backend, body: &[u8]) -> Result<Response<Body>, Error> {
    let result = async {
        let payload: LoginPayload = parse_body(body)?;
        let session = backend
            .identity
            .sign_in(&payload.email, &payload.password)
            .await?;
        let user = users::get_user(backend, session.uid()).await?;
        tracing::info!("User {} logged in", session.uid());
        Ok::<_, KlusError>(LoginResponse {
            access_token: session.access_token,
            user,
        })
    }
    .await;
    respond(StatusCode::OK, result)
}

pub async fn get_me(backend: &Backend, session: &Session) -> Result<Response<Body>, Error> {
    respond(StatusCode::OK, users::get_user(backend, session.uid()).await)
}

pub async fn update_me(backend: &Backend, session: &Session, body: &[u8]) -> Result<Response<Body>, Error> {
    let result = match parse_body::<UpdateUserPayload>(body) {
        Ok(patch) => users::update_profile(backend, session, patch).await,
        Err(e) => Err(e),
    };
    respond(StatusCode::OK, result)
}

/// `PUT /users/me/photo` with the raw image bytes as body.
pub async fn put_photo(backend: &Backend, session: &Session, body: &[u8]) -> Result<Response<Body>, Error> {
    respond(
        StatusCode::OK,
        users::set_profile_photo(backend, session, body).await,
    )
}

pub async fn delete_photo(backend: &Backend, session: &Session) -> Result<Response<Body>, Error> {
    respond(StatusCode::OK, users::remove_profile_photo(backend, session).await)
}

pub async fn reconcile(backend: &Backend, session: &Session) -> Result<Response<Body>, Error> {
    respond(
        StatusCode::OK,
        users::reconcile_active_tasks(backend, session).await,
    )
}
