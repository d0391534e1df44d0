use doeklus_atoms::{KlusError, Session};
use doeklus_shared::AppState;
use lambda_http::http::header::{HeaderValue, AUTHORIZATION};
use lambda_http::{
    http::{Method, StatusCode},
    Body, Error, Request, RequestExt, Response,
};
use marketplace_block::{bids, notifications, response, tasks, users};
use std::sync::Arc;

fn with_cors_headers(mut resp: Response<Body>) -> Response<Body> {
    let headers = resp.headers_mut();
    headers.insert("Access-Control-Allow-Origin", HeaderValue::from_static("*"));
    headers.insert(
        "Access-Control-Allow-Methods",
        HeaderValue::from_static("GET,POST,PUT,PATCH,DELETE,OPTIONS"),
    );
    headers.insert(
        "Access-Control-Allow-Headers",
        HeaderValue::from_static("Content-Type,Authorization"),
    );
    resp
}

fn query_param<'a>(event: &'a Request, name: &str) -> Option<&'a str> {
    event
        .query_string_parameters_ref()
        .and_then(|params| params.first(name))
}

fn parse_limit(event: &Request) -> Result<Option<usize>, KlusError> {
    query_param(event, "limit")
        .map(|v| {
            v.parse::<usize>()
                .map_err(|_| KlusError::Validation(format!("invalid limit: {}", v)))
        })
        .transpose()
}

fn bearer_token(event: &Request) -> Option<&str> {
    event
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

async fn authenticate(event: &Request, state: &AppState) -> Result<Session, KlusError> {
    let token = bearer_token(event).ok_or(KlusError::Unauthenticated)?;
    state.backend.identity.authenticate(token).await
}

/// Main Lambda handler - routes requests to the marketplace block
pub async fn function_handler(event: Request, state: Arc<AppState>) -> Result<Response<Body>, Error> {
    let method = event.method();
    let path = event.uri().path();
    tracing::info!("API Lambda invoked - Method: {} Path: {}", method, path);

    // CORS preflight
    if method == Method::OPTIONS {
        let resp = Response::builder()
            .status(StatusCode::OK)
            .body(Body::Empty)
            .map_err(Box::new)?;
        return Ok(with_cors_headers(resp));
    }

    route(&event, &state).await.map(with_cors_headers)
}

async fn route(event: &Request, state: &AppState) -> Result<Response<Body>, Error> {
    let backend = &state.backend;
    let method = event.method();
    let body = event.body();
    let parts: Vec<&str> = event
        .uri()
        .path()
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    // Public routes
    match (method, parts.as_slice()) {
        (&Method::POST, ["signup"]) => return users::signup(backend, body).await,
        (&Method::POST, ["login"]) => return users::login(backend, body).await,
        (_, ["signup"]) | (_, ["login"]) => return response::method_not_allowed(),
        _ => {}
    }

    let session = match authenticate(event, state).await {
        Ok(session) => session,
        Err(e) => return response::from_error(e),
    };
    let limit = match parse_limit(event) {
        Ok(limit) => limit,
        Err(e) => return response::from_error(e),
    };

    match (method, parts.as_slice()) {
        // --- USERS ---
        (&Method::GET, ["users", "me"]) => users::get_me(backend, &session).await,
        (&Method::PATCH, ["users", "me"]) => users::update_me(backend, &session, body).await,
        (&Method::PUT, ["users", "me", "photo"]) => users::put_photo(backend, &session, body).await,
        (&Method::DELETE, ["users", "me", "photo"]) => users::delete_photo(backend, &session).await,
        (&Method::POST, ["users", "me", "reconcile"]) => users::reconcile(backend, &session).await,

        // --- TASKS ---
        (&Method::GET, ["tasks"]) => {
            tasks::list_tasks(
                backend,
                &session,
                query_param(event, "scope"),
                limit,
            )
            .await
        }
        (&Method::POST, ["tasks"]) => tasks::create_task(backend, &session, body).await,
        (&Method::GET, ["tasks", task_id]) => tasks::get_task(backend, task_id).await,
        (&Method::PATCH, ["tasks", task_id]) => {
            tasks::update_task(backend, &session, task_id, body).await
        }
        (&Method::DELETE, ["tasks", task_id]) => tasks::delete_task(backend, &session, task_id).await,
        (&Method::POST, ["tasks", task_id, "start"]) => {
            tasks::start_task(backend, &session, task_id).await
        }
        (&Method::POST, ["tasks", task_id, "complete"]) => {
            tasks::complete_task(backend, &session, task_id).await
        }
        (&Method::POST, ["tasks", task_id, "cancel"]) => {
            tasks::cancel_task(backend, &session, task_id).await
        }

        // --- BIDS ---
        (&Method::POST, ["tasks", task_id, "bids"]) => {
            bids::submit_bid(backend, &session, task_id, body).await
        }
        (&Method::PATCH, ["tasks", task_id, "bids", bid_id]) => {
            bids::edit_bid(backend, &session, task_id, bid_id, body).await
        }
        (&Method::DELETE, ["tasks", task_id, "bids", bid_id]) => {
            bids::withdraw_bid(backend, &session, task_id, bid_id).await
        }
        (&Method::POST, ["tasks", task_id, "bids", bid_id, "accept"]) => {
            bids::accept_bid(backend, &session, task_id, bid_id).await
        }
        (&Method::POST, ["tasks", task_id, "bids", bid_id, "reject"]) => {
            bids::reject_bid(backend, &session, task_id, bid_id).await
        }

        // --- NOTIFICATIONS ---
        (&Method::GET, ["notifications"]) => {
            let unread_only = query_param(event, "unread").is_some_and(|v| v == "true" || v == "1");
            notifications::list_notifications(backend, &session, unread_only, limit).await
        }
        (&Method::POST, ["notifications", "read-all"]) => {
            notifications::mark_all_read(backend, &session).await
        }
        (&Method::POST, ["notifications", notification_id, "read"]) => {
            notifications::mark_read(backend, &session, notification_id).await
        }

        _ => response::not_found(),
    }
}
