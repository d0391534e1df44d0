//! JSON responses and the mapping from lifecycle errors to HTTP statuses.

use lambda_http::{http::StatusCode, Body, Error, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use doeklus_atoms::{KlusError, StoreError};

pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(value)?.into())
        .map_err(Box::new)?)
}

pub fn no_content() -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .body(Body::Empty)
        .map_err(Box::new)?)
}

pub fn error(status: StatusCode, code: &str, message: &str) -> Result<Response<Body>, Error> {
    json(
        status,
        &serde_json::json!({"error": message, "code": code}),
    )
}

pub fn not_found() -> Result<Response<Body>, Error> {
    error(StatusCode::NOT_FOUND, "not_found", "Not found")
}

pub fn method_not_allowed() -> Result<Response<Body>, Error> {
    error(
        StatusCode::METHOD_NOT_ALLOWED,
        "method_not_allowed",
        "Method not allowed",
    )
}

pub fn status_for(err: &KlusError) -> StatusCode {
    match err {
        KlusError::Validation(_) | KlusError::MissingPhone | KlusError::Media(_) => {
            StatusCode::BAD_REQUEST
        }
        KlusError::Unauthenticated => StatusCode::UNAUTHORIZED,
        KlusError::Forbidden(_) => StatusCode::FORBIDDEN,
        KlusError::NotFound { .. } => StatusCode::NOT_FOUND,
        e if e.is_precondition() => StatusCode::CONFLICT,
        KlusError::AccountExists { .. } => StatusCode::CONFLICT,
        KlusError::Store(StoreError::Conflict { .. }) => StatusCode::CONFLICT,
        KlusError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Stable machine-readable name for an error.
pub fn code_for(err: &KlusError) -> &'static str {
    match err {
        KlusError::Validation(_) => "validation",
        KlusError::MissingPhone => "missing_phone",
        KlusError::Media(_) => "invalid_image",
        KlusError::TaskNotOpen { .. } => "task_not_open",
        KlusError::BidNotPending { .. } => "bid_not_pending",
        KlusError::DuplicateBid { .. } => "duplicate_bid",
        KlusError::InvalidTransition { .. } => "invalid_transition",
        KlusError::NotDeletable { .. } => "not_deletable",
        KlusError::Forbidden(_) => "forbidden",
        KlusError::NotFound { .. } => "not_found",
        KlusError::Unauthenticated => "unauthenticated",
        KlusError::AccountExists { .. } => "account_exists",
        KlusError::Store(StoreError::Conflict { .. }) => "conflict",
        KlusError::Store(StoreError::Unavailable(_)) => "unavailable",
        _ => "internal",
    }
}

/// Render a lifecycle error. Internal details are logged, not returned.
pub fn from_error(err: KlusError) -> Result<Response<Body>, Error> {
    let status = status_for(&err);
    if status.is_server_error() {
        tracing::error!("Request failed: {}", err);
        let message = if status == StatusCode::SERVICE_UNAVAILABLE {
            "Service temporarily unavailable, try again"
        } else {
            "Internal server error"
        };
        return error(status, code_for(&err), message);
    }
    tracing::info!("Request rejected ({}): {}", status.as_u16(), err);
    error(status, code_for(&err), &err.to_string())
}

/// Serialize `result` with `status`, or render its error.
pub fn respond<T: Serialize>(
    status: StatusCode,
    result: Result<T, KlusError>,
) -> Result<Response<Body>, Error> {
    match result {
        Ok(value) => json(status, &value),
        Err(e) => from_error(e),
    }
}

/// Decode a JSON request body; malformed input is a validation error.
pub fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, KlusError> {
    serde_json::from_slice(body).map_err(|e| KlusError::Validation(format!("invalid request body: {}", e)))
}
