use lambda_http::{http::StatusCode, Body, Error, Response};
use serde::Serialize;

use doeklus_atoms::bids::{self, AcceptedBid, Bid, BidPayload};
use doeklus_atoms::tasks::Task;
use doeklus_atoms::{Backend, Session};

use crate::response::{parse_body, respond};

/// The updated task together with the bid the request was about.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BidOutcome<B: Serialize> {
    task: Task,
    bid: B,
}

fn outcome<B: Serialize>((task, bid): (Task, B)) -> BidOutcome<B> {
    BidOutcome { task, bid }
}

pub async fn submit_bid(
    backend: &Backend,
    session: &Session,
    task_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let result = match parse_body::<BidPayload>(body) {
        Ok(payload) => bids::submit_bid(backend, session, task_id, payload).await,
        Err(e) => Err(e),
    };
    respond(StatusCode::CREATED, result.map(outcome::<Bid>))
}

pub async fn edit_bid(
    backend: &Backend,
    session: &Session,
    task_id: &str,
    bid_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let result = match parse_body::<BidPayload>(body) {
        Ok(payload) => bids::edit_bid(backend, session, task_id, bid_id, payload).await,
        Err(e) => Err(e),
    };
    respond(StatusCode::OK, result.map(outcome::<Bid>))
}

pub async fn withdraw_bid(
    backend: &Backend,
    session: &Session,
    task_id: &str,
    bid_id: &str,
) -> Result<Response<Body>, Error> {
    respond(
        StatusCode::OK,
        bids::withdraw_bid(backend, session, task_id, bid_id).await,
    )
}

pub async fn accept_bid(
    backend: &Backend,
    session: &Session,
    task_id: &str,
    bid_id: &str,
) -> Result<Response<Body>, Error> {
    let result = bids::accept_bid(backend, session, task_id, bid_id).await;
    respond(StatusCode::OK, result.map(outcome::<AcceptedBid>))
}

pub async fn reject_bid(
    backend: &Backend,
    session: &Session,
    task_id: &str,
    bid_id: &str,
) -> Result<Response<Body>, Error> {
    let result = bids::reject_bid(backend, session, task_id, bid_id).await;
    respond(StatusCode::OK, result.map(outcome::<Bid>))
}
