//! HTTP handlers for the marketplace: tasks, bids, user profiles and
//! notifications. Each handler decodes the request, calls the lifecycle
//! service and renders the outcome.

pub mod bids;
pub mod notifications;
pub mod response;
pub mod tasks;
pub mod users;
