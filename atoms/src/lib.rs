//! Task and bid lifecycle for the Doeklus marketplace.
//!
//! Customers post tasks, klussers bid on them, the customer accepts one bid
//! and the work runs to completion. Every operation takes the caller's
//! [`Session`] and a [`Backend`] bundling the collaborators.

pub mod backend;
pub mod bids;
pub mod clock;
pub mod error;
pub mod guard;
pub mod identity;
pub mod media;
pub mod notifications;
pub mod retry;
pub mod session;
pub mod store;
pub mod tasks;
pub mod time_format;
pub mod users;

pub use backend::Backend;
pub use error::{KlusError, Result, StoreError};
pub use session::{Identity, Session};
