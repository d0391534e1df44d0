pub mod model;
pub mod service;

pub use model::{AcceptedBid, Bid, BidPayload, BidStatus};
pub use service::*;
