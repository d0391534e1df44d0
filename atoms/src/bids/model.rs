use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{KlusError, Result};
use crate::session::Session;
use crate::tasks::{Task, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    Pending,
    Accepted,
    Rejected,
}

impl BidStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    /// Only `pending -> accepted` and `pending -> rejected` exist.
    pub fn can_transition_to(self, next: BidStatus) -> bool {
        self == BidStatus::Pending && next != BidStatus::Pending
    }
}

impl fmt::Display for BidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provider's priced offer, embedded in its task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub id: String,
    pub klusser_id: String,
    /// Snapshot of the bidder at submission time.
    pub klusser_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub klusser_photo: Option<String>,
    pub amount: f64,
    pub message: String,
    pub status: BidStatus,
    #[serde(with = "crate::time_format")]
    pub created_at: DateTime<Utc>,
    #[serde(
        default,
        with = "crate::time_format::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Terms of the winning bid, copied onto the task at acceptance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedBid {
    pub bid_id: String,
    pub klusser_id: String,
    pub klusser_name: String,
    pub amount: f64,
    pub message: String,
    #[serde(with = "crate::time_format")]
    pub accepted_at: DateTime<Utc>,
}

/// Input for submitting or editing a bid.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BidPayload {
    pub amount: f64,
    pub message: String,
}

impl BidPayload {
    pub fn validate(&self) -> Result<()> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(KlusError::Validation("amount must be greater than zero".into()));
        }
        if self.message.trim().is_empty() {
            return Err(KlusError::Validation("message is required".into()));
        }
        Ok(())
    }
}

// Bid-list transitions. Callers run the authorization gate first; these
// re-check the state they depend on so a stale caller cannot corrupt the list.
impl Task {
    pub(crate) fn add_bid(
        &mut self,
        session: &Session,
        payload: &BidPayload,
        now: DateTime<Utc>,
    ) -> Result<Bid> {
        if !self.status.accepts_bids() {
            return Err(KlusError::TaskNotOpen {
                status: self.status,
            });
        }
        if self.bid_by_klusser(session.uid()).is_some() {
            return Err(KlusError::DuplicateBid {
                klusser_id: session.uid().to_string(),
            });
        }
        let bid = Bid {
            id: uuid::Uuid::new_v4().to_string(),
            klusser_id: session.uid().to_string(),
            klusser_name: session.display_name().to_string(),
            klusser_photo: session.identity.photo_url.clone(),
            amount: payload.amount,
            message: payload.message.trim().to_string(),
            status: BidStatus::Pending,
            created_at: now,
            updated_at: None,
        };
        self.bids.push(bid.clone());
        Ok(bid)
    }

    fn pending_bid_mut(&mut self, bid_id: &str) -> Result<&mut Bid> {
        let bid = self
            .bids
            .iter_mut()
            .find(|b| b.id == bid_id)
            .ok_or_else(|| KlusError::not_found("bid", bid_id))?;
        if bid.status != BidStatus::Pending {
            return Err(KlusError::BidNotPending { status: bid.status });
        }
        Ok(bid)
    }

    pub(crate) fn edit_bid(
        &mut self,
        bid_id: &str,
        payload: &BidPayload,
        now: DateTime<Utc>,
    ) -> Result<Bid> {
        let bid = self.pending_bid_mut(bid_id)?;
        bid.amount = payload.amount;
        bid.message = payload.message.trim().to_string();
        bid.updated_at = Some(now);
        Ok(bid.clone())
    }

    pub(crate) fn remove_bid(&mut self, bid_id: &str) -> Result<Bid> {
        self.pending_bid_mut(bid_id)?;
        let index = self
            .bids
            .iter()
            .position(|b| b.id == bid_id)
            .ok_or_else(|| KlusError::not_found("bid", bid_id))?;
        Ok(self.bids.remove(index))
    }

    /// Accept one bid and reject every other one in the same step.
    pub(crate) fn accept_bid(&mut self, bid_id: &str, now: DateTime<Utc>) -> Result<AcceptedBid> {
        if !self.status.accepts_bids() {
            return Err(KlusError::TaskNotOpen {
                status: self.status,
            });
        }
        let next = self.status.transition(TaskStatus::Assigned)?;
        let winner = self.pending_bid_mut(bid_id)?.clone();

        for bid in &mut self.bids {
            bid.status = if bid.id == winner.id {
                BidStatus::Accepted
            } else {
                BidStatus::Rejected
            };
        }
        let accepted = AcceptedBid {
            bid_id: winner.id.clone(),
            klusser_id: winner.klusser_id.clone(),
            klusser_name: winner.klusser_name.clone(),
            amount: winner.amount,
            message: winner.message.clone(),
            accepted_at: now,
        };
        self.status = next;
        self.klusser_id = Some(winner.klusser_id);
        self.accepted_bid = Some(accepted.clone());
        Ok(accepted)
    }

    pub(crate) fn reject_bid(&mut self, bid_id: &str) -> Result<Bid> {
        if !self.status.accepts_bids() {
            return Err(KlusError::TaskNotOpen {
                status: self.status,
            });
        }
        let bid = self.pending_bid_mut(bid_id)?;
        bid.status = BidStatus::Rejected;
        Ok(bid.clone())
    }

    /// Reject everything still pending; used when the task is cancelled.
    pub(crate) fn reject_pending_bids(&mut self) -> usize {
        let mut rejected = 0;
        for bid in self.bids.iter_mut().filter(|b| b.status == BidStatus::Pending) {
            bid.status = BidStatus::Rejected;
            rejected += 1;
        }
        rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::session::Identity;
    use crate::tasks::TaskDetails;

    fn session(uid: &str) -> Session {
        Session::new(
            Identity {
                uid: uid.into(),
                display_name: format!("Klusser {}", uid),
                email: format!("{}@example.nl", uid),
                photo_url: None,
            },
            "token",
        )
    }

    fn task() -> Task {
        let details = TaskDetails {
            service: "Schilderen".into(),
            description: "Woonkamer schilderen".into(),
            location: "Amsterdam".into(),
            postcode: "1012 AB".into(),
            date: "2024-06-01".into(),
            time: String::new(),
            budget: String::new(),
        };
        Task::new("t1".into(), "owner", "Eva", details, ManualClock::default().now())
    }

    fn payload(amount: f64) -> BidPayload {
        BidPayload {
            amount,
            message: "Kan morgen beginnen".into(),
        }
    }

    #[test]
    fn payload_validation() {
        assert!(payload(10.0).validate().is_ok());
        assert!(payload(0.0).validate().is_err());
        assert!(payload(-3.0).validate().is_err());
        assert!(payload(f64::NAN).validate().is_err());
        let blank = BidPayload {
            amount: 10.0,
            message: "   ".into(),
        };
        assert!(blank.validate().is_err());
    }

    #[test]
    fn bid_status_transitions() {
        assert!(BidStatus::Pending.can_transition_to(BidStatus::Accepted));
        assert!(BidStatus::Pending.can_transition_to(BidStatus::Rejected));
        assert!(!BidStatus::Accepted.can_transition_to(BidStatus::Rejected));
        assert!(!BidStatus::Rejected.can_transition_to(BidStatus::Pending));
    }

    #[test]
    fn accept_rejects_the_rest() {
        let clock = ManualClock::default();
        let mut task = task();
        let a = task.add_bid(&session("a"), &payload(80.0), clock.now()).unwrap();
        let b = task.add_bid(&session("b"), &payload(90.0), clock.now()).unwrap();
        let c = task.add_bid(&session("c"), &payload(70.0), clock.now()).unwrap();

        let accepted = task.accept_bid(&b.id, clock.now()).unwrap();
        let statuses: Vec<_> = task.bids.iter().map(|x| (x.id.clone(), x.status)).collect();
        assert_eq!(
            statuses,
            vec![
                (a.id, BidStatus::Rejected),
                (b.id.clone(), BidStatus::Accepted),
                (c.id, BidStatus::Rejected),
            ]
        );
        assert_eq!(task.status, TaskStatus::Assigned);
        assert_eq!(task.klusser_id.as_deref(), Some("b"));
        assert_eq!(accepted.amount, 90.0);
        assert_eq!(task.accepted_bid.as_ref(), Some(&accepted));
        assert!(task.check_invariants().is_ok());
    }

    #[test]
    fn second_accept_fails_on_assigned_task() {
        let clock = ManualClock::default();
        let mut task = task();
        let a = task.add_bid(&session("a"), &payload(80.0), clock.now()).unwrap();
        let b = task.add_bid(&session("b"), &payload(90.0), clock.now()).unwrap();
        task.accept_bid(&a.id, clock.now()).unwrap();
        assert!(matches!(
            task.accept_bid(&b.id, clock.now()),
            Err(KlusError::TaskNotOpen { status: TaskStatus::Assigned })
        ));
        assert_eq!(task.accepted().map(|x| x.id.as_str()), Some(a.id.as_str()));
    }

    #[test]
    fn duplicate_bid_is_rejected() {
        let clock = ManualClock::default();
        let mut task = task();
        task.add_bid(&session("a"), &payload(80.0), clock.now()).unwrap();
        assert!(matches!(
            task.add_bid(&session("a"), &payload(60.0), clock.now()),
            Err(KlusError::DuplicateBid { .. })
        ));
        assert_eq!(task.bids.len(), 1);
    }

    #[test]
    fn edit_and_remove_require_pending() {
        let clock = ManualClock::default();
        let mut task = task();
        let a = task.add_bid(&session("a"), &payload(80.0), clock.now()).unwrap();
        task.reject_bid(&a.id).unwrap();
        assert!(matches!(
            task.edit_bid(&a.id, &payload(60.0), clock.now()),
            Err(KlusError::BidNotPending { status: BidStatus::Rejected })
        ));
        assert!(matches!(
            task.remove_bid(&a.id),
            Err(KlusError::BidNotPending { .. })
        ));
    }

    #[test]
    fn edit_stamps_updated_at() {
        let clock = ManualClock::default();
        let mut task = task();
        let a = task.add_bid(&session("a"), &payload(80.0), clock.now()).unwrap();
        assert!(a.updated_at.is_none());
        let edited = task.edit_bid(&a.id, &payload(65.0), clock.now()).unwrap();
        assert_eq!(edited.amount, 65.0);
        assert!(edited.updated_at.is_some());
    }

    #[test]
    fn reject_leaves_task_open() {
        let clock = ManualClock::default();
        let mut task = task();
        let a = task.add_bid(&session("a"), &payload(80.0), clock.now()).unwrap();
        let b = task.add_bid(&session("b"), &payload(85.0), clock.now()).unwrap();
        task.reject_bid(&a.id).unwrap();
        assert_eq!(task.status, TaskStatus::Open);
        assert_eq!(task.bid(&b.id).map(|x| x.status), Some(BidStatus::Pending));
    }
}
