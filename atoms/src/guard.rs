//! The single authorization and precondition gate.
//!
//! Every lifecycle operation on a task calls [`authorize`] with the freshly
//! loaded task before computing its change. Ownership, role and state rules
//! live here and nowhere else.

use crate::bids::BidStatus;
use crate::error::{KlusError, Result};
use crate::session::Session;
use crate::tasks::{Task, TaskStatus};
use crate::users::{Role, User};

#[derive(Debug, Clone, Copy)]
pub enum Action<'a> {
    EditTask,
    DeleteTask,
    CancelTask,
    StartTask,
    CompleteTask,
    /// `bidder` is the caller's application profile.
    SubmitBid { bidder: &'a User },
    EditBid { bid_id: &'a str },
    WithdrawBid { bid_id: &'a str },
    AcceptBid { bid_id: &'a str },
    RejectBid { bid_id: &'a str },
}

fn require_owner(session: &Session, task: &Task) -> Result<()> {
    if task.is_owner(session.uid()) {
        Ok(())
    } else {
        Err(KlusError::Forbidden("only the task owner may do this".into()))
    }
}

fn require_open(task: &Task) -> Result<()> {
    if task.status.accepts_bids() {
        Ok(())
    } else {
        Err(KlusError::TaskNotOpen {
            status: task.status,
        })
    }
}

fn require_transition(task: &Task, to: TaskStatus) -> Result<()> {
    task.status.transition(to).map(|_| ())
}

fn require_pending(task: &Task, bid_id: &str) -> Result<()> {
    let bid = task
        .bid(bid_id)
        .ok_or_else(|| KlusError::not_found("bid", bid_id))?;
    if bid.status == BidStatus::Pending {
        Ok(())
    } else {
        Err(KlusError::BidNotPending { status: bid.status })
    }
}

fn require_bid_author(session: &Session, task: &Task, bid_id: &str) -> Result<()> {
    let bid = task
        .bid(bid_id)
        .ok_or_else(|| KlusError::not_found("bid", bid_id))?;
    if bid.klusser_id == session.uid() {
        Ok(())
    } else {
        Err(KlusError::Forbidden("only the bid author may do this".into()))
    }
}

pub fn authorize(session: &Session, task: &Task, action: &Action<'_>) -> Result<()> {
    match action {
        Action::EditTask => {
            require_owner(session, task)?;
            require_open(task)
        }
        Action::DeleteTask => {
            require_owner(session, task)?;
            match task.status {
                TaskStatus::Open | TaskStatus::Cancelled => Ok(()),
                status => Err(KlusError::NotDeletable { status }),
            }
        }
        Action::CancelTask => {
            require_owner(session, task)?;
            require_transition(task, TaskStatus::Cancelled)
        }
        Action::StartTask => {
            if !task.is_assigned_to(session.uid()) {
                return Err(KlusError::Forbidden(
                    "only the assigned klusser may start this task".into(),
                ));
            }
            require_transition(task, TaskStatus::InProgress)
        }
        Action::CompleteTask => {
            if !task.is_owner(session.uid()) && !task.is_assigned_to(session.uid()) {
                return Err(KlusError::Forbidden(
                    "only the owner or the assigned klusser may complete this task".into(),
                ));
            }
            require_transition(task, TaskStatus::Completed)
        }
        Action::SubmitBid { bidder } => {
            if bidder.id != session.uid() {
                return Err(KlusError::Forbidden("profile does not belong to caller".into()));
            }
            if task.is_owner(session.uid()) {
                return Err(KlusError::Forbidden("you cannot bid on your own task".into()));
            }
            if bidder.role != Role::Klusser {
                return Err(KlusError::Forbidden("only klussers can place bids".into()));
            }
            if bidder.contact_phone().is_none() {
                return Err(KlusError::MissingPhone);
            }
            require_open(task)?;
            if task.bid_by_klusser(session.uid()).is_some() {
                return Err(KlusError::DuplicateBid {
                    klusser_id: session.uid().to_string(),
                });
            }
            Ok(())
        }
        Action::EditBid { bid_id } | Action::WithdrawBid { bid_id } => {
            require_bid_author(session, task, bid_id)?;
            require_pending(task, bid_id)
        }
        Action::AcceptBid { bid_id } | Action::RejectBid { bid_id } => {
            require_owner(session, task)?;
            require_open(task)?;
            require_pending(task, bid_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bids::BidPayload;
    use crate::clock::{Clock, ManualClock};
    use crate::session::Identity;
    use crate::tasks::TaskDetails;
    use crate::users::KlusserProfile;

    fn session(uid: &str) -> Session {
        Session::new(
            Identity {
                uid: uid.into(),
                display_name: uid.into(),
                email: format!("{}@example.nl", uid),
                photo_url: None,
            },
            "token",
        )
    }

    fn klusser(uid: &str, phone: &str) -> User {
        let now = ManualClock::default().now();
        let mut user = User::new(uid, uid, &format!("{}@example.nl", uid), Role::Klusser, now);
        user.klusser_profile = Some(KlusserProfile {
            phone: phone.into(),
            ..Default::default()
        });
        user
    }

    fn task() -> Task {
        let details = TaskDetails {
            service: "Tuin".into(),
            description: "Heg snoeien".into(),
            location: "Zwolle".into(),
            postcode: "8011 AA".into(),
            date: "2024-06-01".into(),
            time: String::new(),
            budget: String::new(),
        };
        Task::new("t1".into(), "owner", "Owner", details, ManualClock::default().now())
    }

    #[test]
    fn owner_actions_reject_strangers() {
        let task = task();
        let stranger = session("x");
        for action in [Action::EditTask, Action::DeleteTask, Action::CancelTask] {
            assert!(matches!(
                authorize(&stranger, &task, &action),
                Err(KlusError::Forbidden(_))
            ));
        }
        assert!(authorize(&session("owner"), &task, &Action::EditTask).is_ok());
    }

    #[test]
    fn submit_requires_klusser_with_phone_not_owner() {
        let task = task();
        let k = klusser("k1", "0612345678");
        assert!(authorize(&session("k1"), &task, &Action::SubmitBid { bidder: &k }).is_ok());

        let no_phone = klusser("k2", " ");
        assert!(matches!(
            authorize(&session("k2"), &task, &Action::SubmitBid { bidder: &no_phone }),
            Err(KlusError::MissingPhone)
        ));

        let owner_profile = klusser("owner", "0612345678");
        assert!(matches!(
            authorize(&session("owner"), &task, &Action::SubmitBid { bidder: &owner_profile }),
            Err(KlusError::Forbidden(_))
        ));

        let now = ManualClock::default().now();
        let customer = User::new("c1", "c1", "c1@example.nl", Role::Customer, now);
        assert!(matches!(
            authorize(&session("c1"), &task, &Action::SubmitBid { bidder: &customer }),
            Err(KlusError::Forbidden(_))
        ));
    }

    #[test]
    fn submit_on_closed_task_is_a_precondition_error() {
        let mut task = task();
        task.status = TaskStatus::Cancelled;
        let k = klusser("k1", "0612345678");
        let err = authorize(&session("k1"), &task, &Action::SubmitBid { bidder: &k }).unwrap_err();
        assert!(err.is_precondition());
    }

    #[test]
    fn withdraw_needs_author_and_pending() {
        let clock = ManualClock::default();
        let mut task = task();
        let payload = BidPayload {
            amount: 40.0,
            message: "Prima".into(),
        };
        let bid = task.add_bid(&session("k1"), &payload, clock.now()).unwrap();
        let action = Action::WithdrawBid { bid_id: &bid.id };
        assert!(matches!(
            authorize(&session("k2"), &task, &action),
            Err(KlusError::Forbidden(_))
        ));
        assert!(authorize(&session("k1"), &task, &action).is_ok());

        task.reject_bid(&bid.id).unwrap();
        assert!(matches!(
            authorize(&session("k1"), &task, &action),
            Err(KlusError::BidNotPending { .. })
        ));
    }

    #[test]
    fn delete_only_when_open_or_cancelled() {
        let mut task = task();
        let owner = session("owner");
        for (status, allowed) in [
            (TaskStatus::Open, true),
            (TaskStatus::Assigned, false),
            (TaskStatus::InProgress, false),
            (TaskStatus::Completed, false),
            (TaskStatus::Cancelled, true),
        ] {
            task.status = status;
            assert_eq!(
                authorize(&owner, &task, &Action::DeleteTask).is_ok(),
                allowed,
                "{}",
                status
            );
        }
    }

    #[test]
    fn start_and_complete_roles() {
        let mut task = task();
        task.status = TaskStatus::Assigned;
        task.klusser_id = Some("k1".into());
        assert!(authorize(&session("k1"), &task, &Action::StartTask).is_ok());
        assert!(authorize(&session("owner"), &task, &Action::StartTask).is_err());
        assert!(matches!(
            authorize(&session("owner"), &task, &Action::CompleteTask),
            Err(KlusError::InvalidTransition { .. })
        ));
        task.status = TaskStatus::InProgress;
        assert!(authorize(&session("owner"), &task, &Action::CompleteTask).is_ok());
        assert!(authorize(&session("k1"), &task, &Action::CompleteTask).is_ok());
        assert!(authorize(&session("x"), &task, &Action::CompleteTask).is_err());
    }
}
