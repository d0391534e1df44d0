use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::bids::{AcceptedBid, Bid};
use crate::tasks::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    BidReceived,
    BidAccepted,
    TaskCompleted,
}

impl NotificationType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BidReceived => "bid_received",
            Self::BidAccepted => "bid_accepted",
            Self::TaskCompleted => "task_completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Derived from the triggering event so redelivery is a no-op.
    pub id: String,
    /// Recipient.
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    /// Context for deep links (task id, amounts, names).
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub read: bool,
    #[serde(with = "crate::time_format")]
    pub created_at: DateTime<Utc>,
}

fn euro(amount: f64) -> String {
    format!("€{:.2}", amount)
}

impl Notification {
    pub fn bid_received(task: &Task, bid: &Bid, now: DateTime<Utc>) -> Self {
        Self {
            id: format!("{}:{}:{}", NotificationType::BidReceived.as_str(), task.id, bid.id),
            user_id: task.user_id.clone(),
            kind: NotificationType::BidReceived,
            title: "Nieuw bod ontvangen".to_string(),
            message: format!(
                "{} heeft een bod van {} uitgebracht op \"{}\"",
                bid.klusser_name,
                euro(bid.amount),
                task.title()
            ),
            data: json!({
                "taskId": task.id,
                "bidId": bid.id,
                "bidAmount": bid.amount,
                "klusserId": bid.klusser_id,
                "klusserName": bid.klusser_name,
            }),
            read: false,
            created_at: now,
        }
    }

    pub fn bid_accepted(task: &Task, accepted: &AcceptedBid, now: DateTime<Utc>) -> Self {
        Self {
            id: format!(
                "{}:{}:{}",
                NotificationType::BidAccepted.as_str(),
                task.id,
                accepted.bid_id
            ),
            user_id: accepted.klusser_id.clone(),
            kind: NotificationType::BidAccepted,
            title: "Je bod is geaccepteerd!".to_string(),
            message: format!(
                "{} heeft je bod van {} op \"{}\" geaccepteerd",
                task.customer_name,
                euro(accepted.amount),
                task.title()
            ),
            data: json!({
                "taskId": task.id,
                "bidId": accepted.bid_id,
                "bidAmount": accepted.amount,
                "customerId": task.user_id,
                "customerName": task.customer_name,
            }),
            read: false,
            created_at: now,
        }
    }

    /// Sent to whichever party did not mark the task completed.
    pub fn task_completed(task: &Task, recipient: &str, completed_by: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: format!("{}:{}", NotificationType::TaskCompleted.as_str(), task.id),
            user_id: recipient.to_string(),
            kind: NotificationType::TaskCompleted,
            title: "Klus afgerond".to_string(),
            message: format!("{} heeft \"{}\" als afgerond gemarkeerd", completed_by, task.title()),
            data: json!({
                "taskId": task.id,
                "amount": task.accepted_bid.as_ref().map(|a| a.amount),
                "klusserId": task.klusser_id,
            }),
            read: false,
            created_at: now,
        }
    }
}
