use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::TaskStatus;
use crate::bids::model::{AcceptedBid, Bid, BidStatus};
use crate::error::{KlusError, Result};

/// Free-form task attributes supplied by the customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDetails {
    pub service: String,
    pub description: String,
    pub location: String,
    pub postcode: String,
    pub date: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub budget: String,
}

pub type CreateTaskPayload = TaskDetails;

impl TaskDetails {
    /// Presence check only; formats are not enforced.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("service", &self.service),
            ("description", &self.description),
            ("location", &self.location),
            ("postcode", &self.postcode),
            ("date", &self.date),
        ] {
            if value.trim().is_empty() {
                return Err(KlusError::Validation(format!("{} is required", field)));
            }
        }
        Ok(())
    }

    pub fn apply(&mut self, patch: &UpdateTaskPayload) {
        let fields = [
            (&mut self.service, &patch.service),
            (&mut self.description, &patch.description),
            (&mut self.location, &patch.location),
            (&mut self.postcode, &patch.postcode),
            (&mut self.date, &patch.date),
            (&mut self.time, &patch.time),
            (&mut self.budget, &patch.budget),
        ];
        for (target, value) in fields {
            if let Some(value) = value {
                *target = value.clone();
            }
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskPayload {
    pub service: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub postcode: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub budget: Option<String>,
}

impl UpdateTaskPayload {
    pub fn is_empty(&self) -> bool {
        [
            &self.service,
            &self.description,
            &self.location,
            &self.postcode,
            &self.date,
            &self.time,
            &self.budget,
        ]
        .iter()
        .all(|f| f.is_none())
    }
}

/// A unit of work ("klus") posted by a customer, with its bids embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    /// Owning customer; never changes.
    pub user_id: String,
    /// Owner's display name when the task was posted.
    #[serde(default)]
    pub customer_name: String,
    #[serde(flatten)]
    pub details: TaskDetails,
    pub status: TaskStatus,
    /// Submission order.
    #[serde(default)]
    pub bids: Vec<Bid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub klusser_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_bid: Option<AcceptedBid>,
    #[serde(with = "crate::time_format")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::time_format")]
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        id: String,
        owner_id: &str,
        customer_name: &str,
        details: TaskDetails,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id: owner_id.to_string(),
            customer_name: customer_name.to_string(),
            details,
            status: TaskStatus::Open,
            bids: Vec::new(),
            klusser_id: None,
            accepted_bid: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owner(&self, uid: &str) -> bool {
        self.user_id == uid
    }

    pub fn is_assigned_to(&self, uid: &str) -> bool {
        self.klusser_id.as_deref() == Some(uid)
    }

    /// Short human-readable label used in notifications and provider overviews.
    pub fn title(&self) -> &str {
        &self.details.service
    }

    pub fn bid(&self, bid_id: &str) -> Option<&Bid> {
        self.bids.iter().find(|b| b.id == bid_id)
    }

    pub fn bid_by_klusser(&self, klusser_id: &str) -> Option<&Bid> {
        self.bids.iter().find(|b| b.klusser_id == klusser_id)
    }

    pub fn accepted(&self) -> Option<&Bid> {
        self.bids.iter().find(|b| b.status == BidStatus::Accepted)
    }

    /// Check the cross-field invariants between `status`, `bids`,
    /// `klusserId` and `acceptedBid`.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        let accepted: Vec<_> = self
            .bids
            .iter()
            .filter(|b| b.status == BidStatus::Accepted)
            .collect();
        if accepted.len() > 1 {
            return Err(format!("{} accepted bids", accepted.len()));
        }
        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = self.bids.iter().find(|b| !seen.insert(b.klusser_id.as_str())) {
            return Err(format!("klusser {} has more than one bid", dup.klusser_id));
        }
        match accepted.first() {
            Some(bid) => {
                if self.status == TaskStatus::Open {
                    return Err("open task has an accepted bid".into());
                }
                if self.klusser_id.as_deref() != Some(bid.klusser_id.as_str()) {
                    return Err("klusserId does not match the accepted bid".into());
                }
                if self.accepted_bid.as_ref().map(|a| a.bid_id.as_str()) != Some(bid.id.as_str()) {
                    return Err("acceptedBid snapshot does not match the accepted bid".into());
                }
            }
            None => {
                if self.status.has_provider() {
                    return Err(format!("{} task without an accepted bid", self.status));
                }
                if self.status == TaskStatus::Open && self.klusser_id.is_some() {
                    return Err("open task has a klusserId".into());
                }
            }
        }
        Ok(())
    }
}
