use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{KlusError, Result};
use crate::identity::SignUp;
use crate::tasks::TaskStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Klusser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveTaskStatus {
    Active,
    InProgress,
    Completed,
    Cancelled,
}

impl ActiveTaskStatus {
    /// Entry status that mirrors a task assigned to the provider.
    /// `None` for open tasks, which have no provider.
    pub fn for_task(status: TaskStatus) -> Option<Self> {
        match status {
            TaskStatus::Open => None,
            TaskStatus::Assigned => Some(Self::Active),
            TaskStatus::InProgress => Some(Self::InProgress),
            TaskStatus::Completed => Some(Self::Completed),
            TaskStatus::Cancelled => Some(Self::Cancelled),
        }
    }
}

/// Entry in a provider's work list, written when one of their bids is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTask {
    pub task_id: String,
    pub title: String,
    pub customer_name: String,
    pub amount: f64,
    #[serde(with = "crate::time_format")]
    pub accepted_at: DateTime<Utc>,
    pub status: ActiveTaskStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KlusserProfile {
    /// Contact phone; required before bidding.
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hourly_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default)]
    pub active_tasks: Vec<ActiveTask>,
}

impl KlusserProfile {
    /// Insert or replace the entry for `entry.task_id`.
    pub fn put_active_task(&mut self, entry: ActiveTask) {
        match self
            .active_tasks
            .iter_mut()
            .find(|t| t.task_id == entry.task_id)
        {
            Some(existing) => *existing = entry,
            None => self.active_tasks.push(entry),
        }
    }

    pub fn set_active_task_status(&mut self, task_id: &str, status: ActiveTaskStatus) -> bool {
        match self.active_tasks.iter_mut().find(|t| t.task_id == task_id) {
            Some(entry) => {
                entry.status = status;
                true
            }
            None => false,
        }
    }

    pub fn remove_active_task(&mut self, task_id: &str) -> bool {
        let before = self.active_tasks.len();
        self.active_tasks.retain(|t| t.task_id != task_id);
        self.active_tasks.len() != before
    }

    fn apply(&mut self, patch: &KlusserProfilePatch) {
        if let Some(phone) = &patch.phone {
            self.phone = phone.trim().to_string();
        }
        if let Some(skills) = &patch.skills {
            self.skills = skills
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(rate) = patch.hourly_rate {
            self.hourly_rate = Some(rate);
        }
        if let Some(bio) = &patch.bio {
            self.bio = Some(bio.clone()).filter(|b| !b.trim().is_empty());
        }
    }
}

/// Application profile stored next to the external identity, keyed by its uid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub klusser_profile: Option<KlusserProfile>,
    #[serde(with = "crate::time_format")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::time_format")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: &str, display_name: &str, email: &str, role: Role, now: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            email: email.to_string(),
            photo_url: None,
            role,
            phone: None,
            klusser_profile: match role {
                Role::Klusser => Some(KlusserProfile::default()),
                Role::Customer => None,
            },
            created_at: now,
            updated_at: now,
        }
    }

    /// Non-empty contact phone, preferring the klusser profile's.
    pub fn contact_phone(&self) -> Option<&str> {
        self.klusser_profile
            .as_ref()
            .map(|p| p.phone.trim())
            .filter(|p| !p.is_empty())
            .or_else(|| self.phone.as_deref().map(str::trim).filter(|p| !p.is_empty()))
    }

    /// Apply a profile patch. Only klussers carry a klusser profile.
    pub fn apply(&mut self, patch: &UpdateUserPayload) -> Result<()> {
        patch.validate()?;
        if patch.klusser.is_some() && self.role != Role::Klusser {
            return Err(KlusError::Validation(
                "only klussers have a klusser profile".into(),
            ));
        }
        if let Some(name) = &patch.display_name {
            self.display_name = name.trim().to_string();
        }
        if let Some(phone) = &patch.phone {
            self.phone = Some(phone.trim().to_string()).filter(|p| !p.is_empty());
        }
        if let Some(klusser) = &patch.klusser {
            self.klusser_profile
                .get_or_insert_with(KlusserProfile::default)
                .apply(klusser);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    #[serde(flatten)]
    pub sign_up: SignUp,
    pub role: Role,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KlusserProfilePatch {
    pub phone: Option<String>,
    pub skills: Option<Vec<String>>,
    pub hourly_rate: Option<f64>,
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserPayload {
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub klusser: Option<KlusserProfilePatch>,
}

impl UpdateUserPayload {
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.display_name {
            if name.trim().is_empty() {
                return Err(KlusError::Validation("display name cannot be empty".into()));
            }
        }
        if let Some(rate) = self.klusser.as_ref().and_then(|k| k.hourly_rate) {
            if !rate.is_finite() || rate < 0.0 {
                return Err(KlusError::Validation("hourly rate cannot be negative".into()));
            }
        }
        Ok(())
    }
}
