use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::JobLike;
use crate::wire::{de_id, de_opt_timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl std::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub email: String,
    #[serde(default, alias = "name")]
    pub full_name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// An engineer registration waiting for an admin decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub status: ApplicationStatus,
    pub user: UserSummary,
    #[serde(default, alias = "created_at", deserialize_with = "de_opt_timestamp")]
    pub submitted_at: Option<DateTime<Utc>>,
}

impl JobLike for Application {
    fn is_active(&self) -> bool {
        self.status == ApplicationStatus::Pending
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminAccount {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub email: String,
    #[serde(default, alias = "name")]
    pub full_name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool { true }

#[derive(Debug, Clone, Serialize)]
pub struct NewAdmin {
    pub email: String,
    pub full_name: String,
    pub password: String,
}

/// Counters shown on the dashboard cards. Missing counters read as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardStats {
    pub total_users: u64,
    pub total_engineers: u64,
    pub total_customers: u64,
    pub total_admins: u64,
    #[serde(alias = "pending_engineers")]
    pub pending_applications: u64,
    pub training_files: u64,
    pub training_jobs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityEntry {
    #[serde(default, alias = "message")]
    pub description: String,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardOverview {
    #[serde(default)]
    pub stats: DashboardStats,
    #[serde(default)]
    pub recent_activity: Vec<ActivityEntry>,
}

/// User lifecycle toggles exposed to admins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    Activate,
    Suspend,
    Deactivate,
}

impl UserAction {
    pub fn past_tense(&self) -> &'static str {
        match self {
            UserAction::Activate => "activated",
            UserAction::Suspend => "suspended",
            UserAction::Deactivate => "deactivated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_defaults_to_pending() {
        let app: Application = serde_json::from_str(
            r#"{"id": 5, "user": {"id": 9, "email": "eng@example.com", "name": "Eng One"}}"#,
        )
        .unwrap();
        assert_eq!(app.status, ApplicationStatus::Pending);
        assert_eq!(app.user.full_name, "Eng One");
        assert!(app.is_active());
    }

    #[test]
    fn test_stats_tolerate_missing_counters() {
        let stats: DashboardStats =
            serde_json::from_str(r#"{"total_users": 40, "pending_engineers": 3}"#).unwrap();
        assert_eq!(stats.total_users, 40);
        assert_eq!(stats.pending_applications, 3);
        assert_eq!(stats.total_admins, 0);
    }
}
