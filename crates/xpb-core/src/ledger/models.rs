use serde::Serialize;

use crate::domain::ConfigId;

/// One provisioned account as the ledger knows it, joined with owner names.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct LedgerRecord {
    pub config_id: i64,
    pub user_id: i64,
    pub email: String,
    pub client_id: Option<String>,
    /// Advisory: what was sold, not what the panel enforces.
    pub total_gb: f64,
    pub is_active: bool,
    /// Unix seconds.
    pub created_at: i64,
    /// Unix seconds of the last delivered notification.
    pub last_notified: Option<i64>,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

impl LedgerRecord {
    pub fn id(&self) -> ConfigId {
        ConfigId(self.config_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct StatusLog {
    pub log_id: i64,
    pub config_id: i64,
    pub remaining_gb: f64,
    pub remaining_days: i64,
    pub checked_at: i64,
}

/// One row of the admin user listing.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct UserSummary {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub config_count: i64,
    /// Unix seconds of the newest account, if any.
    pub last_created: Option<i64>,
}
