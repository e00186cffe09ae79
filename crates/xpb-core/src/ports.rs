//! Hexagonal ports between the core workflows and their backing stores.
//!
//! `AccountPanel` and `LedgerStore` are also the seam for the two known
//! read-modify-write races (`extend_account`, `add_quota`): neither has a
//! compare-and-swap today, and a locking or versioned implementation can be
//! swapped in behind these traits without touching callers.

use async_trait::async_trait;
use chrono::TimeDelta;

use crate::{
    domain::ConfigId,
    ledger::LedgerRecord,
    panel::{AccountStatus, PanelAccount},
    Result,
};

/// Account-lifecycle operations against the remote panel.
#[async_trait]
pub trait AccountPanel: Send + Sync {
    async fn ensure_authenticated(&self) -> bool;

    /// Live status; `None` covers both "not found" and "could not ask".
    async fn get_status(&self, email: &str) -> Option<AccountStatus>;

    /// Provision a new account and return its generated client id.
    ///
    /// Not idempotent: a retry after an ambiguous failure can leave two
    /// accounts under the same email.
    async fn create_account(&self, email: &str, total_bytes: i64, expiry_ms: i64)
        -> Result<String>;

    /// Add quota and push expiry (full overwrite of the client on the panel).
    async fn extend_account(
        &self,
        email: &str,
        client_id: &str,
        additional_gb: f64,
        extend_by: TimeDelta,
    ) -> Result<()>;

    /// Every client of the configured inbound, enriched with live status.
    async fn list_all_accounts(&self) -> Result<Vec<PanelAccount>>;

    async fn delete_account(&self, client_id: &str) -> Result<()>;
}

/// The subset of the local ledger used by reconciliation and notification.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn insert(
        &self,
        user_id: i64,
        email: &str,
        client_id: &str,
        total_gb: f64,
    ) -> Result<ConfigId>;

    async fn set_active(&self, email: &str, user_id: i64, active: bool) -> Result<()>;

    async fn set_notified(&self, config_id: ConfigId, at: i64) -> Result<()>;

    /// Returns `false` when no record matched.
    async fn add_quota(&self, email: &str, user_id: i64, delta_gb: f64) -> Result<bool>;

    /// Returns `false` when there was nothing to delete.
    async fn delete_by_client_id(&self, client_id: &str) -> Result<bool>;

    async fn all_records(&self) -> Result<Vec<LedgerRecord>>;

    async fn active_records(&self) -> Result<Vec<LedgerRecord>>;

    async fn log_status_check(
        &self,
        config_id: ConfigId,
        remaining_gb: f64,
        remaining_days: i64,
    ) -> Result<()>;
}
