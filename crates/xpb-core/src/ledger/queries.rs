//! Ledger queries.

use async_trait::async_trait;
use tracing::{debug, info};

use super::{
    db::{unix_timestamp, Ledger},
    models::{LedgerRecord, StatusLog, UserSummary},
};
use crate::{
    domain::{ConfigId, UserProfile},
    ports::LedgerStore,
    Result,
};

const SECS_PER_YEAR: i64 = 365 * 86_400;

const RECORD_COLUMNS: &str = "c.config_id, c.user_id, c.email, c.client_id, c.total_gb, \
     c.is_active, c.created_at, c.last_notified, u.username, u.first_name \
     FROM configs c LEFT JOIN users u ON u.user_id = c.user_id";

impl Ledger {
    // =========================================================================
    // Users
    // =========================================================================

    /// Register a user; an existing row is left untouched.
    pub async fn upsert_user(&self, profile: &UserProfile) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO users (user_id, username, first_name, last_name, join_date) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(profile.user_id)
        .bind(&profile.username)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn user_profile(&self, user_id: i64) -> Result<Option<UserProfile>> {
        let row = sqlx::query_as::<_, (i64, Option<String>, Option<String>, Option<String>)>(
            "SELECT user_id, username, first_name, last_name FROM users WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(|(user_id, username, first_name, last_name)| UserProfile {
            user_id,
            username,
            first_name,
            last_name,
        }))
    }

    /// Users with their account counts, most recently provisioned first.
    pub async fn user_summaries(&self, limit: i64) -> Result<Vec<UserSummary>> {
        let rows = sqlx::query_as::<_, UserSummary>(
            "SELECT u.user_id, u.username, u.first_name, \
                    COUNT(c.config_id) AS config_count, MAX(c.created_at) AS last_created \
             FROM users u LEFT JOIN configs c ON c.user_id = u.user_id \
             GROUP BY u.user_id \
             ORDER BY last_created IS NULL, last_created DESC, u.user_id \
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Broadcast audience: every registered user.
    pub async fn all_user_ids(&self) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>("SELECT user_id FROM users ORDER BY user_id")
            .fetch_all(self.pool())
            .await?;
        Ok(ids)
    }

    // =========================================================================
    // Configs
    // =========================================================================

    /// Store a new ownership record. The owner row is created on demand.
    pub async fn insert_config(
        &self,
        user_id: i64,
        email: &str,
        client_id: &str,
        total_gb: f64,
    ) -> Result<ConfigId> {
        let now = unix_timestamp();
        let mut tx = self.pool().begin().await?;

        sqlx::query("INSERT OR IGNORE INTO users (user_id, join_date) VALUES (?, ?)")
            .bind(user_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        let id = sqlx::query(
            "INSERT INTO configs (user_id, email, client_id, total_gb, created_at, is_active) \
             VALUES (?, ?, ?, ?, ?, 1)",
        )
        .bind(user_id)
        .bind(email)
        .bind(client_id)
        .bind(total_gb)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        tx.commit().await?;
        info!(user_id, email, config_id = id, "ledger record added");
        Ok(ConfigId(id))
    }

    pub async fn get_config(&self, config_id: ConfigId) -> Result<Option<LedgerRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} WHERE c.config_id = ?");
        let rec = sqlx::query_as::<_, LedgerRecord>(&sql)
            .bind(config_id.0)
            .fetch_optional(self.pool())
            .await?;
        Ok(rec)
    }

    /// A user's accounts, newest first.
    pub async fn user_configs(&self, user_id: i64) -> Result<Vec<LedgerRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} WHERE c.user_id = ? ORDER BY c.created_at DESC, c.config_id DESC"
        );
        let recs = sqlx::query_as::<_, LedgerRecord>(&sql)
            .bind(user_id)
            .fetch_all(self.pool())
            .await?;
        Ok(recs)
    }

    pub async fn config_by_email(&self, email: &str) -> Result<Option<LedgerRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} WHERE c.email = ?");
        let rec = sqlx::query_as::<_, LedgerRecord>(&sql)
            .bind(email)
            .fetch_optional(self.pool())
            .await?;
        Ok(rec)
    }

    pub async fn client_id_for(&self, email: &str, user_id: i64) -> Result<Option<String>> {
        let id = sqlx::query_scalar::<_, Option<String>>(
            "SELECT client_id FROM configs WHERE email = ? AND user_id = ?",
        )
        .bind(email)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(id.flatten())
    }

    /// Whether the user was already given `total_gb` within the last year.
    pub async fn has_used_trial(&self, user_id: i64, total_gb: f64) -> Result<bool> {
        let since = unix_timestamp() - SECS_PER_YEAR;
        let n = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM configs WHERE user_id = ? AND total_gb = ? AND created_at > ?",
        )
        .bind(user_id)
        .bind(total_gb)
        .bind(since)
        .fetch_one(self.pool())
        .await?;
        Ok(n > 0)
    }

    pub async fn update_active(&self, email: &str, user_id: i64, active: bool) -> Result<()> {
        sqlx::query("UPDATE configs SET is_active = ? WHERE email = ? AND user_id = ?")
            .bind(active)
            .bind(email)
            .bind(user_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn mark_notified(&self, config_id: ConfigId, at: i64) -> Result<()> {
        sqlx::query("UPDATE configs SET last_notified = ? WHERE config_id = ?")
            .bind(at)
            .bind(config_id.0)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Add purchased quota and re-arm notifications.
    ///
    /// Read-modify-write without a version check; two concurrent renewals
    /// of the same account can lose one increment.
    pub async fn add_total_gb(&self, email: &str, user_id: i64, delta_gb: f64) -> Result<bool> {
        let current = sqlx::query_scalar::<_, f64>(
            "SELECT total_gb FROM configs WHERE email = ? AND user_id = ?",
        )
        .bind(email)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;

        let Some(current) = current else {
            return Ok(false);
        };

        let result = sqlx::query(
            "UPDATE configs SET total_gb = ?, last_notified = NULL WHERE email = ? AND user_id = ?",
        )
        .bind(current + delta_gb)
        .bind(email)
        .bind(user_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove every record carrying `client_id`, status history first.
    pub async fn remove_by_client_id(&self, client_id: &str) -> Result<bool> {
        let mut tx = self.pool().begin().await?;

        sqlx::query(
            "DELETE FROM status_logs WHERE config_id IN \
             (SELECT config_id FROM configs WHERE client_id = ?)",
        )
        .bind(client_id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM configs WHERE client_id = ?")
            .bind(client_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(client_id, removed = result.rows_affected(), "ledger delete");
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_all(&self) -> Result<Vec<LedgerRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} ORDER BY c.created_at DESC, c.config_id DESC");
        let recs = sqlx::query_as::<_, LedgerRecord>(&sql)
            .fetch_all(self.pool())
            .await?;
        Ok(recs)
    }

    pub async fn list_active(&self) -> Result<Vec<LedgerRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} WHERE c.is_active = 1 ORDER BY c.config_id");
        let recs = sqlx::query_as::<_, LedgerRecord>(&sql)
            .fetch_all(self.pool())
            .await?;
        Ok(recs)
    }

    // =========================================================================
    // Status history
    // =========================================================================

    pub async fn insert_status_log(
        &self,
        config_id: ConfigId,
        remaining_gb: f64,
        remaining_days: i64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO status_logs (config_id, remaining_gb, remaining_days, checked_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(config_id.0)
        .bind(remaining_gb)
        .bind(remaining_days)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn status_logs(&self, config_id: ConfigId) -> Result<Vec<StatusLog>> {
        let logs = sqlx::query_as::<_, StatusLog>(
            "SELECT * FROM status_logs WHERE config_id = ? ORDER BY log_id",
        )
        .bind(config_id.0)
        .fetch_all(self.pool())
        .await?;
        Ok(logs)
    }
}

#[async_trait]
impl LedgerStore for Ledger {
    async fn insert(
        &self,
        user_id: i64,
        email: &str,
        client_id: &str,
        total_gb: f64,
    ) -> Result<ConfigId> {
        self.insert_config(user_id, email, client_id, total_gb).await
    }

    async fn set_active(&self, email: &str, user_id: i64, active: bool) -> Result<()> {
        self.update_active(email, user_id, active).await
    }

    async fn set_notified(&self, config_id: ConfigId, at: i64) -> Result<()> {
        self.mark_notified(config_id, at).await
    }

    async fn add_quota(&self, email: &str, user_id: i64, delta_gb: f64) -> Result<bool> {
        self.add_total_gb(email, user_id, delta_gb).await
    }

    async fn delete_by_client_id(&self, client_id: &str) -> Result<bool> {
        self.remove_by_client_id(client_id).await
    }

    async fn all_records(&self) -> Result<Vec<LedgerRecord>> {
        self.list_all().await
    }

    async fn active_records(&self) -> Result<Vec<LedgerRecord>> {
        self.list_active().await
    }

    async fn log_status_check(
        &self,
        config_id: ConfigId,
        remaining_gb: f64,
        remaining_days: i64,
    ) -> Result<()> {
        self.insert_status_log(config_id, remaining_gb, remaining_days)
            .await
    }
}
