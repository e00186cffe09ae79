//! In-memory `AccountPanel` / `LedgerStore` doubles for workflow tests.

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};

use crate::{
    domain::ConfigId,
    errors::Error,
    ledger::LedgerRecord,
    panel::{
        status::{bytes_to_gb, gb_to_bytes},
        wire::{ClientEntry, ClientTraffic},
        AccountStatus, PanelAccount,
    },
    ports::{AccountPanel, LedgerStore},
    Result,
};

pub(crate) const GB: i64 = 1 << 30;

pub(crate) fn status(email: &str, total_gb: f64, remaining_gb: f64, days_left: i64) -> AccountStatus {
    let now = Utc::now().timestamp_millis();
    let total = gb_to_bytes(total_gb);
    let traffic = ClientTraffic {
        email: email.to_string(),
        up: total - gb_to_bytes(remaining_gb),
        down: 0,
        total,
        expiry_time: now + days_left * 86_400_000 + 3_600_000,
        enable: true,
    };
    AccountStatus::from_traffic(email, &traffic, now)
}

pub(crate) fn panel_account(id: &str, email: &str, expiry_ms: i64) -> PanelAccount {
    PanelAccount {
        inbound_id: 1,
        client: ClientEntry::provisioned(id, email, 10 * GB, expiry_ms, ""),
        status: None,
    }
}

pub(crate) fn record(config_id: i64, user_id: i64, email: &str, client_id: Option<&str>) -> LedgerRecord {
    LedgerRecord {
        config_id,
        user_id,
        email: email.to_string(),
        client_id: client_id.map(str::to_string),
        total_gb: 10.0,
        is_active: true,
        created_at: 1_700_000_000 + config_id,
        last_notified: None,
        username: Some(format!("user{user_id}")),
        first_name: None,
    }
}

/// Panel double; every call is appended to `calls`.
#[derive(Default)]
pub(crate) struct FakePanel {
    pub(crate) accounts: Mutex<Vec<PanelAccount>>,
    pub(crate) statuses: Mutex<HashMap<String, AccountStatus>>,
    pub(crate) calls: Mutex<Vec<String>>,
    pub(crate) auth_fails: bool,
    pub(crate) list_error: Option<String>,
    pub(crate) delete_error: Option<String>,
    pub(crate) create_error: Option<String>,
}

impl FakePanel {
    pub(crate) fn with_accounts(accounts: Vec<PanelAccount>) -> Self {
        Self {
            accounts: Mutex::new(accounts),
            ..Self::default()
        }
    }

    pub(crate) fn set_status(&self, s: AccountStatus) {
        self.statuses.lock().unwrap().insert(s.email.clone(), s);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl AccountPanel for FakePanel {
    async fn ensure_authenticated(&self) -> bool {
        self.record("auth".to_string());
        !self.auth_fails
    }

    async fn get_status(&self, email: &str) -> Option<AccountStatus> {
        self.record(format!("status:{email}"));
        self.statuses.lock().unwrap().get(email).cloned()
    }

    async fn create_account(&self, email: &str, total_bytes: i64, expiry_ms: i64) -> Result<String> {
        self.record(format!("create:{email}"));
        if let Some(msg) = &self.create_error {
            return Err(Error::Panel(msg.clone()));
        }
        let id = format!("cid-{}", self.accounts.lock().unwrap().len() + 1);
        let now = Utc::now().timestamp_millis();
        let traffic = ClientTraffic {
            email: email.to_string(),
            up: 0,
            down: 0,
            total: total_bytes,
            expiry_time: expiry_ms,
            enable: true,
        };
        self.set_status(AccountStatus::from_traffic(email, &traffic, now));
        self.accounts
            .lock()
            .unwrap()
            .push(panel_account(&id, email, expiry_ms));
        Ok(id)
    }

    async fn extend_account(
        &self,
        email: &str,
        client_id: &str,
        additional_gb: f64,
        extend_by: TimeDelta,
    ) -> Result<()> {
        self.record(format!("extend:{email}:{client_id}"));
        let mut statuses = self.statuses.lock().unwrap();
        let s = statuses
            .get_mut(email)
            .ok_or_else(|| Error::NotFound("could not find client information".to_string()))?;
        s.total_bytes += gb_to_bytes(additional_gb);
        s.total_gb = bytes_to_gb(s.total_bytes);
        s.expiry_epoch_ms += extend_by.num_milliseconds();
        Ok(())
    }

    async fn list_all_accounts(&self) -> Result<Vec<PanelAccount>> {
        self.record("list".to_string());
        if let Some(msg) = &self.list_error {
            return Err(Error::Transport(msg.clone()));
        }
        let statuses = self.statuses.lock().unwrap();
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .cloned()
            .map(|mut a| {
                a.status = statuses.get(&a.client.email).cloned();
                a
            })
            .collect())
    }

    async fn delete_account(&self, client_id: &str) -> Result<()> {
        self.record(format!("delete:{client_id}"));
        if let Some(msg) = &self.delete_error {
            return Err(Error::Panel(msg.clone()));
        }
        self.accounts
            .lock()
            .unwrap()
            .retain(|a| a.client.id != client_id);
        Ok(())
    }
}

/// Ledger double backed by a vector.
#[derive(Default)]
pub(crate) struct FakeLedger {
    pub(crate) records: Mutex<Vec<LedgerRecord>>,
    pub(crate) calls: Mutex<Vec<String>>,
    pub(crate) notified: Mutex<Vec<(i64, i64)>>,
    pub(crate) status_logs: Mutex<Vec<(i64, f64, i64)>>,
    pub(crate) delete_error: Option<String>,
    pub(crate) insert_error: Option<String>,
}

impl FakeLedger {
    pub(crate) fn with_records(records: Vec<LedgerRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn notified(&self) -> Vec<(i64, i64)> {
        self.notified.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl LedgerStore for FakeLedger {
    async fn insert(&self, user_id: i64, email: &str, client_id: &str, total_gb: f64) -> Result<ConfigId> {
        self.record(format!("insert:{email}"));
        if let Some(msg) = &self.insert_error {
            return Err(Error::Database(msg.clone()));
        }
        let mut recs = self.records.lock().unwrap();
        let id = recs.len() as i64 + 1;
        let mut rec = record(id, user_id, email, Some(client_id));
        rec.total_gb = total_gb;
        recs.push(rec);
        Ok(ConfigId(id))
    }

    async fn set_active(&self, email: &str, user_id: i64, active: bool) -> Result<()> {
        self.record(format!("set_active:{email}:{active}"));
        for r in self.records.lock().unwrap().iter_mut() {
            if r.email == email && r.user_id == user_id {
                r.is_active = active;
            }
        }
        Ok(())
    }

    async fn set_notified(&self, config_id: ConfigId, at: i64) -> Result<()> {
        self.record(format!("set_notified:{}", config_id.0));
        self.notified.lock().unwrap().push((config_id.0, at));
        for r in self.records.lock().unwrap().iter_mut() {
            if r.config_id == config_id.0 {
                r.last_notified = Some(at);
            }
        }
        Ok(())
    }

    async fn add_quota(&self, email: &str, user_id: i64, delta_gb: f64) -> Result<bool> {
        self.record(format!("add_quota:{email}"));
        let mut found = false;
        for r in self.records.lock().unwrap().iter_mut() {
            if r.email == email && r.user_id == user_id {
                r.total_gb += delta_gb;
                r.last_notified = None;
                found = true;
            }
        }
        Ok(found)
    }

    async fn delete_by_client_id(&self, client_id: &str) -> Result<bool> {
        self.record(format!("delete:{client_id}"));
        if let Some(msg) = &self.delete_error {
            return Err(Error::Database(msg.clone()));
        }
        let mut recs = self.records.lock().unwrap();
        let before = recs.len();
        recs.retain(|r| r.client_id.as_deref() != Some(client_id));
        Ok(recs.len() < before)
    }

    async fn all_records(&self) -> Result<Vec<LedgerRecord>> {
        Ok(self.records.lock().unwrap().clone())
    }

    async fn active_records(&self) -> Result<Vec<LedgerRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.is_active)
            .cloned()
            .collect())
    }

    async fn log_status_check(&self, config_id: ConfigId, remaining_gb: f64, remaining_days: i64) -> Result<()> {
        self.status_logs
            .lock()
            .unwrap()
            .push((config_id.0, remaining_gb, remaining_days));
        Ok(())
    }
}
