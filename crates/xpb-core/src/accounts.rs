//! User-facing account workflows: provisioning, trials, renewals, status.
//!
//! Every workflow talks to the panel first and records the outcome in the
//! ledger afterwards. There is no transaction across the two stores; a ledger
//! failure after a successful panel call is reported as such so the operator
//! can reconcile it.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use rand::Rng;
use tracing::{info, warn};

use crate::{
    config::LinkConfig,
    domain::{ConfigId, UserProfile},
    errors::Error,
    ledger::{Ledger, LedgerRecord, UserSummary},
    panel::{status::gb_to_bytes, AccountStatus},
    ports::{AccountPanel, LedgerStore},
    Result,
};

const SUFFIX_LEN: usize = 6;
const SUFFIX_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const MAX_EMAIL_LEN: usize = 50;

/// Free trial tiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrialPlan {
    OneGb,
    FiveGb,
}

impl TrialPlan {
    pub fn from_gb(gb: u32) -> Option<Self> {
        match gb {
            1 => Some(TrialPlan::OneGb),
            5 => Some(TrialPlan::FiveGb),
            _ => None,
        }
    }

    pub fn gb(self) -> u32 {
        match self {
            TrialPlan::OneGb => 1,
            TrialPlan::FiveGb => 5,
        }
    }

    pub fn days(self) -> i64 {
        match self {
            TrialPlan::OneGb => 1,
            TrialPlan::FiveGb => 7,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Provisioned {
    pub config_id: ConfigId,
    pub email: String,
    pub client_id: String,
    pub link: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TrialOutcome {
    Granted(Provisioned),
    AlreadyUsed,
}

/// Live status of one of the caller's accounts plus its connection link.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigStatus {
    pub status: AccountStatus,
    pub link: String,
}

pub fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..SUFFIX_LEN)
        .map(|_| SUFFIX_CHARSET[rng.gen_range(0..SUFFIX_CHARSET.len())] as char)
        .collect()
}

/// `{username|user_id}_{suffix}@vpn`, shortened to `u{user_id}_{suffix}@vpn`
/// when too long for the panel.
pub fn account_email(owner: &UserProfile, suffix: &str) -> String {
    let ident = owner
        .username
        .clone()
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| owner.user_id.to_string());
    let email = format!("{ident}_{suffix}@vpn");
    if email.len() > MAX_EMAIL_LEN {
        return format!("u{}_{suffix}@vpn", owner.user_id);
    }
    email
}

pub fn trial_email(owner: &UserProfile, suffix: &str, plan: TrialPlan) -> String {
    let ident = owner
        .username
        .as_deref()
        .filter(|u| !u.is_empty())
        .unwrap_or("user");
    let email = format!("{ident}_{suffix}@free");
    if email.len() > MAX_EMAIL_LEN {
        return format!("u{}_{suffix}@free_{}_gb", owner.user_id, plan.gb());
    }
    email
}

/// `vless://` connection link for a client.
pub fn subscription_link(link: &LinkConfig, client_id: &str, email: &str) -> String {
    format!(
        "vless://{client_id}@{addr}:{port}?type=ws&path=%2F&host={host}&security=tls&fp=firefox\
         &alpn=h3%2Ch2%2Chttp%2F1.1&sni={sni}#{email}",
        addr = link.address,
        port = link.port,
        host = link.host,
        sni = link.sni,
    )
}

pub struct AccountService {
    panel: Arc<dyn AccountPanel>,
    ledger: Arc<Ledger>,
    link: LinkConfig,
}

impl AccountService {
    pub fn new(panel: Arc<dyn AccountPanel>, ledger: Arc<Ledger>, link: LinkConfig) -> Self {
        Self {
            panel,
            ledger,
            link,
        }
    }

    pub fn link_for(&self, client_id: &str, email: &str) -> String {
        subscription_link(&self.link, client_id, email)
    }

    pub async fn register(&self, profile: &UserProfile) -> Result<()> {
        self.ledger.upsert_user(profile).await
    }

    pub async fn my_configs(&self, user_id: i64) -> Result<Vec<LedgerRecord>> {
        self.ledger.user_configs(user_id).await
    }

    /// Create a paid account valid for `days` from now.
    pub async fn provision(&self, owner: &UserProfile, total_gb: f64, days: i64) -> Result<Provisioned> {
        let email = account_email(owner, &random_suffix());
        self.create_and_record(owner, email, total_gb, days).await
    }

    /// Operator-side provisioning for `user_id`. A user the bot has never
    /// seen is registered with an empty profile.
    pub async fn provision_for(&self, user_id: i64, total_gb: f64, days: i64) -> Result<Provisioned> {
        let owner = self
            .ledger
            .user_profile(user_id)
            .await?
            .unwrap_or(UserProfile {
                user_id,
                ..UserProfile::default()
            });
        self.provision(&owner, total_gb, days).await
    }

    pub async fn grant_trial(&self, owner: &UserProfile, plan: TrialPlan) -> Result<TrialOutcome> {
        let gb = f64::from(plan.gb());
        if self.ledger.has_used_trial(owner.user_id, gb).await? {
            info!(user_id = owner.user_id, gb, "trial already used");
            return Ok(TrialOutcome::AlreadyUsed);
        }

        let email = trial_email(owner, &random_suffix(), plan);
        let provisioned = self.create_and_record(owner, email, gb, plan.days()).await?;
        Ok(TrialOutcome::Granted(provisioned))
    }

    async fn create_and_record(
        &self,
        owner: &UserProfile,
        email: String,
        total_gb: f64,
        days: i64,
    ) -> Result<Provisioned> {
        self.ledger.upsert_user(owner).await?;

        let expiry_ms = (Utc::now() + TimeDelta::days(days)).timestamp_millis();
        let client_id = self
            .panel
            .create_account(&email, gb_to_bytes(total_gb), expiry_ms)
            .await?;

        let config_id = self
            .ledger
            .insert(owner.user_id, &email, &client_id, total_gb)
            .await
            .map_err(|e| {
                warn!(email = %email, client_id = %client_id, "account created on panel but not recorded: {e}");
                Error::Database(format!(
                    "account {email} ({client_id}) exists on the panel but was not recorded: {e}"
                ))
            })?;

        info!(user_id = owner.user_id, email = %email, total_gb, days, "account provisioned");
        Ok(Provisioned {
            config_id,
            link: self.link_for(&client_id, &email),
            email,
            client_id,
        })
    }

    /// Add quota and push the expiry of one of the user's accounts.
    pub async fn renew(&self, user_id: i64, email: &str, additional_gb: f64, days: i64) -> Result<()> {
        let client_id = self
            .ledger
            .client_id_for(email, user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no account {email} for user {user_id}")))?;

        self.panel
            .extend_account(email, &client_id, additional_gb, TimeDelta::days(days))
            .await?;

        if !self.ledger.add_quota(email, user_id, additional_gb).await? {
            warn!(email, user_id, "account renewed on panel but ledger record missing");
        }
        info!(email, additional_gb, days, "account renewed");
        Ok(())
    }

    /// `renew` for an operator who only knows the email; returns the owner.
    pub async fn renew_by_email(&self, email: &str, additional_gb: f64, days: i64) -> Result<i64> {
        let rec = self
            .ledger
            .config_by_email(email)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no account {email}")))?;
        self.renew(rec.user_id, email, additional_gb, days).await?;
        Ok(rec.user_id)
    }

    pub async fn users(&self, limit: i64) -> Result<Vec<UserSummary>> {
        self.ledger.user_summaries(limit).await
    }

    /// Push the expiry of every recorded account by `days`; returns how many
    /// were extended on both stores.
    pub async fn extend_all(&self, days: i64) -> Result<usize> {
        let records = self.ledger.all_records().await?;
        let mut extended = 0usize;
        for rec in records {
            let Some(client_id) = rec.client_id.as_deref() else {
                continue;
            };
            if let Err(e) = self
                .panel
                .extend_account(&rec.email, client_id, 0.0, TimeDelta::days(days))
                .await
            {
                warn!(email = %rec.email, "bulk extend failed: {e}");
                continue;
            }
            match self.ledger.add_quota(&rec.email, rec.user_id, 0.0).await {
                Ok(true) => extended += 1,
                Ok(false) => {}
                Err(e) => warn!(email = %rec.email, "bulk extend not recorded: {e}"),
            }
        }
        info!(days, extended, "bulk extend finished");
        Ok(extended)
    }

    /// Live status of one of the user's accounts; refreshes the ledger's
    /// active flag and appends a status log row.
    pub async fn status(&self, user_id: i64, email: &str) -> Result<ConfigStatus> {
        let client_id = self
            .ledger
            .client_id_for(email, user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no account {email} for user {user_id}")))?;

        let status = self
            .panel
            .get_status(email)
            .await
            .ok_or_else(|| Error::NotFound(format!("could not retrieve status for {email}")))?;

        self.ledger.set_active(email, user_id, status.is_active).await?;
        if let Some(rec) = self
            .ledger
            .user_configs(user_id)
            .await?
            .into_iter()
            .find(|r| r.email == email)
        {
            self.ledger
                .log_status_check(rec.id(), status.remaining_gb, status.remaining_days())
                .await?;
        }

        Ok(ConfigStatus {
            link: self.link_for(&client_id, email),
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePanel;

    fn link_cfg() -> LinkConfig {
        LinkConfig {
            address: "vpn.example.com".to_string(),
            port: 2087,
            host: "cdn.example.com".to_string(),
            sni: "sni.example.com".to_string(),
        }
    }

    fn owner(user_id: i64, username: Option<&str>) -> UserProfile {
        UserProfile {
            user_id,
            username: username.map(str::to_string),
            first_name: Some("Test".to_string()),
            last_name: None,
        }
    }

    async fn service(panel: Arc<FakePanel>) -> (AccountService, Arc<Ledger>) {
        let ledger = Arc::new(Ledger::open_in_memory().await.unwrap());
        (AccountService::new(panel, ledger.clone(), link_cfg()), ledger)
    }

    #[test]
    fn suffix_shape() {
        let s = random_suffix();
        assert_eq!(s.len(), SUFFIX_LEN);
        assert!(s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn email_uses_username_or_id() {
        assert_eq!(account_email(&owner(5, Some("bob")), "abc123"), "bob_abc123@vpn");
        assert_eq!(account_email(&owner(5, None), "abc123"), "5_abc123@vpn");

        let long = "x".repeat(60);
        assert_eq!(account_email(&owner(5, Some(&long)), "abc123"), "u5_abc123@vpn");
    }

    #[test]
    fn trial_email_shapes() {
        assert_eq!(
            trial_email(&owner(9, Some("amy")), "zz9911", TrialPlan::OneGb),
            "amy_zz9911@free"
        );
        assert_eq!(
            trial_email(&owner(9, None), "zz9911", TrialPlan::FiveGb),
            "user_zz9911@free"
        );
        let long = "y".repeat(60);
        assert_eq!(
            trial_email(&owner(9, Some(&long)), "zz9911", TrialPlan::FiveGb),
            "u9_zz9911@free_5_gb"
        );
    }

    #[test]
    fn trial_plans() {
        assert_eq!(TrialPlan::from_gb(1).map(TrialPlan::days), Some(1));
        assert_eq!(TrialPlan::from_gb(5).map(TrialPlan::days), Some(7));
        assert!(TrialPlan::from_gb(2).is_none());
    }

    #[test]
    fn vless_link_format() {
        assert_eq!(
            subscription_link(&link_cfg(), "uuid-1", "bob_abc123@vpn"),
            "vless://uuid-1@vpn.example.com:2087?type=ws&path=%2F&host=cdn.example.com\
             &security=tls&fp=firefox&alpn=h3%2Ch2%2Chttp%2F1.1&sni=sni.example.com#bob_abc123@vpn"
        );
    }

    #[tokio::test]
    async fn provision_then_status_end_to_end() {
        let panel = Arc::new(FakePanel::default());
        let (svc, ledger) = service(panel.clone()).await;
        let alice = owner(100, Some("alice"));

        let p = svc.provision(&alice, 10.0, 30).await.unwrap();
        assert!(p.email.starts_with("alice_") && p.email.ends_with("@vpn"));
        assert!(p.link.starts_with(&format!("vless://{}@", p.client_id)));

        let rec = ledger.get_config(p.config_id).await.unwrap().unwrap();
        assert_eq!(rec.total_gb, 10.0);
        assert_eq!(rec.client_id.as_deref(), Some(p.client_id.as_str()));
        assert_eq!(rec.username.as_deref(), Some("alice"));

        let st = svc.status(100, &p.email).await.unwrap();
        assert_eq!(st.status.remaining_gb, 10.0);
        assert!(st.status.is_active);
        assert_eq!(ledger.status_logs(p.config_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn status_mirrors_disabled_flag_into_ledger() {
        let panel = Arc::new(FakePanel::default());
        let (svc, ledger) = service(panel.clone()).await;
        let p = svc.provision(&owner(1, None), 5.0, 30).await.unwrap();

        let mut s = panel.statuses.lock().unwrap().get(&p.email).cloned().unwrap();
        s.is_active = false;
        panel.set_status(s);

        let st = svc.status(1, &p.email).await.unwrap();
        assert!(!st.status.is_active);
        assert!(!ledger.get_config(p.config_id).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn status_of_foreign_account_is_not_found() {
        let panel = Arc::new(FakePanel::default());
        let (svc, _) = service(panel).await;
        let p = svc.provision(&owner(1, None), 5.0, 30).await.unwrap();

        assert!(matches!(svc.status(2, &p.email).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn panel_failure_leaves_no_ledger_row() {
        let panel = Arc::new(FakePanel {
            create_error: Some("Duplicate email".to_string()),
            ..FakePanel::default()
        });
        let (svc, ledger) = service(panel).await;

        let err = svc.provision(&owner(1, None), 5.0, 30).await.unwrap_err();
        assert!(matches!(err, Error::Panel(_)));
        assert!(ledger.user_configs(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn trial_is_granted_once_per_tier() {
        let panel = Arc::new(FakePanel::default());
        let (svc, _) = service(panel.clone()).await;
        let u = owner(3, Some("tom"));

        let first = svc.grant_trial(&u, TrialPlan::OneGb).await.unwrap();
        let TrialOutcome::Granted(p) = first else {
            panic!("expected a trial");
        };
        assert!(p.email.ends_with("@free"));

        assert_eq!(
            svc.grant_trial(&u, TrialPlan::OneGb).await.unwrap(),
            TrialOutcome::AlreadyUsed
        );
        assert!(matches!(
            svc.grant_trial(&u, TrialPlan::FiveGb).await.unwrap(),
            TrialOutcome::Granted(_)
        ));
        assert_eq!(
            panel.calls().iter().filter(|c| c.starts_with("create:")).count(),
            2
        );
    }

    #[tokio::test]
    async fn renew_extends_panel_and_ledger() {
        let panel = Arc::new(FakePanel::default());
        let (svc, ledger) = service(panel.clone()).await;
        let p = svc.provision(&owner(1, None), 10.0, 30).await.unwrap();

        svc.renew(1, &p.email, 20.0, 30).await.unwrap();

        assert_eq!(
            ledger.get_config(p.config_id).await.unwrap().unwrap().total_gb,
            30.0
        );
        assert!(panel
            .calls()
            .contains(&format!("extend:{}:{}", p.email, p.client_id)));
        let st = panel.statuses.lock().unwrap().get(&p.email).cloned().unwrap();
        assert_eq!(st.total_gb, 30.0);
    }

    #[tokio::test]
    async fn renew_unknown_account_does_not_touch_panel() {
        let panel = Arc::new(FakePanel::default());
        let (svc, _) = service(panel.clone()).await;

        let err = svc.renew(1, "ghost@vpn", 10.0, 30).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(panel.calls().is_empty());
    }

    #[tokio::test]
    async fn provision_for_uses_stored_profile() {
        let panel = Arc::new(FakePanel::default());
        let (svc, ledger) = service(panel.clone()).await;
        svc.register(&owner(8, Some("dana"))).await.unwrap();

        let p = svc.provision_for(8, 20.0, 30).await.unwrap();
        assert!(p.email.starts_with("dana_"), "email {}", p.email);
        let rec = ledger.get_config(p.config_id).await.unwrap().unwrap();
        assert_eq!((rec.user_id, rec.total_gb), (8, 20.0));

        let stranger = svc.provision_for(9, 5.0, 7).await.unwrap();
        assert!(stranger.email.starts_with("9_"), "email {}", stranger.email);
    }

    #[tokio::test]
    async fn renew_by_email_finds_the_owner() {
        let panel = Arc::new(FakePanel::default());
        let (svc, ledger) = service(panel.clone()).await;
        let p = svc.provision(&owner(4, None), 10.0, 30).await.unwrap();

        assert_eq!(svc.renew_by_email(&p.email, 5.0, 10).await.unwrap(), 4);
        assert_eq!(
            ledger.get_config(p.config_id).await.unwrap().unwrap().total_gb,
            15.0
        );

        let err = svc.renew_by_email("ghost@vpn", 5.0, 10).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn extend_all_counts_accounts_updated_on_both_stores() {
        let panel = Arc::new(FakePanel::default());
        let (svc, ledger) = service(panel.clone()).await;
        svc.provision(&owner(1, None), 10.0, 30).await.unwrap();
        svc.provision(&owner(2, None), 10.0, 30).await.unwrap();
        // Known to the ledger only: the panel extend fails.
        ledger.insert(3, "stale@vpn", "cid-stale", 1.0).await.unwrap();

        assert_eq!(svc.extend_all(7).await.unwrap(), 2);
    }
}
