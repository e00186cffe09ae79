//! Expiry / usage notifier.
//!
//! Each cycle walks the active ledger records, asks the panel for live
//! status and warns owners whose account is nearly used up or about to
//! expire. `last_notified` is only advanced after the messenger accepted the
//! message, so a failed delivery is retried next cycle (at-least-once).

use std::{fmt::Write as _, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    config::NotifyPolicy,
    domain::ChatId,
    ledger::unix_timestamp,
    messaging::MessagingPort,
    panel::AccountStatus,
    ports::{AccountPanel, LedgerStore},
    scheduler::ScheduledTask,
};

/// Whether a record is due for evaluation given its last notification.
pub fn should_scan(last_notified: Option<i64>, now: i64, cooldown: Duration) -> bool {
    match last_notified {
        None => true,
        Some(at) => now.saturating_sub(at) >= cooldown.as_secs() as i64,
    }
}

/// Alert text for `status`, or `None` when no threshold is crossed.
pub fn evaluate(status: &AccountStatus, policy: &NotifyPolicy) -> Option<String> {
    let used = status.used_percentage();
    let low_traffic = used >= policy.traffic_threshold_percent;
    let expiring = status.remaining_days() <= policy.days_threshold;
    if !low_traffic && !expiring {
        return None;
    }

    let mut msg = String::from("⚠️ هشدار وضعیت سرویس VPN ⚠️\n\n");
    if low_traffic {
        let _ = write!(
            msg,
            "🔄 سرویس شما با نام {} به {:.1}% از حجم ترافیک خود رسیده است.\nحجم باقیمانده: {:.2} GB\n\n",
            status.email, used, status.remaining_gb
        );
    }
    if expiring {
        let _ = write!(
            msg,
            "⏰ سرویس شما با نام {} تنها {} دیگر اعتبار دارد.\nتاریخ انقضا: {}\n\n",
            status.email, status.remaining_time_display, status.expiry_date
        );
    }
    msg.push_str("برای تمدید سرویس یا خرید سرویس جدید، لطفا از منوی اصلی ربات استفاده کنید.");
    Some(msg)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanAbort {
    /// Another cycle was still running.
    Busy,
    AuthFailed,
    LedgerUnavailable(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub records: usize,
    pub skipped_recent: usize,
    pub status_unavailable: usize,
    pub below_threshold: usize,
    pub notified: usize,
    pub delivery_failed: usize,
    pub aborted: Option<ScanAbort>,
}

impl ScanReport {
    fn aborted(reason: ScanAbort) -> Self {
        Self {
            aborted: Some(reason),
            ..Self::default()
        }
    }
}

pub struct ExpiryNotifier {
    panel: Arc<dyn AccountPanel>,
    ledger: Arc<dyn LedgerStore>,
    messenger: Arc<dyn MessagingPort>,
    policy: NotifyPolicy,
    running: Mutex<()>,
}

impl ExpiryNotifier {
    pub fn new(
        panel: Arc<dyn AccountPanel>,
        ledger: Arc<dyn LedgerStore>,
        messenger: Arc<dyn MessagingPort>,
        policy: NotifyPolicy,
    ) -> Self {
        Self {
            panel,
            ledger,
            messenger,
            policy,
            running: Mutex::new(()),
        }
    }

    /// One scan cycle at `now` (unix seconds).
    pub async fn run_once(&self, now: i64) -> ScanReport {
        let Ok(_guard) = self.running.try_lock() else {
            debug!("notifier cycle already running, skipping");
            return ScanReport::aborted(ScanAbort::Busy);
        };

        info!("starting expiry/usage scan");
        if !self.panel.ensure_authenticated().await {
            error!("panel authentication failed, skipping notifier cycle");
            return ScanReport::aborted(ScanAbort::AuthFailed);
        }

        let records = match self.ledger.active_records().await {
            Ok(v) => v,
            Err(e) => {
                error!("cannot read ledger for notifier cycle: {e}");
                return ScanReport::aborted(ScanAbort::LedgerUnavailable(e.to_string()));
            }
        };

        let mut report = ScanReport {
            records: records.len(),
            ..ScanReport::default()
        };

        for rec in records {
            if !should_scan(rec.last_notified, now, self.policy.cooldown) {
                report.skipped_recent += 1;
                continue;
            }

            let Some(status) = self.panel.get_status(&rec.email).await else {
                warn!(email = %rec.email, "could not retrieve status");
                report.status_unavailable += 1;
                continue;
            };

            let Some(text) = evaluate(&status, &self.policy) else {
                report.below_threshold += 1;
                continue;
            };

            match self.messenger.send_text(ChatId(rec.user_id), &text).await {
                Ok(()) => {
                    info!(user_id = rec.user_id, email = %rec.email, "notification sent");
                    report.notified += 1;
                    if let Err(e) = self.ledger.set_notified(rec.id(), now).await {
                        warn!(email = %rec.email, "notification sent but not recorded: {e}");
                    }
                }
                Err(e) => {
                    warn!(user_id = rec.user_id, "failed to deliver notification: {e}");
                    report.delivery_failed += 1;
                }
            }
        }

        info!(
            records = report.records,
            notified = report.notified,
            failed = report.delivery_failed,
            "expiry/usage scan finished"
        );
        report
    }
}

#[async_trait]
impl ScheduledTask for ExpiryNotifier {
    fn name(&self) -> &str {
        "expiry-notifier"
    }

    async fn run(&self) {
        self.run_once(unix_timestamp()).await;
    }
}
