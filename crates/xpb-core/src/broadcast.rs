//! Operator announcements to every registered user.

use std::sync::Arc;

use tracing::{info, warn};

use crate::{domain::ChatId, ledger::Ledger, messaging::MessagingPort, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub sent: usize,
    pub failed: usize,
}

/// Fans one message out to the ledger's users through the (throttled) messenger.
pub struct Broadcaster {
    ledger: Arc<Ledger>,
    messenger: Arc<dyn MessagingPort>,
}

impl Broadcaster {
    pub fn new(ledger: Arc<Ledger>, messenger: Arc<dyn MessagingPort>) -> Self {
        Self { ledger, messenger }
    }

    /// Sent as plain text; a failed delivery is counted and the fan-out goes on.
    pub async fn send(&self, text: &str) -> Result<BroadcastReport> {
        let users = self.ledger.all_user_ids().await?;
        let body = format!("📢 اطلاعیه:\n\n{text}");

        let mut report = BroadcastReport::default();
        for user_id in users {
            match self.messenger.send_text(ChatId(user_id), &body).await {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    warn!(user_id, "broadcast delivery failed: {e}");
                    report.failed += 1;
                }
            }
        }
        info!(sent = report.sent, failed = report.failed, "broadcast finished");
        Ok(report)
    }
}
