//! Reconciliation of the panel's account list with the local ledger.
//!
//! The panel is authoritative for quota, usage and expiry; the ledger is
//! authoritative for ownership. Neither store is assumed complete, so every
//! listing is recomputed from both and each entry carries its provenance.

use std::{collections::HashMap, sync::Arc};

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::{
    ledger::LedgerRecord,
    panel::{status::bytes_to_gb, PanelAccount},
    ports::{AccountPanel, LedgerStore},
};

pub const DEFAULT_PAGE_SIZE: usize = 5;

/// Where an entry was found.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provenance {
    Both,
    PanelOnly,
    LedgerOnly,
}

/// One account as seen through both stores.
#[derive(Clone, Debug, PartialEq)]
pub struct ReconciledClient {
    pub client_id: Option<String>,
    pub email: String,
    // Ownership (ledger).
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub created_at: Option<i64>,
    pub ledger_total_gb: Option<f64>,
    // Live state (panel).
    pub total_gb: Option<f64>,
    pub remaining_gb: Option<f64>,
    pub expiry_date: Option<NaiveDate>,
    pub remaining_time_display: Option<String>,
    pub expiry_epoch_ms: Option<i64>,
    pub is_active: bool,
    pub in_panel: bool,
    pub in_ledger: bool,
}

impl ReconciledClient {
    pub fn provenance(&self) -> Provenance {
        match (self.in_panel, self.in_ledger) {
            (true, false) => Provenance::PanelOnly,
            (false, true) => Provenance::LedgerOnly,
            _ => Provenance::Both,
        }
    }

    /// Sold quota and enforced quota disagree.
    pub fn quota_diverges(&self) -> bool {
        match (self.total_gb, self.ledger_total_gb) {
            (Some(panel), Some(ledger)) => (panel - ledger).abs() >= 0.01,
            _ => false,
        }
    }

    // Ledger creation time when known, else panel expiry, both in ms.
    fn sort_key(&self) -> i64 {
        self.created_at
            .map(|s| s.saturating_mul(1000))
            .or(self.expiry_epoch_ms)
            .unwrap_or(0)
    }

    fn from_panel(acc: PanelAccount) -> Self {
        let status = acc.status;
        let client = acc.client;
        Self {
            client_id: Some(client.id).filter(|id| !id.is_empty()),
            email: client.email,
            user_id: None,
            username: None,
            first_name: None,
            created_at: None,
            ledger_total_gb: None,
            total_gb: Some(
                status
                    .as_ref()
                    .map(|s| s.total_gb)
                    .unwrap_or_else(|| bytes_to_gb(client.total_gb)),
            ),
            remaining_gb: status.as_ref().map(|s| s.remaining_gb),
            expiry_date: status.as_ref().map(|s| s.expiry_date),
            remaining_time_display: status.as_ref().map(|s| s.remaining_time_display.clone()),
            expiry_epoch_ms: Some(
                status
                    .as_ref()
                    .map(|s| s.expiry_epoch_ms)
                    .unwrap_or(client.expiry_time),
            ),
            is_active: status.map(|s| s.is_active).unwrap_or(client.enable),
            in_panel: true,
            in_ledger: false,
        }
    }

    fn from_ledger(rec: LedgerRecord) -> Self {
        Self {
            client_id: rec.client_id.filter(|id| !id.is_empty()),
            email: rec.email,
            user_id: Some(rec.user_id),
            username: rec.username,
            first_name: rec.first_name,
            created_at: Some(rec.created_at),
            ledger_total_gb: Some(rec.total_gb),
            total_gb: None,
            remaining_gb: None,
            expiry_date: None,
            remaining_time_display: None,
            expiry_epoch_ms: None,
            is_active: rec.is_active,
            in_panel: false,
            in_ledger: true,
        }
    }

    fn overlay_ownership(&mut self, rec: LedgerRecord) {
        self.user_id = Some(rec.user_id);
        self.username = rec.username;
        self.first_name = rec.first_name;
        self.created_at = Some(rec.created_at);
        self.ledger_total_gb = Some(rec.total_gb);
        self.in_ledger = true;
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum MergeKey {
    ClientId(String),
    Email(String),
}

impl MergeKey {
    fn of(client_id: Option<&str>, email: &str) -> Self {
        match client_id.filter(|id| !id.is_empty()) {
            Some(id) => MergeKey::ClientId(id.to_string()),
            None => MergeKey::Email(email.to_string()),
        }
    }
}

/// Union of both stores keyed by client id, newest first.
///
/// A side without a client id is matched by email instead.
pub fn merge(panel: Vec<PanelAccount>, ledger: Vec<LedgerRecord>) -> Vec<ReconciledClient> {
    let mut out: Vec<ReconciledClient> = Vec::with_capacity(panel.len() + ledger.len());
    let mut index: HashMap<MergeKey, usize> = HashMap::new();
    // Panel entries by email, for ledger rows that never learned their client id.
    let mut panel_by_email: HashMap<String, usize> = HashMap::new();

    for acc in panel {
        let key = MergeKey::of(acc.client_id(), &acc.client.email);
        // Duplicate panel key: keep the first occurrence.
        if index.contains_key(&key) {
            continue;
        }
        if !acc.client.email.is_empty() {
            panel_by_email
                .entry(acc.client.email.clone())
                .or_insert(out.len());
        }
        index.insert(key, out.len());
        out.push(ReconciledClient::from_panel(acc));
    }

    for rec in ledger {
        let key = MergeKey::of(rec.client_id.as_deref(), &rec.email);
        let slot = match &key {
            MergeKey::ClientId(_) => index.get(&key).copied(),
            MergeKey::Email(email) => index
                .get(&key)
                .copied()
                .or_else(|| panel_by_email.get(email).copied()),
        };
        match slot {
            Some(i) if !out[i].in_ledger => out[i].overlay_ownership(rec),
            Some(_) => continue,
            None => {
                index.insert(key, out.len());
                out.push(ReconciledClient::from_ledger(rec));
            }
        }
    }

    // Stable: equal keys keep panel-then-ledger order.
    out.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
    out
}

/// One page of a reconciled listing.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientPage {
    pub items: Vec<ReconciledClient>,
    /// Zero-based, already clamped.
    pub page: usize,
    pub total_pages: usize,
    pub total: usize,
}

/// Slice `items` into pages of `page_size`; out-of-range pages clamp to the
/// nearest valid one.
pub fn paginate(items: &[ReconciledClient], page: usize, page_size: usize) -> ClientPage {
    let page_size = page_size.max(1);
    let total = items.len();
    let total_pages = total.div_ceil(page_size);
    let page = page.min(total_pages.saturating_sub(1));
    let start = page * page_size;
    let end = (start + page_size).min(total);

    ClientPage {
        items: items.get(start..end).map(<[_]>::to_vec).unwrap_or_default(),
        page,
        total_pages,
        total,
    }
}

/// Counts shown next to a listing.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub clients: Vec<ReconciledClient>,
    pub panel_count: usize,
    pub ledger_count: usize,
    /// Set when one store could not be read; the listing is then partial.
    pub panel_error: Option<String>,
    pub ledger_error: Option<String>,
}

/// Result of the two-store delete workflow.
#[derive(Clone, Debug, PartialEq)]
pub enum DeleteOutcome {
    /// Removed from the panel and the ledger (or the ledger had no record).
    Deleted { ledger_removed: bool },
    /// Removed from the panel only; the ledger row is now an orphan.
    LedgerCleanupFailed { reason: String },
    /// The panel refused or was unreachable; the ledger was not touched.
    PanelFailed(String),
}

pub struct ReconciliationEngine {
    panel: Arc<dyn AccountPanel>,
    ledger: Arc<dyn LedgerStore>,
    page_size: usize,
}

impl ReconciliationEngine {
    pub fn new(panel: Arc<dyn AccountPanel>, ledger: Arc<dyn LedgerStore>, page_size: usize) -> Self {
        Self {
            panel,
            ledger,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Read both stores and merge them. A failing store contributes nothing.
    pub async fn snapshot(&self) -> Snapshot {
        let (panel, panel_error) = match self.panel.list_all_accounts().await {
            Ok(v) => (v, None),
            Err(e) => {
                warn!("panel listing failed, showing ledger only: {e}");
                (Vec::new(), Some(e.to_string()))
            }
        };
        let (ledger, ledger_error) = match self.ledger.all_records().await {
            Ok(v) => (v, None),
            Err(e) => {
                warn!("ledger listing failed, showing panel only: {e}");
                (Vec::new(), Some(e.to_string()))
            }
        };

        let panel_count = panel.len();
        let ledger_count = ledger.len();
        Snapshot {
            clients: merge(panel, ledger),
            panel_count,
            ledger_count,
            panel_error,
            ledger_error,
        }
    }

    /// One page of a fresh snapshot.
    pub async fn page(&self, page: usize) -> (ClientPage, Snapshot) {
        let snap = self.snapshot().await;
        let p = paginate(&snap.clients, page, self.page_size);
        (p, snap)
    }

    /// Delete from the panel, then from the ledger.
    ///
    /// There is no transaction across the two stores: the ledger is only
    /// touched after the panel confirmed, and a ledger failure at that point
    /// is reported rather than retried.
    pub async fn delete_client(&self, client_id: &str) -> DeleteOutcome {
        if let Err(e) = self.panel.delete_account(client_id).await {
            warn!(client_id, "panel delete failed: {e}");
            return DeleteOutcome::PanelFailed(e.to_string());
        }

        match self.ledger.delete_by_client_id(client_id).await {
            Ok(ledger_removed) => {
                info!(client_id, ledger_removed, "client deleted");
                DeleteOutcome::Deleted { ledger_removed }
            }
            Err(e) => {
                warn!(client_id, "client removed from panel but ledger cleanup failed: {e}");
                DeleteOutcome::LedgerCleanupFailed {
                    reason: e.to_string(),
                }
            }
        }
    }
}
