//! SQLite ledger of account ownership.
//!
//! The panel is authoritative for usage and expiry; the ledger only records
//! who owns which account, the quota they bought, and notification state.

mod db;
mod models;
mod queries;


pub use db::{unix_timestamp, Ledger};
pub use models::{LedgerRecord, StatusLog, UserSummary};
