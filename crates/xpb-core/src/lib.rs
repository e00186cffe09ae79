//! Core domain + application logic for the x-ui panel bot.
//!
//! This crate is intentionally framework-agnostic. The panel transport, the
//! local ledger and the messenger live behind ports (traits) so Telegram and
//! HTTP specifics stay in adapter code.

pub mod accounts;
pub mod broadcast;
pub mod config;
pub mod domain;
pub mod errors;
pub mod ledger;
pub mod logging;
pub mod messaging;
pub mod notifier;
pub mod panel;
pub mod ports;
pub mod reconcile;
pub mod scheduler;
pub mod security;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
