use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tracing::info;

use xpb_core::{
    accounts::AccountService,
    broadcast::Broadcaster,
    config::Config,
    messaging::{MessagingPort, ThrottleConfig, ThrottledMessenger},
    notifier::ExpiryNotifier,
    reconcile::ReconciliationEngine,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub accounts: Arc<AccountService>,
    pub engine: Arc<ReconciliationEngine>,
    pub notifier: Arc<ExpiryNotifier>,
    pub broadcaster: Arc<Broadcaster>,
    pub messenger: Arc<dyn MessagingPort>,
}

/// Throttled Telegram messenger shared by the handlers and the notifier.
///
/// 429 `RetryAfter` is still retried once inside `TelegramMessenger`.
pub fn build_messenger(bot: &Bot) -> Arc<dyn MessagingPort> {
    let raw: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    Arc::new(ThrottledMessenger::new(raw, ThrottleConfig::default()))
}

pub async fn run_polling(bot: Bot, state: Arc<AppState>) -> anyhow::Result<()> {
    if let Ok(me) = bot.get_me().await {
        info!(bot = %me.username(), "telegram bot started");
    }
    info!(
        admins = state.cfg.admin_ids.len(),
        inbound = state.cfg.panel.inbound_id,
        "serving commands"
    );

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}
