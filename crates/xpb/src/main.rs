use std::sync::Arc;

use teloxide::Bot;
use tokio_util::sync::CancellationToken;
use tracing::info;

use xpb_core::{
    accounts::AccountService,
    broadcast::Broadcaster,
    config::Config,
    ledger::Ledger,
    notifier::ExpiryNotifier,
    panel::PanelClient,
    ports::{AccountPanel, LedgerStore},
    reconcile::ReconciliationEngine,
    scheduler::{spawn_periodic, ScheduledTask},
};
use xpb_telegram::router::{build_messenger, run_polling, AppState};

#[tokio::main]
async fn main() -> Result<(), xpb_core::Error> {
    xpb_core::logging::init("xpb")?;

    let cfg = Arc::new(Config::load()?);
    let ledger = Arc::new(Ledger::open(&cfg.db_file).await?);
    let panel: Arc<dyn AccountPanel> = Arc::new(PanelClient::from_config(&cfg.panel)?);
    let store: Arc<dyn LedgerStore> = ledger.clone();

    let bot = Bot::new(cfg.telegram_bot_token.clone());
    let messenger = build_messenger(&bot);

    let accounts = Arc::new(AccountService::new(
        panel.clone(),
        ledger.clone(),
        cfg.link.clone(),
    ));
    let engine = Arc::new(ReconciliationEngine::new(
        panel.clone(),
        store.clone(),
        cfg.page_size,
    ));
    let notifier = Arc::new(ExpiryNotifier::new(
        panel,
        store,
        messenger.clone(),
        cfg.notify,
    ));
    let broadcaster = Arc::new(Broadcaster::new(ledger.clone(), messenger.clone()));

    let cancel = CancellationToken::new();
    let task: Arc<dyn ScheduledTask> = notifier.clone();
    let scan_loop = spawn_periodic(task, cfg.notify_interval, cancel.clone());

    let state = Arc::new(AppState {
        cfg: cfg.clone(),
        accounts,
        engine,
        notifier,
        broadcaster,
        messenger,
    });

    let result = run_polling(bot, state)
        .await
        .map_err(|e| xpb_core::Error::External(format!("telegram bot failed: {e}")));

    info!("shutting down");
    cancel.cancel();
    let _ = scan_loop.await;

    result
}
