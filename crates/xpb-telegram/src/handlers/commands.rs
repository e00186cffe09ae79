use tracing::{info, warn};

use xpb_core::{
    accounts::{TrialOutcome, TrialPlan},
    domain::{UserId, UserProfile},
    ledger::unix_timestamp,
    security::is_admin,
    Error,
};

use crate::router::AppState;

use super::{
    render::{self, escape_html},
    reply, HINT,
};

const USERS_LIMIT: i64 = 50;

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

/// `/clients 3` is one-based for humans; pages are zero-based internally.
fn parse_page(arg: &str) -> usize {
    arg.trim()
        .parse::<usize>()
        .map(|p| p.saturating_sub(1))
        .unwrap_or(0)
}

/// `<user_id> <gb> <days>`, both amounts positive.
fn parse_create(arg: &str) -> Option<(i64, f64, i64)> {
    let mut it = arg.split_whitespace();
    let user_id = it.next()?.parse::<i64>().ok()?;
    let gb = it.next()?.parse::<f64>().ok().filter(|g| g.is_finite() && *g > 0.0)?;
    let days = it.next()?.parse::<i64>().ok().filter(|d| *d > 0)?;
    it.next().is_none().then_some((user_id, gb, days))
}

/// `<email> <gb> <days>`; either amount may be zero, not both.
fn parse_renew(arg: &str) -> Option<(String, f64, i64)> {
    let mut it = arg.split_whitespace();
    let email = it.next()?.to_string();
    let gb = it.next()?.parse::<f64>().ok().filter(|g| g.is_finite() && *g >= 0.0)?;
    let days = it.next()?.parse::<i64>().ok().filter(|d| *d >= 0)?;
    if it.next().is_some() || (gb == 0.0 && days == 0) {
        return None;
    }
    Some((email, gb, days))
}

fn error_text(e: &Error) -> String {
    match e {
        Error::Database(_) => "⚠️ دیتابیس در دسترس نیست.".to_string(),
        Error::NotFound(msg) => format!("❌ یافت نشد: <code>{}</code>", escape_html(msg)),
        other => format!("❌ خطا: <code>{}</code>", escape_html(&other.to_string())),
    }
}

const HELP: &str = "🤖 <b>ربات مدیریت سرویس VPN</b>\n\n\
<b>📋 دستورات:</b>\n\
/configs - وضعیت سرویس‌های من\n\
/trial 1 - هدیه ۱ گیگابایت (۱ روزه)\n\
/trial 5 - هدیه ۵ گیگابایت (۷ روزه)";

const ADMIN_HELP: &str = "\n\n<b>🛠 مدیریت:</b>\n\
/clients [صفحه] - لیست کلاینت ها\n\
/delclient &lt;شناسه&gt; - حذف کلاینت\n\
/create &lt;کاربر&gt; &lt;گیگ&gt; &lt;روز&gt; - ساخت سرویس\n\
/renew &lt;ایمیل&gt; &lt;گیگ&gt; &lt;روز&gt; - تمدید سرویس\n\
/extendall &lt;روز&gt; - تمدید همه سرویس‌ها\n\
/users - لیست کاربران\n\
/broadcast &lt;متن&gt; - ارسال پیام همگانی\n\
/scan - بررسی فوری انقضا و حجم";

/// Route one text message from `caller`; every answer goes out via `reply`.
pub(crate) async fn dispatch(state: &AppState, caller: &UserProfile, chat_id: i64, text: &str) {
    if !text.starts_with('/') {
        reply(state, chat_id, HINT).await;
        return;
    }

    let user_id = caller.user_id;
    let admin = is_admin(Some(UserId(user_id)), &state.cfg.admin_ids);
    let (cmd, arg) = parse_command(text);

    match cmd.as_str() {
        "start" | "help" => {
            if let Err(e) = state.accounts.register(caller).await {
                warn!(user_id, "failed to register user: {e}");
            }
            let body = if admin {
                format!("{HELP}{ADMIN_HELP}")
            } else {
                HELP.to_string()
            };
            reply(state, chat_id, &body).await;
        }

        "configs" => {
            let configs = match state.accounts.my_configs(user_id).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(user_id, "cannot list configs: {e}");
                    reply(state, chat_id, "⚠️ خطا در دریافت اطلاعات سرویس.").await;
                    return;
                }
            };
            if configs.is_empty() {
                reply(state, chat_id, "سرویسی برای شما یافت نشد.").await;
                return;
            }
            for rec in configs {
                let body = match state.accounts.status(user_id, &rec.email).await {
                    Ok(st) => render::config_status(&rec.email, &st),
                    Err(e) => {
                        warn!(email = %rec.email, "status unavailable: {e}");
                        format!(
                            "⚠️ خطا در دریافت اطلاعات سرویس <code>{}</code>.",
                            escape_html(&rec.email)
                        )
                    }
                };
                reply(state, chat_id, &body).await;
            }
        }

        "trial" => {
            let Some(plan) = arg.trim().parse::<u32>().ok().and_then(TrialPlan::from_gb) else {
                reply(state, chat_id, "گزینه نامعتبر. استفاده: /trial 1 یا /trial 5").await;
                return;
            };
            let body = match state.accounts.grant_trial(caller, plan).await {
                Ok(TrialOutcome::Granted(p)) => render::provisioned(&p),
                Ok(TrialOutcome::AlreadyUsed) => {
                    format!("❗ شما قبلاً از هدیه {}GB استفاده کرده‌اید.", plan.gb())
                }
                Err(e) => {
                    warn!(user_id, "trial failed: {e}");
                    "⚠️ خطا در ایجاد هدیه. لطفاً دوباره تلاش کنید.".to_string()
                }
            };
            reply(state, chat_id, &body).await;
        }

        "clients" | "delclient" | "scan" | "extendall" | "create" | "renew" | "users"
        | "broadcast"
            if !admin =>
        {
            reply(state, chat_id, "دسترسی رد شد.").await;
        }

        "clients" => {
            let (page, snap) = state.engine.page(parse_page(&arg)).await;
            reply(state, chat_id, &render::client_page(&page, &snap)).await;
        }

        "delclient" => {
            let client_id = arg.trim();
            if client_id.is_empty() {
                reply(state, chat_id, "استفاده: /delclient &lt;شناسه&gt;").await;
                return;
            }
            info!(admin = user_id, client_id, "admin delete requested");
            let outcome = state.engine.delete_client(client_id).await;
            reply(state, chat_id, &render::delete_outcome(client_id, &outcome)).await;
        }

        "create" => {
            let Some((owner, gb, days)) = parse_create(&arg) else {
                reply(state, chat_id, "استفاده: /create &lt;کاربر&gt; &lt;گیگ&gt; &lt;روز&gt;").await;
                return;
            };
            info!(admin = user_id, owner, gb, days, "admin create requested");
            match state.accounts.provision_for(owner, gb, days).await {
                Ok(p) => {
                    let body = render::provisioned(&p);
                    reply(state, chat_id, &body).await;
                    if owner != chat_id {
                        reply(state, owner, &body).await;
                    }
                }
                Err(e) => {
                    warn!(owner, "admin create failed: {e}");
                    reply(state, chat_id, &error_text(&e)).await;
                }
            }
        }

        "renew" => {
            let Some((email, gb, days)) = parse_renew(&arg) else {
                reply(state, chat_id, "استفاده: /renew &lt;ایمیل&gt; &lt;گیگ&gt; &lt;روز&gt;").await;
                return;
            };
            info!(admin = user_id, email = %email, gb, days, "admin renew requested");
            match state.accounts.renew_by_email(&email, gb, days).await {
                Ok(owner) => {
                    let body = format!(
                        "✅ سرویس <code>{}</code> تمدید شد: +{gb} گیگابایت، +{days} روز",
                        escape_html(&email)
                    );
                    reply(state, chat_id, &body).await;
                    if owner != chat_id {
                        reply(state, owner, &body).await;
                    }
                }
                Err(e) => {
                    warn!(email = %email, "admin renew failed: {e}");
                    reply(state, chat_id, &error_text(&e)).await;
                }
            }
        }

        "users" => {
            let body = match state.accounts.users(USERS_LIMIT).await {
                Ok(users) => render::users_list(&users),
                Err(e) => {
                    warn!("cannot list users: {e}");
                    error_text(&e)
                }
            };
            reply(state, chat_id, &body).await;
        }

        "broadcast" => {
            if arg.is_empty() {
                reply(state, chat_id, "لطفاً پیام خود را بعد از دستور /broadcast وارد کنید.").await;
                return;
            }
            info!(admin = user_id, "broadcast requested");
            let body = match state.broadcaster.send(&arg).await {
                Ok(report) => render::broadcast_report(&report),
                Err(e) => {
                    warn!("broadcast failed: {e}");
                    error_text(&e)
                }
            };
            reply(state, chat_id, &body).await;
        }

        "scan" => {
            let report = state.notifier.run_once(unix_timestamp()).await;
            reply(state, chat_id, &render::scan_report(&report)).await;
        }

        "extendall" => {
            let Some(days) = arg.trim().parse::<i64>().ok().filter(|d| *d > 0) else {
                reply(state, chat_id, "استفاده: /extendall &lt;روز&gt;").await;
                return;
            };
            let body = match state.accounts.extend_all(days).await {
                Ok(n) => format!("{n} کلاینت افزایش داده شدند"),
                Err(e) => {
                    warn!("bulk extend failed: {e}");
                    error_text(&e)
                }
            };
            reply(state, chat_id, &body).await;
        }

        _ => {
            reply(state, chat_id, "دستور ناشناخته. /start را بزنید.").await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        path::PathBuf,
        sync::{Arc, Mutex},
        time::Duration,
    };

    use async_trait::async_trait;
    use chrono::TimeDelta;

    use xpb_core::{
        accounts::AccountService,
        broadcast::Broadcaster,
        config::{Config, LinkConfig, NotifyPolicy, PanelConfig},
        domain::ChatId,
        ledger::Ledger,
        messaging::MessagingPort,
        notifier::ExpiryNotifier,
        panel::{AccountStatus, PanelAccount},
        ports::{AccountPanel, LedgerStore},
        reconcile::ReconciliationEngine,
        Result,
    };

    use super::*;

    const ADMIN: i64 = 1;

    /// Panel that accepts everything and remembers what it was asked.
    #[derive(Default)]
    struct StubPanel {
        calls: Mutex<Vec<String>>,
    }

    impl StubPanel {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AccountPanel for StubPanel {
        async fn ensure_authenticated(&self) -> bool {
            true
        }

        async fn get_status(&self, _email: &str) -> Option<AccountStatus> {
            None
        }

        async fn create_account(&self, email: &str, _total: i64, _expiry_ms: i64) -> Result<String> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(format!("create:{email}"));
            Ok(format!("cid-{}", calls.len()))
        }

        async fn extend_account(
            &self,
            email: &str,
            client_id: &str,
            additional_gb: f64,
            extend_by: TimeDelta,
        ) -> Result<()> {
            self.calls.lock().unwrap().push(format!(
                "extend:{email}:{client_id}:{additional_gb}:{}",
                extend_by.num_days()
            ));
            Ok(())
        }

        async fn list_all_accounts(&self) -> Result<Vec<PanelAccount>> {
            Ok(Vec::new())
        }

        async fn delete_account(&self, client_id: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("delete:{client_id}"));
            Ok(())
        }
    }

    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<(i64, String)>>,
    }

    impl Outbox {
        fn to(&self, chat: i64) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|(c, _)| *c == chat)
                .map(|(_, t)| t.clone())
                .collect()
        }
    }

    #[async_trait]
    impl MessagingPort for Outbox {
        async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()> {
            self.sent.lock().unwrap().push((chat_id.0, text.to_string()));
            Ok(())
        }

        async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<()> {
            self.send_text(chat_id, html).await
        }
    }

    fn config() -> Config {
        Config {
            telegram_bot_token: String::new(),
            admin_ids: vec![ADMIN],
            panel: PanelConfig {
                base_url: "http://panel.local".to_string(),
                username: "admin".to_string(),
                password: "secret".to_string(),
                inbound_id: 1,
                request_timeout: Duration::from_secs(1),
                session_timeout: Duration::from_secs(1800),
            },
            db_file: PathBuf::from(":memory:"),
            notify: NotifyPolicy::default(),
            notify_interval: Duration::from_secs(3600),
            page_size: 5,
            link: LinkConfig::default(),
        }
    }

    struct Harness {
        state: AppState,
        panel: Arc<StubPanel>,
        ledger: Arc<Ledger>,
        outbox: Arc<Outbox>,
    }

    async fn harness() -> Harness {
        let panel = Arc::new(StubPanel::default());
        let ledger = Arc::new(Ledger::open_in_memory().await.unwrap());
        let outbox = Arc::new(Outbox::default());
        let dyn_panel: Arc<dyn AccountPanel> = panel.clone();
        let store: Arc<dyn LedgerStore> = ledger.clone();
        let messenger: Arc<dyn MessagingPort> = outbox.clone();

        let state = AppState {
            cfg: Arc::new(config()),
            accounts: Arc::new(AccountService::new(
                dyn_panel.clone(),
                ledger.clone(),
                LinkConfig::default(),
            )),
            engine: Arc::new(ReconciliationEngine::new(dyn_panel.clone(), store.clone(), 5)),
            notifier: Arc::new(ExpiryNotifier::new(
                dyn_panel,
                store,
                messenger.clone(),
                NotifyPolicy::default(),
            )),
            broadcaster: Arc::new(Broadcaster::new(ledger.clone(), messenger.clone())),
            messenger,
        };
        Harness {
            state,
            panel,
            ledger,
            outbox,
        }
    }

    fn profile(user_id: i64) -> UserProfile {
        UserProfile {
            user_id,
            username: None,
            first_name: Some("T".to_string()),
            last_name: None,
        }
    }

    #[test]
    fn parses_bot_suffix_and_args() {
        assert_eq!(
            parse_command("/Clients@xui_bot 3"),
            ("clients".to_string(), "3".to_string())
        );
        assert_eq!(
            parse_command("/delclient   abc-def "),
            ("delclient".to_string(), "abc-def".to_string())
        );
        assert_eq!(parse_command("/scan"), ("scan".to_string(), String::new()));
    }

    #[test]
    fn page_argument_is_one_based() {
        assert_eq!(parse_page(""), 0);
        assert_eq!(parse_page("1"), 0);
        assert_eq!(parse_page("3"), 2);
        assert_eq!(parse_page("0"), 0);
        assert_eq!(parse_page("x"), 0);
    }

    #[test]
    fn create_and_renew_arguments() {
        assert_eq!(parse_create("42 10 30"), Some((42, 10.0, 30)));
        assert_eq!(parse_create("42 0 30"), None);
        assert_eq!(parse_create("42 10"), None);
        assert_eq!(parse_create("42 10 30 x"), None);

        assert_eq!(
            parse_renew("a@vpn 5 0"),
            Some(("a@vpn".to_string(), 5.0, 0))
        );
        assert_eq!(parse_renew("a@vpn 0 0"), None);
        assert_eq!(parse_renew("a@vpn -1 3"), None);
    }

    #[tokio::test]
    async fn plain_text_gets_the_hint_through_the_messenger() {
        let h = harness().await;
        dispatch(&h.state, &profile(5), 5, "hello").await;
        assert_eq!(h.outbox.to(5), vec![HINT.to_string()]);
    }

    #[tokio::test]
    async fn admin_commands_are_refused_to_users() {
        let h = harness().await;
        for cmd in ["/create 5 10 30", "/renew a@vpn 1 1", "/broadcast hi", "/users"] {
            dispatch(&h.state, &profile(5), 5, cmd).await;
        }
        assert!(h.outbox.to(5).iter().all(|t| t == "دسترسی رد شد."));
        assert!(h.panel.calls().is_empty());
    }

    #[tokio::test]
    async fn create_provisions_and_tells_the_owner() {
        let h = harness().await;
        dispatch(&h.state, &profile(ADMIN), ADMIN, "/create 42 10 30").await;

        assert_eq!(h.panel.calls().len(), 1);
        assert!(h.panel.calls()[0].starts_with("create:42_"));
        let recs = h.ledger.user_configs(42).await.unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].total_gb, 10.0);
        assert!(h.outbox.to(ADMIN)[0].contains("🎉"));
        assert!(h.outbox.to(42)[0].contains(&recs[0].email));
    }

    #[tokio::test]
    async fn renew_extends_panel_then_ledger() {
        let h = harness().await;
        h.ledger.insert(42, "u42_abc@vpn", "cid-9", 10.0).await.unwrap();

        dispatch(&h.state, &profile(ADMIN), ADMIN, "/renew u42_abc@vpn 5 30").await;

        assert_eq!(h.panel.calls(), vec!["extend:u42_abc@vpn:cid-9:5:30".to_string()]);
        let rec = h.ledger.config_by_email("u42_abc@vpn").await.unwrap().unwrap();
        assert_eq!(rec.total_gb, 15.0);
        assert!(h.outbox.to(ADMIN)[0].starts_with("✅"));
        assert_eq!(h.outbox.to(42).len(), 1);
    }

    #[tokio::test]
    async fn renew_of_unknown_email_reports_not_found() {
        let h = harness().await;
        dispatch(&h.state, &profile(ADMIN), ADMIN, "/renew ghost@vpn 5 30").await;
        assert!(h.panel.calls().is_empty());
        assert!(h.outbox.to(ADMIN)[0].contains("یافت نشد"));
    }

    #[tokio::test]
    async fn broadcast_reaches_registered_users_and_reports() {
        let h = harness().await;
        for id in [10, 11] {
            h.ledger.upsert_user(&profile(id)).await.unwrap();
        }

        dispatch(&h.state, &profile(ADMIN), ADMIN, "/broadcast panel upgrade tonight").await;

        for id in [10, 11] {
            let got = h.outbox.to(id);
            assert_eq!(got.len(), 1);
            assert!(got[0].ends_with("panel upgrade tonight"));
        }
        assert!(h.outbox.to(ADMIN)[0].contains("پیام به 2 کاربر"));
    }

    #[tokio::test]
    async fn users_lists_registered_users() {
        let h = harness().await;
        h.ledger.insert(77, "u77@vpn", "cid-1", 1.0).await.unwrap();

        dispatch(&h.state, &profile(ADMIN), ADMIN, "/users").await;

        let got = h.outbox.to(ADMIN);
        assert!(got[0].contains("<code>77</code>"));
        assert!(got[0].contains("تعداد کانفیگ: 1"));
    }
}
