use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

/// Typed configuration for the bot, loaded from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub admin_ids: Vec<i64>,

    // Panel
    pub panel: PanelConfig,

    // Ledger
    pub db_file: PathBuf,

    // Notifier
    pub notify: NotifyPolicy,
    pub notify_interval: Duration,

    // Admin listing
    pub page_size: usize,

    // Subscription links
    pub link: LinkConfig,
}

/// Connection settings for the x-ui panel.
#[derive(Clone, Debug)]
pub struct PanelConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub inbound_id: i64,
    /// Uniform bound applied to every panel HTTP call.
    pub request_timeout: Duration,
    /// Age after which a locally-authenticated session is refreshed.
    pub session_timeout: Duration,
}

/// Thresholds for the expiry/usage notifier.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NotifyPolicy {
    pub traffic_threshold_percent: f64,
    pub days_threshold: i64,
    /// Minimum spacing between two notifications for the same account.
    pub cooldown: Duration,
}

impl Default for NotifyPolicy {
    fn default() -> Self {
        Self {
            traffic_threshold_percent: 90.0,
            days_threshold: 2,
            cooldown: Duration::from_secs(24 * 3600),
        }
    }
}

/// Parameters baked into generated `vless://` links.
#[derive(Clone, Debug, Default)]
pub struct LinkConfig {
    pub address: String,
    pub port: u16,
    pub host: String,
    pub sni: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = required("TELEGRAM_BOT_TOKEN")?;
        let base_url = required("XUI_URL")?;
        let username = required("XUI_USERNAME")?;
        let password = required("XUI_PASSWORD")?;

        let admin_ids = parse_csv_i64(env_str("ADMIN_IDS"));
        if admin_ids.is_empty() {
            tracing::warn!("ADMIN_IDS is empty; admin commands are disabled");
        }

        let panel = PanelConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            password,
            inbound_id: env_i64("INBOUND_ID").unwrap_or(1),
            request_timeout: Duration::from_secs(env_u64("PANEL_TIMEOUT_SECS").unwrap_or(20)),
            session_timeout: Duration::from_secs(
                env_u64("SESSION_TIMEOUT_SECS").unwrap_or(1800),
            ),
        };

        let db_file = env_str("DB_FILE")
            .and_then(non_empty)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("xui_bot.db"));

        let defaults = NotifyPolicy::default();
        let notify = NotifyPolicy {
            traffic_threshold_percent: env_f64("TRAFFIC_THRESHOLD_PERCENT")
                .unwrap_or(defaults.traffic_threshold_percent),
            days_threshold: env_i64("DAYS_THRESHOLD").unwrap_or(defaults.days_threshold),
            cooldown: defaults.cooldown,
        };
        let notify_interval = notify_interval(env_u64("NOTIFY_INTERVAL_SECS"));

        let page_size = env_u64("PAGE_SIZE").map(|v| v as usize).unwrap_or(5).max(1);

        let link = LinkConfig {
            address: env_str("SERVER_ADDRESS").unwrap_or_default(),
            port: env_u64("SERVER_PORT")
                .and_then(|p| u16::try_from(p).ok())
                .unwrap_or(2087),
            host: env_str("WS_HOST").unwrap_or_default(),
            sni: env_str("TLS_SNI").unwrap_or_default(),
        };

        Ok(Self {
            telegram_bot_token,
            admin_ids,
            panel,
            db_file,
            notify,
            notify_interval,
            page_size,
            link,
        })
    }
}

const DEFAULT_NOTIFY_INTERVAL_SECS: u64 = 3600;
const MIN_NOTIFY_INTERVAL_SECS: u64 = 60;

// Each scan costs one panel call per active account; never loop faster than a minute.
fn notify_interval(secs: Option<u64>) -> Duration {
    let secs = secs.unwrap_or(DEFAULT_NOTIFY_INTERVAL_SECS);
    if secs < MIN_NOTIFY_INTERVAL_SECS {
        tracing::warn!(
            secs,
            min = MIN_NOTIFY_INTERVAL_SECS,
            "NOTIFY_INTERVAL_SECS too small; clamping"
        );
    }
    Duration::from_secs(secs.max(MIN_NOTIFY_INTERVAL_SECS))
}

fn required(key: &str) -> Result<String> {
    env_str(key)
        .and_then(non_empty)
        .ok_or_else(|| Error::Config(format!("{key} environment variable is required")))
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, unquote(v.trim()));
    }
}

fn unquote(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return &val[1..val.len() - 1];
    }
    val
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_i64(key: &str) -> Option<i64> {
    env_str(key).and_then(|s| s.trim().parse::<i64>().ok())
}

fn env_f64(key: &str) -> Option<f64> {
    env_str(key).and_then(|s| s.trim().parse::<f64>().ok())
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
