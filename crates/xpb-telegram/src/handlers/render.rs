//! HTML rendering of core results for Telegram.

use std::fmt::Write as _;

use chrono::DateTime;
use xpb_core::{
    accounts::{ConfigStatus, Provisioned},
    broadcast::BroadcastReport,
    ledger::UserSummary,
    notifier::{ScanAbort, ScanReport},
    reconcile::{ClientPage, DeleteOutcome, Provenance, ReconciledClient, Snapshot},
};

const UNKNOWN: &str = "نامشخص";

pub(crate) fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

fn active_label(active: bool) -> &'static str {
    if active {
        "✅ فعال"
    } else {
        "❌ غیرفعال"
    }
}

pub(crate) fn config_status(email: &str, st: &ConfigStatus) -> String {
    let s = &st.status;
    format!(
        "{icon} <b>وضعیت سرویس</b>\n\
         📧 نام: <code>{email}</code>\n\
         📊 حجم باقیمانده: {rem} گیگابایت از {total} گیگابایت\n\
         ⏳ زمان باقیمانده: {time} (تا {date})\n\
         🔌 وضعیت: {active}\n\n\
         🔗 لینک کانفیگ:\n<code>{link}</code>",
        icon = if s.is_active { "✅" } else { "❌" },
        email = escape_html(email),
        rem = s.remaining_gb,
        total = s.total_gb,
        time = escape_html(&s.remaining_time_display),
        date = s.expiry_date,
        active = active_label(s.is_active),
        link = escape_html(&st.link),
    )
}

pub(crate) fn provisioned(p: &Provisioned) -> String {
    format!(
        "🎉 سرویس شما آماده شد!\n📧 <code>{}</code>\n\n🔗 لینک کانفیگ:\n<code>{}</code>",
        escape_html(&p.email),
        escape_html(&p.link)
    )
}

fn provenance_marker(c: &ReconciledClient) -> &'static str {
    match c.provenance() {
        Provenance::Both => "📱💾",
        Provenance::PanelOnly => "📱",
        Provenance::LedgerOnly => "💾",
    }
}

fn client_entry(out: &mut String, n: usize, c: &ReconciledClient) {
    let _ = writeln!(out, "{n}. {} {}", provenance_marker(c), escape_html(&c.email));

    if c.username.is_some() || c.first_name.is_some() {
        let _ = writeln!(
            out,
            "   👤 کاربر: {} (@{})",
            escape_html(c.first_name.as_deref().unwrap_or("")),
            escape_html(c.username.as_deref().unwrap_or(""))
        );
    }

    let total = c.total_gb.or(c.ledger_total_gb).unwrap_or(0.0);
    let remaining = c.remaining_gb.unwrap_or(0.0);
    let _ = write!(out, "   📊 حجم: {remaining}/{total} GB");
    if c.quota_diverges() {
        if let Some(ledger) = c.ledger_total_gb {
            let _ = write!(out, " (💾 {ledger} GB)");
        }
    }
    out.push('\n');

    let time = c.remaining_time_display.as_deref().unwrap_or(UNKNOWN);
    let date = c
        .expiry_date
        .map(|d| d.to_string())
        .unwrap_or_else(|| UNKNOWN.to_string());
    let _ = writeln!(out, "   ⏳ زمان: {} (تا {date})", escape_html(time));
    let _ = writeln!(out, "   🔌 وضعیت: {}", active_label(c.is_active));
    let id = c.client_id.as_deref().map(short_id).unwrap_or_else(|| UNKNOWN.to_string());
    let _ = writeln!(out, "   🆔 شناسه: <code>{}</code>\n", escape_html(&id));
}

pub(crate) fn client_page(page: &ClientPage, snap: &Snapshot) -> String {
    if page.total == 0 {
        let mut out = "⚠️ هیچ کلاینتی یافت نشد.".to_string();
        if let Some(e) = &snap.panel_error {
            let _ = write!(out, "\n\n⚠️ پنل در دسترس نیست: {}", escape_html(e));
        }
        return out;
    }

    let mut out = format!(
        "👨‍💻 <b>لیست کلاینت ها</b> (صفحه {} از {}):\n📊 تعداد کل: {} | 🔌 پنل: {} | 💾 دیتابیس: {}\n",
        page.page + 1,
        page.total_pages,
        page.total,
        snap.panel_count,
        snap.ledger_count
    );
    if let Some(e) = &snap.panel_error {
        let _ = writeln!(out, "⚠️ پنل در دسترس نیست: {}", escape_html(e));
    }
    if let Some(e) = &snap.ledger_error {
        let _ = writeln!(out, "⚠️ دیتابیس در دسترس نیست: {}", escape_html(e));
    }
    out.push('\n');

    for (i, c) in page.items.iter().enumerate() {
        client_entry(&mut out, i + 1, c);
    }

    if page.page + 1 < page.total_pages {
        let _ = write!(out, "➡️ صفحه بعد: /clients {}", page.page + 2);
    }
    out
}

pub(crate) fn delete_outcome(client_id: &str, outcome: &DeleteOutcome) -> String {
    let id = escape_html(&short_id(client_id));
    match outcome {
        DeleteOutcome::Deleted { ledger_removed: true } => format!(
            "✅ کلاینت با شناسه {id}... با موفقیت حذف شد.\n✅ اطلاعات مربوطه از دیتابیس نیز حذف شد."
        ),
        DeleteOutcome::Deleted {
            ledger_removed: false,
        } => format!(
            "✅ کلاینت با شناسه {id}... با موفقیت حذف شد.\nℹ️ رکوردی در دیتابیس وجود نداشت."
        ),
        DeleteOutcome::LedgerCleanupFailed { reason } => format!(
            "✅ کلاینت با شناسه {id}... از پنل حذف شد.\n⚠️ حذف از دیتابیس ناموفق بود. کاربران ممکن است همچنان کانفیگ را در لیست خود مشاهده کنند.\n<code>{}</code>",
            escape_html(reason)
        ),
        DeleteOutcome::PanelFailed(reason) => {
            format!("❌ خطا در حذف کلاینت:\n<code>{}</code>", escape_html(reason))
        }
    }
}

pub(crate) fn scan_report(r: &ScanReport) -> String {
    match &r.aborted {
        Some(ScanAbort::Busy) => return "⏳ بررسی دیگری در حال اجراست.".to_string(),
        Some(ScanAbort::AuthFailed) => return "❌ ورود به پنل ناموفق بود؛ بررسی انجام نشد.".to_string(),
        Some(ScanAbort::LedgerUnavailable(e)) => {
            return format!("❌ دیتابیس در دسترس نیست:\n<code>{}</code>", escape_html(e))
        }
        None => {}
    }
    format!(
        "🔔 <b>بررسی انجام شد</b>\n\
         سرویس‌های فعال: {}\n\
         اخیراً مطلع شده: {}\n\
         بدون وضعیت: {}\n\
         زیر آستانه: {}\n\
         اعلان ارسال شد: {}\n\
         ارسال ناموفق: {}",
        r.records, r.skipped_recent, r.status_unavailable, r.below_threshold, r.notified, r.delivery_failed
    )
}

pub(crate) fn users_list(users: &[UserSummary]) -> String {
    if users.is_empty() {
        return "هیچ کاربری یافت نشد.".to_string();
    }
    let mut out = "👥 <b>لیست کاربران:</b>\n\n".to_string();
    for u in users {
        let username = u
            .username
            .as_deref()
            .map(|n| format!("@{}", escape_html(n)))
            .unwrap_or_else(|| "بدون یوزرنیم".to_string());
        let last = u
            .last_created
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(|d| d.date_naive().to_string())
            .unwrap_or_else(|| "ندارد".to_string());
        let _ = writeln!(
            out,
            "👤 {} ({username})\n🆔 <code>{}</code>\n🔢 تعداد کانفیگ: {}\n📅 آخرین کانفیگ: {last}\n",
            escape_html(u.first_name.as_deref().unwrap_or("")),
            u.user_id,
            u.config_count,
        );
    }
    out
}

pub(crate) fn broadcast_report(r: &BroadcastReport) -> String {
    format!(
        "پیام به {} کاربر ارسال شد.\nارسال به {} کاربر ناموفق بود.",
        r.sent, r.failed
    )
}
