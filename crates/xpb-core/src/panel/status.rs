//! Derived account status and the unit conversions behind it.

use std::fmt;

use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};

use super::wire::ClientTraffic;

pub const BYTES_PER_GB: f64 = 1_073_741_824.0;
const SECS_PER_DAY: i64 = 86_400;
const SECS_PER_HOUR: i64 = 3_600;

/// Round to two decimals (quota display precision).
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub fn bytes_to_gb(bytes: i64) -> f64 {
    round2(bytes as f64 / BYTES_PER_GB)
}

/// GB → bytes, truncating any fractional byte.
pub fn gb_to_bytes(gb: f64) -> i64 {
    (gb * BYTES_PER_GB) as i64
}

/// Calendar date (local time zone) of an epoch-milliseconds instant.
pub fn epoch_ms_to_local_date(ms: i64) -> NaiveDate {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.with_timezone(&Local).date_naive())
        .unwrap_or_else(|| DateTime::<Utc>::UNIX_EPOCH.date_naive())
}

/// Local midnight of `date`, shifted by `by`, as epoch milliseconds.
pub fn local_midnight_plus_ms(date: NaiveDate, by: TimeDelta) -> i64 {
    let naive = date.and_time(NaiveTime::MIN);
    let start = Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp_millis())
        .unwrap_or_else(|| naive.and_utc().timestamp_millis());
    start + by.num_milliseconds()
}

/// Whole days + hours left before expiry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemainingTime {
    pub days: i64,
    pub hours: i64,
}

impl RemainingTime {
    pub fn from_seconds(secs: i64) -> Self {
        let secs = secs.max(0);
        Self {
            days: secs / SECS_PER_DAY,
            hours: (secs % SECS_PER_DAY) / SECS_PER_HOUR,
        }
    }
}

impl fmt::Display for RemainingTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.days > 0 {
            write!(f, "{} روز", self.days)?;
            if self.hours > 0 {
                write!(f, " و {} ساعت", self.hours)?;
            }
            return Ok(());
        }
        write!(f, "{} ساعت", self.hours)
    }
}

/// Live status of one panel account, with derived remaining quota/time.
#[derive(Clone, Debug, PartialEq)]
pub struct AccountStatus {
    pub email: String,
    pub total_bytes: i64,
    pub used_bytes: i64,
    pub remaining_bytes: i64,
    pub total_gb: f64,
    pub remaining_gb: f64,
    pub expiry_epoch_ms: i64,
    pub expiry_date: NaiveDate,
    pub remaining: RemainingTime,
    pub remaining_time_display: String,
    pub is_active: bool,
}

impl AccountStatus {
    pub fn from_traffic(email: &str, traffic: &ClientTraffic, now_ms: i64) -> Self {
        let used_bytes = traffic.up + traffic.down;
        let remaining_bytes = (traffic.total - used_bytes).max(0);
        let remaining_secs = (traffic.expiry_time - now_ms).max(0) / 1000;
        let remaining = RemainingTime::from_seconds(remaining_secs);

        Self {
            email: email.to_string(),
            total_bytes: traffic.total,
            used_bytes,
            remaining_bytes,
            total_gb: bytes_to_gb(traffic.total),
            remaining_gb: bytes_to_gb(remaining_bytes),
            expiry_epoch_ms: traffic.expiry_time,
            expiry_date: epoch_ms_to_local_date(traffic.expiry_time),
            remaining,
            remaining_time_display: remaining.to_string(),
            is_active: traffic.enable,
        }
    }

    pub fn remaining_days(&self) -> i64 {
        self.remaining.days
    }

    pub fn remaining_hours(&self) -> i64 {
        self.remaining.hours
    }

    /// Share of the quota already consumed, in percent; 0 for an unlimited quota.
    pub fn used_percentage(&self) -> f64 {
        if self.total_gb <= 0.0 {
            return 0.0;
        }
        (self.total_gb - self.remaining_gb) / self.total_gb * 100.0
    }
}
