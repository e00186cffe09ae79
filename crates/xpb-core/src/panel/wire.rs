//! Typed schema for the panel's JSON API.
//!
//! Inbound client settings travel as a JSON document *encoded into a string*
//! inside the outer JSON body; `encode_settings` / `decode_settings` own that
//! second layer.

use serde::{Deserialize, Serialize};

use crate::{errors::Error, Result};

/// Common response envelope: `{success, msg, obj}`.
#[derive(Clone, Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub msg: String,
    pub obj: Option<T>,
}

/// Traffic counters for one client (`getClientTraffics/{email}`).
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientTraffic {
    pub email: String,
    pub up: i64,
    pub down: i64,
    pub total: i64,
    #[serde(rename = "expiryTime")]
    pub expiry_time: i64,
    pub enable: bool,
}

/// One client inside an inbound's settings document.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientEntry {
    pub id: String,
    pub flow: String,
    pub email: String,
    pub limit_ip: i64,
    /// Quota in bytes, despite the field name.
    #[serde(rename = "totalGB")]
    pub total_gb: i64,
    pub expiry_time: i64,
    pub enable: bool,
    /// The panel stores either a string or a number here.
    pub tg_id: serde_json::Value,
    pub sub_id: String,
    pub reset: i64,
}

impl ClientEntry {
    /// Entry shape used for both `addClient` and `updateClient`.
    pub fn provisioned(
        id: impl Into<String>,
        email: impl Into<String>,
        total_bytes: i64,
        expiry_ms: i64,
        sub_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            flow: String::new(),
            email: email.into(),
            limit_ip: 0,
            total_gb: total_bytes,
            expiry_time: expiry_ms,
            enable: true,
            tg_id: serde_json::Value::String(String::new()),
            sub_id: sub_id.into(),
            reset: 0,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientSettings {
    pub clients: Vec<ClientEntry>,
}

/// Body of `addClient` / `updateClient/{id}`.
#[derive(Clone, Debug, Serialize)]
pub struct ClientUpsert {
    pub id: i64,
    pub settings: String,
}

/// The part of an inbound listing entry we care about.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct InboundSummary {
    pub id: i64,
    pub settings: String,
}

pub fn encode_settings(settings: &ClientSettings) -> Result<String> {
    Ok(serde_json::to_string(settings)?)
}

pub fn decode_settings(raw: &str) -> Result<ClientSettings> {
    if raw.trim().is_empty() {
        return Ok(ClientSettings::default());
    }
    serde_json::from_str(raw).map_err(|e| Error::Decode(format!("inbound settings: {e}")))
}

/// Build the `addClient` / `updateClient` body for a single client.
pub fn client_upsert(inbound_id: i64, entry: ClientEntry) -> Result<ClientUpsert> {
    let settings = encode_settings(&ClientSettings {
        clients: vec![entry],
    })?;
    Ok(ClientUpsert {
        id: inbound_id,
        settings,
    })
}
