use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    session::{Credentials, SessionManager},
    status::{gb_to_bytes, local_midnight_plus_ms, AccountStatus},
    transport::{HttpTransport, PanelRequest, PanelResponse, PanelTransport},
    wire::{client_upsert, decode_settings, ClientEntry, ClientTraffic, Envelope, InboundSummary},
};
use crate::{config::PanelConfig, errors::Error, ports::AccountPanel, Result};

const SUB_ID_LEN: usize = 16;

/// A client as listed by the panel, plus its live status when available.
#[derive(Clone, Debug)]
pub struct PanelAccount {
    pub inbound_id: i64,
    pub client: ClientEntry,
    pub status: Option<AccountStatus>,
}

impl PanelAccount {
    pub fn client_id(&self) -> Option<&str> {
        Some(self.client.id.as_str()).filter(|id| !id.is_empty())
    }
}

/// Typed operations against one inbound of the panel.
pub struct PanelClient {
    session: Arc<SessionManager>,
    transport: Arc<dyn PanelTransport>,
    inbound_id: i64,
}

impl PanelClient {
    /// `session` must log in through the same `transport` so cookies are shared.
    pub fn new(
        session: Arc<SessionManager>,
        transport: Arc<dyn PanelTransport>,
        inbound_id: i64,
    ) -> Self {
        Self {
            session,
            transport,
            inbound_id,
        }
    }

    pub fn from_config(cfg: &PanelConfig) -> Result<Self> {
        let transport: Arc<dyn PanelTransport> =
            Arc::new(HttpTransport::new(cfg.base_url.clone(), cfg.request_timeout)?);
        let session = Arc::new(SessionManager::new(
            transport.clone(),
            Credentials {
                username: cfg.username.clone(),
                password: cfg.password.clone(),
            },
            cfg.session_timeout,
        ));
        Ok(Self::new(session, transport, cfg.inbound_id))
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn inbound_id(&self) -> i64 {
        self.inbound_id
    }

    /// Send one request with the session protocol applied.
    ///
    /// A 401 triggers exactly one forced re-login and one retry; a second 401
    /// is final. Non-2xx answers become transport errors.
    async fn execute(&self, req: PanelRequest) -> Result<PanelResponse> {
        if !self.session.ensure_authenticated().await {
            return Err(Error::Auth("failed to log in to the panel".to_string()));
        }

        let mut resp = self.transport.send(&req).await?;
        if resp.is_unauthorized() {
            debug!(path = %req.path, "panel session expired, logging in again");
            if !self.session.login(true).await {
                return Err(Error::Auth("re-login after 401 failed".to_string()));
            }
            resp = self.transport.send(&req).await?;
            if resp.is_unauthorized() {
                self.session.invalidate().await;
                return Err(Error::Auth(format!(
                    "{} {} still unauthorized after re-login",
                    req.method, req.path
                )));
            }
        }

        if !resp.is_success() {
            return Err(Error::Transport(format!(
                "{} {} returned HTTP {}",
                req.method, req.path, resp.status
            )));
        }
        Ok(resp)
    }

    /// `execute` + envelope decoding; `success:false` becomes `Error::Panel`.
    async fn call<T: DeserializeOwned>(&self, req: PanelRequest) -> Result<Option<T>> {
        let path = req.path.clone();
        let resp = self.execute(req).await?;
        let env: Envelope<T> = serde_json::from_str(&resp.body)
            .map_err(|e| Error::Decode(format!("{path}: {e}")))?;
        if !env.success {
            let msg = if env.msg.trim().is_empty() {
                "unknown error".to_string()
            } else {
                env.msg
            };
            return Err(Error::Panel(msg));
        }
        Ok(env.obj)
    }

    async fn fetch_status(&self, email: &str) -> Result<Option<AccountStatus>> {
        let path = format!("/panel/api/inbounds/getClientTraffics/{email}");
        let Some(obj) = self.call::<serde_json::Value>(PanelRequest::get(path)).await? else {
            return Ok(None);
        };
        if obj.as_object().map(|m| m.is_empty()).unwrap_or(true) {
            return Ok(None);
        }
        let traffic: ClientTraffic = serde_json::from_value(obj)
            .map_err(|e| Error::Decode(format!("client traffic for {email}: {e}")))?;
        Ok(Some(AccountStatus::from_traffic(
            email,
            &traffic,
            Utc::now().timestamp_millis(),
        )))
    }

    async fn upsert_client(&self, path: String, entry: ClientEntry) -> Result<()> {
        let body = serde_json::to_value(client_upsert(self.inbound_id, entry)?)?;
        self.call::<serde_json::Value>(PanelRequest::post(path, Some(body)))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AccountPanel for PanelClient {
    async fn ensure_authenticated(&self) -> bool {
        self.session.ensure_authenticated().await
    }

    async fn get_status(&self, email: &str) -> Option<AccountStatus> {
        match self.fetch_status(email).await {
            Ok(status) => status,
            Err(e) => {
                warn!(email, "client status unavailable: {e}");
                None
            }
        }
    }

    async fn create_account(
        &self,
        email: &str,
        total_bytes: i64,
        expiry_ms: i64,
    ) -> Result<String> {
        let client_id = Uuid::new_v4().to_string();
        let sub_id: String = Uuid::new_v4().to_string().chars().take(SUB_ID_LEN).collect();
        let entry = ClientEntry::provisioned(&client_id, email, total_bytes, expiry_ms, sub_id);

        self.upsert_client("/panel/api/inbounds/addClient".to_string(), entry)
            .await
            .inspect_err(|e| warn!(email, "failed to create client: {e}"))?;

        info!(email, client_id = %client_id, "client created");
        Ok(client_id)
    }

    async fn extend_account(
        &self,
        email: &str,
        client_id: &str,
        additional_gb: f64,
        extend_by: TimeDelta,
    ) -> Result<()> {
        if !self.session.ensure_authenticated().await {
            return Err(Error::Auth("failed to log in to the panel".to_string()));
        }

        let current = self
            .get_status(email)
            .await
            .ok_or_else(|| Error::NotFound(format!("could not find client information for {email}")))?;

        let new_total_gb = current.total_gb + additional_gb;
        let expiry_ms = local_midnight_plus_ms(current.expiry_date, extend_by);
        let sub_id: String = client_id.chars().take(SUB_ID_LEN).collect();
        let entry =
            ClientEntry::provisioned(client_id, email, gb_to_bytes(new_total_gb), expiry_ms, sub_id);

        self.upsert_client(format!("/panel/api/inbounds/updateClient/{client_id}"), entry)
            .await
            .inspect_err(|e| warn!(email, "failed to extend client: {e}"))?;

        info!(email, new_total_gb, expiry_ms, "client extended");
        Ok(())
    }

    async fn list_all_accounts(&self) -> Result<Vec<PanelAccount>> {
        let inbounds: Vec<InboundSummary> = self
            .call(PanelRequest::get("/panel/api/inbounds/list"))
            .await?
            .unwrap_or_default();

        let mut out = Vec::new();
        for inbound in inbounds.into_iter().filter(|i| i.id == self.inbound_id) {
            let settings = decode_settings(&inbound.settings)?;
            for client in settings.clients {
                let status = if client.email.is_empty() {
                    None
                } else {
                    self.get_status(&client.email).await
                };
                out.push(PanelAccount {
                    inbound_id: inbound.id,
                    client,
                    status,
                });
            }
        }

        debug!(count = out.len(), "listed panel clients");
        Ok(out)
    }

    async fn delete_account(&self, client_id: &str) -> Result<()> {
        let path = format!(
            "/panel/api/inbounds/{}/delClient/{client_id}",
            self.inbound_id
        );
        self.call::<serde_json::Value>(PanelRequest::post(path, None))
            .await
            .inspect_err(|e| warn!(client_id, "failed to delete client: {e}"))?;
        info!(client_id, "client deleted from panel");
        Ok(())
    }
}
