//! Test doubles for the panel transport.

use std::{sync::Mutex, time::Duration};

use async_trait::async_trait;

use super::transport::{PanelRequest, PanelResponse, PanelTransport};
use crate::Result;

type Handler = Box<dyn Fn(&PanelRequest) -> Result<PanelResponse> + Send + Sync>;

/// Transport that answers from a closure and records every request.
pub(crate) struct ScriptedTransport {
    handler: Handler,
    requests: Mutex<Vec<PanelRequest>>,
    delay: Option<Duration>,
}

impl ScriptedTransport {
    pub(crate) fn new(
        handler: impl Fn(&PanelRequest) -> Result<PanelResponse> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Sleep before answering, so concurrent callers overlap.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn requests(&self) -> Vec<PanelRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn calls_to(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .count()
    }
}

#[async_trait]
impl PanelTransport for ScriptedTransport {
    async fn send(&self, req: &PanelRequest) -> Result<PanelResponse> {
        self.requests.lock().unwrap().push(req.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.handler)(req)
    }
}

pub(crate) fn json(status: u16, body: serde_json::Value) -> Result<PanelResponse> {
    Ok(PanelResponse {
        status,
        body: body.to_string(),
    })
}

pub(crate) fn ok_envelope(obj: serde_json::Value) -> Result<PanelResponse> {
    json(200, serde_json::json!({ "success": true, "msg": "", "obj": obj }))
}

pub(crate) fn unauthorized() -> Result<PanelResponse> {
    Ok(PanelResponse {
        status: 401,
        body: String::new(),
    })
}
