use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::transport::{PanelRequest, PanelTransport};

const LOGIN_PATH: &str = "/login";

#[derive(Clone, Debug)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Default)]
struct SessionState {
    authenticated: bool,
    last_login: Option<Instant>,
}

/// Authentication state against the panel.
///
/// One instance is shared (via `Arc`) by every caller that talks to the panel.
/// The state lock is held across the login request, so concurrent callers that
/// find the session stale wait for a single re-login instead of racing.
pub struct SessionManager {
    transport: Arc<dyn PanelTransport>,
    credentials: Credentials,
    timeout: Duration,
    state: Mutex<SessionState>,
}

impl SessionManager {
    pub fn new(
        transport: Arc<dyn PanelTransport>,
        credentials: Credentials,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            credentials,
            timeout,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.lock().await.authenticated
    }

    /// Log in to the panel.
    ///
    /// Without `force`, a fresh authenticated session is reused with no I/O.
    /// Every failure (network, non-2xx, rejected credentials) is logged and
    /// reported as `false`.
    pub async fn login(&self, force: bool) -> bool {
        let mut st = self.state.lock().await;

        let fresh = st
            .last_login
            .map(|at| at.elapsed() < self.timeout)
            .unwrap_or(false);
        if st.authenticated && fresh && !force {
            return true;
        }

        let body = LoginRequest {
            username: &self.credentials.username,
            password: &self.credentials.password,
        };
        let req = match serde_json::to_value(&body) {
            Ok(v) => PanelRequest::post(LOGIN_PATH, Some(v)),
            Err(e) => {
                error!("failed to encode panel login request: {e}");
                st.authenticated = false;
                return false;
            }
        };

        debug!(force, "logging in to panel");
        match self.transport.send(&req).await {
            Ok(resp) if resp.is_success() && login_accepted(&resp.body) => {
                st.authenticated = true;
                st.last_login = Some(Instant::now());
                info!("logged in to panel");
                true
            }
            Ok(resp) if resp.is_success() => {
                st.authenticated = false;
                warn!("panel rejected login or answered with an unexpected body");
                false
            }
            Ok(resp) => {
                st.authenticated = false;
                error!(status = resp.status, "panel login failed");
                false
            }
            Err(e) => {
                st.authenticated = false;
                error!("panel login error: {e}");
                false
            }
        }
    }

    /// Returns immediately when already authenticated, else logs in lazily.
    pub async fn ensure_authenticated(&self) -> bool {
        if self.is_authenticated().await {
            return true;
        }
        self.login(false).await
    }

    /// Drop the local session (e.g. after the panel answered 401).
    pub async fn invalidate(&self) {
        let mut st = self.state.lock().await;
        st.authenticated = false;
    }
}

// Only `{"success": true}` counts. The panel answers 200 with
// `success:false` for bad credentials, and a proxy may answer 200 with HTML.
fn login_accepted(body: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("success").and_then(|s| s.as_bool()))
        .unwrap_or(false)
}
