use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};

use crate::{errors::Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

/// A single panel call, relative to the panel base URL.
#[derive(Clone, Debug, PartialEq)]
pub struct PanelRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
}

impl PanelRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Option<serde_json::Value>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body,
        }
    }
}

/// Raw HTTP outcome; envelope parsing happens in the client.
#[derive(Clone, Debug, PartialEq)]
pub struct PanelResponse {
    pub status: u16,
    pub body: String,
}

impl PanelResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }
}

/// Transport port for the panel.
///
/// Implementations must keep the panel session cookie between calls: `login`
/// and every later request go through the same transport instance.
#[async_trait]
pub trait PanelTransport: Send + Sync {
    async fn send(&self, req: &PanelRequest) -> Result<PanelResponse>;
}

/// reqwest-backed transport with a cookie store and a uniform timeout.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    base_url: String,
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .default_headers(headers)
            .user_agent("xpb/0.1")
            .build()
            .map_err(|e| Error::Transport(format!("http client build failed: {e}")))?;

        let base_url = base_url.into();
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl PanelTransport for HttpTransport {
    async fn send(&self, req: &PanelRequest) -> Result<PanelResponse> {
        let url = self.url(&req.path);
        let mut builder = match req.method {
            Method::Get => self.http.get(&url),
            Method::Post => self.http.post(&url),
        };
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| Error::Transport(format!("{} {}: {e}", req.method, req.path)))?;

        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::Transport(format!("{} {}: {e}", req.method, req.path)))?;

        Ok(PanelResponse { status, body })
    }
}
