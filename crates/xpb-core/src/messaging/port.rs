use async_trait::async_trait;

use crate::{domain::ChatId, Result};

/// Outbound messaging port.
///
/// An `Ok` return means the messenger accepted the message; callers treat
/// anything else as "not delivered".
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()>;

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<()>;
}
