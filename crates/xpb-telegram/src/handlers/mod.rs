//! Telegram update handlers.
//!
//! Only text commands are handled; everything else gets a short hint.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};
use tracing::warn;

use xpb_core::domain::{ChatId, UserProfile};

use crate::router::AppState;

mod commands;
mod render;

const HINT: &str = "برای مشاهده دستورات /start را بزنید.";

/// Send through the shared messenger; failures are logged, never returned.
pub(crate) async fn reply(state: &AppState, chat_id: i64, html: &str) {
    if let Err(e) = state.messenger.send_html(ChatId(chat_id), html).await {
        warn!(chat_id, "reply failed: {e}");
    }
}

pub async fn handle_message(_bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let chat_id = msg.chat.id.0;
    let (Some(user), Some(text)) = (msg.from(), msg.text()) else {
        reply(&state, chat_id, HINT).await;
        return Ok(());
    };

    let profile = UserProfile {
        user_id: user.id.0 as i64,
        username: user.username.clone(),
        first_name: Some(user.first_name.clone()),
        last_name: user.last_name.clone(),
    };
    commands::dispatch(&state, &profile, chat_id, text).await;
    Ok(())
}
