//! Telegram Bot API transport.
//!
//! [`TelegramChannel`] sends messages; [`TelegramPoller`] long-polls
//! `getUpdates` and hands each message to a [`ChatDispatcher`], which keeps
//! each chat in order without letting one chat hold up the others.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::{sleep, Duration};

use crate::chat::{ChatChannel, ChatDispatcher, ChatRouter, InboundMessage, OutgoingMessage};
use crate::user::ChatId;

/// Telegram caps a message at 4096 UTF-16 code units.
const MAX_MESSAGE_LEN: usize = 4096;
const LONG_POLL_TIMEOUT_SECS: u64 = 30;

// ─── Telegram API types ──────────────────────────────────────────────────────

#[derive(Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct Update {
    update_id: i64,
    message: Option<TelegramMessage>,
}

#[derive(Deserialize)]
struct TelegramMessage {
    chat: TelegramChat,
    #[serde(default)]
    from: Option<TelegramUser>,
    text: Option<String>,
}

#[derive(Deserialize)]
struct TelegramChat {
    id: i64,
}

#[derive(Deserialize)]
struct TelegramUser {
    first_name: String,
}

impl TelegramMessage {
    fn into_inbound(self) -> Option<InboundMessage> {
        let text = self.text.filter(|t| !t.trim().is_empty())?;
        let name = self
            .from
            .map(|u| u.first_name)
            .unwrap_or_else(|| "friend".to_string());
        Some(InboundMessage::new(self.chat.id, name, &text))
    }
}

// ─── Outbound ────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct TelegramChannel {
    api_base: String,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(token: &str, client: reqwest::Client) -> Self {
        Self {
            api_base: format!("https://api.telegram.org/bot{}", token),
            client,
        }
    }
}

#[async_trait]
impl ChatChannel for TelegramChannel {
    async fn send_message(&self, chat_id: ChatId, message: OutgoingMessage) -> Result<()> {
        let url = format!("{}/sendMessage", self.api_base);
        let mut payload = serde_json::json!({
            "chat_id": chat_id,
            "text": truncate_message(&message.text),
        });
        if message.html {
            payload["parse_mode"] = serde_json::Value::from("HTML");
        }

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .context("Telegram sendMessage request failed")?;

        if !response.status().is_success() {
            bail!("Telegram sendMessage failed: HTTP {}", response.status());
        }
        tracing::debug!("Telegram: sent message to chat {}", chat_id);
        Ok(())
    }
}

fn truncate_message(text: &str) -> &str {
    let mut units = 0;
    for (byte_idx, ch) in text.char_indices() {
        units += ch.len_utf16();
        if units > MAX_MESSAGE_LEN {
            return &text[..byte_idx];
        }
    }
    text
}

// ─── Inbound ─────────────────────────────────────────────────────────────────

pub struct TelegramPoller {
    api_base: String,
    client: reqwest::Client,
    router: Arc<ChatRouter>,
}

impl TelegramPoller {
    pub fn new(token: &str, client: reqwest::Client, router: Arc<ChatRouter>) -> Self {
        Self {
            api_base: format!("https://api.telegram.org/bot{}", token),
            client,
            router,
        }
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        tracing::info!("Telegram long-polling started");
        let mut offset: i64 = 0;
        let mut dispatcher = ChatDispatcher::new(self.router.clone());

        loop {
            let updates = match self.poll_updates(offset).await {
                Some(u) => u,
                None => continue,
            };

            for update in updates {
                offset = update.update_id + 1;

                let Some(inbound) = update.message.and_then(TelegramMessage::into_inbound) else {
                    continue;
                };
                tracing::info!("Telegram [chat {}]: {:?}", inbound.chat_id, inbound.text);

                dispatcher.dispatch(inbound);
            }
        }
    }

    async fn poll_updates(&self, offset: i64) -> Option<Vec<Update>> {
        let url = format!("{}/getUpdates", self.api_base);
        let params = serde_json::json!({
            "offset": offset,
            "timeout": LONG_POLL_TIMEOUT_SECS,
            "allowed_updates": ["message"]
        });

        let resp = match self.client.post(&url).json(&params).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Telegram getUpdates error: {}", e);
                sleep(Duration::from_secs(5)).await;
                return None;
            }
        };

        let body: TelegramResponse<Vec<Update>> = match resp.json().await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!("Telegram getUpdates parse error: {}", e);
                sleep(Duration::from_secs(5)).await;
                return None;
            }
        };

        if !body.ok {
            tracing::warn!(
                "Telegram API returned ok=false: {}",
                body.description.as_deref().unwrap_or("no description")
            );
            sleep(Duration::from_secs(10)).await;
            return None;
        }

        Some(body.result.unwrap_or_default())
    }
}
