//! Transport-neutral chat adapter.
//!
//! [`ChatRouter`] turns inbound messages and commands into coach calls and
//! relays replies through a [`ChatChannel`]. [`ChatDispatcher`] gives every
//! chat its own worker so one chat's messages are handled in arrival order
//! while different chats run concurrently. The Telegram transport lives in
//! `crate::telegram`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::coach::{Coach, CoachReply, Turn};
use crate::user::ChatId;

const GREETING: &str = "👋 I am ResolveAI. <b>What is your Resolution?</b>";
const GOAL_SAVED: &str = "✅ <b>Goal Locked.</b> Let's build a plan to achieve this.";
const NEEDS_START: &str = "Type /start first!";
const STORAGE_APOLOGY: &str = "Something went wrong while saving your progress. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    /// Send with HTML parse mode.
    pub html: bool,
}

impl OutgoingMessage {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            html: false,
        }
    }

    pub fn html(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            html: true,
        }
    }
}

/// Outbound half of a chat protocol.
#[async_trait]
pub trait ChatChannel: Send + Sync {
    async fn send_message(&self, chat_id: ChatId, message: OutgoingMessage) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub chat_id: ChatId,
    pub display_name: String,
    pub text: String,
    /// Command name without the slash or `@botname` suffix.
    pub command: Option<String>,
}

impl InboundMessage {
    pub fn new(chat_id: ChatId, display_name: impl Into<String>, raw_text: &str) -> Self {
        let text = raw_text.trim().to_string();
        let command = text.strip_prefix('/').and_then(|rest| {
            let word = rest.split_whitespace().next()?;
            let name = word.split('@').next().unwrap_or(word);
            (!name.is_empty()).then(|| name.to_ascii_lowercase())
        });

        Self {
            chat_id,
            display_name: display_name.into(),
            text,
            command,
        }
    }
}

pub struct ChatRouter {
    coach: Arc<Coach>,
    channel: Arc<dyn ChatChannel>,
    allowed_chat_ids: Vec<ChatId>,
    awaiting_goal: Mutex<HashSet<ChatId>>,
}

impl ChatRouter {
    pub fn new(coach: Arc<Coach>, channel: Arc<dyn ChatChannel>, allowed_chat_ids: Vec<ChatId>) -> Self {
        Self {
            coach,
            channel,
            allowed_chat_ids,
            awaiting_goal: Mutex::new(HashSet::new()),
        }
    }

    pub async fn handle(&self, message: &InboundMessage) -> Result<()> {
        let chat_id = message.chat_id;

        if !self.allowed_chat_ids.is_empty() && !self.allowed_chat_ids.contains(&chat_id) {
            tracing::debug!("Ignoring message from unauthorized chat {}", chat_id);
            return Ok(());
        }

        match message.command.as_deref() {
            Some("start") => {
                self.awaiting_goal.lock().await.insert(chat_id);
                self.send(chat_id, OutgoingMessage::html(GREETING)).await
            }
            Some(other) => {
                tracing::debug!("Ignoring unknown command /{} from chat {}", other, chat_id);
                Ok(())
            }
            None if message.text.is_empty() => Ok(()),
            None => {
                let setting_goal = self.awaiting_goal.lock().await.remove(&chat_id);
                if setting_goal {
                    self.save_goal(message).await
                } else {
                    self.chat(message).await
                }
            }
        }
    }

    async fn save_goal(&self, message: &InboundMessage) -> Result<()> {
        let chat_id = message.chat_id;
        match self
            .coach
            .set_goal(chat_id, &message.display_name, &message.text)
            .await
        {
            Ok(opening) => {
                self.send(chat_id, OutgoingMessage::html(GOAL_SAVED)).await?;
                self.send(chat_id, OutgoingMessage::plain(opening)).await
            }
            Err(e) => {
                tracing::error!("Goal-setting failed for chat {}: {:#}", chat_id, e);
                self.send(chat_id, OutgoingMessage::plain(STORAGE_APOLOGY)).await
            }
        }
    }

    async fn chat(&self, message: &InboundMessage) -> Result<()> {
        let chat_id = message.chat_id;
        let reply = match self.coach.invoke(chat_id, Turn::User(&message.text)).await {
            Ok(CoachReply::Message(text)) => text,
            Ok(CoachReply::NeedsOnboarding) => NEEDS_START.to_string(),
            Err(e) => {
                tracing::error!("Coach failed for chat {}: {:#}", chat_id, e);
                STORAGE_APOLOGY.to_string()
            }
        };
        self.send(chat_id, OutgoingMessage::plain(reply)).await
    }

    async fn send(&self, chat_id: ChatId, message: OutgoingMessage) -> Result<()> {
        self.channel.send_message(chat_id, message).await
    }
}

/// Per-chat FIFO workers in front of a [`ChatRouter`].
pub struct ChatDispatcher {
    router: Arc<ChatRouter>,
    workers: HashMap<ChatId, mpsc::UnboundedSender<InboundMessage>>,
    handles: Vec<JoinHandle<()>>,
}

impl ChatDispatcher {
    pub fn new(router: Arc<ChatRouter>) -> Self {
        Self {
            router,
            workers: HashMap::new(),
            handles: Vec::new(),
        }
    }

    /// Queue a message behind earlier messages from the same chat.
    pub fn dispatch(&mut self, message: InboundMessage) {
        let chat_id = message.chat_id;
        let message = match self.workers.get(&chat_id) {
            Some(queue) => match queue.send(message) {
                Ok(()) => return,
                Err(mpsc::error::SendError(message)) => {
                    tracing::warn!("Worker for chat {} is gone; restarting it", chat_id);
                    message
                }
            },
            None => message,
        };

        let (queue, inbox) = mpsc::unbounded_channel();
        // The receiver is alive until the worker starts, so this cannot fail.
        let _ = queue.send(message);
        self.workers.insert(chat_id, queue);
        self.handles
            .push(tokio::spawn(drain(self.router.clone(), chat_id, inbox)));
    }

    /// Stop accepting messages and wait for every queued one to be handled.
    pub async fn close(self) {
        drop(self.workers);
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::warn!("Chat worker ended abnormally: {}", e);
            }
        }
    }
}

async fn drain(
    router: Arc<ChatRouter>,
    chat_id: ChatId,
    mut inbox: mpsc::UnboundedReceiver<InboundMessage>,
) {
    while let Some(message) = inbox.recv().await {
        if let Err(e) = router.handle(&message).await {
            tracing::error!("Reply to chat {} failed: {:#}", chat_id, e);
        }
    }
    tracing::debug!("Worker for chat {} stopped", chat_id);
}
