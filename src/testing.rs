//! Test doubles for the generation and chat seams.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::chat::{ChatChannel, OutgoingMessage};
use crate::llm_client::TextGenerator;
use crate::user::ChatId;

/// Replays canned completions in order and records every call.
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<Result<String>>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedGenerator {
    pub fn new(responses: Vec<std::result::Result<String, String>>) -> Self {
        Self::with_errors(
            responses
                .into_iter()
                .map(|r| r.map_err(|e| anyhow!(e)))
                .collect(),
        )
    }

    pub fn with_errors(responses: Vec<Result<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, response: std::result::Result<String, String>) {
        self.responses
            .lock()
            .unwrap()
            .push_back(response.map_err(|e| anyhow!(e)));
    }

    pub fn models_called(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(_, p)| p.clone()).collect()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((model.to_string(), prompt.to_string()));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("script exhausted")))
    }
}

/// Collects outbound messages; sends to chats in `failing` return an error.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<(ChatId, OutgoingMessage)>>,
    failing: Mutex<HashSet<ChatId>>,
}

impl RecordingChannel {
    pub fn fail_for(&self, chat_id: ChatId) {
        self.failing.lock().unwrap().insert(chat_id);
    }

    pub fn sent(&self) -> Vec<(ChatId, OutgoingMessage)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts_for(&self, chat_id: ChatId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(id, _)| *id == chat_id)
            .map(|(_, m)| m.text)
            .collect()
    }
}

#[async_trait]
impl ChatChannel for RecordingChannel {
    async fn send_message(&self, chat_id: ChatId, message: OutgoingMessage) -> Result<()> {
        if self.failing.lock().unwrap().contains(&chat_id) {
            return Err(anyhow!("chat {} is unreachable", chat_id));
        }
        self.sent.lock().unwrap().push((chat_id, message));
        Ok(())
    }
}
