use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::task::JoinHandle;

use crate::chat::{ChatChannel, ChatRouter};
use crate::coach::Coach;
use crate::config::CoachConfig;
use crate::generation::GenerationClient;
use crate::http_client::build_http_client;
use crate::llm_client::LlmClient;
use crate::reminder::ReminderLoop;
use crate::store::UserStore;
use crate::telegram::{TelegramChannel, TelegramPoller};

/// Long polling holds requests open for 30 s, so Telegram gets at least this.
const TELEGRAM_MIN_TIMEOUT: Duration = Duration::from_secs(60);

pub struct CoachRuntime {
    pub config: CoachConfig,
    pub coach: Arc<Coach>,
    telegram_token: String,
    telegram_client: reqwest::Client,
}

impl CoachRuntime {
    pub fn bootstrap(config: CoachConfig) -> Result<Self> {
        config.validate()?;

        let telegram_token = config
            .telegram_bot_token
            .clone()
            .ok_or_else(|| anyhow!("TELEGRAM_TOKEN is required to run the bot"))?;

        let store = Arc::new(
            UserStore::open(&config.store_path)
                .with_context(|| format!("Failed to open user store {}", config.store_path))?,
        );

        let llm_client = LlmClient::new(
            config.llm_api_url.clone(),
            config.llm_api_key.clone(),
            build_http_client(config.request_timeout())?,
        );
        let models = config.generation_models();
        tracing::info!(
            "Generation via {} with models {:?}",
            llm_client.api_url(),
            models
        );
        let generation = GenerationClient::new(Arc::new(llm_client), models);

        let telegram_client = build_http_client(config.request_timeout().max(TELEGRAM_MIN_TIMEOUT))?;

        Ok(Self {
            coach: Arc::new(Coach::new(store, generation)),
            config,
            telegram_token,
            telegram_client,
        })
    }

    /// Start the Telegram poller and the reminder loop. Both share state only
    /// through the user store.
    pub fn spawn_background(&self) -> Vec<JoinHandle<()>> {
        let channel: Arc<dyn ChatChannel> = Arc::new(TelegramChannel::new(
            &self.telegram_token,
            self.telegram_client.clone(),
        ));

        let router = Arc::new(ChatRouter::new(
            self.coach.clone(),
            channel.clone(),
            self.config.allowed_chat_ids.clone(),
        ));
        if !self.config.allowed_chat_ids.is_empty() {
            tracing::info!("Telegram restricted to chats {:?}", self.config.allowed_chat_ids);
        }

        let poller = TelegramPoller::new(&self.telegram_token, self.telegram_client.clone(), router);
        let reminders = ReminderLoop::new(
            self.coach.clone(),
            channel,
            self.config.reminder_interval(),
        );

        vec![poller.spawn(), reminders.spawn()]
    }
}
