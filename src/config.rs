use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::user::ChatId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoachConfig {
    // Telegram
    #[serde(default)]
    pub telegram_bot_token: Option<String>,
    #[serde(default)]
    pub allowed_chat_ids: Vec<ChatId>,

    // LLM configuration (any OpenAI-compatible endpoint)
    #[serde(default = "default_llm_url")]
    pub llm_api_url: String,
    #[serde(default)]
    pub llm_api_key: Option<String>,
    #[serde(default = "default_primary_model")]
    pub primary_model: String,
    #[serde(default = "default_fallback_model")]
    pub fallback_model: String,
    #[serde(default = "default_probe_models")]
    pub probe_models: Vec<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    // Storage and scheduling
    #[serde(default = "default_store_path")]
    pub store_path: String,
    #[serde(default = "default_reminder_interval_secs")]
    pub reminder_interval_secs: u64,

    // Health endpoint
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_llm_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta/openai".to_string()
}

fn default_primary_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_fallback_model() -> String {
    "gemini-2.5-pro".to_string()
}

fn default_probe_models() -> Vec<String> {
    [
        "gemini-2.5-flash",
        "gemini-2.5-flash-lite",
        "gemini-2.5-pro",
        "gemini-2.0-flash",
        "gemini-1.5-flash",
    ]
    .iter()
    .map(|m| m.to_string())
    .collect()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_store_path() -> String {
    "user_db.json".to_string()
}

fn default_reminder_interval_secs() -> u64 {
    60
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

impl Default for CoachConfig {
    fn default() -> Self {
        Self {
            telegram_bot_token: None,
            allowed_chat_ids: Vec::new(),
            llm_api_url: default_llm_url(),
            llm_api_key: None,
            primary_model: default_primary_model(),
            fallback_model: default_fallback_model(),
            probe_models: default_probe_models(),
            request_timeout_secs: default_request_timeout_secs(),
            store_path: default_store_path(),
            reminder_interval_secs: default_reminder_interval_secs(),
            bind_addr: default_bind_addr(),
        }
    }
}

impl CoachConfig {
    /// Get the directory containing the executable
    fn get_base_dir() -> PathBuf {
        match std::env::current_exe() {
            Ok(exe_path) => exe_path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".")),
            Err(_) => PathBuf::from("."),
        }
    }

    /// `HABIT_COACH_CONFIG`, or `habit_coach.toml` next to the executable.
    pub fn config_path() -> PathBuf {
        match env::var("HABIT_COACH_CONFIG") {
            Ok(path) if !path.trim().is_empty() => PathBuf::from(path.trim()),
            _ => Self::get_base_dir().join("habit_coach.toml"),
        }
    }

    /// Load the config file if present, then apply environment overrides.
    pub fn load() -> Self {
        let path = Self::config_path();

        let base = match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_toml(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {:?}", path);
                    config
                }
                Err(e) => {
                    tracing::error!("Failed to parse {:?}: {:#}", path, e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::warn!("No config file at {:?}, using defaults + env vars", path);
                Self::default()
            }
        };

        base.with_env_overrides(|key| env::var(key).ok())
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse config TOML")
    }

    /// Apply overrides from `lookup` (the process environment in production).
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(token) = non_empty("TELEGRAM_TOKEN").or_else(|| non_empty("TELEGRAM_BOT_TOKEN")) {
            self.telegram_bot_token = Some(token);
        }

        if let Some(ids) = non_empty("TELEGRAM_CHAT_ID") {
            self.allowed_chat_ids = ids
                .split(',')
                .filter_map(|id| id.trim().parse().ok())
                .collect();
        }

        if let Some(url) = non_empty("LLM_API_URL") {
            self.llm_api_url = url;
        }

        if let Some(key) = non_empty("LLM_API_KEY").or_else(|| non_empty("GEMINI_API_KEY")) {
            self.llm_api_key = Some(key);
        }

        if let Some(model) = non_empty("LLM_PRIMARY_MODEL") {
            self.primary_model = model;
        }

        if let Some(model) = non_empty("LLM_FALLBACK_MODEL") {
            self.fallback_model = model;
        }

        if let Some(secs) = non_empty("LLM_REQUEST_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.request_timeout_secs = secs;
        }

        if let Some(path) = non_empty("HABIT_COACH_STORE") {
            self.store_path = path;
        }

        if let Some(secs) = non_empty("HABIT_COACH_TICK_SECS").and_then(|v| v.parse().ok()) {
            self.reminder_interval_secs = secs;
        }

        if let Some(addr) = non_empty("HABIT_COACH_BIND") {
            self.bind_addr = addr;
        }

        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.reminder_interval_secs == 0 {
            bail!("reminder_interval_secs must be at least 1");
        }
        if self.generation_models().is_empty() {
            bail!("at least one of primary_model / fallback_model must be set");
        }
        Ok(())
    }

    /// Models in attempt order, skipping blanks and a repeated fallback.
    pub fn generation_models(&self) -> Vec<String> {
        let mut models: Vec<String> = Vec::new();
        for model in [&self.primary_model, &self.fallback_model] {
            let model = model.trim();
            if !model.is_empty() && !models.iter().any(|m| m == model) {
                models.push(model.to_string());
            }
        }
        models
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn reminder_interval(&self) -> Duration {
        Duration::from_secs(self.reminder_interval_secs)
    }
}
