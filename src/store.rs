//! JSON-document user store.
//!
//! The whole document lives in memory behind one async mutex and is rewritten
//! on every upsert while that mutex is held, so concurrent handlers never
//! clobber each other's records.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::sync::Mutex;

use crate::user::{ChatId, Stage, UserRecord};

/// Fields to overlay onto a stored record. `None` keeps the previous value.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub resolution: Option<String>,
    pub stage: Option<Stage>,
}

impl UserUpdate {
    pub fn profile(name: impl Into<String>, resolution: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            resolution: Some(resolution.into()),
            stage: None,
        }
    }

    pub fn stage(stage: Stage) -> Self {
        Self {
            stage: Some(stage),
            ..Self::default()
        }
    }

    fn apply(self, current: Option<&UserRecord>) -> UserRecord {
        let previous = current.cloned().unwrap_or_else(|| UserRecord::new("", ""));
        UserRecord {
            name: self.name.unwrap_or(previous.name),
            resolution: self.resolution.unwrap_or(previous.resolution),
            stage: self.stage.unwrap_or(previous.stage),
        }
    }
}

pub struct UserStore {
    path: PathBuf,
    users: Mutex<BTreeMap<String, UserRecord>>,
}

impl UserStore {
    /// Load the document at `path`, or start empty when it does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let users = match std::fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse user store {:?}", path))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read user store {:?}", path))
            }
        };

        tracing::info!("Loaded {} user record(s) from {:?}", users.len(), path);
        Ok(Self {
            path,
            users: Mutex::new(users),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self, chat_id: ChatId) -> Option<UserRecord> {
        self.users.lock().await.get(&chat_id.to_string()).cloned()
    }

    /// Point-in-time copy of every record whose key is a valid chat id.
    pub async fn snapshot(&self) -> Vec<(ChatId, UserRecord)> {
        let users = self.users.lock().await;
        users
            .iter()
            .filter_map(|(key, record)| match key.parse::<ChatId>() {
                Ok(chat_id) => Some((chat_id, record.clone())),
                Err(_) => {
                    tracing::warn!("Skipping user store key {:?}: not a chat id", key);
                    None
                }
            })
            .collect()
    }

    /// Merge `update` onto the current record and rewrite the document.
    /// The in-memory copy is rolled back if the write fails.
    pub async fn upsert(&self, chat_id: ChatId, update: UserUpdate) -> Result<UserRecord> {
        let key = chat_id.to_string();
        let mut users = self.users.lock().await;

        let merged = update.apply(users.get(&key));
        let previous = users.insert(key.clone(), merged.clone());

        if let Err(e) = self.persist(&users).await {
            match previous {
                Some(previous) => users.insert(key, previous),
                None => users.remove(&key),
            };
            return Err(e);
        }

        tracing::info!(
            "Saved {} (chat {}): phase={}, time={}",
            merged.name,
            chat_id,
            merged.stage.phase().as_str(),
            merged
                .stage
                .reminder_time()
                .map(|t| t.to_string())
                .unwrap_or_else(|| "-".to_string())
        );
        Ok(merged)
    }

    async fn persist(&self, users: &BTreeMap<String, UserRecord>) -> Result<()> {
        let body = serde_json::to_vec_pretty(users).context("Failed to serialize user store")?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create store directory {:?}", parent))?;
        }

        let tmp_path = self
            .path
            .with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp_path, body)
            .await
            .with_context(|| format!("Failed to write {:?}", tmp_path))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("Failed to replace user store {:?}", self.path))?;
        Ok(())
    }
}
