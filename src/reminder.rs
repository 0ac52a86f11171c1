//! Fixed-interval reminder scan.
//!
//! Each tick compares the wall-clock minute with every active user's
//! reminder time and sends a proactive nudge on a match. Missed ticks are
//! skipped, never replayed, and there is no per-minute dedup: two ticks inside
//! the same minute deliver twice.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::chat::{ChatChannel, OutgoingMessage};
use crate::coach::{Coach, CoachReply, Turn};
use crate::user::{ChatId, ReminderTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub now: ReminderTime,
    pub due: usize,
    pub delivered: usize,
    pub failed: usize,
}

pub struct ReminderLoop {
    coach: Arc<Coach>,
    channel: Arc<dyn ChatChannel>,
    period: Duration,
}

impl ReminderLoop {
    pub fn new(coach: Arc<Coach>, channel: Arc<dyn ChatChannel>, period: Duration) -> Self {
        Self {
            coach,
            channel,
            period,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        tracing::info!("Reminder loop running every {:?}", self.period);
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            let now = ReminderTime::from_clock(&chrono::Local::now());
            self.tick_at(now).await;
        }
    }

    pub async fn tick_at(&self, now: ReminderTime) -> TickReport {
        let due: Vec<_> = self
            .coach
            .store()
            .snapshot()
            .await
            .into_iter()
            .filter(|(_, record)| record.is_due_at(now))
            .collect();

        let mut report = TickReport {
            now,
            due: due.len(),
            delivered: 0,
            failed: 0,
        };
        tracing::debug!("⏰ Tick {}: {} reminder(s) due", now, report.due);

        for (chat_id, record) in due {
            tracing::info!("Waking up {} (chat {}, scheduled {})", record.name, chat_id, now);
            match self.remind(chat_id).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!("Reminder for chat {} failed: {:#}", chat_id, e);
                    report.failed += 1;
                }
            }
        }

        report
    }

    async fn remind(&self, chat_id: ChatId) -> Result<()> {
        match self.coach.invoke(chat_id, Turn::Proactive).await? {
            CoachReply::Message(text) => {
                self.channel
                    .send_message(chat_id, OutgoingMessage::plain(format!("⚡ {}", text)))
                    .await
            }
            CoachReply::NeedsOnboarding => Err(anyhow!("no record for chat {}", chat_id)),
        }
    }
}
