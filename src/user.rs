//! User records and the intake → active stage machine.
//!
//! On disk a record keeps the flat `name, resolution, plan, phase,
//! reminder_time` layout. In memory the last three collapse into [`Stage`],
//! so an active record without a reminder time cannot be constructed.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use chrono::Timelike;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub type ChatId = i64;

const PLAN_LOCKED: &str = "Locked";

/// A daily reminder time, always rendered as zero-padded 24-hour `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReminderTime {
    hour: u8,
    minute: u8,
}

impl ReminderTime {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self {
                hour: hour as u8,
                minute: minute as u8,
            })
        } else {
            None
        }
    }

    /// Truncate a wall-clock time to minute resolution.
    pub fn from_clock<T: Timelike>(time: &T) -> Self {
        Self {
            hour: time.hour() as u8,
            minute: time.minute() as u8,
        }
    }

    pub fn hour(&self) -> u32 {
        self.hour as u32
    }

    pub fn minute(&self) -> u32 {
        self.minute as u32
    }
}

impl fmt::Display for ReminderTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for ReminderTime {
    type Err = anyhow::Error;

    /// Accepts `H:MM` or `HH:MM`.
    fn from_str(raw: &str) -> Result<Self> {
        let (hour, minute) = raw
            .trim()
            .split_once(':')
            .ok_or_else(|| anyhow!("reminder time '{}' has no ':' separator", raw))?;

        let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        if !digits(hour) || hour.len() > 2 || !digits(minute) || minute.len() != 2 {
            return Err(anyhow!("reminder time '{}' is not H:MM or HH:MM", raw));
        }

        let hour: u32 = hour.parse()?;
        let minute: u32 = minute.parse()?;
        Self::new(hour, minute).ok_or_else(|| anyhow!("reminder time '{}' is out of range", raw))
    }
}

impl Serialize for ReminderTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ReminderTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Intake,
    Active,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Intake => "intake",
            Phase::Active => "active",
        }
    }
}

/// Where a user is in the coaching flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Interview in progress; no reminder yet.
    Intake,
    /// Plan locked; reminders fire daily at `reminder_time`.
    Active { reminder_time: ReminderTime },
}

impl Stage {
    pub fn phase(&self) -> Phase {
        match self {
            Stage::Intake => Phase::Intake,
            Stage::Active { .. } => Phase::Active,
        }
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, Stage::Active { .. })
    }

    pub fn reminder_time(&self) -> Option<ReminderTime> {
        match self {
            Stage::Intake => None,
            Stage::Active { reminder_time } => Some(*reminder_time),
        }
    }

    /// Stage after a reply that may have locked a time. Intake moves to
    /// active; an active user whose time changed stays active at the new
    /// time. Anything else leaves the stage untouched (`None`), so the phase
    /// never regresses.
    pub fn after_reply(&self, locked: Option<ReminderTime>) -> Option<Stage> {
        match (self, locked) {
            (_, None) => None,
            (Stage::Active { reminder_time }, Some(time)) if *reminder_time == time => None,
            (_, Some(reminder_time)) => Some(Stage::Active { reminder_time }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredUser", into = "StoredUser")]
pub struct UserRecord {
    pub name: String,
    pub resolution: String,
    pub stage: Stage,
}

impl UserRecord {
    pub fn new(name: impl Into<String>, resolution: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resolution: resolution.into(),
            stage: Stage::Intake,
        }
    }

    pub fn is_due_at(&self, now: ReminderTime) -> bool {
        self.stage.reminder_time() == Some(now)
    }
}

#[derive(Serialize, Deserialize)]
struct StoredUser {
    #[serde(default)]
    name: String,
    #[serde(default)]
    resolution: String,
    #[serde(default)]
    plan: Option<String>,
    #[serde(default)]
    phase: Option<String>,
    #[serde(default)]
    reminder_time: Option<String>,
}

impl From<StoredUser> for UserRecord {
    fn from(stored: StoredUser) -> Self {
        let stage = match stored.phase.as_deref() {
            Some("active") => match stored.reminder_time.as_deref().map(str::parse::<ReminderTime>) {
                Some(Ok(reminder_time)) => Stage::Active { reminder_time },
                other => {
                    tracing::warn!(
                        "Active record for '{}' has unusable reminder_time ({:?}); treating as intake",
                        stored.name,
                        other.map(|r| r.map_err(|e| e.to_string()))
                    );
                    Stage::Intake
                }
            },
            _ => Stage::Intake,
        };

        Self {
            name: stored.name,
            resolution: stored.resolution,
            stage,
        }
    }
}

impl From<UserRecord> for StoredUser {
    fn from(record: UserRecord) -> Self {
        Self {
            name: record.name,
            resolution: record.resolution,
            plan: record.stage.is_locked().then(|| PLAN_LOCKED.to_string()),
            phase: Some(record.stage.phase().as_str().to_string()),
            reminder_time: record.stage.reminder_time().map(|t| t.to_string()),
        }
    }
}
