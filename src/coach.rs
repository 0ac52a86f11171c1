//! Conversation orchestrator: load user, compose, generate, parse, persist.
//!
//! The stored record is always the source of truth for the user's stage.
//! Callers only say whether a turn is user-driven or proactive.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use crate::generation::GenerationClient;
use crate::prompt::{compose, PromptMode, GOAL_SET_INPUT};
use crate::reply;
use crate::store::{UserStore, UserUpdate};
use crate::user::ChatId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Turn<'a> {
    /// Inbound text from the user.
    User(&'a str),
    /// Timer-driven nudge.
    Proactive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoachReply {
    Message(String),
    /// No record for this chat; the user has to set a goal first.
    NeedsOnboarding,
}

pub struct Coach {
    store: Arc<UserStore>,
    generation: GenerationClient,
}

impl Coach {
    pub fn new(store: Arc<UserStore>, generation: GenerationClient) -> Self {
        Self { store, generation }
    }

    pub fn store(&self) -> &Arc<UserStore> {
        &self.store
    }

    /// Record the user's resolution and return the interview's opening
    /// question. An existing record keeps its stage.
    pub async fn set_goal(&self, chat_id: ChatId, name: &str, resolution: &str) -> Result<String> {
        self.store
            .upsert(chat_id, UserUpdate::profile(name, resolution))
            .await
            .with_context(|| format!("Failed to save goal for chat {}", chat_id))?;

        match self.invoke(chat_id, Turn::User(GOAL_SET_INPUT)).await? {
            CoachReply::Message(text) => Ok(text),
            CoachReply::NeedsOnboarding => Err(anyhow!(
                "record for chat {} missing right after goal-setting",
                chat_id
            )),
        }
    }

    pub async fn invoke(&self, chat_id: ChatId, turn: Turn<'_>) -> Result<CoachReply> {
        let Some(record) = self.store.get(chat_id).await else {
            return Ok(CoachReply::NeedsOnboarding);
        };

        let (mode, input) = match turn {
            Turn::Proactive => (PromptMode::Proactive, ""),
            Turn::User(text) => (PromptMode::for_stage(&record.stage), text),
        };
        tracing::debug!("Coaching chat {} in {:?} mode", chat_id, mode);

        let prompt = compose(&record, input, mode);
        let raw = self.generation.generate(&prompt).await;

        // Nudges never touch the schedule.
        if mode == PromptMode::Proactive {
            return Ok(CoachReply::Message(reply::scrub(&raw)));
        }

        let parsed = reply::parse(&raw);
        if let Some(next) = record.stage.after_reply(parsed.locked_time) {
            self.store
                .upsert(chat_id, UserUpdate::stage(next))
                .await
                .with_context(|| format!("Failed to lock plan for chat {}", chat_id))?;
            let verb = if record.stage.is_locked() { "moved" } else { "locked" };
            tracing::info!(
                "Plan {} for {} (chat {}) at {}",
                verb,
                record.name,
                chat_id,
                next.reminder_time().map(|t| t.to_string()).unwrap_or_default()
            );
        }

        Ok(CoachReply::Message(parsed.text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedGenerator;
    use crate::user::{ReminderTime, Stage};

    struct Fixture {
        _dir: tempfile::TempDir,
        generator: Arc<ScriptedGenerator>,
        coach: Coach,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(UserStore::open(dir.path().join("user_db.json")).unwrap());
        let generator = Arc::new(ScriptedGenerator::new(Vec::new()));
        let generation = GenerationClient::new(generator.clone(), vec!["fast".to_string()]);
        Fixture {
            _dir: dir,
            generator,
            coach: Coach::new(store, generation),
        }
    }

    fn message(reply: CoachReply) -> String {
        match reply {
            CoachReply::Message(text) => text,
            CoachReply::NeedsOnboarding => panic!("expected a message"),
        }
    }

    #[tokio::test]
    async fn sam_locks_a_nine_pm_reading_plan() {
        let f = fixture();
        f.generator.push(Ok("What time of day will you read?".to_string()));
        f.generator.push(Ok("Does 21:00 every night work?".to_string()));
        f.generator.push(Ok(
            "PLAN_LOCKED: Great, 20 pages every night at 9pm. ALARM: 21:00".to_string(),
        ));

        let opening = f.coach.set_goal(1, "Sam", "Read 20 pages daily").await.unwrap();
        assert_eq!(opening, "What time of day will you read?");
        let record = f.coach.store().get(1).await.unwrap();
        assert_eq!(record.stage, Stage::Intake);
        assert!(f.generator.prompts()[0].contains(GOAL_SET_INPUT));

        message(f.coach.invoke(1, Turn::User("9pm")).await.unwrap());
        let confirmation = message(f.coach.invoke(1, Turn::User("Yes")).await.unwrap());

        assert!(confirmation.contains("21:00"));
        assert!(!confirmation.contains("ALARM"));
        assert!(!confirmation.contains("PLAN_LOCKED"));

        let record = f.coach.store().get(1).await.unwrap();
        assert_eq!(record.name, "Sam");
        assert_eq!(record.resolution, "Read 20 pages daily");
        assert_eq!(
            record.stage,
            Stage::Active {
                reminder_time: ReminderTime::new(21, 0).unwrap()
            }
        );
        let stored = serde_json::to_value(&record).unwrap();
        assert_eq!(stored["plan"], "Locked");
    }

    #[tokio::test]
    async fn active_users_get_advice_and_never_return_to_intake() {
        let f = fixture();
        f.generator.push(Ok("When?".to_string()));
        f.generator.push(Ok("Locked. ALARM: 7:15".to_string()));
        f.generator.push(Ok("Lay out **your shoes** tonight.".to_string()));

        f.coach.set_goal(2, "Ana", "Run 5k").await.unwrap();
        f.coach.invoke(2, Turn::User("7:15 yes")).await.unwrap();

        let advice = message(f.coach.invoke(2, Turn::User("any tips?")).await.unwrap());
        assert_eq!(advice, "Lay out your shoes tonight.");
        assert!(f.generator.prompts()[2].contains("at most two sentences"));

        let record = f.coach.store().get(2).await.unwrap();
        assert_eq!(record.stage.reminder_time(), ReminderTime::new(7, 15));
    }

    #[tokio::test]
    async fn active_user_can_move_the_reminder() {
        let f = fixture();
        f.generator.push(Ok("When?".to_string()));
        f.generator.push(Ok("Locked. ALARM: 7:15".to_string()));
        f.generator.push(Ok("Sure, moved to 6am. ALARM: 06:00".to_string()));

        f.coach.set_goal(6, "Ana", "Run 5k").await.unwrap();
        f.coach.invoke(6, Turn::User("7:15 yes")).await.unwrap();

        let reply = message(f.coach.invoke(6, Turn::User("make it 6am")).await.unwrap());
        assert!(!reply.contains("ALARM"));
        assert!(reply.starts_with("Sure, moved to 6am."));
        assert!(reply.contains("06:00"));

        let record = f.coach.store().get(6).await.unwrap();
        assert_eq!(
            record.stage,
            Stage::Active {
                reminder_time: ReminderTime::new(6, 0).unwrap()
            }
        );
        assert_eq!(record.resolution, "Run 5k");
    }

    #[tokio::test]
    async fn set_goal_again_keeps_an_active_stage() {
        let f = fixture();
        f.generator.push(Ok("When?".to_string()));
        f.generator.push(Ok("ALARM: 06:00".to_string()));
        f.generator.push(Ok("Stretch for ten minutes first.".to_string()));

        f.coach.set_goal(9, "Lee", "Run").await.unwrap();
        f.coach.invoke(9, Turn::User("6am, yes")).await.unwrap();
        f.coach.set_goal(9, "Lee", "Run further").await.unwrap();

        let record = f.coach.store().get(9).await.unwrap();
        assert_eq!(record.resolution, "Run further");
        assert!(record.stage.is_locked());
        assert!(f.generator.prompts()[2].contains("at most two sentences"));
    }

    #[tokio::test]
    async fn unknown_chat_needs_onboarding_without_generating() {
        let f = fixture();
        let reply = f.coach.invoke(404, Turn::User("hello")).await.unwrap();
        assert_eq!(reply, CoachReply::NeedsOnboarding);
        assert!(f.generator.prompts().is_empty());
    }

    #[tokio::test]
    async fn malformed_marker_writes_nothing() {
        let f = fixture();
        f.generator.push(Ok("When?".to_string()));
        f.coach.set_goal(3, "Kim", "Meditate").await.unwrap();
        let path = f.coach.store().path().to_path_buf();
        let before = std::fs::read_to_string(&path).unwrap();

        f.generator.push(Ok("I'll set an **ALARM: soon**".to_string()));
        let text = message(f.coach.invoke(3, Turn::User("whenever")).await.unwrap());

        assert_eq!(text, "I'll set an ALARM: soon");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
        assert_eq!(f.coach.store().get(3).await.unwrap().stage, Stage::Intake);
    }

    #[tokio::test]
    async fn proactive_turn_never_locks_and_ignores_input() {
        let f = fixture();
        f.generator.push(Ok("When?".to_string()));
        f.coach.set_goal(4, "Jo", "Write daily").await.unwrap();

        f.generator.push(Ok("Open the doc and write **now**. ALARM: 08:00".to_string()));
        let text = message(f.coach.invoke(4, Turn::Proactive).await.unwrap());

        assert_eq!(text, "Open the doc and write now.");
        assert!(f.generator.prompts()[1].contains("No questions"));
        assert_eq!(f.coach.store().get(4).await.unwrap().stage, Stage::Intake);
    }

    #[tokio::test]
    async fn generation_failure_is_shown_and_keeps_intake() {
        let f = fixture();
        f.generator.push(Ok("When?".to_string()));
        f.coach.set_goal(5, "Max", "Practice piano").await.unwrap();

        f.generator.push(Err("503 overloaded".to_string()));
        let text = message(f.coach.invoke(5, Turn::User("8pm")).await.unwrap());

        assert!(text.contains("503 overloaded"));
        assert_eq!(f.coach.store().get(5).await.unwrap().stage, Stage::Intake);
    }
}
