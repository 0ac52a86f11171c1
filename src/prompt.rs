//! Prompt templates for the three coaching modes.

use crate::reply::{LOCK_MARKER, PLAN_LOCKED_SENTINEL};
use crate::user::{Stage, UserRecord};

/// Synthetic input used to open the interview right after goal-setting.
pub const GOAL_SET_INPUT: &str = "I just set my goal.";

const PLAIN_TEXT_RULE: &str =
    "Formatting: PLAIN TEXT ONLY. Do NOT use asterisks (**), bolding, or any markdown emphasis.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    /// Timer-driven nudge; the user said nothing.
    Proactive,
    /// Interview to lock a reminder time.
    Intake,
    /// Plan locked; answer questions briefly.
    Active,
}

impl PromptMode {
    pub fn for_stage(stage: &Stage) -> Self {
        match stage {
            Stage::Intake => PromptMode::Intake,
            Stage::Active { .. } => PromptMode::Active,
        }
    }
}

pub fn compose(record: &UserRecord, user_input: &str, mode: PromptMode) -> String {
    match mode {
        PromptMode::Proactive => proactive_prompt(record),
        PromptMode::Intake => intake_prompt(record, user_input),
        PromptMode::Active => active_prompt(record, user_input),
    }
}

fn proactive_prompt(record: &UserRecord) -> String {
    format!(
        "User's Goal: '{}'. It is strictly time to work.\n\
         Draft a 1-sentence high-energy command to start working.\n\
         Rules: No hello. No questions. Just action, in the imperative.\n\
         {}",
        record.resolution, PLAIN_TEXT_RULE
    )
}

fn intake_prompt(record: &UserRecord, user_input: &str) -> String {
    format!(
        "You are a Habit Strategist. User Goal: '{resolution}'.\n\
         User says: '{input}'.\n\
         Goal: Lock a specific daily schedule.\n\
         CRITICAL RULES:\n\
         1. If the goal is vague, ask for one specific daily habit.\n\
         2. If the user has not given a time of day, ask when they want to do it.\n\
         3. Once the user confirms a proposed time, lock the plan.\n\
         4. When locking, start the final message with '{sentinel}', write one sentence confirming the plan, \
         then end with the hidden tag '{marker} HH:MM' (24-hour, zero-padded).\n\
         5. Example: if the user says '12am', output '{marker} 00:00'. If '2pm', output '{marker} 14:00'.\n\
         6. Never output the tag before the user has confirmed.\n\
         {rule}",
        resolution = record.resolution,
        input = user_input,
        sentinel = PLAN_LOCKED_SENTINEL,
        marker = LOCK_MARKER,
        rule = PLAIN_TEXT_RULE,
    )
}

fn active_prompt(record: &UserRecord, user_input: &str) -> String {
    format!(
        "User Goal: {}. User Input: '{}'.\n\
         Provide practical technical advice in at most two sentences.\n\
         {}",
        record.resolution, user_input, PLAIN_TEXT_RULE
    )
}
