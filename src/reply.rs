//! Extracts the `ALARM: HH:MM` lock marker from generated text and cleans the
//! text for display.

use crate::user::ReminderTime;

pub const LOCK_MARKER: &str = "ALARM:";
pub const PLAN_LOCKED_SENTINEL: &str = "PLAN_LOCKED:";

const MARKER_PATTERN: &str = r"ALARM:\s*(\d{1,2}:\d{2})";
const EMPHASIS: &str = "**";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    pub text: String,
    pub locked_time: Option<ReminderTime>,
}

/// Parse a reply that may lock the plan.
///
/// The first marker decides the time. A marker that is missing, does not
/// match the pattern, or carries an impossible time is treated as "no lock"
/// and the text is only stripped of emphasis. Every well-formed marker is
/// removed from the visible text.
pub fn parse(raw: &str) -> ParsedReply {
    if !raw.contains(LOCK_MARKER) {
        return unlocked(raw);
    }

    let Some(re) = marker_regex() else {
        return unlocked(raw);
    };
    let Some(captured) = re.captures(raw).and_then(|caps| caps.get(1)) else {
        tracing::debug!("Reply mentions {} but carries no usable time", LOCK_MARKER);
        return unlocked(raw);
    };

    let time = match captured.as_str().parse::<ReminderTime>() {
        Ok(time) => time,
        Err(e) => {
            tracing::warn!("Ignoring lock marker {:?}: {}", captured.as_str(), e);
            return unlocked(raw);
        }
    };

    let text = re.replace_all(raw, "").replace(PLAN_LOCKED_SENTINEL, "");
    let text = strip_emphasis(text.trim());

    let confirmation = format!("(⏰ System set to remind you daily at {})", time);
    let text = if text.is_empty() {
        confirmation
    } else {
        format!("{}\n\n{}", text, confirmation)
    };

    ParsedReply {
        text,
        locked_time: Some(time),
    }
}

/// Clean a reply that must never lock a plan: markers, the sentinel and
/// emphasis are removed, and no confirmation is appended.
pub fn scrub(raw: &str) -> String {
    let text = match marker_regex() {
        Some(re) if raw.contains(LOCK_MARKER) => re.replace_all(raw, "").into_owned(),
        _ => raw.to_string(),
    };
    strip_emphasis(text.replace(PLAN_LOCKED_SENTINEL, "").trim())
}

/// Remove markdown bold markers the model slipped in despite instructions.
pub fn strip_emphasis(raw: &str) -> String {
    raw.replace(EMPHASIS, "")
}

fn unlocked(raw: &str) -> ParsedReply {
    ParsedReply {
        text: strip_emphasis(raw),
        locked_time: None,
    }
}

fn marker_regex() -> Option<regex_lite::Regex> {
    match regex_lite::Regex::new(MARKER_PATTERN) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::error!("Lock marker pattern failed to compile: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locks_and_pads_single_digit_hour() {
        let parsed = parse("Plan set. ALARM: 9:00");
        assert_eq!(parsed.locked_time, ReminderTime::new(9, 0));
        assert!(!parsed.text.contains("ALARM"));
        assert!(parsed.text.starts_with("Plan set."));
        assert!(parsed.text.contains("09:00"));
    }

    #[test]
    fn text_without_marker_is_unchanged() {
        let parsed = parse("Here's advice with no marker.");
        assert_eq!(parsed.text, "Here's advice with no marker.");
        assert_eq!(parsed.locked_time, None);
    }

    #[test]
    fn emphasis_is_stripped_with_or_without_marker() {
        assert_eq!(parse("Do **this** now").text, "Do this now");

        let parsed = parse("**Locked in!** ALARM: 21:00");
        assert_eq!(
            parsed.text,
            "Locked in!\n\n(⏰ System set to remind you daily at 21:00)"
        );
    }

    #[test]
    fn malformed_marker_does_not_lock() {
        let parsed = parse("I'll set an **ALARM: soon**");
        assert_eq!(parsed.locked_time, None);
        assert_eq!(parsed.text, "I'll set an ALARM: soon");
    }

    #[test]
    fn impossible_time_does_not_lock() {
        let parsed = parse("Sure. ALARM: 27:15");
        assert_eq!(parsed.locked_time, None);
        assert!(parsed.text.contains("ALARM: 27:15"));
    }

    #[test]
    fn sentinel_and_tight_marker_are_removed() {
        let parsed = parse("PLAN_LOCKED: Reading every night at 9pm.\nALARM:21:00");
        assert_eq!(parsed.locked_time, ReminderTime::new(21, 0));
        assert!(!parsed.text.contains("PLAN_LOCKED"));
        assert!(!parsed.text.contains("ALARM"));
        assert!(parsed.text.starts_with("Reading every night at 9pm."));
    }

    #[test]
    fn marker_only_reply_still_confirms() {
        let parsed = parse("ALARM: 06:30");
        assert_eq!(parsed.text, "(⏰ System set to remind you daily at 06:30)");
    }

    #[test]
    fn marker_glued_to_trailing_text_still_locks() {
        let parsed = parse("Done. ALARM: 9:00pm");
        assert_eq!(parsed.locked_time, ReminderTime::new(9, 0));
        assert!(!parsed.text.contains("ALARM"));
        assert!(parsed.text.starts_with("Done."));

        let parsed = parse("Locked for 9pm. ALARM: 21:00h");
        assert_eq!(parsed.locked_time, ReminderTime::new(21, 0));
        assert!(!parsed.text.contains("ALARM"));
    }

    #[test]
    fn every_marker_is_removed_and_the_first_wins() {
        let parsed = parse("ALARM: 9:00 is early, so let's say ALARM: 10:00 instead.");
        assert_eq!(parsed.locked_time, ReminderTime::new(9, 0));
        assert!(!parsed.text.contains("ALARM"));
        assert!(parsed.text.contains("instead."));
    }

    #[test]
    fn scrub_removes_markers_without_confirming() {
        assert_eq!(
            scrub("Open the doc and write **now**. ALARM: 08:00"),
            "Open the doc and write now."
        );
        assert_eq!(scrub("Just read."), "Just read.");
    }
}
