//! Red-flag heuristics for generated turns.
//!
//! The trigger list is a plain table: each rule pairs a regex (matched against
//! the lowercased text) with the cue it reports. Adding a cue means adding a
//! row, nothing else.

use lazy_static::lazy_static;
use regex::Regex;

use crate::conversation::{AnnotationNote, ConversationTurn, CueCategory, RedFlag, Severity};

struct TriggerRule {
    category: CueCategory,
    pattern: Regex,
    description: &'static str,
    severity: Severity,
    /// Only fire on messages shorter than this many characters.
    max_len: Option<usize>,
}

impl TriggerRule {
    fn new(
        category: CueCategory,
        pattern: &str,
        description: &'static str,
        severity: Severity,
        max_len: Option<usize>,
    ) -> Self {
        Self {
            category,
            pattern: Regex::new(pattern).unwrap_or_else(|e| panic!("bad trigger pattern {pattern}: {e}")),
            description,
            severity,
            max_len,
        }
    }

    fn fires(&self, lowered: &str) -> bool {
        if let Some(max) = self.max_len {
            if lowered.chars().count() >= max {
                return false;
            }
        }
        self.pattern.is_match(lowered)
    }
}

lazy_static! {
    static ref TRIGGER_TABLE: Vec<TriggerRule> = vec![
        TriggerRule::new(
            CueCategory::PhotoRequest,
            r"\b(selfie|photo|picture|pics)\b",
            "Asks for personal photo/selfie",
            Severity::Warning,
            None,
        ),
        TriggerRule::new(
            CueCategory::MoneyRequest,
            r"\b(money|transfer|send .* rupees|wallet|pay|gift card|loan)\b",
            "Asks for money or a transfer (financial manipulation)",
            Severity::Warning,
            None,
        ),
        TriggerRule::new(
            CueCategory::AvoidsVerification,
            r"\b(can't video|can['’]t video|camera broken|camera is broken|no video|can't call|avoid video|no camera)\b",
            "Avoids live verification/video call",
            Severity::Warning,
            None,
        ),
        TriggerRule::new(
            CueCategory::Isolation,
            r"\b(whatsapp|telegram|private chat|chat privately|talk privately|dm me|message me privately|keep this between us|don't tell)\b",
            "Wants to move the chat somewhere private (isolation tactic)",
            Severity::Warning,
            None,
        ),
        TriggerRule::new(
            CueCategory::FastAffection,
            r"\b(love you|miss you|so sweet|so beautiful)\b",
            "Fast affection / emotional push",
            Severity::Warning,
            Some(120),
        ),
        TriggerRule::new(
            CueCategory::SensitiveData,
            r"\b(password|otp|one-time|pin|bank|account)\b",
            "Sensitive data request (password/OTP/bank) - CRITICAL",
            Severity::Critical,
            None,
        ),
        TriggerRule::new(
            CueCategory::Urgency,
            r"\b(right now|immediately|urgent|urgently|asap|hurry|before it's too late|only today)\b",
            "Creates urgency to rush a decision",
            Severity::Warning,
            None,
        ),
        TriggerRule::new(
            CueCategory::Flattery,
            r"\b(gorgeous|stunning|soulmate|so special|never met anyone like you|perfect for me)\b",
            "Heavy flattery to lower defences",
            Severity::Warning,
            None,
        ),
    ];
}

/// Every rule that fires on `text`, in table order.
pub fn detect_red_flags(text: &str) -> Vec<RedFlag> {
    let lowered = text.to_lowercase();
    TRIGGER_TABLE
        .iter()
        .filter(|rule| rule.fires(&lowered))
        .map(|rule| RedFlag {
            category: rule.category,
            description: rule.description.to_string(),
            severity: rule.severity,
        })
        .collect()
}

/// Builds a note for `turn` when at least one trigger fires.
pub fn annotate_turn(turn: &ConversationTurn) -> Option<AnnotationNote> {
    let cues = detect_red_flags(&turn.text);
    if cues.is_empty() {
        None
    } else {
        Some(AnnotationNote::new(turn.turn_index, cues))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Role;

    fn categories(text: &str) -> Vec<CueCategory> {
        detect_red_flags(text).into_iter().map(|f| f.category).collect()
    }

    #[test]
    fn test_table_compiles() {
        assert_eq!(TRIGGER_TABLE.len(), 8);
    }

    #[test]
    fn test_money_request_fires() {
        assert_eq!(
            categories("[SIMULATION] Babe, can you send me money for the taxi?"),
            vec![CueCategory::MoneyRequest]
        );
    }

    #[test]
    fn test_isolation_and_photo() {
        let cats = categories("Add me on WhatsApp and send a selfie there");
        assert_eq!(cats, vec![CueCategory::PhotoRequest, CueCategory::Isolation]);
    }

    #[test]
    fn test_fast_affection_only_on_short_messages() {
        assert_eq!(categories("I miss you already"), vec![CueCategory::FastAffection]);

        let long = format!("I miss you already. {}", "We talked about many things today. ".repeat(5));
        assert!(long.len() >= 120);
        assert!(!categories(&long).contains(&CueCategory::FastAffection));
    }

    #[test]
    fn test_fast_affection_counts_characters_not_bytes() {
        let text = format!("i love you {}", "😍".repeat(30));
        assert_eq!(text.chars().count(), 41);
        assert!(text.len() >= 120);
        assert_eq!(categories(&text), vec![CueCategory::FastAffection]);
    }

    #[test]
    fn test_sensitive_data_is_critical() {
        let flags = detect_red_flags("What's the OTP you just got?");
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].severity, Severity::Critical);
    }

    #[test]
    fn test_word_boundaries_respected() {
        // "pin" inside "spinning" and "pay" inside "payload" must not fire
        assert!(categories("my head is spinning, the payload was huge").is_empty());
    }

    #[test]
    fn test_urgency_and_flattery() {
        assert_eq!(
            categories("You're gorgeous, reply right now!"),
            vec![CueCategory::Urgency, CueCategory::Flattery]
        );
    }

    #[test]
    fn test_annotate_turn_none_for_benign_text() {
        let turn = ConversationTurn {
            role: Role::Victim,
            text: "I had pasta for dinner.".into(),
            turn_index: 1,
        };
        assert!(annotate_turn(&turn).is_none());
    }

    #[test]
    fn test_annotate_turn_references_turn_index() {
        let turn = ConversationTurn {
            role: Role::Attacker,
            text: "Please send me money, it's urgent".into(),
            turn_index: 4,
        };
        let note = annotate_turn(&turn).unwrap();
        assert_eq!(note.after_turn_index, 4);
        assert!(note.cue_description.contains("financial manipulation"));
        assert_eq!(annotate_turn(&turn), Some(note));
    }
}
