use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SimulationError;

/// The two simulated sides of a catphishing conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Attacker,
    Victim,
}

impl Role {
    pub fn other(self) -> Role {
        match self {
            Role::Attacker => Role::Victim,
            Role::Victim => Role::Attacker,
        }
    }

    /// Speaker label used in prompts and the terminal transcript.
    pub fn label(self) -> &'static str {
        match self {
            Role::Attacker => "Attacker",
            Role::Victim => "Victim",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Role {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "attacker" | "catphisher" | "scammer" => Ok(Role::Attacker),
            "victim" | "target" => Ok(Role::Victim),
            other => Err(SimulationError::InvalidConfiguration(format!(
                "unknown role '{}', expected 'attacker' or 'victim'",
                other
            ))),
        }
    }
}

/// One generated message. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub turn_index: usize,
}

impl ConversationTurn {
    pub fn transcript_line(&self) -> String {
        format!("{}: {}", self.role.label(), self.text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CueCategory {
    PhotoRequest,
    MoneyRequest,
    AvoidsVerification,
    Isolation,
    FastAffection,
    SensitiveData,
    Urgency,
    Flattery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

/// A single fired heuristic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedFlag {
    pub category: CueCategory,
    pub description: String,
    pub severity: Severity,
}

/// Educational note attached to a turn, kept apart from the dialogue itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationNote {
    pub after_turn_index: usize,
    pub cue_description: String,
    pub cues: Vec<RedFlag>,
}

impl AnnotationNote {
    pub fn new(after_turn_index: usize, cues: Vec<RedFlag>) -> Self {
        let cue_description = cues
            .iter()
            .map(|cue| cue.description.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        Self {
            after_turn_index,
            cue_description,
            cues,
        }
    }

    pub fn is_critical(&self) -> bool {
        self.cues.iter().any(|cue| cue.severity == Severity::Critical)
    }
}

/// Reference excerpt that seeds the tone of generated turns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StyleSample(String);

impl StyleSample {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}
