//! Defender mode: help a user pick apart a message they actually received.

use std::sync::Arc;

use lazy_static::lazy_static;
use rand::thread_rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::annotate::detect_red_flags;
use crate::constants::{DEFAULT_FEW_SHOT_COUNT, DEFENDER_MARKER};
use crate::conversation::RedFlag;
use crate::dataset::Corpus;
use crate::error::{Result, SimulationError};
use crate::llm_interaction::LlmClient;
use crate::prompt;

lazy_static! {
    static ref SENSITIVE_RE: Regex = Regex::new(r"(?i)(password|otp|pin|bank|account|card|cvv)").unwrap();
}

pub const SENSITIVE_PLACEHOLDER: &str = "[REDACTED_SENSITIVE]";

/// Replaces credential-like words before anything leaves the process.
/// Returns the redacted text and whether anything was replaced.
pub fn redact_sensitive(input: &str) -> (String, bool) {
    if !SENSITIVE_RE.is_match(input) {
        return (input.to_string(), false);
    }
    (SENSITIVE_RE.replace_all(input, SENSITIVE_PLACEHOLDER).into_owned(), true)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefenderReport {
    pub redacted_input: String,
    pub had_sensitive: bool,
    pub flags: Vec<RedFlag>,
    pub analysis: String,
}

pub struct Defender {
    client: Arc<dyn LlmClient>,
    corpus: Arc<Corpus>,
}

impl Defender {
    pub fn new(client: Arc<dyn LlmClient>, corpus: Arc<Corpus>) -> Self {
        Self { client, corpus }
    }

    pub async fn analyze(&self, message: &str) -> Result<DefenderReport> {
        if message.trim().is_empty() {
            return Err(SimulationError::InvalidConfiguration(
                "enter a message to analyze".to_string(),
            ));
        }

        let (redacted_input, had_sensitive) = redact_sensitive(message);
        if had_sensitive {
            warn!("Sensitive tokens removed from defender input");
        }
        // Heuristics run on the original text so redaction does not hide cues.
        let flags = detect_red_flags(message);

        let few_shots = self
            .corpus
            .sample_few_shots(DEFAULT_FEW_SHOT_COUNT, &mut thread_rng());
        let prompt = prompt::defender_prompt(&redacted_input, &flags, &few_shots);
        let reply = self.client.generate(&prompt, &prompt::safety_rules()).await?;
        let reply = reply.trim();
        if reply.is_empty() {
            return Err(SimulationError::GenerationFailure(
                "model returned an empty analysis".to_string(),
            ));
        }

        let analysis = if reply.starts_with(DEFENDER_MARKER) {
            reply.to_string()
        } else {
            format!("{} {}", DEFENDER_MARKER, reply)
        };
        info!(flags = flags.len(), had_sensitive, "Defender analysis complete");

        Ok(DefenderReport {
            redacted_input,
            had_sensitive,
            flags,
            analysis,
        })
    }
}
