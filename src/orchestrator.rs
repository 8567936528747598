//! Turn orchestration: alternating roles, bounded prompt context, and
//! red-flag annotations over a session-owned transcript.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::annotate;
use crate::config::SimulationConfig;
use crate::constants::SIMULATION_MARKER;
use crate::conversation::{AnnotationNote, ConversationTurn, Role, StyleSample};
use crate::defender::redact_sensitive;
use crate::error::{Result, SimulationError};
use crate::llm_interaction::LlmClient;
use crate::prompt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Active,
    Closed,
}

/// One simulated conversation. Owns its transcript and annotations; both only
/// ever grow, and neither changes once the session is closed.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    state: SessionState,
    starting_role: Role,
    style: StyleSample,
    turns: Vec<ConversationTurn>,
    annotations: Vec<AnnotationNote>,
}

/// Read-only view handed to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub state: SessionState,
    pub starting_role: Role,
    pub style_sample: StyleSample,
    pub turns: Vec<ConversationTurn>,
    pub annotations: Vec<AnnotationNote>,
}

impl Session {
    fn new(starting_role: Role, style: StyleSample) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Active,
            starting_role,
            style,
            turns: Vec::new(),
            annotations: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    pub fn starting_role(&self) -> Role {
        self.starting_role
    }

    pub fn style_sample(&self) -> &StyleSample {
        &self.style
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn annotations(&self) -> &[AnnotationNote] {
        &self.annotations
    }

    pub fn last_turn(&self) -> Option<&ConversationTurn> {
        self.turns.last()
    }

    /// Role that speaks the next turn.
    pub fn next_role(&self) -> Role {
        if self.turns.len() % 2 == 0 {
            self.starting_role
        } else {
            self.starting_role.other()
        }
    }

    /// Trailing turns that fit in a prompt window of `window` turns.
    pub fn tail(&self, window: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(window);
        &self.turns[start..]
    }

    /// Stores a note. Recording the same turn twice keeps the first note.
    pub fn record_annotation(&mut self, note: AnnotationNote) -> Result<()> {
        if self.is_closed() {
            return Err(SimulationError::SessionClosed);
        }
        if note.after_turn_index >= self.turns.len() {
            return Err(SimulationError::InvalidConfiguration(format!(
                "annotation references turn {} but the transcript has {} turns",
                note.after_turn_index,
                self.turns.len()
            )));
        }
        if self
            .annotations
            .iter()
            .any(|existing| existing.after_turn_index == note.after_turn_index)
        {
            return Ok(());
        }
        self.annotations.push(note);
        Ok(())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            state: self.state,
            starting_role: self.starting_role,
            style_sample: self.style.clone(),
            turns: self.turns.clone(),
            annotations: self.annotations.clone(),
        }
    }
}

/// Drives sessions against an [`LlmClient`].
pub struct Orchestrator {
    client: Arc<dyn LlmClient>,
    config: SimulationConfig,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn LlmClient>, config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn client_name(&self) -> &str {
        self.client.name()
    }

    pub fn start_session(&self, starting_role: Role, style: StyleSample) -> Session {
        let session = Session::new(starting_role, style);
        info!(session = %session.id, %starting_role, "Started simulation session");
        session
    }

    /// Generates and appends the next turn.
    ///
    /// The transcript is only touched after a usable completion is in hand, so
    /// a failed call can be retried as-is.
    pub async fn advance_turn(&self, session: &mut Session) -> Result<ConversationTurn> {
        if session.is_closed() {
            return Err(SimulationError::SessionClosed);
        }

        let role = session.next_role();
        let turn_index = session.turns.len();
        let prompt = prompt::compose_turn_prompt(
            role,
            session.tail(self.config.context_window),
            &session.style,
        )?;
        debug!(session = %session.id, turn_index, %role, ?prompt, "Composed turn prompt");

        let raw = self
            .client
            .generate(&prompt, &prompt::safety_rules())
            .await
            .map_err(|e| {
                warn!(session = %session.id, turn_index, error = %e, "Turn generation failed");
                SimulationError::from(e)
            })?;

        let text = self.finish_text(&raw)?;
        let turn = ConversationTurn {
            role,
            text,
            turn_index,
        };
        session.turns.push(turn.clone());
        info!(session = %session.id, turn_index, %role, "Appended turn");
        Ok(turn)
    }

    /// Appends a turn the user typed as the victim. Credential-like words are
    /// redacted before the text is stored; the returned flag says whether any
    /// were. Follow with [`Orchestrator::step`] for the attacker's reply.
    pub fn submit_turn(&self, session: &mut Session, text: &str) -> Result<(ConversationTurn, bool)> {
        if session.is_closed() {
            return Err(SimulationError::SessionClosed);
        }
        let role = session.next_role();
        if role != Role::Victim {
            return Err(SimulationError::InvalidConfiguration(format!(
                "it is the {}'s turn; user messages are only accepted for the victim",
                role
            )));
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(SimulationError::InvalidConfiguration(
                "enter a message to send".to_string(),
            ));
        }

        let (text, had_sensitive) = redact_sensitive(text);
        if had_sensitive {
            warn!(session = %session.id, "Sensitive tokens removed from user message");
        }
        let turn = ConversationTurn {
            role,
            text,
            turn_index: session.turns.len(),
        };
        session.turns.push(turn.clone());
        info!(session = %session.id, turn_index = turn.turn_index, "Appended user turn");
        Ok((turn, had_sensitive))
    }

    fn finish_text(&self, raw: &str) -> Result<String> {
        let text = raw.trim();
        let body = text.strip_prefix(SIMULATION_MARKER).unwrap_or(text).trim();
        if body.is_empty() {
            return Err(SimulationError::GenerationFailure(
                "model returned an empty reply".to_string(),
            ));
        }
        if self.config.simulation_marker && !text.starts_with(SIMULATION_MARKER) {
            Ok(format!("{} {}", SIMULATION_MARKER, text))
        } else {
            Ok(text.to_string())
        }
    }

    /// Checks the latest turn against the trigger table. Pure: it neither
    /// records the note nor calls the model.
    pub fn maybe_annotate(&self, session: &Session) -> Option<AnnotationNote> {
        session.last_turn().and_then(annotate::annotate_turn)
    }

    /// Advances one turn and records any annotation it triggers.
    pub async fn step(&self, session: &mut Session) -> Result<(ConversationTurn, Option<AnnotationNote>)> {
        let turn = self.advance_turn(session).await?;
        let note = self.maybe_annotate(session);
        if let Some(note) = &note {
            info!(session = %session.id, turn_index = turn.turn_index, cues = %note.cue_description, "Red flags detected");
            session.record_annotation(note.clone())?;
        }
        Ok((turn, note))
    }

    /// Closes the session. Idempotent.
    pub fn end_session(&self, session: &mut Session) -> SessionSnapshot {
        if !session.is_closed() {
            session.state = SessionState::Closed;
            info!(session = %session.id, turns = session.turns.len(), "Closed simulation session");
        }
        session.snapshot()
    }
}
