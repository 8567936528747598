pub mod annotate;
pub mod chat;
pub mod config;
pub mod constants;
pub mod conversation;
pub mod dataset;
pub mod defender;
pub mod error;
pub mod llm_interaction;
pub mod orchestrator;
pub mod prompt;
pub mod web_server;

pub use config::{LlmConfig, Provider, SimulationConfig};
pub use conversation::{AnnotationNote, ConversationTurn, CueCategory, RedFlag, Role, Severity, StyleSample};
pub use dataset::Corpus;
pub use defender::{Defender, DefenderReport};
pub use error::SimulationError;
pub use llm_interaction::{build_client, LlmClient, LlmError, ScriptedClient};
pub use orchestrator::{Orchestrator, Session, SessionSnapshot, SessionState};
