use thiserror::Error;

/// Failures surfaced by the simulation core to its caller.
///
/// Nothing here is retried internally. `GenerationFailure` is the only
/// variant a caller may retry by re-issuing the same operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulationError {
    /// Bad role, empty prompt input or missing credentials.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The LLM provider errored, timed out or returned nothing usable.
    #[error("generation failed: {0}")]
    GenerationFailure(String),

    #[error("session is closed")]
    SessionClosed,
}

impl SimulationError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SimulationError::GenerationFailure(_))
    }

    /// Short machine-readable tag used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            SimulationError::InvalidConfiguration(_) => "invalid_configuration",
            SimulationError::GenerationFailure(_) => "generation_failure",
            SimulationError::SessionClosed => "session_closed",
        }
    }
}

pub type Result<T, E = SimulationError> = std::result::Result<T, E>;
