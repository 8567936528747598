use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::SimulationError;

/// Which text-generation backend to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Google Gemini `generateContent` REST API.
    Gemini,
    /// A local Ollama server.
    Ollama,
    /// Canned offline replies, no network.
    Scripted,
}

/// Everything an LLM client needs. Passed explicitly into client constructors.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: Provider,
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub request_timeout: Duration,
}

impl LlmConfig {
    pub fn new(provider: Provider) -> Self {
        let (model, base_url) = match provider {
            Provider::Gemini => (constants::DEFAULT_GEMINI_MODEL, constants::DEFAULT_GEMINI_URL),
            Provider::Ollama => (constants::DEFAULT_OLLAMA_MODEL, constants::DEFAULT_OLLAMA_URL),
            Provider::Scripted => ("scripted", ""),
        };
        Self {
            provider,
            api_key: None,
            model: model.to_string(),
            base_url: base_url.to_string(),
            request_timeout: Duration::from_secs(constants::DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// The credential must be resolvable before any call is attempted.
    pub fn require_api_key(&self) -> Result<&str, SimulationError> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(SimulationError::InvalidConfiguration(format!(
                "provider {:?} requires an API key (set GEMINI_API_KEY or pass --api-key)",
                self.provider
            ))),
        }
    }
}

/// Knobs for the turn orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Trailing turns included in each prompt.
    pub context_window: usize,
    /// Prefix every generated turn with the simulation marker.
    pub simulation_marker: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            context_window: constants::DEFAULT_CONTEXT_WINDOW,
            simulation_marker: true,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.context_window == 0 {
            return Err(SimulationError::InvalidConfiguration(
                "context window must be at least one turn".to_string(),
            ));
        }
        Ok(())
    }
}
