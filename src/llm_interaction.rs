//! Text-generation clients.
//!
//! The orchestrator only sees [`LlmClient`]. Provider implementations own
//! their HTTP shapes and credentials; credentials come in through
//! [`LlmConfig`], never from process-wide state.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, instrument};

use crate::config::{LlmConfig, Provider};
use crate::error::SimulationError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LlmError {
    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    Malformed(String),

    #[error("provider returned an empty completion")]
    Empty,
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else if e.is_decode() {
            LlmError::Malformed(e.to_string())
        } else {
            LlmError::Transport(e.to_string())
        }
    }
}

impl From<LlmError> for SimulationError {
    fn from(e: LlmError) -> Self {
        SimulationError::GenerationFailure(e.to_string())
    }
}

/// Capability interface over a text-generation API.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a completion for `prompt`. `prior_context` carries standing
    /// instructions that precede the prompt, oldest first.
    async fn generate(&self, prompt: &str, prior_context: &[String]) -> Result<String, LlmError>;

    /// Human-readable backend name for logs and the UI.
    fn name(&self) -> &str;
}

/// Builds the client selected by `config.provider`.
pub fn build_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, SimulationError> {
    let client: Arc<dyn LlmClient> = match config.provider {
        Provider::Gemini => Arc::new(GeminiClient::new(config)?),
        Provider::Ollama => Arc::new(OllamaClient::new(config)?),
        Provider::Scripted => Arc::new(ScriptedClient::demo()),
    };
    Ok(client)
}

fn http_client(config: &LlmConfig) -> Result<Client, SimulationError> {
    Client::builder()
        .timeout(config.request_timeout)
        .build()
        .map_err(|e| SimulationError::InvalidConfiguration(format!("failed to build HTTP client: {}", e)))
}

async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error body".to_string());
    error!(%status, %body, "LLM API request failed");
    Err(LlmError::Status {
        status: status.as_u16(),
        body,
    })
}

// ---------------------------------------------------------------------------
// Gemini
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent<'a>>,
    contents: Vec<GeminiContent<'a>>,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Deserialize, Debug)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize, Debug)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Deserialize, Debug)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Deserialize, Debug)]
struct GeminiCandidatePart {
    #[serde(default)]
    text: String,
}

/// Client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    http: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(config: &LlmConfig) -> Result<Self, SimulationError> {
        let api_key = config.require_api_key()?.to_string();
        Ok(Self {
            http: http_client(config)?,
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.clone(),
        })
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    #[instrument(skip(self, prompt, prior_context), fields(model = %self.model))]
    async fn generate(&self, prompt: &str, prior_context: &[String]) -> Result<String, LlmError> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);

        let system_instruction = if prior_context.is_empty() {
            None
        } else {
            Some(GeminiContent {
                role: None,
                parts: prior_context
                    .iter()
                    .map(|text| GeminiPart { text: text.as_str() })
                    .collect(),
            })
        };
        let request = GeminiRequest {
            system_instruction,
            contents: vec![GeminiContent {
                role: Some("user"),
                parts: vec![GeminiPart { text: prompt }],
            }],
        };

        debug!(?prompt, "Sending Gemini generateContent request");

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;
        let response = error_for_status(response).await?;

        let body = response.json::<GeminiResponse>().await?;
        let text = body
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .ok_or_else(|| LlmError::Malformed("response has no candidates".to_string()))?;

        debug!(response = ?text, "Received Gemini response");
        Ok(text.trim().to_string())
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// ---------------------------------------------------------------------------
// Ollama
// ---------------------------------------------------------------------------

// Structures matching Ollama's /api/generate endpoint
#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool, // We want the full response, not a stream
}

#[derive(Deserialize, Debug)]
struct OllamaResponse {
    response: String, // The generated text
    #[serde(default)]
    done: bool,
}

/// Client for a local Ollama server.
pub struct OllamaClient {
    http: Client,
    model: String,
    base_url: String,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Result<Self, SimulationError> {
        Ok(Self {
            http: http_client(config)?,
            model: config.model.clone(),
            base_url: config.base_url.clone(),
        })
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    #[instrument(skip(self, prompt, prior_context), fields(model = %self.model))]
    async fn generate(&self, prompt: &str, prior_context: &[String]) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.base_url);
        let request = OllamaRequest {
            model: &self.model,
            prompt,
            system: (!prior_context.is_empty()).then(|| prior_context.join("\n")),
            stream: false,
        };

        debug!(?prompt, "Sending Ollama generate request");

        let response = self.http.post(&url).json(&request).send().await?;
        let response = error_for_status(response).await?;
        let body = response.json::<OllamaResponse>().await?;

        debug!(response = ?body.response, done = body.done, "Received Ollama response");
        Ok(body.response.trim().to_string())
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

// ---------------------------------------------------------------------------
// Scripted
// ---------------------------------------------------------------------------

enum Script {
    /// Replies handed out in order, wrapping around at the end.
    Sequence(Vec<Result<String, LlmError>>),
    /// Picks a line for whichever role the prompt asks to speak. Each role
    /// walks its own lines, so other calls never make it skip one.
    ByRole {
        attacker: Vec<String>,
        victim: Vec<String>,
        attacker_next: AtomicUsize,
        victim_next: AtomicUsize,
    },
}

const DEMO_DEFENDER_ANALYSIS: &str = "[DEFENDER MODE] Red flags: pressure to act fast, requests for money or \
codes, and a push to move off-platform. Safe replies: \"I don't send money or codes to people I haven't met.\" or \
\"Let's video call first.\" Next steps: block the account, report it on the platform, and tell a parent or IT.";

/// A call the scripted client received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub prompt: String,
    pub prior_context: Vec<String>,
}

/// Deterministic offline client. Backs the `scripted` provider and tests.
pub struct ScriptedClient {
    script: Script,
    cursor: AtomicUsize,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedClient {
    pub fn new(replies: Vec<Result<String, LlmError>>) -> Self {
        Self::with_script(Script::Sequence(replies))
    }

    /// Every call succeeds with the given texts, in order.
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(|t| Ok(t.into())).collect())
    }

    /// Canned catphishing dialogue for running the demo without an API key.
    pub fn demo() -> Self {
        let attacker = [
            "[SIMULATION] Hey! I saw your profile, you seem so sweet. Can we chat privately?",
            "[SIMULATION] I'm abroad for work and my camera is broken, so no video for now. Send me a selfie?",
            "[SIMULATION] You're gorgeous. Let's move to WhatsApp, it's easier there.",
            "[SIMULATION] I lost my wallet, can you send me money for a taxi right now? (SIMULATION - do NOT send money or passwords)",
            "[SIMULATION] My bank needs a code to unlock my account, what's the OTP you just got? (SIMULATION - do NOT send money or passwords)",
        ];
        let victim = [
            "[SIMULATION] Hi, do I know you?",
            "[SIMULATION] Why can't we just video call?",
            "[SIMULATION] I'd rather keep chatting here.",
            "[SIMULATION] Sorry, I don't send money to people I haven't met.",
            "[SIMULATION] That sounds like a scam. I'm going to block and report this account.",
        ];
        Self::with_script(Script::ByRole {
            attacker: attacker.iter().map(|s| s.to_string()).collect(),
            victim: victim.iter().map(|s| s.to_string()).collect(),
            attacker_next: AtomicUsize::new(0),
            victim_next: AtomicUsize::new(0),
        })
    }

    fn with_script(script: Script) -> Self {
        Self {
            script,
            cursor: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Calls received so far, oldest first.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn generate(&self, prompt: &str, prior_context: &[String]) -> Result<String, LlmError> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(RecordedCall {
                prompt: prompt.to_string(),
                prior_context: prior_context.to_vec(),
            });

        match &self.script {
            Script::Sequence(replies) if replies.is_empty() => Err(LlmError::Empty),
            Script::Sequence(replies) => {
                let n = self.cursor.fetch_add(1, Ordering::SeqCst);
                replies[n % replies.len()].clone()
            }
            Script::ByRole { .. } if prompt.trim_end().ends_with("Response:") => {
                Ok(DEMO_DEFENDER_ANALYSIS.to_string())
            }
            Script::ByRole {
                attacker,
                victim,
                attacker_next,
                victim_next,
            } => {
                let (lines, next) = if prompt.trim_end().ends_with("Victim:") {
                    (victim, victim_next)
                } else {
                    (attacker, attacker_next)
                };
                let n = next.fetch_add(1, Ordering::SeqCst);
                Ok(lines[n % lines.len()].clone())
            }
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_sequence_wraps() {
        let client = ScriptedClient::from_texts(["one", "two"]);
        assert_eq!(client.generate("p", &[]).await.unwrap(), "one");
        assert_eq!(client.generate("p", &[]).await.unwrap(), "two");
        assert_eq!(client.generate("p", &[]).await.unwrap(), "one");
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn test_scripted_records_prior_context() {
        let client = ScriptedClient::from_texts(["ok"]);
        let context = vec!["rule".to_string()];
        client.generate("prompt", &context).await.unwrap();
        let calls = client.calls();
        assert_eq!(calls[0].prompt, "prompt");
        assert_eq!(calls[0].prior_context, context);
    }

    #[tokio::test]
    async fn test_scripted_failure_then_success() {
        let client = ScriptedClient::new(vec![Err(LlmError::Timeout), Ok("fine".to_string())]);
        assert_eq!(client.generate("p", &[]).await, Err(LlmError::Timeout));
        assert_eq!(client.generate("p", &[]).await.unwrap(), "fine");
    }

    #[tokio::test]
    async fn test_empty_script_reports_empty() {
        let client = ScriptedClient::new(Vec::new());
        assert_eq!(client.generate("p", &[]).await, Err(LlmError::Empty));
    }

    #[tokio::test]
    async fn test_demo_picks_line_for_requested_role() {
        let client = ScriptedClient::demo();
        let opener = client.generate("...\nAttacker:", &[]).await.unwrap();
        let reply = client.generate("...\nVictim:", &[]).await.unwrap();
        assert!(opener.contains("chat privately"));
        assert!(reply.contains("do I know you"));

        let analysis = client.generate("User message:\nhi\n\nResponse:", &[]).await.unwrap();
        assert!(analysis.starts_with("[DEFENDER MODE]"));
    }

    #[tokio::test]
    async fn test_demo_roles_advance_independently() {
        let client = ScriptedClient::demo();
        client.generate("User message:\nhi\n\nResponse:", &[]).await.unwrap();
        let first = client.generate("...\nAttacker:", &[]).await.unwrap();
        client.generate("...\nAttacker:", &[]).await.unwrap();
        client.generate("User message:\nhi\n\nResponse:", &[]).await.unwrap();
        let victim_first = client.generate("...\nVictim:", &[]).await.unwrap();
        let victim_second = client.generate("...\nVictim:", &[]).await.unwrap();

        assert!(first.contains("chat privately"));
        assert!(victim_first.contains("do I know you"));
        assert!(victim_second.contains("video call"));
    }

    #[test]
    fn test_llm_error_maps_to_generation_failure() {
        let err: SimulationError = LlmError::Status {
            status: 500,
            body: "boom".into(),
        }
        .into();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_gemini_requires_api_key() {
        let config = LlmConfig::new(Provider::Gemini);
        assert!(matches!(
            GeminiClient::new(&config),
            Err(SimulationError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_gemini_request_shape() {
        let request = GeminiRequest {
            system_instruction: Some(GeminiContent {
                role: None,
                parts: vec![GeminiPart { text: "rule" }],
            }),
            contents: vec![GeminiContent {
                role: Some("user"),
                parts: vec![GeminiPart { text: "hi" }],
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "rule");
        assert!(json["systemInstruction"].get("role").is_none());
        assert_eq!(json["contents"][0]["role"], "user");
    }
}
