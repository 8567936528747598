// Defaults for configuration values that are not supplied on the command line
// or through the environment.

pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "gemma3:12b";

pub const DEFAULT_CORPUS_PATH: &str = "data/scc_clean.jsonl";
pub const DEFAULT_PORT: u16 = 9900;

/// Number of trailing turns embedded in each prompt.
pub const DEFAULT_CONTEXT_WINDOW: usize = 6;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_FEW_SHOT_COUNT: usize = 4;

pub const SIMULATION_MARKER: &str = "[SIMULATION]";
pub const DEFENDER_MARKER: &str = "[DEFENDER MODE]";
