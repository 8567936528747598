//! Style corpus: sanitized catphishing excerpts used to seed tone.
//!
//! The corpus is JSONL. Records come in a few shapes (a `dialogue` list, a
//! `text` or `message` field, or anything else) and are flattened into short
//! textual examples. PII is redacted on the way in.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};

use crate::conversation::StyleSample;

const MAX_DIALOGUE_TURNS: usize = 6;
const MAX_EXAMPLE_CHARS: usize = 400;
const MIN_EXAMPLE_CHARS: usize = 10;

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"[a-zA-Z0-9.\-_+]+@[a-zA-Z0-9\-_]+\.[a-zA-Z0-9\-.]+").unwrap();
    static ref PHONE_RE: Regex = Regex::new(r"\+?\d[\d\s\-()]{6,}\d").unwrap();
    static ref URL_RE: Regex = Regex::new(r"https?://\S+|www\.\S+").unwrap();
}

const BUILTIN_EXAMPLES: [&str; 3] = [
    "Scammer: [SIMULATION] Hey, I saw your pics, you seem so sweet! Can we chat privately?\n\
     Target: Okay.\n\
     Scammer: I'm abroad for work, phone camera broken, can you send a selfie?",
    "Scammer: [SIMULATION] Hi! I'm new here, we seem similar. Can I add you on WhatsApp?\n\
     Target: Maybe. What's your number?\n\
     Scammer: I'll DM you, I prefer private chat.",
    "Scammer: [SIMULATION] I lost my wallet yesterday, can you help me send 500 for a taxi? \
     (SIMULATION - do not send money)\n\
     Target: Sorry, I can't.",
];

/// Redacts emails, phone numbers and URLs after decoding common HTML entities.
pub fn sanitize_text(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }
    let s = unescape_html(s);
    let s = EMAIL_RE.replace_all(&s, "[REDACTED_EMAIL]");
    let s = PHONE_RE.replace_all(&s, "[REDACTED_PHONE]");
    let s = URL_RE.replace_all(&s, "[REDACTED_URL]");
    s.into_owned()
}

fn unescape_html(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Flattens one corpus record into a textual example.
pub fn example_from_record(record: &Value) -> String {
    if let Some(Value::Array(turns)) = record.get("dialogue") {
        return turns
            .iter()
            .take(MAX_DIALOGUE_TURNS)
            .map(|turn| {
                let (speaker, text) = match turn {
                    Value::Object(obj) => {
                        let speaker = obj
                            .get("speaker")
                            .map(value_text)
                            .unwrap_or_else(|| "scammer".to_string());
                        let text = obj
                            .get("text")
                            .map(value_text)
                            .filter(|t| !t.is_empty())
                            .or_else(|| obj.get("message").map(value_text))
                            .unwrap_or_default();
                        (speaker, text)
                    }
                    Value::Array(pair) if pair.len() >= 2 => (value_text(&pair[0]), value_text(&pair[1])),
                    other => ("scammer".to_string(), value_text(other)),
                };
                format!("{}: {}", capitalize(&speaker), sanitize_text(&text))
            })
            .collect::<Vec<_>>()
            .join("\n");
    }
    for key in ["text", "message"] {
        if let Some(value) = record.get(key) {
            return truncate_chars(&sanitize_text(&value_text(value)), MAX_EXAMPLE_CHARS);
        }
    }
    truncate_chars(&sanitize_text(&record.to_string()), MAX_EXAMPLE_CHARS)
}

/// Read-only pool of style examples, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Corpus {
    examples: Vec<String>,
    record_count: usize,
    source: Option<PathBuf>,
}

impl Corpus {
    /// Loads a JSONL corpus. A missing file yields the built-in examples;
    /// unparseable lines are skipped.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "Corpus not found, using built-in examples");
            return Ok(Self::builtin());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read corpus at {}", path.display()))?;
        let corpus = Self::from_jsonl(&raw).with_source(path);
        info!(
            path = %path.display(),
            records = corpus.record_count,
            examples = corpus.examples.len(),
            "Loaded style corpus"
        );
        Ok(corpus)
    }

    pub fn from_jsonl(raw: &str) -> Self {
        let mut record_count = 0;
        let mut examples = Vec::new();
        for (lineno, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: Value = match serde_json::from_str(line) {
                Ok(record) => record,
                Err(e) => {
                    warn!(line = lineno + 1, error = %e, "Skipping unparseable corpus line");
                    continue;
                }
            };
            record_count += 1;
            let example = example_from_record(&record);
            if example.chars().count() > MIN_EXAMPLE_CHARS {
                examples.push(example);
            }
        }

        if examples.is_empty() {
            warn!("No usable corpus examples, falling back to built-in examples");
            examples = BUILTIN_EXAMPLES.iter().map(|s| s.to_string()).collect();
        }

        Self {
            examples,
            record_count,
            source: None,
        }
    }

    pub fn builtin() -> Self {
        Self::from_jsonl("")
    }

    fn with_source(mut self, path: &Path) -> Self {
        self.source = Some(path.to_path_buf());
        self
    }

    pub fn examples(&self) -> &[String] {
        &self.examples
    }

    /// Parsed records in the source file, zero for the built-in pool.
    pub fn record_count(&self) -> usize {
        self.record_count
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// One reference excerpt.
    pub fn sample_style_text<R: Rng + ?Sized>(&self, rng: &mut R) -> StyleSample {
        let text = self.examples.choose(rng).cloned().unwrap_or_default();
        StyleSample::new(text)
    }

    /// Up to `n` distinct excerpts joined by blank lines.
    pub fn sample_few_shots<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> String {
        let n = n.min(self.examples.len());
        self.examples
            .choose_multiple(rng, n)
            .cloned()
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
