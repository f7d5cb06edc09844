pub mod allocation;
pub mod composite;
pub mod dto;
pub mod error;
pub mod flow;
pub mod matcher;
pub mod render;
pub mod review;
pub mod risk;
pub mod rubric;
pub mod source;

pub use error::{CoreError, Result, ScoringError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::allocation::{BlockId, TextBlock};
use crate::risk::{RiskLevel, Thresholds};

// --- Types (matching the portal's frontend DTOs) ---

/// A glossary term. `title` is the case-insensitive match key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
pub struct Keyword {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum QuestionKind {
    Open,
    Single,
    Multiple,
}

impl QuestionKind {
    pub fn is_choice(self) -> bool {
        matches!(self, QuestionKind::Single | QuestionKind::Multiple)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QuestionKind::Open => "open",
            QuestionKind::Single => "single",
            QuestionKind::Multiple => "multiple",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
pub struct ChoiceOption {
    pub id: String,
    pub text: String,
}

/// A validated questionnaire question. Immutable for the lifetime of a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ChoiceOption>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<Keyword>,
}

impl Question {
    /// Text blocks in display order: the title, then every option.
    pub fn blocks(&self) -> Vec<TextBlock<'_>> {
        std::iter::once(TextBlock {
            id: BlockId::Title,
            text: self.text.as_str(),
        })
        .chain(self.options.iter().enumerate().map(|(i, o)| TextBlock {
            id: BlockId::Option(i),
            text: o.text.as_str(),
        }))
        .collect()
    }

    pub fn option(&self, id: &str) -> Option<&ChoiceOption> {
        self.options.iter().find(|o| o.id == id)
    }

    pub fn option_position(&self, id: &str) -> Option<usize> {
        self.options.iter().position(|o| o.id == id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub question_id: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmissionMetadata {
    pub category: String,
    pub timestamp: DateTime<Utc>,
}

/// What the scoring service receives when a questionnaire is completed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmissionPayload {
    pub metadata: SubmissionMetadata,
    pub answers: Vec<Answer>,
}

/// Raw response of the scoring service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScoringResult {
    pub summary_text: String,
    pub color_code: String,
}

/// A scoring result after its color code has been classified.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub summary_text: String,
    pub color_code: String,
    pub level: RiskLevel,
}

impl Assessment {
    pub fn from_result(result: ScoringResult) -> Self {
        let level = risk::classify_color_code(&result.color_code);
        Self {
            summary_text: result.summary_text,
            color_code: result.color_code,
            level,
        }
    }
}

/// The external scoring collaborator.
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(
        &self,
        payload: &SubmissionPayload,
    ) -> std::result::Result<ScoringResult, ScoringError>;
}

// --- Storage ---

/// Resolve the data directory: `$SEMAFORO_HOME`, else `~/.semaforo/`.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("SEMAFORO_HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".semaforo")
}

/// Write a file atomically (temp file + rename) so readers never observe a
/// truncated document.
pub fn write_atomic(path: &Path, data: &str) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = dir.join(format!(".{}.tmp", file_name));
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Check that a name is safe to use as a file stem: `[a-zA-Z0-9_-]`, non-empty.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

// --- Settings ---

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScoringSettings {
    pub provider: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model: String,
    /// Only used by the `http` provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PortalSettings {
    #[serde(default)]
    pub scoring: ScoringSettings,
    #[serde(default)]
    pub thresholds: Thresholds,
}

fn settings_path(root: &Path) -> PathBuf {
    root.join("settings.json")
}

/// Read settings from `root`. A missing file yields defaults; a malformed one
/// is an error so a typo never silently resets thresholds.
pub fn read_settings(root: &Path) -> Result<PortalSettings> {
    let path = settings_path(root);
    if !path.exists() {
        return Ok(PortalSettings::default());
    }
    let raw = fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&raw)?)
}

pub fn write_settings(root: &Path, settings: &PortalSettings) -> Result<()> {
    let json = serde_json::to_string_pretty(settings)?;
    write_atomic(&settings_path(root), &json)
}

/// Chat providers the scoring crate can drive.
pub const LLM_PROVIDERS: [&str; 7] = [
    "openai", "anthropic", "google", "ollama", "groq", "mistral", "deepseek",
];

pub fn scoring_configured(settings: &ScoringSettings) -> bool {
    match settings.provider.as_str() {
        "http" => settings
            .endpoint
            .as_deref()
            .is_some_and(|e| !e.trim().is_empty()),
        "ollama" => !settings.model.is_empty(),
        p if LLM_PROVIDERS.contains(&p) => {
            !settings.model.is_empty() && !settings.api_key.is_empty()
        }
        _ => false,
    }
}
