//! Scorers for questionnaire submissions: an LLM reviewer driven by the
//! shared rubric, or a plain HTTP scoring service.

pub mod engine;
mod http;
mod parse;
mod prompt;

use async_trait::async_trait;

use semaforo_core::{
    scoring_configured, Question, Scorer, ScoringError, ScoringResult, ScoringSettings,
    SubmissionPayload, LLM_PROVIDERS,
};

pub use parse::parse_scoring_output;

/// Scores submissions with a chat model.
pub struct LlmScorer {
    settings: ScoringSettings,
    questions: Vec<Question>,
}

impl LlmScorer {
    pub fn new(settings: ScoringSettings) -> Self {
        Self {
            settings,
            questions: Vec::new(),
        }
    }

    /// Questions used to show the model option text instead of ids.
    pub fn with_questions(mut self, questions: Vec<Question>) -> Self {
        self.questions = questions;
        self
    }
}

#[async_trait]
impl Scorer for LlmScorer {
    async fn score(&self, payload: &SubmissionPayload) -> Result<ScoringResult, ScoringError> {
        let system = prompt::system_prompt();
        let user_msg = prompt::user_message(payload, &self.questions);

        tracing::info!(
            provider = %self.settings.provider,
            model = %self.settings.model,
            category = %payload.metadata.category,
            "requesting score"
        );

        let raw = engine::generate(&self.settings, &system, &user_msg).await?;
        tracing::debug!(raw = %raw, "raw scoring output");
        let result = parse::parse_scoring_output(&raw)?;
        tracing::info!(color = %result.color_code, "scored");
        Ok(result)
    }
}

/// Scores submissions by POSTing them to an external service.
pub struct HttpScorer {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpScorer {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Scorer for HttpScorer {
    async fn score(&self, payload: &SubmissionPayload) -> Result<ScoringResult, ScoringError> {
        tracing::info!(endpoint = %self.endpoint, category = %payload.metadata.category, "requesting score");
        http::post_submission(&self.client, &self.endpoint, payload).await
    }
}

/// Build the scorer named by `settings.provider`.
pub fn scorer_from_settings(
    settings: &ScoringSettings,
    questions: Vec<Question>,
) -> Result<Box<dyn Scorer>, ScoringError> {
    if !scoring_configured(settings) {
        let provider = settings.provider.as_str();
        return Err(ScoringError::Config(if provider.is_empty() {
            "no scoring provider set".to_string()
        } else if provider != "http" && !LLM_PROVIDERS.contains(&provider) {
            format!("unknown provider: {provider}")
        } else {
            format!("provider '{provider}' is missing required settings")
        }));
    }
    if settings.provider == "http" {
        let endpoint = settings.endpoint.clone().unwrap_or_default();
        return Ok(Box::new(HttpScorer::new(endpoint.trim())));
    }
    engine::map_backend(&settings.provider)?;
    Ok(Box::new(
        LlmScorer::new(settings.clone()).with_questions(questions),
    ))
}
