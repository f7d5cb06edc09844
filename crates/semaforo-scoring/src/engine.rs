use llm::builder::{LLMBackend, LLMBuilder};
use llm::chat::ChatMessage;

use semaforo_core::{ScoringError, ScoringSettings};

/// Every name in [`semaforo_core::LLM_PROVIDERS`] maps to a backend.
pub(crate) fn map_backend(provider: &str) -> Result<LLMBackend, ScoringError> {
    match provider {
        "openai" => Ok(LLMBackend::OpenAI),
        "anthropic" => Ok(LLMBackend::Anthropic),
        "google" => Ok(LLMBackend::Google),
        "ollama" => Ok(LLMBackend::Ollama),
        "groq" => Ok(LLMBackend::Groq),
        "mistral" => Ok(LLMBackend::Mistral),
        "deepseek" => Ok(LLMBackend::DeepSeek),
        other => Err(ScoringError::Config(format!("unknown provider: {other}"))),
    }
}

/// One-shot chat completion with the configured provider.
pub async fn generate(
    settings: &ScoringSettings,
    system: &str,
    user_msg: &str,
) -> Result<String, ScoringError> {
    let backend = map_backend(&settings.provider)?;

    let mut builder = LLMBuilder::new()
        .backend(backend)
        .model(&settings.model)
        .system(system);

    if !settings.api_key.is_empty() {
        builder = builder.api_key(&settings.api_key);
    }
    if let Some(endpoint) = settings.endpoint.as_deref().filter(|e| !e.is_empty()) {
        builder = builder.base_url(endpoint);
    }

    let llm = builder
        .build()
        .map_err(|e| ScoringError::Config(format!("build LLM: {e}")))?;

    let messages = vec![ChatMessage::user().content(user_msg).build()];

    let response = llm
        .chat(&messages)
        .await
        .map_err(|e| ScoringError::Transport(format!("chat: {e}")))?;

    match response.text() {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(ScoringError::EmptyResponse),
    }
}
