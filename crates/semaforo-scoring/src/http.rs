use semaforo_core::{ScoringError, ScoringResult, SubmissionPayload};

use crate::parse::parse_scoring_output;

/// POST the payload as JSON and read a scoring object back.
pub async fn post_submission(
    client: &reqwest::Client,
    endpoint: &str,
    payload: &SubmissionPayload,
) -> Result<ScoringResult, ScoringError> {
    let response = client
        .post(endpoint)
        .json(payload)
        .send()
        .await
        .map_err(|e| ScoringError::Transport(format!("POST {endpoint}: {e}")))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ScoringError::Transport(format!("read body: {e}")))?;

    if !status.is_success() {
        return Err(ScoringError::Transport(format!(
            "scoring service answered {status}: {}",
            body.trim()
        )));
    }
    parse_scoring_output(&body)
}
