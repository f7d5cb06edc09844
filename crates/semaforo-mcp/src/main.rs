use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use semaforo_core::composite::{composite, Indicator};
use semaforo_core::flow::{Advance, FlowController, FlowState, SessionSnapshot};
use semaforo_core::render::{annotate_question, AnnotatedQuestion};
use semaforo_core::review::{FileReviewStore, ReviewStore};
use semaforo_core::risk::{classify_color_code, classify_score, RiskBadge};
use semaforo_core::source::FileQuestionSource;
use semaforo_core::{
    is_valid_name, read_settings, write_atomic, Assessment, CoreError, QuestionKind, ScoringError,
    ScoringResult, SubmissionPayload,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

// --- Request types ---

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct CategoryRequest {
    /// Questionnaire category (file stem under questionnaires/, e.g. "ahorro")
    category: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct AnnotateRequest {
    /// Questionnaire category
    category: String,
    /// ID of the question to annotate
    question_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ClassifyScoreRequest {
    /// Score in 0..=100. Omit when no score is available (classified as the worst level).
    score: Option<f64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ClassifyColorRequest {
    /// Color code returned by a scorer: verde/amarillo/rojo (green/yellow/red also accepted)
    color_code: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct CompositeRequest {
    /// Sub-indicators. Each value is clamped to 0..=100; weights are normalized.
    indicators: Vec<Indicator>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct StartSessionRequest {
    /// Client identifier, used for the review cache and the saved session
    client_id: String,
    /// Questionnaire category to answer
    category: String,
    /// Continue the client's saved session for this category instead of starting over
    #[serde(default)]
    resume: bool,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct AnswerRequest {
    /// Free text (one value) for open questions; option IDs for single and multiple choice.
    /// An empty list clears the answer.
    values: Vec<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ReviewRequest {
    /// Client identifier
    client_id: String,
}

// --- Responses ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionView {
    client_id: String,
    category: String,
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<usize>,
    total: usize,
    answered: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<QuestionKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    question: Option<AnnotatedQuestion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_answer: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    assessment: Option<Assessment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    badge: Option<RiskBadge>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompositeView {
    score: f64,
    contributions: Vec<semaforo_core::composite::Contribution>,
    badge: RiskBadge,
}

// --- Session ---

struct Session {
    client_id: String,
    flow: FlowController<FileReviewStore>,
}

impl Session {
    fn view(&self) -> SessionView {
        let flow = &self.flow;
        let question = flow.current_question();
        let error = match flow.state() {
            FlowState::Failed { error, .. } => Some(error.to_string()),
            _ => None,
        };
        SessionView {
            client_id: self.client_id.clone(),
            category: flow.category().to_string(),
            state: flow.state().name(),
            index: flow.current_index(),
            total: flow.questions().len(),
            answered: flow.answered_count(),
            kind: question.map(|q| q.kind),
            question: flow.annotated_current(),
            current_answer: question
                .and_then(|q| flow.answer_for(&q.id))
                .map(<[String]>::to_vec),
            assessment: flow.assessment().cloned(),
            badge: flow.level().map(|l| l.badge()),
            error,
        }
    }
}

fn snapshot_path(root: &Path, client_id: &str) -> PathBuf {
    root.join("sessions").join(format!("{}.json", client_id))
}

fn load_snapshot(root: &Path, client_id: &str) -> Result<Option<SessionSnapshot>, CoreError> {
    let path = snapshot_path(root, client_id);
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(&path)?;
    Ok(Some(serde_json::from_str(&raw)?))
}

/// Keep the saved session in step with the controller. A finished session
/// has nothing left to resume.
fn persist_session(root: &Path, session: &Session) {
    let path = snapshot_path(root, &session.client_id);
    let result = match session.flow.state() {
        FlowState::Complete { .. } => {
            if path.exists() {
                std::fs::remove_file(&path).map_err(CoreError::from)
            } else {
                Ok(())
            }
        }
        _ => serde_json::to_string_pretty(&session.flow.snapshot())
            .map_err(CoreError::from)
            .and_then(|json| write_atomic(&path, &json)),
    };
    if let Err(e) = result {
        tracing::warn!(client = %session.client_id, error = %e, "could not save session");
    }
}

async fn open_session(
    root: &Path,
    client_id: &str,
    category: &str,
    resume: bool,
) -> Result<Session, CoreError> {
    let store = FileReviewStore::new(root, client_id)?;
    let source = FileQuestionSource::new(root);

    let saved = if resume {
        load_snapshot(root, client_id)?.filter(|s| s.category == category)
    } else {
        None
    };
    let flow = match saved {
        Some(snapshot) => {
            let questions = source.read(category)?;
            tracing::info!(client = client_id, category, index = snapshot.index, "resuming session");
            FlowController::restore(questions, snapshot, store)?
        }
        None => {
            let mut flow = FlowController::new(category, store);
            flow.load_from(&source).await?;
            flow
        }
    };
    Ok(Session {
        client_id: client_id.to_string(),
        flow,
    })
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(format!("Serialization error: {}", e), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

fn error_result(message: impl Into<String>) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(message.into())]))
}

const NO_SESSION: &str = "No active session. Call start_session first.";

// --- Server ---

#[derive(Clone)]
pub struct SemaforoServer {
    tool_router: ToolRouter<Self>,
    root: PathBuf,
    session: Arc<Mutex<Option<Session>>>,
}

#[tool_router]
impl SemaforoServer {
    pub fn new(root: PathBuf) -> Self {
        Self {
            tool_router: Self::tool_router(),
            root,
            session: Arc::new(Mutex::new(None)),
        }
    }

    #[tool(description = "List all available questionnaire categories")]
    fn list_categories(&self) -> Result<CallToolResult, McpError> {
        match FileQuestionSource::new(&self.root).list_categories() {
            Ok(names) => {
                let text = if names.is_empty() {
                    format!(
                        "No questionnaires found in {}",
                        self.root.join("questionnaires").display()
                    )
                } else {
                    names.join("\n")
                };
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(e) => error_result(e.to_string()),
        }
    }

    #[tool(
        description = "Get the validated questions of a category. Returns [{id, text, type: open|single|multiple, options: [{id, text}], keywords: [{title, description}]}]."
    )]
    fn get_questionnaire(
        &self,
        Parameters(req): Parameters<CategoryRequest>,
    ) -> Result<CallToolResult, McpError> {
        match FileQuestionSource::new(&self.root).read(&req.category) {
            Ok(questions) => json_result(&questions),
            Err(e) => error_result(format!(
                "Failed to read questionnaire '{}': {}",
                req.category, e
            )),
        }
    }

    #[tool(
        description = "Annotate one question with its glossary keywords. Each keyword is highlighted once, in the first block (title, then options in order) where it appears as a whole word. Returns {questionId, title: [segment], options: [{id, segments}], allocation}; a segment is {kind: text, text} or {kind: highlight, text, keyword, description}."
    )]
    fn annotate_question(
        &self,
        Parameters(req): Parameters<AnnotateRequest>,
    ) -> Result<CallToolResult, McpError> {
        let questions = match FileQuestionSource::new(&self.root).read(&req.category) {
            Ok(q) => q,
            Err(e) => return error_result(e.to_string()),
        };
        let Some(question) = questions.iter().find(|q| q.id == req.question_id) else {
            return Err(McpError::invalid_params(
                format!(
                    "Question '{}' not found in '{}'",
                    req.question_id, req.category
                ),
                None,
            ));
        };
        json_result(&annotate_question(question))
    }

    #[tool(
        description = "Classify a 0-100 score into a traffic-light badge using the configured thresholds (default: below 60 rojo, below 80 amarillo, otherwise verde)"
    )]
    fn classify_score(
        &self,
        Parameters(req): Parameters<ClassifyScoreRequest>,
    ) -> Result<CallToolResult, McpError> {
        let settings = match read_settings(&self.root) {
            Ok(s) => s,
            Err(e) => return error_result(format!("Failed to read settings: {}", e)),
        };
        json_result(&classify_score(req.score, &settings.thresholds).badge())
    }

    #[tool(description = "Classify a scorer color code into a traffic-light badge")]
    fn classify_color(
        &self,
        Parameters(req): Parameters<ClassifyColorRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&classify_color_code(&req.color_code).badge())
    }

    #[tool(
        description = "Combine weighted sub-indicators into one 0-100 score and classify it. Indicators with non-finite values or non-positive weights are skipped."
    )]
    fn composite_score(
        &self,
        Parameters(req): Parameters<CompositeRequest>,
    ) -> Result<CallToolResult, McpError> {
        let settings = match read_settings(&self.root) {
            Ok(s) => s,
            Err(e) => return error_result(format!("Failed to read settings: {}", e)),
        };
        let Some(result) = composite(&req.indicators) else {
            return Err(McpError::invalid_params(
                "No usable indicators: each needs a finite value and a positive weight",
                None,
            ));
        };
        let badge = classify_score(Some(result.score), &settings.thresholds).badge();
        json_result(&CompositeView {
            score: result.score,
            contributions: result.contributions,
            badge,
        })
    }

    #[tool(
        description = "Start a questionnaire session for a client, replacing any active one. Returns the session view with the first (or resumed) question annotated."
    )]
    async fn start_session(
        &self,
        Parameters(req): Parameters<StartSessionRequest>,
    ) -> Result<CallToolResult, McpError> {
        if !is_valid_name(&req.client_id) {
            return Err(McpError::invalid_params(
                format!(
                    "client_id '{}' must only contain letters, digits, '_' or '-'",
                    req.client_id
                ),
                None,
            ));
        }
        let session = match open_session(&self.root, &req.client_id, &req.category, req.resume).await {
            Ok(s) => s,
            Err(e) => return error_result(format!("Failed to start session: {}", e)),
        };
        persist_session(&self.root, &session);
        let view = session.view();
        *self.session.lock().await = Some(session);
        json_result(&view)
    }

    #[tool(description = "Get the active session: state, current question with annotations, answers so far, and the assessment once scored")]
    async fn get_session(&self) -> Result<CallToolResult, McpError> {
        let guard = self.session.lock().await;
        match guard.as_ref() {
            Some(session) => json_result(&session.view()),
            None => error_result(NO_SESSION),
        }
    }

    #[tool(description = "Answer the current question. Does not move to the next one.")]
    async fn answer(
        &self,
        Parameters(req): Parameters<AnswerRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut guard = self.session.lock().await;
        let Some(session) = guard.as_mut() else {
            return error_result(NO_SESSION);
        };
        if let Err(e) = session.flow.set_answer(req.values) {
            return error_result(e.to_string());
        }
        persist_session(&self.root, session);
        json_result(&session.view())
    }

    #[tool(
        description = "Move to the next question. The current question must be answered. On the last question this submits the questionnaire for scoring and returns the assessment."
    )]
    async fn next(&self) -> Result<CallToolResult, McpError> {
        let payload = {
            let mut guard = self.session.lock().await;
            let Some(session) = guard.as_mut() else {
                return error_result(NO_SESSION);
            };
            match session.flow.next() {
                Ok(Advance::Question(_)) => {
                    persist_session(&self.root, session);
                    return json_result(&session.view());
                }
                Ok(Advance::Submit(payload)) => payload,
                Err(e) => return error_result(e.to_string()),
            }
        };
        self.score_pending(payload).await
    }

    #[tool(description = "Go back to the previous question. Answers are kept.")]
    async fn previous(&self) -> Result<CallToolResult, McpError> {
        let mut guard = self.session.lock().await;
        let Some(session) = guard.as_mut() else {
            return error_result(NO_SESSION);
        };
        if let Err(e) = session.flow.previous() {
            return error_result(e.to_string());
        }
        persist_session(&self.root, session);
        json_result(&session.view())
    }

    #[tool(description = "Submit again after a failed scoring attempt, with the same answers")]
    async fn retry(&self) -> Result<CallToolResult, McpError> {
        let payload = {
            let mut guard = self.session.lock().await;
            let Some(session) = guard.as_mut() else {
                return error_result(NO_SESSION);
            };
            match session.flow.retry() {
                Ok(payload) => payload,
                Err(e) => return error_result(e.to_string()),
            }
        };
        self.score_pending(payload).await
    }

    #[tool(description = "After a failed scoring attempt, return to the last question to review or change answers")]
    async fn resume(&self) -> Result<CallToolResult, McpError> {
        let mut guard = self.session.lock().await;
        let Some(session) = guard.as_mut() else {
            return error_result(NO_SESSION);
        };
        if let Err(e) = session.flow.resume() {
            return error_result(e.to_string());
        }
        persist_session(&self.root, session);
        json_result(&session.view())
    }

    #[tool(
        description = "Get a client's last scored submission: {payload: {metadata: {category, timestamp}, answers: [{questionId, values}]}, assessment: {summaryText, colorCode, level}}"
    )]
    fn get_review(
        &self,
        Parameters(req): Parameters<ReviewRequest>,
    ) -> Result<CallToolResult, McpError> {
        let store = match FileReviewStore::new(&self.root, &req.client_id) {
            Ok(s) => s,
            Err(e) => return Err(McpError::invalid_params(e.to_string(), None)),
        };
        match store.load() {
            Ok(Some(last)) => json_result(&last),
            Ok(None) => error_result(format!(
                "No submission cached for client '{}'",
                req.client_id
            )),
            Err(e) => error_result(format!("Failed to read review: {}", e)),
        }
    }

    #[tool(description = "Get the rubric used to score questionnaires")]
    fn get_rubric(&self) -> Result<CallToolResult, McpError> {
        Ok(CallToolResult::success(vec![Content::text(
            semaforo_core::rubric::RUBRIC,
        )]))
    }
}

impl SemaforoServer {
    /// Score a payload with the session lock released, then apply the
    /// outcome if the session is still waiting for it.
    async fn score_pending(&self, payload: SubmissionPayload) -> Result<CallToolResult, McpError> {
        let questions = {
            let guard = self.session.lock().await;
            match guard.as_ref() {
                Some(session) => {
                    persist_session(&self.root, session);
                    session.flow.questions().to_vec()
                }
                None => return error_result(NO_SESSION),
            }
        };

        let outcome = self.score(&payload, questions).await;

        let mut guard = self.session.lock().await;
        let Some(session) = guard.as_mut() else {
            return error_result(NO_SESSION);
        };
        let waiting = matches!(
            session.flow.state(),
            FlowState::Submitting { payload: pending } if *pending == payload
        );
        if !waiting {
            tracing::warn!("session changed while scoring, discarding result");
            return error_result("The session changed while scoring; the result was discarded.");
        }
        if let Err(e) = session.flow.complete_submission(outcome) {
            return error_result(e.to_string());
        }
        persist_session(&self.root, session);
        json_result(&session.view())
    }

    async fn score(
        &self,
        payload: &SubmissionPayload,
        questions: Vec<semaforo_core::Question>,
    ) -> Result<ScoringResult, ScoringError> {
        let settings = read_settings(&self.root)
            .map_err(|e| ScoringError::Config(format!("settings: {}", e)))?;
        let scorer = semaforo_scoring::scorer_from_settings(&settings.scoring, questions)?;
        scorer.score(payload).await
    }
}

#[tool_handler]
impl ServerHandler for SemaforoServer {
    fn get_info(&self) -> ServerInfo {
        let instructions = format!("{}\n\n## Scoring Rubric\n{}", INSTRUCTIONS, semaforo_core::rubric::RUBRIC);
        ServerInfo {
            instructions: Some(instructions.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

const INSTRUCTIONS: &str = r#"semaforo runs financial-health questionnaires for advisory clients and classifies the result as a traffic light: verde (low risk), amarillo (moderate) or rojo (high).

Questionnaires live in the data directory ($SEMAFORO_HOME, default ~/.semaforo/) under questionnaires/<category>.json. Each question is open (free text), single (one option ID) or multiple (one or more option IDs) and carries glossary keywords that are highlighted once per question.

## Running a session
1. `list_categories`, then `start_session` with a client_id and category. Pass `resume: true` to continue a saved session.
2. Show the annotated question from the session view, collect the client's answer and send it with `answer`. Choice questions take option IDs, not option text.
3. Call `next`. It refuses to move on while the current question is unanswered; relay the error to the client.
4. `next` on the last question submits the answers for scoring and returns the assessment with its badge.
5. If scoring fails the session is `failed` and no answers are lost: call `retry`, or `resume` to go back to the last question.

Use `get_review` to show a client's last scored submission. `classify_score`, `classify_color` and `composite_score` are standalone helpers for dashboard widgets."#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout carries the MCP transport
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("semaforo_core=info,semaforo_scoring=info,semaforo_mcp=info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let root = semaforo_core::data_dir();
    tracing::info!(root = %root.display(), "starting semaforo MCP server");

    let service = SemaforoServer::new(root)
        .serve(rmcp::transport::io::stdio())
        .await
        .inspect_err(|e| tracing::error!(error = %e, "MCP server error"))?;
    service.waiting().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const AHORRO: &str = r#"[
        {"id": "q1", "text": "¿Cuánto ahorras al mes?", "type": "open",
         "keywords": [{"title": "ahorro", "description": "Parte del ingreso que no gastas."}]},
        {"id": "q2", "text": "¿Tienes un fondo de emergencia?", "options": ["Sí", "No"]}
    ]"#;

    fn seeded() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        FileQuestionSource::new(dir.path())
            .write_raw("ahorro", AHORRO)
            .unwrap();
        dir
    }

    #[tokio::test]
    async fn sessions_are_saved_and_resumed() {
        let dir = seeded();
        let mut session = open_session(dir.path(), "cliente-1", "ahorro", false).await.unwrap();
        session.flow.set_text_answer("200 euros").unwrap();
        session.flow.next().unwrap();
        persist_session(dir.path(), &session);

        let resumed = open_session(dir.path(), "cliente-1", "ahorro", true).await.unwrap();
        assert_eq!(resumed.flow.current_index(), Some(1));
        assert_eq!(resumed.flow.answer_for("q1"), Some(&["200 euros".to_string()][..]));

        let fresh = open_session(dir.path(), "cliente-1", "ahorro", false).await.unwrap();
        assert_eq!(fresh.flow.current_index(), Some(0));
    }

    #[tokio::test]
    async fn completed_sessions_are_not_resumable() {
        let dir = seeded();
        let mut session = open_session(dir.path(), "cliente-2", "ahorro", false).await.unwrap();
        session.flow.set_text_answer("nada").unwrap();
        session.flow.next().unwrap();
        session.flow.set_answer(vec!["No".to_string()]).unwrap();
        persist_session(dir.path(), &session);
        assert!(snapshot_path(dir.path(), "cliente-2").exists());

        session.flow.next().unwrap();
        session
            .flow
            .complete_submission(Ok(ScoringResult {
                summary_text: "Sin colchón para imprevistos.".to_string(),
                color_code: "rojo".to_string(),
            }))
            .unwrap();
        persist_session(dir.path(), &session);
        assert!(!snapshot_path(dir.path(), "cliente-2").exists());

        let view = session.view();
        assert_eq!(view.state, "complete");
        assert_eq!(view.badge.unwrap().color, "rojo");
        let review = session.flow.last_review().unwrap().unwrap();
        assert_eq!(review.assessment.color_code, "rojo");
    }

    #[tokio::test]
    async fn unknown_category_fails_to_open() {
        let dir = seeded();
        assert!(open_session(dir.path(), "cliente-3", "deuda", false).await.is_err());
    }

    #[tokio::test]
    async fn missing_settings_fail_scoring_as_config() {
        let dir = seeded();
        let server = SemaforoServer::new(dir.path().to_path_buf());
        let session = open_session(dir.path(), "cliente-4", "ahorro", false).await.unwrap();
        let payload = SubmissionPayload {
            metadata: semaforo_core::SubmissionMetadata {
                category: "ahorro".to_string(),
                timestamp: chrono::Utc::now(),
            },
            answers: vec![],
        };
        let outcome = server.score(&payload, session.flow.questions().to_vec()).await;
        assert!(matches!(outcome, Err(ScoringError::Config(_))));
    }
}
