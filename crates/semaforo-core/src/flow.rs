//! Questionnaire flow controller.
//!
//! ```text
//! Loading ──load──▶ Ready(0) ──next──▶ Ready(1) … Ready(last) ──next──▶ Submitting
//!                      ◀──previous──                                 │
//!                                               Complete ◀──ok───────┤
//!                                               Failed   ◀──error────┘
//!                                                 │ retry → Submitting
//!                                                 │ resume → Ready(last)
//! ```
//!
//! The keyword allocation for the active question is recomputed on every
//! index change and never carried from one question to another.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::allocation::{allocate_question, KeywordAllocation};
use crate::error::{CoreError, Result, ScoringError};
use crate::render::{annotate_with, AnnotatedQuestion};
use crate::review::{LastSubmission, ReviewStore};
use crate::risk::RiskLevel;
use crate::source::QuestionSource;
use crate::{
    Answer, Assessment, Question, QuestionKind, Scorer, ScoringResult, SubmissionMetadata,
    SubmissionPayload,
};

#[derive(Debug, Clone, PartialEq)]
pub enum FlowState {
    Loading,
    Ready {
        index: usize,
        allocation: KeywordAllocation,
    },
    Submitting {
        payload: SubmissionPayload,
    },
    Complete {
        assessment: Assessment,
    },
    Failed {
        payload: SubmissionPayload,
        error: ScoringError,
    },
}

impl FlowState {
    pub fn name(&self) -> &'static str {
        match self {
            FlowState::Loading => "loading",
            FlowState::Ready { .. } => "ready",
            FlowState::Submitting { .. } => "submitting",
            FlowState::Complete { .. } => "complete",
            FlowState::Failed { .. } => "failed",
        }
    }
}

/// Result of a forward step.
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    /// Moved to the question at this index.
    Question(usize),
    /// The last question was answered; hand this payload to the scorer.
    Submit(SubmissionPayload),
}

/// Enough to rebuild a session after a reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub category: String,
    pub index: usize,
    pub answers: BTreeMap<String, Vec<String>>,
}

pub struct FlowController<S: ReviewStore> {
    category: String,
    questions: Vec<Question>,
    answers: BTreeMap<String, Vec<String>>,
    state: FlowState,
    store: S,
}

/// Clean up raw values for a question and check them against its options.
/// Multiple-choice selections are deduplicated and put in display order.
fn normalize_values(question: &Question, values: Vec<String>) -> Result<Vec<String>> {
    match question.kind {
        QuestionKind::Open => {
            if values.len() > 1 {
                return Err(CoreError::validation(format!(
                    "Question '{}' takes a single free-text answer",
                    question.id
                )));
            }
            Ok(values)
        }
        QuestionKind::Single | QuestionKind::Multiple => {
            if question.kind == QuestionKind::Single && values.len() > 1 {
                return Err(CoreError::validation(format!(
                    "Question '{}' allows only one option",
                    question.id
                )));
            }
            let mut positions = Vec::with_capacity(values.len());
            for value in &values {
                let pos = question.option_position(value).ok_or_else(|| {
                    CoreError::validation(format!(
                        "'{}' is not an option of question '{}'",
                        value, question.id
                    ))
                })?;
                positions.push(pos);
            }
            positions.sort_unstable();
            positions.dedup();
            Ok(positions
                .into_iter()
                .map(|p| question.options[p].id.clone())
                .collect())
        }
    }
}

fn first_duplicate_id(questions: &[Question]) -> Option<String> {
    let mut seen = HashSet::new();
    questions
        .iter()
        .find(|q| !seen.insert(q.id.as_str()))
        .map(|q| q.id.clone())
}

fn is_complete(question: &Question, values: Option<&Vec<String>>) -> bool {
    let Some(values) = values else {
        return false;
    };
    match question.kind {
        QuestionKind::Open => values.iter().any(|v| !v.trim().is_empty()),
        QuestionKind::Single => values.len() == 1,
        QuestionKind::Multiple => !values.is_empty(),
    }
}

impl<S: ReviewStore> FlowController<S> {
    pub fn new(category: impl Into<String>, store: S) -> Self {
        Self {
            category: category.into(),
            questions: Vec::new(),
            answers: BTreeMap::new(),
            state: FlowState::Loading,
            store,
        }
    }

    /// Rebuild a session in `Ready` from a snapshot. Answers for unknown
    /// questions or with stale option ids are dropped.
    pub fn restore(questions: Vec<Question>, snapshot: SessionSnapshot, store: S) -> Result<Self> {
        let mut flow = Self::new(snapshot.category, store);
        flow.load(questions)?;
        if snapshot.index >= flow.questions.len() {
            return Err(CoreError::validation(format!(
                "Snapshot index {} is past the last question",
                snapshot.index
            )));
        }
        for (question_id, values) in snapshot.answers {
            let Some(question) = flow.questions.iter().find(|q| q.id == question_id) else {
                tracing::debug!(question = %question_id, "dropping answer for unknown question");
                continue;
            };
            match normalize_values(question, values) {
                Ok(values) if !values.is_empty() => {
                    flow.answers.insert(question_id, values);
                }
                Ok(_) => {}
                Err(e) => tracing::debug!(question = %question_id, error = %e, "dropping stale answer"),
            }
        }
        flow.enter_ready(snapshot.index);
        Ok(flow)
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn current_index(&self) -> Option<usize> {
        match self.state {
            FlowState::Ready { index, .. } => Some(index),
            _ => None,
        }
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.current_index().and_then(|i| self.questions.get(i))
    }

    pub fn allocation(&self) -> Option<&KeywordAllocation> {
        match &self.state {
            FlowState::Ready { allocation, .. } => Some(allocation),
            _ => None,
        }
    }

    /// The active question with its render plan.
    pub fn annotated_current(&self) -> Option<AnnotatedQuestion> {
        let question = self.current_question()?;
        let allocation = self.allocation()?.clone();
        Some(annotate_with(question, allocation))
    }

    pub fn answer_for(&self, question_id: &str) -> Option<&[String]> {
        self.answers.get(question_id).map(Vec::as_slice)
    }

    pub fn answered_count(&self) -> usize {
        self.questions
            .iter()
            .filter(|q| is_complete(q, self.answers.get(&q.id)))
            .count()
    }

    pub fn assessment(&self) -> Option<&Assessment> {
        match &self.state {
            FlowState::Complete { assessment } => Some(assessment),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let index = match &self.state {
            FlowState::Ready { index, .. } => *index,
            _ => self.questions.len().saturating_sub(1),
        };
        SessionSnapshot {
            category: self.category.clone(),
            index,
            answers: self.answers.clone(),
        }
    }

    fn enter_ready(&mut self, index: usize) {
        let allocation = allocate_question(&self.questions[index]);
        self.state = FlowState::Ready { index, allocation };
    }

    fn require_ready(&self, action: &str) -> Result<usize> {
        self.current_index().ok_or_else(|| {
            CoreError::flow(format!("Cannot {} while {}", action, self.state.name()))
        })
    }

    pub fn load(&mut self, questions: Vec<Question>) -> Result<()> {
        if !matches!(self.state, FlowState::Loading) {
            return Err(CoreError::flow(format!(
                "Questions are already loaded (state: {})",
                self.state.name()
            )));
        }
        if questions.is_empty() {
            return Err(CoreError::validation(format!(
                "Category '{}' has no questions",
                self.category
            )));
        }
        if let Some(dup) = first_duplicate_id(&questions) {
            return Err(CoreError::validation(format!(
                "Duplicate question id '{}'",
                dup
            )));
        }
        self.questions = questions;
        self.enter_ready(0);
        tracing::info!(
            category = %self.category,
            questions = self.questions.len(),
            "questionnaire ready"
        );
        Ok(())
    }

    pub async fn load_from(&mut self, source: &dyn QuestionSource) -> Result<()> {
        let questions = source.questions(&self.category).await?;
        self.load(questions)
    }

    /// Set (or clear, with an empty list) the answer to the active question.
    pub fn set_answer(&mut self, values: Vec<String>) -> Result<()> {
        let index = self.require_ready("answer")?;
        let question = &self.questions[index];
        let values = normalize_values(question, values)?;
        let id = question.id.clone();
        if values.is_empty() {
            self.answers.remove(&id);
        } else {
            self.answers.insert(id, values);
        }
        Ok(())
    }

    pub fn set_text_answer(&mut self, text: impl Into<String>) -> Result<()> {
        self.set_answer(vec![text.into()])
    }

    pub fn next(&mut self) -> Result<Advance> {
        let index = self.require_ready("advance")?;
        let question = &self.questions[index];
        if !is_complete(question, self.answers.get(&question.id)) {
            return Err(CoreError::validation(match question.kind {
                QuestionKind::Open => format!("Question '{}' requires an answer", question.id),
                QuestionKind::Single => format!("Select an option for question '{}'", question.id),
                QuestionKind::Multiple => {
                    format!("Select at least one option for question '{}'", question.id)
                }
            }));
        }

        if index + 1 < self.questions.len() {
            self.enter_ready(index + 1);
            return Ok(Advance::Question(index + 1));
        }
        let payload = self.begin_submission()?;
        Ok(Advance::Submit(payload))
    }

    pub fn previous(&mut self) -> Result<usize> {
        let index = self.require_ready("go back")?;
        if index == 0 {
            return Err(CoreError::flow("Already at the first question"));
        }
        self.enter_ready(index - 1);
        Ok(index - 1)
    }

    fn assemble_payload(&self) -> Result<SubmissionPayload> {
        let mut answers = Vec::with_capacity(self.questions.len());
        for question in &self.questions {
            let values = self.answers.get(&question.id);
            if !is_complete(question, values) {
                return Err(CoreError::validation(format!(
                    "Question '{}' requires an answer",
                    question.id
                )));
            }
            answers.push(Answer {
                question_id: question.id.clone(),
                values: values.cloned().unwrap_or_default(),
            });
        }
        Ok(SubmissionPayload {
            metadata: SubmissionMetadata {
                category: self.category.clone(),
                timestamp: Utc::now(),
            },
            answers,
        })
    }

    fn begin_submission(&mut self) -> Result<SubmissionPayload> {
        match self.state {
            FlowState::Ready { .. } => {}
            FlowState::Submitting { .. } => {
                return Err(CoreError::flow("A submission is already in progress"))
            }
            _ => {
                return Err(CoreError::flow(format!(
                    "Cannot submit while {}",
                    self.state.name()
                )))
            }
        }
        let payload = self.assemble_payload()?;
        self.state = FlowState::Submitting {
            payload: payload.clone(),
        };
        tracing::info!(
            category = %self.category,
            answers = payload.answers.len(),
            "submitting questionnaire"
        );
        Ok(payload)
    }

    /// Re-enter `Submitting` after a failure with the payload that failed,
    /// timestamp included.
    pub fn retry(&mut self) -> Result<SubmissionPayload> {
        let FlowState::Failed { payload, .. } = &self.state else {
            return Err(CoreError::flow(format!(
                "Nothing to retry while {}",
                self.state.name()
            )));
        };
        let payload = payload.clone();
        self.state = FlowState::Submitting {
            payload: payload.clone(),
        };
        tracing::info!(category = %self.category, "retrying submission");
        Ok(payload)
    }

    /// Leave `Failed` and go back to the last question.
    pub fn resume(&mut self) -> Result<usize> {
        if !matches!(self.state, FlowState::Failed { .. }) {
            return Err(CoreError::flow(format!(
                "Nothing to resume while {}",
                self.state.name()
            )));
        }
        let last = self.questions.len() - 1;
        self.enter_ready(last);
        Ok(last)
    }

    /// Apply the scoring outcome. Answers are kept in every case.
    pub fn complete_submission(
        &mut self,
        outcome: std::result::Result<ScoringResult, ScoringError>,
    ) -> Result<&FlowState> {
        let FlowState::Submitting { payload } = &self.state else {
            return Err(CoreError::flow(format!(
                "No submission in progress (state: {})",
                self.state.name()
            )));
        };
        let payload = payload.clone();

        self.state = match outcome {
            Ok(result) => {
                let assessment = Assessment::from_result(result);
                tracing::info!(
                    category = %self.category,
                    level = assessment.level.color(),
                    "questionnaire scored"
                );
                let last = LastSubmission {
                    payload,
                    assessment: assessment.clone(),
                };
                if let Err(e) = self.store.save(&last) {
                    tracing::warn!(error = %e, "could not cache submission for review");
                }
                FlowState::Complete { assessment }
            }
            Err(error) => {
                tracing::warn!(category = %self.category, error = %error, "scoring failed");
                FlowState::Failed { payload, error }
            }
        };
        Ok(&self.state)
    }

    /// Send the pending payload to `scorer` and apply the outcome.
    pub async fn run_submission(&mut self, scorer: &dyn Scorer) -> Result<&FlowState> {
        let FlowState::Submitting { payload } = &self.state else {
            return Err(CoreError::flow(format!(
                "No submission in progress (state: {})",
                self.state.name()
            )));
        };
        let payload = payload.clone();
        let outcome = scorer.score(&payload).await;
        self.complete_submission(outcome)
    }

    /// Last cached submission for the review screen.
    pub fn last_review(&self) -> Result<Option<LastSubmission>> {
        self.store.load()
    }

    pub fn level(&self) -> Option<RiskLevel> {
        self.assessment().map(|a| a.level)
    }
}
