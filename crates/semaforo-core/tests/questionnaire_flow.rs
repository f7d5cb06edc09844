use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};

use semaforo_core::flow::{Advance, FlowController, FlowState};
use semaforo_core::render::Segment;
use semaforo_core::review::{FileReviewStore, MemoryReviewStore, ReviewStore};
use semaforo_core::risk::RiskLevel;
use semaforo_core::source::{FileQuestionSource, QuestionSource};
use semaforo_core::{Scorer, ScoringError, ScoringResult, SubmissionPayload};

const FINANZAS: &str = r#"{
  "questions": [
    {
      "id": 1,
      "question": "¿Cuál es tu ingreso mensual y cómo lo distribuyes?",
      "type": "open",
      "keywords": [
        {"title": "ingreso", "description": "Dinero que recibes de forma regular."},
        {"title": "presupuesto", "description": "Plan de gastos e ingresos."}
      ]
    },
    {
      "id": 2,
      "question": "¿Tienes un fondo de emergencia?",
      "type": "single",
      "options": [
        {"id": "si", "label": "Sí, cubre más de tres meses de gastos"},
        {"id": "parcial", "label": "Sí, pero cubre menos de tres meses"},
        {"id": "no", "label": "No tengo fondo de emergencia"}
      ],
      "keywords": [
        {"title": "fondo de emergencia", "description": "Ahorro reservado para imprevistos."},
        {"title": "gastos", "description": "Salidas de dinero habituales."}
      ]
    },
    {
      "id": 3,
      "question": "¿Qué productos financieros tienes?",
      "type": "multiple",
      "options": ["Cuenta de ahorro", "Tarjeta de crédito", "Hipoteca", "Fondo indexado"],
      "keywords": [
        {"title": "crédito", "description": "Dinero prestado que debes devolver."},
        {"title": "fondo indexado", "description": "Fondo que replica un índice de mercado."},
        {"title": ""}
      ]
    }
  ]
}"#;

struct FixedScorer {
    color: &'static str,
    calls: AtomicUsize,
}

impl FixedScorer {
    fn new(color: &'static str) -> Self {
        Self {
            color,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Scorer for FixedScorer {
    async fn score(&self, payload: &SubmissionPayload) -> Result<ScoringResult, ScoringError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ScoringResult {
            summary_text: format!("{} respuestas analizadas.", payload.answers.len()),
            color_code: self.color.to_string(),
        })
    }
}

struct FlakyScorer {
    calls: AtomicUsize,
}

#[async_trait]
impl Scorer for FlakyScorer {
    async fn score(&self, _payload: &SubmissionPayload) -> Result<ScoringResult, ScoringError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(ScoringError::Transport("connection reset".to_string()))
        } else {
            Ok(ScoringResult {
                summary_text: "Situación saludable.".to_string(),
                color_code: "verde".to_string(),
            })
        }
    }
}

fn seeded_source() -> (tempfile::TempDir, FileQuestionSource) {
    let dir = tempfile::tempdir().unwrap();
    let source = FileQuestionSource::new(dir.path());
    source.write_raw("finanzas", FINANZAS).unwrap();
    (dir, source)
}

async fn answered<S: ReviewStore>(flow: &mut FlowController<S>) -> SubmissionPayload {
    flow.set_text_answer("2500 euros, la mitad para vivienda").unwrap();
    assert_eq!(flow.next().unwrap(), Advance::Question(1));
    flow.set_answer(vec!["no".to_string()]).unwrap();
    assert_eq!(flow.next().unwrap(), Advance::Question(2));
    flow.set_answer(vec!["Hipoteca".to_string(), "Tarjeta de crédito".to_string()])
        .unwrap();
    match flow.next().unwrap() {
        Advance::Submit(payload) => payload,
        other => panic!("expected submission, got {other:?}"),
    }
}

#[tokio::test]
async fn three_question_flow_ends_in_worst_level() {
    let (_dir, source) = seeded_source();
    let mut flow = FlowController::new("finanzas", MemoryReviewStore::new());
    flow.load_from(&source).await.unwrap();

    // An empty free-text answer does not move the flow.
    flow.set_text_answer("").unwrap();
    assert!(flow.next().is_err());
    assert_eq!(flow.current_index(), Some(0));

    let payload = answered(&mut flow).await;
    assert!(matches!(flow.state(), FlowState::Submitting { .. }));
    assert_eq!(payload.answers[2].values, vec!["Tarjeta de crédito", "Hipoteca"]);

    let scorer = FixedScorer::new("rojo");
    flow.run_submission(&scorer).await.unwrap();
    assert_eq!(flow.level(), Some(RiskLevel::Worst));
    assert_eq!(flow.assessment().unwrap().summary_text, "3 respuestas analizadas.");
    assert_eq!(scorer.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_submission_is_retried_manually() {
    let (dir, source) = seeded_source();
    let store = FileReviewStore::new(dir.path(), "cliente-7").unwrap();
    let mut flow = FlowController::new("finanzas", store);
    flow.load_from(&source).await.unwrap();
    answered(&mut flow).await;

    let scorer = FlakyScorer {
        calls: AtomicUsize::new(0),
    };
    flow.run_submission(&scorer).await.unwrap();
    assert!(matches!(flow.state(), FlowState::Failed { .. }));
    assert_eq!(flow.last_review().unwrap(), None);

    flow.retry().unwrap();
    flow.run_submission(&scorer).await.unwrap();
    assert_eq!(flow.level(), Some(RiskLevel::Best));

    // The review cache survives the controller.
    let reopened = FileReviewStore::new(dir.path(), "cliente-7").unwrap();
    let review = reopened.load().unwrap().unwrap();
    assert_eq!(review.assessment.color_code, "verde");
    assert_eq!(review.payload.metadata.category, "finanzas");
}

#[tokio::test]
async fn each_question_gets_its_own_single_use_annotation() {
    let (_dir, source) = seeded_source();
    let mut flow = FlowController::new("finanzas", MemoryReviewStore::new());
    flow.load_from(&source).await.unwrap();

    let first = flow.annotated_current().unwrap();
    let title: String = first.title.iter().map(Segment::text).collect();
    assert_eq!(title, "¿Cuál es tu ingreso mensual y cómo lo distribuyes?");

    flow.set_text_answer("2000").unwrap();
    flow.next().unwrap();
    let second = flow.annotated_current().unwrap();
    let alloc = &second.allocation;
    // "fondo de emergencia" hits the title, so options never highlight it.
    assert_eq!(
        alloc.block_of("fondo de emergencia"),
        Some(semaforo_core::allocation::BlockId::Title)
    );
    assert_eq!(
        alloc.block_of("gastos"),
        Some(semaforo_core::allocation::BlockId::Option(0))
    );
    let option_highlights = second
        .options
        .iter()
        .flat_map(|o| &o.segments)
        .filter(|s| s.is_highlight())
        .count();
    assert_eq!(option_highlights, 1);
}

#[tokio::test]
async fn categories_come_from_the_source() {
    let (_dir, source) = seeded_source();
    assert_eq!(source.categories().await.unwrap(), vec!["finanzas"]);
    let mut flow = FlowController::new("inexistente", MemoryReviewStore::new());
    assert!(flow.load_from(&source).await.is_err());
    assert_eq!(flow.state(), &FlowState::Loading);
}
