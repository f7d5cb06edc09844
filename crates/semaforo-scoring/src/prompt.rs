use semaforo_core::{Question, QuestionKind, SubmissionPayload};

pub fn system_prompt() -> String {
    format!(
        "You are a financial risk reviewer for an advisory portal. Clients answer a short \
questionnaire about one area of their finances and you classify the answers with a \
traffic-light color.\n\n\
## Rubric\n{}\n\n\
Output ONLY a JSON object: {{\"summaryText\":\"<summary for the client>\",\
\"colorCode\":\"verde\"|\"amarillo\"|\"rojo\"}}. Nothing before or after it.",
        semaforo_core::rubric::RUBRIC
    )
}

/// Render a submission as compact text, resolving option ids back to the
/// text the client saw.
pub fn user_message(payload: &SubmissionPayload, questions: &[Question]) -> String {
    let mut out = String::with_capacity(1024);
    out.push_str("CATEGORY: ");
    out.push_str(&payload.metadata.category);
    out.push('\n');
    out.push_str("ANSWERS:\n");

    for (i, answer) in payload.answers.iter().enumerate() {
        let question = questions.iter().find(|q| q.id == answer.question_id);
        out.push_str(&format!("{}. ", i + 1));
        match question {
            Some(q) => {
                out.push_str(&q.text);
                out.push_str(" (");
                out.push_str(q.kind.as_str());
                out.push(')');
            }
            None => out.push_str(&answer.question_id),
        }
        out.push('\n');

        for value in &answer.values {
            let shown = match question {
                Some(q) if q.kind != QuestionKind::Open => q
                    .option(value)
                    .map(|o| o.text.as_str())
                    .unwrap_or(value.as_str()),
                _ => value.as_str(),
            };
            out.push_str("   - ");
            out.push_str(shown.trim());
            out.push('\n');
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use semaforo_core::{Answer, ChoiceOption, SubmissionMetadata};

    #[test]
    fn system_prompt_embeds_rubric() {
        let prompt = system_prompt();
        assert!(prompt.contains(semaforo_core::rubric::RUBRIC));
        assert!(prompt.contains("\"colorCode\""));
    }

    #[test]
    fn options_are_shown_by_text() {
        let questions = vec![
            Question {
                id: "q1".to_string(),
                text: "¿Tienes deudas?".to_string(),
                kind: QuestionKind::Single,
                options: vec![ChoiceOption {
                    id: "si".to_string(),
                    text: "Sí, una hipoteca".to_string(),
                }],
                keywords: vec![],
            },
            Question {
                id: "q2".to_string(),
                text: "¿Cuánto ahorras?".to_string(),
                kind: QuestionKind::Open,
                options: vec![],
                keywords: vec![],
            },
        ];
        let payload = SubmissionPayload {
            metadata: SubmissionMetadata {
                category: "deuda".to_string(),
                timestamp: chrono::Utc.with_ymd_and_hms(2026, 5, 2, 12, 0, 0).unwrap(),
            },
            answers: vec![
                Answer {
                    question_id: "q1".to_string(),
                    values: vec!["si".to_string()],
                },
                Answer {
                    question_id: "q2".to_string(),
                    values: vec![" 200 al mes ".to_string()],
                },
            ],
        };
        assert_eq!(
            user_message(&payload, &questions),
            "CATEGORY: deuda\nANSWERS:\n\
1. ¿Tienes deudas? (single)\n   - Sí, una hipoteca\n\
2. ¿Cuánto ahorras? (open)\n   - 200 al mes\n"
        );
    }
}
