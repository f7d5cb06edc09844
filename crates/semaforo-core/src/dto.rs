//! Loosely-shaped backend payloads and their validation into [`Question`].
//!
//! The questionnaire service is not strict about shapes: ids may be numbers,
//! options may be bare strings, keyword lists may be missing or contain
//! blank entries. Everything is checked here so the rest of the crate only
//! sees validated types.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashSet;

use crate::error::{CoreError, Result};
use crate::{ChoiceOption, Keyword, Question, QuestionKind};

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IdDto {
    Text(String),
    Number(i64),
}

impl IdDto {
    fn into_string(self) -> String {
        match self {
            IdDto::Text(s) => s.trim().to_string(),
            IdDto::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OptionDto {
    Text(String),
    Full {
        #[serde(default)]
        id: Option<IdDto>,
        #[serde(default, alias = "label", alias = "value")]
        text: Option<String>,
    },
}

/// Glossary entry. Fields of the wrong type read as absent.
#[derive(Debug, Clone, Deserialize)]
pub struct KeywordDto {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

/// Keyword lists never fail a question: entries that are not objects are
/// dropped, and anything but an array counts as no keywords.
fn lenient_keywords<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<KeywordDto>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(Value::Array(entries)) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let total = entries.len();
    let keywords: Vec<KeywordDto> = entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value(entry).ok())
        .collect();
    if keywords.len() < total {
        tracing::debug!(dropped = total - keywords.len(), "dropping malformed keyword entries");
    }
    Ok(Some(keywords))
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuestionDto {
    #[serde(default)]
    pub id: Option<IdDto>,
    #[serde(default, alias = "question", alias = "title")]
    pub text: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub options: Option<Vec<OptionDto>>,
    #[serde(default, deserialize_with = "lenient_keywords")]
    pub keywords: Option<Vec<KeywordDto>>,
}

/// Either a bare array or `{ "questions": [...] }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum QuestionnaireDto {
    List(Vec<QuestionDto>),
    Wrapped { questions: Vec<QuestionDto> },
}

impl QuestionnaireDto {
    pub fn into_questions(self) -> Vec<QuestionDto> {
        match self {
            QuestionnaireDto::List(q) | QuestionnaireDto::Wrapped { questions: q } => q,
        }
    }
}

fn parse_kind(raw: Option<&str>, has_options: bool) -> Result<QuestionKind> {
    match raw.map(|s| s.trim().to_lowercase()) {
        None => Ok(if has_options {
            QuestionKind::Single
        } else {
            QuestionKind::Open
        }),
        Some(s) => match s.as_str() {
            "open" | "text" => Ok(QuestionKind::Open),
            "single" | "radio" => Ok(QuestionKind::Single),
            "multiple" | "checkbox" => Ok(QuestionKind::Multiple),
            other => Err(CoreError::validation(format!(
                "Invalid question type '{}'. Must be: open, single, multiple",
                other
            ))),
        },
    }
}

fn validate_keywords(raw: Vec<KeywordDto>, question_id: &str) -> Vec<Keyword> {
    raw.into_iter()
        .filter_map(|k| {
            let title = k.title.map(|t| t.trim().to_string()).unwrap_or_default();
            if title.is_empty() {
                tracing::debug!(question = question_id, "dropping keyword without title");
                return None;
            }
            Some(Keyword {
                title,
                description: k.description.unwrap_or_default(),
            })
        })
        .collect()
}

fn validate_options(raw: Vec<OptionDto>, question_id: &str) -> Result<Vec<ChoiceOption>> {
    let mut seen = HashSet::new();
    let mut options = Vec::with_capacity(raw.len());
    for (i, dto) in raw.into_iter().enumerate() {
        let (id, text) = match dto {
            OptionDto::Text(text) => (None, text),
            OptionDto::Full { id, text } => (id.map(IdDto::into_string), text.unwrap_or_default()),
        };
        if text.trim().is_empty() {
            return Err(CoreError::validation(format!(
                "Option {} of question '{}' has no text",
                i + 1,
                question_id
            )));
        }
        let id = id.filter(|s| !s.is_empty()).unwrap_or_else(|| text.clone());
        if !seen.insert(id.clone()) {
            return Err(CoreError::validation(format!(
                "Duplicate option '{}' in question '{}'",
                id, question_id
            )));
        }
        options.push(ChoiceOption { id, text });
    }
    Ok(options)
}

impl QuestionDto {
    /// `position` is 1-based and only used for error messages.
    pub fn validate(self, position: usize) -> Result<Question> {
        let id = self
            .id
            .map(IdDto::into_string)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CoreError::validation(format!("Question {} has no id", position)))?;
        let text = self
            .text
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| CoreError::validation(format!("Question '{}' has no text", id)))?;

        let raw_options = self.options.unwrap_or_default();
        let kind = parse_kind(self.kind.as_deref(), !raw_options.is_empty())?;
        let options = if kind.is_choice() {
            let options = validate_options(raw_options, &id)?;
            if options.is_empty() {
                return Err(CoreError::validation(format!(
                    "Question '{}' is {} but has no options",
                    id,
                    kind.as_str()
                )));
            }
            options
        } else {
            if !raw_options.is_empty() {
                tracing::debug!(question = %id, "ignoring options on open question");
            }
            Vec::new()
        };
        let keywords = validate_keywords(self.keywords.unwrap_or_default(), &id);

        Ok(Question {
            id,
            text,
            kind,
            options,
            keywords,
        })
    }
}

/// Validate a whole questionnaire. Question ids must be unique.
pub fn validate_questionnaire(dtos: Vec<QuestionDto>) -> Result<Vec<Question>> {
    let mut seen = HashSet::new();
    let mut questions = Vec::with_capacity(dtos.len());
    for (i, dto) in dtos.into_iter().enumerate() {
        let question = dto.validate(i + 1)?;
        if !seen.insert(question.id.clone()) {
            return Err(CoreError::validation(format!(
                "Duplicate question id '{}'",
                question.id
            )));
        }
        questions.push(question);
    }
    Ok(questions)
}

pub fn parse_questionnaire(raw: &str) -> Result<Vec<Question>> {
    let dto: QuestionnaireDto = serde_json::from_str(raw)?;
    validate_questionnaire(dto.into_questions())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn accepts_loose_shapes() {
        let raw = r#"{
            "questions": [
                {"id": 1, "question": "¿Cuál es tu ingreso mensual?", "type": "open",
                 "keywords": [{"title": "ingreso", "description": "Dinero que recibes"}, {"title": ""}, {}]},
                {"id": "q2", "text": "¿Tienes deudas?", "options": ["Sí", "No"]},
                {"id": "q3", "text": "¿Qué productos tienes?", "type": "Multiple",
                 "options": [{"id": 10, "label": "Cuenta de ahorro"}, {"value": "Tarjeta"}]}
            ]
        }"#;
        let questions = parse_questionnaire(raw).unwrap();
        assert_eq!(questions.len(), 3);

        assert_eq!(questions[0].id, "1");
        assert_eq!(questions[0].kind, QuestionKind::Open);
        assert_eq!(questions[0].keywords.len(), 1);

        assert_eq!(questions[1].kind, QuestionKind::Single);
        assert_eq!(questions[1].options[0].id, "Sí");

        assert_eq!(questions[2].kind, QuestionKind::Multiple);
        let ids: Vec<&str> = questions[2].options.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["10", "Tarjeta"]);
    }

    #[test]
    fn malformed_keywords_are_skipped() {
        let raw = r#"[{"id": "a", "text": "¿Ahorras?", "keywords": [
            {"title": 5, "description": "x"},
            "ahorro",
            {"title": "ahorro", "description": ["no", "es", "texto"]},
            {"title": "presupuesto", "description": "Plan de gastos."}
        ]}, {"id": "b", "text": "¿Inviertes?", "keywords": {"title": "bolsa"}}]"#;
        let questions = parse_questionnaire(raw).unwrap();
        let titles: Vec<&str> = questions[0].keywords.iter().map(|k| k.title.as_str()).collect();
        assert_eq!(titles, vec!["ahorro", "presupuesto"]);
        assert_eq!(questions[0].keywords[0].description, "");
        assert!(questions[1].keywords.is_empty());
    }

    #[test]
    fn accepts_bare_arrays() {
        let questions = parse_questionnaire(r#"[{"id": "a", "text": "¿Ahorras?"}]"#).unwrap();
        assert_eq!(questions[0].kind, QuestionKind::Open);
        assert!(questions[0].keywords.is_empty());
    }

    #[test]
    fn rejects_choice_question_without_options() {
        let err = parse_questionnaire(r#"[{"id": "a", "text": "x", "type": "single"}]"#).unwrap_err();
        assert!(err.to_string().contains("has no options"), "{err}");
    }

    #[test]
    fn rejects_unknown_type_and_missing_fields() {
        assert!(parse_questionnaire(r#"[{"id": "a", "text": "x", "type": "slider"}]"#).is_err());
        assert!(parse_questionnaire(r#"[{"text": "x"}]"#).is_err());
        assert!(parse_questionnaire(r#"[{"id": "a", "text": "   "}]"#).is_err());
    }

    #[test]
    fn rejects_duplicates() {
        assert!(parse_questionnaire(r#"[{"id": "a", "text": "x"}, {"id": "a", "text": "y"}]"#).is_err());
        assert!(parse_questionnaire(r#"[{"id": "a", "text": "x", "options": ["Sí", "Sí"]}]"#).is_err());
    }

    #[test]
    fn open_questions_drop_options() {
        let questions =
            parse_questionnaire(r#"[{"id": "a", "text": "x", "type": "open", "options": ["y"]}]"#).unwrap();
        assert!(questions[0].options.is_empty());
    }

    #[test]
    fn malformed_json_is_a_serialization_error() {
        assert!(matches!(
            parse_questionnaire("{"),
            Err(CoreError::Serialization { .. })
        ));
    }
}
