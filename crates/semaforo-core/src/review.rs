//! The review cache: the last submitted payload and its assessment.
//!
//! The flow controller receives a store explicitly and writes to it when a
//! submission completes; nothing here is global.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};
use crate::{is_valid_name, write_atomic, Assessment, SubmissionPayload};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LastSubmission {
    pub payload: SubmissionPayload,
    pub assessment: Assessment,
}

pub trait ReviewStore: Send {
    fn save(&mut self, last: &LastSubmission) -> Result<()>;
    fn load(&self) -> Result<Option<LastSubmission>>;
}

/// One JSON file per client under `<root>/reviews/`.
#[derive(Debug, Clone)]
pub struct FileReviewStore {
    path: PathBuf,
}

impl FileReviewStore {
    pub fn new(root: &Path, client: &str) -> Result<Self> {
        if !is_valid_name(client) {
            return Err(CoreError::validation(format!(
                "Client id '{}' must only contain letters, digits, '_' or '-'",
                client
            )));
        }
        Ok(Self {
            path: root.join("reviews").join(format!("{}.json", client)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReviewStore for FileReviewStore {
    fn save(&mut self, last: &LastSubmission) -> Result<()> {
        let json = serde_json::to_string_pretty(last)?;
        write_atomic(&self.path, &json)
    }

    fn load(&self) -> Result<Option<LastSubmission>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryReviewStore {
    last: Option<LastSubmission>,
}

impl MemoryReviewStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReviewStore for MemoryReviewStore {
    fn save(&mut self, last: &LastSubmission) -> Result<()> {
        self.last = Some(last.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<LastSubmission>> {
        Ok(self.last.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::RiskLevel;
    use crate::{Answer, SubmissionMetadata};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn sample() -> LastSubmission {
        LastSubmission {
            payload: SubmissionPayload {
                metadata: SubmissionMetadata {
                    category: "ahorro".to_string(),
                    timestamp: chrono::Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap(),
                },
                answers: vec![Answer {
                    question_id: "q1".to_string(),
                    values: vec!["si".to_string()],
                }],
            },
            assessment: Assessment {
                summary_text: "Buen nivel de ahorro.".to_string(),
                color_code: "verde".to_string(),
                level: RiskLevel::Best,
            },
        }
    }

    #[test]
    fn file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileReviewStore::new(dir.path(), "cliente-42").unwrap();
        assert_eq!(store.load().unwrap(), None);

        store.save(&sample()).unwrap();
        assert!(store.path().ends_with("reviews/cliente-42.json"));
        assert_eq!(store.load().unwrap(), Some(sample()));

        let reopened = FileReviewStore::new(dir.path(), "cliente-42").unwrap();
        assert_eq!(reopened.load().unwrap(), Some(sample()));
    }

    #[test]
    fn clients_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = FileReviewStore::new(dir.path(), "a").unwrap();
        let b = FileReviewStore::new(dir.path(), "b").unwrap();
        a.save(&sample()).unwrap();
        assert_eq!(b.load().unwrap(), None);
    }

    #[test]
    fn rejects_unsafe_client_ids() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileReviewStore::new(dir.path(), "../x").is_err());
    }

    #[test]
    fn wire_format_uses_camel_case() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["assessment"]["summaryText"], "Buen nivel de ahorro.");
        assert_eq!(json["payload"]["answers"][0]["questionId"], "q1");
        assert_eq!(json["payload"]["metadata"]["timestamp"], "2026-03-14T09:30:00Z");
    }
}
