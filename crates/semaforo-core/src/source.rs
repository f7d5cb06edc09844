//! Where questionnaires come from.

use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};

use crate::dto::parse_questionnaire;
use crate::error::{CoreError, Result};
use crate::{is_valid_name, write_atomic, Question};

#[async_trait]
pub trait QuestionSource: Send + Sync {
    async fn categories(&self) -> Result<Vec<String>>;
    /// Ordered, validated questions of one category.
    async fn questions(&self, category: &str) -> Result<Vec<Question>>;
}

/// Reads `<root>/questionnaires/<category>.json`.
#[derive(Debug, Clone)]
pub struct FileQuestionSource {
    dir: PathBuf,
}

impl FileQuestionSource {
    pub fn new(root: &Path) -> Self {
        Self {
            dir: root.join("questionnaires"),
        }
    }

    fn path_for(&self, category: &str) -> Result<PathBuf> {
        if !is_valid_name(category) {
            return Err(CoreError::validation(format!(
                "Category '{}' must only contain letters, digits, '_' or '-'",
                category
            )));
        }
        Ok(self.dir.join(format!("{}.json", category)))
    }

    /// All category names (without .json extension), sorted.
    pub fn list_categories(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(vec![]);
        }
        let mut names: Vec<String> = fs::read_dir(&self.dir)?
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let name = entry.file_name().to_string_lossy().to_string();
                name.strip_suffix(".json")
                    .filter(|n| is_valid_name(n))
                    .map(|n| n.to_string())
            })
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn read_raw(&self, category: &str) -> Result<String> {
        let path = self.path_for(category)?;
        if !path.exists() {
            return Err(CoreError::not_found(format!("questionnaire '{}'", category)));
        }
        Ok(fs::read_to_string(&path)?)
    }

    pub fn read(&self, category: &str) -> Result<Vec<Question>> {
        let raw = self.read_raw(category)?;
        let questions = parse_questionnaire(&raw)?;
        tracing::debug!(category, count = questions.len(), "loaded questionnaire");
        Ok(questions)
    }

    /// Store a questionnaire after validating it.
    pub fn write_raw(&self, category: &str, data: &str) -> Result<()> {
        let path = self.path_for(category)?;
        parse_questionnaire(data)?;
        write_atomic(&path, data)
    }
}

#[async_trait]
impl QuestionSource for FileQuestionSource {
    async fn categories(&self) -> Result<Vec<String>> {
        self.list_categories()
    }

    async fn questions(&self, category: &str) -> Result<Vec<Question>> {
        self.read(category)
    }
}
