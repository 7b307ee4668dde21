use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Immutable identity of a question within a named section.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuestionRef {
    pub section: String,
    pub id: i64,
}

/// Canonical question document after bank normalization. Raw banks may
/// carry either a keyed `options` map or only a free-form `answers` list;
/// in the latter case option keys are assigned by presentation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionDoc {
    pub id: i64,
    pub question: String,
    #[serde(default)]
    pub answers: Vec<String>,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    #[serde(default)]
    pub correct_answer: Option<String>,
}

impl QuestionDoc {
    /// Assign "A", "B", ... keys from the answers list when the raw
    /// document carried no keyed option map.
    pub fn normalize_options(&mut self) {
        if self.options.is_empty() && !self.answers.is_empty() {
            for (i, answer) in self.answers.iter().enumerate() {
                let key = char::from(b'A' + i as u8).to_string();
                self.options.insert(key, answer.clone());
            }
        }
    }
}

/// Bank shape variant 1: exam/activity nesting.
#[derive(Debug, Deserialize)]
pub struct ExamBankFile {
    pub exams: Vec<ExamEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ExamEntry {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub activities: Vec<ActivityEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ActivityEntry {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub questions: Vec<QuestionDoc>,
}

/// Bank shape variant 2: flat category nesting.
#[derive(Debug, Deserialize)]
pub struct CategoryBankFile {
    pub quiz_data: QuizData,
}

#[derive(Debug, Deserialize)]
pub struct QuizData {
    #[serde(default)]
    pub categories: Vec<CategoryEntry>,
}

#[derive(Debug, Deserialize)]
pub struct CategoryEntry {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub questions: Vec<QuestionDoc>,
}
