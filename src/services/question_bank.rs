use crate::error::{Error, Result};
use crate::models::question::{
    CategoryBankFile, ExamBankFile, QuestionDoc, QuestionRef,
};
use std::collections::BTreeMap;
use std::path::Path;

/// Read-only question repository. Loaded once at startup; a missing or
/// unparseable bank file is a fatal configuration error.
#[derive(Debug, Clone, Default)]
pub struct QuestionBank {
    sections: BTreeMap<String, BTreeMap<i64, QuestionDoc>>,
}

impl QuestionBank {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read question bank at {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&raw)
    }

    /// Accepts both legacy bank shapes and normalizes them into the same
    /// section -> id -> document index.
    pub fn from_json(raw: &str) -> Result<Self> {
        if let Ok(file) = serde_json::from_str::<CategoryBankFile>(raw) {
            let mut bank = Self::default();
            for category in file.quiz_data.categories {
                let Some(name) = category.name else { continue };
                bank.insert_section(name, category.questions);
            }
            return Ok(bank);
        }

        if let Ok(file) = serde_json::from_str::<ExamBankFile>(raw) {
            let mut bank = Self::default();
            for exam in file.exams {
                for activity in exam.activities {
                    let name = activity
                        .title
                        .clone()
                        .or_else(|| exam.title.clone())
                        .unwrap_or_else(|| "Unknown".to_string());
                    bank.insert_section(name, activity.questions);
                }
            }
            return Ok(bank);
        }

        Err(Error::Config(
            "Question bank file matches neither supported schema".to_string(),
        ))
    }

    fn insert_section(&mut self, name: String, questions: Vec<QuestionDoc>) {
        let index = self.sections.entry(name).or_default();
        for mut q in questions {
            q.normalize_options();
            index.insert(q.id, q);
        }
    }

    pub fn section_counts(&self) -> BTreeMap<String, usize> {
        self.sections
            .iter()
            .map(|(name, questions)| (name.clone(), questions.len()))
            .collect()
    }

    pub fn question(&self, section: &str, id: i64) -> Option<&QuestionDoc> {
        self.sections.get(section)?.get(&id)
    }

    /// The full pool of QuestionRefs across all sections.
    pub fn pool(&self) -> Vec<QuestionRef> {
        self.sections
            .iter()
            .flat_map(|(section, questions)| {
                questions.keys().map(move |id| QuestionRef {
                    section: section.clone(),
                    id: *id,
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sections.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATEGORY_BANK: &str = r#"{
        "quiz_data": {
            "title": "Aviation Knowledge",
            "categories": [
                {
                    "name": "Navigation",
                    "questions": [
                        {"id": 1, "question": "Q1", "options": {"A": "a", "B": "b"}, "correct_answer": "A"},
                        {"id": 2, "question": "Q2", "answers": ["first", "second", "third"]}
                    ]
                },
                {
                    "name": "Meteorology",
                    "questions": [
                        {"id": 1, "question": "Q3", "options": {"A": "a", "B": "b"}, "correct_answer": "B"}
                    ]
                }
            ]
        }
    }"#;

    const EXAM_BANK: &str = r#"{
        "exams": [
            {
                "title": "PPL",
                "activities": [
                    {
                        "title": "Air Law",
                        "questions": [
                            {"id": 7, "question": "Q7", "answers": ["x", "y"], "correct_answer": "A"}
                        ]
                    }
                ]
            }
        ]
    }"#;

    #[test]
    fn loads_category_shape() {
        let bank = QuestionBank::from_json(CATEGORY_BANK).unwrap();
        assert_eq!(bank.len(), 3);
        assert_eq!(bank.section_counts().get("Navigation"), Some(&2));
        assert_eq!(bank.section_counts().get("Meteorology"), Some(&1));
    }

    #[test]
    fn loads_exam_activity_shape() {
        let bank = QuestionBank::from_json(EXAM_BANK).unwrap();
        assert_eq!(bank.len(), 1);
        let q = bank.question("Air Law", 7).unwrap();
        assert_eq!(q.options.get("A").map(String::as_str), Some("x"));
        assert_eq!(q.options.get("B").map(String::as_str), Some("y"));
    }

    #[test]
    fn assigns_option_keys_in_answer_order() {
        let bank = QuestionBank::from_json(CATEGORY_BANK).unwrap();
        let q = bank.question("Navigation", 2).unwrap();
        assert_eq!(q.options.get("A").map(String::as_str), Some("first"));
        assert_eq!(q.options.get("B").map(String::as_str), Some("second"));
        assert_eq!(q.options.get("C").map(String::as_str), Some("third"));
        assert!(q.correct_answer.is_none());
    }

    #[test]
    fn rejects_unknown_shape() {
        assert!(QuestionBank::from_json(r#"{"foo": 1}"#).is_err());
    }

    #[test]
    fn pool_covers_every_section() {
        let bank = QuestionBank::from_json(CATEGORY_BANK).unwrap();
        let pool = bank.pool();
        assert_eq!(pool.len(), 3);
        assert!(pool
            .iter()
            .any(|r| r.section == "Meteorology" && r.id == 1));
    }
}
