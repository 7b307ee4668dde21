use crate::models::assignment::SectionResult;
use crate::models::question::QuestionRef;
use crate::services::question_bank::QuestionBank;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Strictly-greater-than pass bar, in percent.
pub const PASS_THRESHOLD: f64 = 70.0;

/// One answered question as submitted by the client. `correct` may be
/// graded client-side; missing grades are resolved against the bank key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmittedAnswer {
    pub section: String,
    pub id: i64,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub correct: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct GradedSubmission {
    pub attempted: i32,
    pub correct: i32,
    pub total_with_keys: i32,
    pub percentage: f64,
    pub passed: bool,
    pub per_section: HashMap<String, SectionResult>,
}

pub fn percentage_of(correct: i32, total_with_keys: i32) -> f64 {
    if total_with_keys <= 0 {
        return 0.0;
    }
    f64::from(correct) / f64::from(total_with_keys) * 100.0
}

pub fn is_passing(percentage: f64) -> bool {
    percentage > PASS_THRESHOLD
}

/// Grades a submission against the assignment's selected questions.
/// Only questions carrying an answer key count toward the denominator,
/// so an unkeyed question can never drag the percentage down.
pub fn grade(
    bank: &QuestionBank,
    selected: &[QuestionRef],
    answers: &[SubmittedAnswer],
) -> GradedSubmission {
    let total_with_keys = selected
        .iter()
        .filter(|r| {
            bank.question(&r.section, r.id)
                .map(|q| q.correct_answer.is_some())
                .unwrap_or(false)
        })
        .count() as i32;

    let mut attempted = 0;
    let mut correct = 0;
    let mut per_section: HashMap<String, SectionResult> = HashMap::new();

    for answer in answers {
        let has_answer = answer
            .answer
            .as_deref()
            .map(|a| !a.trim().is_empty())
            .unwrap_or(false);
        if !has_answer {
            continue;
        }
        attempted += 1;

        let graded = answer.correct.unwrap_or_else(|| {
            bank.question(&answer.section, answer.id)
                .and_then(|q| q.correct_answer.as_deref())
                .map(|key| {
                    answer
                        .answer
                        .as_deref()
                        .map(|a| a.trim().eq_ignore_ascii_case(key.trim()))
                        .unwrap_or(false)
                })
                .unwrap_or(false)
        });

        let entry = per_section
            .entry(answer.section.clone())
            .or_insert(SectionResult {
                attempted: 0,
                correct: 0,
            });
        entry.attempted += 1;
        if graded {
            correct += 1;
            entry.correct += 1;
        }
    }

    let percentage = percentage_of(correct, total_with_keys);
    GradedSubmission {
        attempted,
        correct,
        total_with_keys,
        percentage,
        passed: is_passing(percentage),
        per_section,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank() -> QuestionBank {
        let mut questions = String::new();
        for id in 1..=30 {
            if id > 1 {
                questions.push(',');
            }
            questions.push_str(&format!(
                r#"{{"id": {}, "question": "Q{}", "options": {{"A": "a", "B": "b"}}, "correct_answer": "A"}}"#,
                id, id
            ));
        }
        let raw = format!(
            r#"{{"quiz_data": {{"categories": [{{"name": "Navigation", "questions": [{}]}}]}}}}"#,
            questions
        );
        QuestionBank::from_json(&raw).unwrap()
    }

    fn refs(count: i64) -> Vec<QuestionRef> {
        (1..=count)
            .map(|id| QuestionRef {
                section: "Navigation".to_string(),
                id,
            })
            .collect()
    }

    fn answer(id: i64, choice: &str) -> SubmittedAnswer {
        SubmittedAnswer {
            section: "Navigation".to_string(),
            id,
            answer: Some(choice.to_string()),
            correct: None,
        }
    }

    #[test]
    fn grades_ungraded_answers_against_the_key() {
        let answers = vec![answer(1, "A"), answer(2, "B"), answer(3, "a")];
        let graded = grade(&bank(), &refs(10), &answers);
        assert_eq!(graded.attempted, 3);
        assert_eq!(graded.correct, 2, "key comparison ignores case");
        assert_eq!(graded.total_with_keys, 10);
    }

    #[test]
    fn client_grades_take_precedence() {
        let mut a = answer(1, "B");
        a.correct = Some(true);
        let graded = grade(&bank(), &refs(5), &[a]);
        assert_eq!(graded.correct, 1);
    }

    #[test]
    fn blank_answers_do_not_count_as_attempted() {
        let mut a = answer(1, " ");
        a.answer = Some("  ".to_string());
        let graded = grade(&bank(), &refs(5), &[a]);
        assert_eq!(graded.attempted, 0);
        assert_eq!(graded.correct, 0);
    }

    #[test]
    fn pass_requires_strictly_above_seventy() {
        assert!(!is_passing(70.0));
        assert!(is_passing(70.1));
        assert!(!is_passing(percentage_of(7, 10)));
        assert!(is_passing(percentage_of(71, 100)));
    }

    #[test]
    fn empty_denominator_scores_zero() {
        assert_eq!(percentage_of(0, 0), 0.0);
        assert!(!is_passing(percentage_of(0, 0)));
    }

    #[test]
    fn aggregates_per_section() {
        let answers = vec![answer(1, "A"), answer(2, "A"), answer(3, "B")];
        let graded = grade(&bank(), &refs(10), &answers);
        let nav = graded.per_section.get("Navigation").unwrap();
        assert_eq!(nav.attempted, 3);
        assert_eq!(nav.correct, 2);
    }
}
