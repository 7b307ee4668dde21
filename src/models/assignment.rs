use crate::models::question::QuestionRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// One exam attempt bound to a candidate and a fixed question list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub candidate_email: String,
    pub assigned_by: String,
    /// Fixed at creation, never mutated afterward.
    pub selected: Vec<QuestionRef>,
    pub total: i32,
    pub duration_seconds: i64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_used_seconds: Option<i64>,
    pub expired: bool,
    pub score: Option<i32>,
    pub total_with_keys: Option<i32>,
    pub attempted: Option<i32>,
    pub percentage_score: Option<f64>,
    pub passed: Option<bool>,
    pub per_section: Option<HashMap<String, SectionResult>>,
    pub violations: i32,
    pub violation_log: Vec<Violation>,
    pub terminated: bool,
    pub termination_reason: Option<ViolationKind>,
    pub termination_message: Option<String>,
    pub terminated_at: Option<DateTime<Utc>>,
    /// Guards attempt counting so a re-entrant start never double-counts.
    pub attempt_counted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_image: Option<Vec<u8>>,
}

impl Assignment {
    pub fn new(
        candidate_email: String,
        assigned_by: String,
        selected: Vec<QuestionRef>,
        duration_seconds: i64,
        now: DateTime<Utc>,
    ) -> Self {
        let total = selected.len() as i32;
        Self {
            id: Uuid::new_v4(),
            candidate_email,
            assigned_by,
            selected,
            total,
            duration_seconds,
            created_at: now,
            started_at: None,
            finished_at: None,
            duration_used_seconds: None,
            expired: false,
            score: None,
            total_with_keys: None,
            attempted: None,
            percentage_score: None,
            passed: None,
            per_section: None,
            violations: 0,
            violation_log: Vec::new(),
            terminated: false,
            termination_reason: None,
            termination_message: None,
            terminated_at: None,
            attempt_counted: false,
            reference_image: None,
        }
    }

    /// Terminal means no outbound transitions: finished, expired or
    /// terminated assignments never mutate their outcome fields again.
    pub fn is_terminal(&self) -> bool {
        self.finished_at.is_some() || self.terminated
    }

    pub fn is_in_progress(&self) -> bool {
        self.started_at.is_some() && !self.is_terminal()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionResult {
    pub attempted: i32,
    pub correct: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationKind {
    NoFace,
    MultipleFaces,
    FaceMismatch,
    DistanceChange,
    SeatMovement,
    PositionChange,
    NoEyes,
    MultipleEyes,
}

impl ViolationKind {
    /// Critical violations terminate the assignment upon confirmation.
    pub fn is_critical(self) -> bool {
        matches!(
            self,
            ViolationKind::NoFace
                | ViolationKind::MultipleFaces
                | ViolationKind::FaceMismatch
                | ViolationKind::DistanceChange
                | ViolationKind::SeatMovement
        )
    }

    pub fn default_severity(self) -> Severity {
        match self {
            kind if kind.is_critical() => Severity::Critical,
            ViolationKind::MultipleEyes => Severity::High,
            ViolationKind::NoEyes => Severity::Medium,
            _ => Severity::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub severity: Severity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured_image: Option<Vec<u8>>,
}
