use crate::error::{Error, Result};
use crate::models::assignment::{Assignment, Severity, Violation, ViolationKind};
use crate::models::attempt_counter::{AttemptCounter, MAX_ATTEMPTS};
use crate::models::question::QuestionRef;
use crate::services::notification_service::NotificationService;
use crate::services::question_bank::QuestionBank;
use crate::services::scoring::{self, SubmittedAnswer};
use crate::services::selection;
use crate::storage::Store;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

/// Authenticated caller identity, extracted from the JWT claims by the
/// route layer. Admins may act on any assignment; candidates only on
/// their own.
#[derive(Debug, Clone)]
pub struct Requester {
    pub email: String,
    pub admin: bool,
}

impl Requester {
    fn can_access(&self, assignment: &Assignment) -> bool {
        self.admin || self.email.eq_ignore_ascii_case(&assignment.candidate_email)
    }
}

/// A question as served to the exam client. Documents are deep copies of
/// the bank entries taken at materialization time, keys included, since
/// the client grades locally during the sitting.
#[derive(Debug, Clone, Serialize)]
pub struct MaterializedQuestion {
    pub section: String,
    pub id: i64,
    pub question: String,
    pub options: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaterializedExam {
    pub assignment_id: Uuid,
    pub questions: Vec<MaterializedQuestion>,
    pub total: i32,
    pub duration_seconds: i64,
    pub remaining_seconds: i64,
    pub expired: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignmentStatus {
    pub assignment_id: Uuid,
    pub started: bool,
    pub finished: bool,
    pub terminated: bool,
    pub expired: bool,
    pub remaining_seconds: i64,
    pub duration_seconds: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub violations: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_reason: Option<ViolationKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoreSubmission {
    #[serde(default)]
    pub attempted: i32,
    #[serde(default)]
    pub correct: i32,
    #[serde(default)]
    pub total_with_keys: i32,
    #[serde(default)]
    pub answers: Vec<SubmittedAnswer>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreOutcome {
    pub assignment_id: Uuid,
    pub score: i32,
    pub total_with_keys: i32,
    pub attempted: i32,
    pub percentage_score: f64,
    pub passed: bool,
    pub attempts_remaining: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ViolationOutcome {
    pub terminated: bool,
    pub violations: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptsStatus {
    pub email: String,
    pub attempts_used: i32,
    pub attempts_remaining: i32,
    pub passed: bool,
}

/// Owns the assignment lifecycle: creation with non-repeating question
/// selection, idempotent start, wall-clock expiry, violation-driven
/// termination and final scoring. Every transition out of the active
/// state goes through the store's compare-and-set so a terminal document
/// is never overwritten.
pub struct AssignmentService {
    store: Arc<dyn Store>,
    bank: Arc<QuestionBank>,
    notifier: Arc<NotificationService>,
}

impl AssignmentService {
    pub fn new(
        store: Arc<dyn Store>,
        bank: Arc<QuestionBank>,
        notifier: Arc<NotificationService>,
    ) -> Self {
        Self {
            store,
            bank,
            notifier,
        }
    }

    pub async fn create_assignment(
        &self,
        candidate_email: &str,
        requested_total: usize,
        requester: &Requester,
    ) -> Result<Assignment> {
        self.create_assignment_at(candidate_email, requested_total, requester, Utc::now())
            .await
    }

    /// Creates a fresh assignment for the candidate. A candidate starting
    /// their own exam is blocked once all attempts are used without a
    /// pass; an admin assignment resets the attempt counter and clears
    /// any stale unfinished assignment first.
    pub async fn create_assignment_at(
        &self,
        candidate_email: &str,
        requested_total: usize,
        requester: &Requester,
        now: DateTime<Utc>,
    ) -> Result<Assignment> {
        let email = candidate_email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(Error::BadRequest("A valid candidate email is required".to_string()));
        }
        if !requester.admin && !requester.email.eq_ignore_ascii_case(&email) {
            return Err(Error::Forbidden(
                "Candidates may only request their own assignment".to_string(),
            ));
        }

        if requester.admin {
            // Re-assignment wipes prior attempt history for the candidate.
            let counter = AttemptCounter::new(email.clone());
            self.store.upsert_attempt_counter(&counter).await?;
        } else if let Some(counter) = self.store.get_attempt_counter(&email).await? {
            if counter.passed {
                return Err(Error::Forbidden(
                    "Exam already passed; a new assignment requires an administrator".to_string(),
                ));
            }
            if !counter.can_attempt() {
                return Err(Error::Forbidden(format!(
                    "Maximum of {} attempts used",
                    MAX_ATTEMPTS
                )));
            }
        }

        // History is gathered before deleting stale assignments so their
        // questions still count as seen.
        let history = self.selection_history(&email).await?;
        let removed = self.store.delete_unfinished_assignments(&email).await?;
        if removed > 0 {
            tracing::info!(email = %email, removed, "Replaced stale unfinished assignments");
        }

        let total = selection::clamp_total(requested_total);
        let selected = selection::select_questions(&self.bank.pool(), &history, total)?;
        let duration = selection::duration_for(selected.len());

        let assignment = Assignment::new(
            email.clone(),
            requester.email.clone(),
            selected,
            duration,
            now,
        );
        self.store.insert_assignment(&assignment).await?;
        tracing::info!(
            assignment_id = %assignment.id,
            email = %email,
            total = assignment.total,
            "Assignment created"
        );

        self.notifier
            .notify(
                &email,
                "assignment_created",
                "New exam assigned",
                format!(
                    "You have been assigned a {}-question exam ({} minutes).",
                    assignment.total,
                    duration / 60
                ),
                Some(assignment.id),
                now,
            )
            .await;

        Ok(assignment)
    }

    async fn selection_history(&self, email: &str) -> Result<HashSet<QuestionRef>> {
        let previous = self.store.list_assignments_for_candidate(email).await?;
        Ok(previous
            .into_iter()
            .flat_map(|a| a.selected.into_iter())
            .collect())
    }

    pub async fn materialize_questions(
        &self,
        id: Uuid,
        requester: &Requester,
    ) -> Result<MaterializedExam> {
        self.materialize_questions_at(id, requester, Utc::now()).await
    }

    /// Serves the question documents for an assignment. The first call
    /// starts the wall clock and consumes one attempt; repeated calls are
    /// idempotent and keep the original deadline. When the deadline has
    /// already passed the assignment is expired in place but the list is
    /// still returned, flagged, so the client can render the terminal
    /// screen.
    pub async fn materialize_questions_at(
        &self,
        id: Uuid,
        requester: &Requester,
        now: DateTime<Utc>,
    ) -> Result<MaterializedExam> {
        let mut assignment = self.require_assignment(id).await?;
        if !requester.can_access(&assignment) {
            return Err(Error::Forbidden("Not your assignment".to_string()));
        }
        if assignment.terminated {
            return Err(Error::Forbidden(
                assignment
                    .termination_message
                    .unwrap_or_else(|| "Assignment was terminated".to_string()),
            ));
        }
        if assignment.score.is_some() {
            return Err(Error::BadRequest("Assignment already submitted".to_string()));
        }

        let started_at = match assignment.started_at {
            Some(t) => t,
            None => {
                assignment.started_at = Some(now);
                let count_attempt = !assignment.attempt_counted;
                assignment.attempt_counted = true;
                // The start must land before the attempt is consumed; a
                // lost race here must not burn an attempt for an exam
                // that never began.
                if !self.store.update_assignment_if_active(&assignment).await? {
                    return Err(Error::Expired);
                }
                if count_attempt {
                    self.consume_attempt(&assignment.candidate_email, now).await?;
                }
                now
            }
        };

        let elapsed = (now - started_at).num_seconds();
        let expired = elapsed >= assignment.duration_seconds;
        if expired && !assignment.is_terminal() {
            self.apply_expiry(&mut assignment, now).await?;
        }

        let questions = self.materialize_docs(&assignment.selected);
        Ok(MaterializedExam {
            assignment_id: assignment.id,
            total: assignment.total,
            duration_seconds: assignment.duration_seconds,
            remaining_seconds: (assignment.duration_seconds - elapsed).max(0),
            expired: expired || assignment.expired,
            questions,
        })
    }

    fn materialize_docs(&self, selected: &[QuestionRef]) -> Vec<MaterializedQuestion> {
        selected
            .iter()
            .filter_map(|r| match self.bank.question(&r.section, r.id) {
                Some(doc) => Some(MaterializedQuestion {
                    section: r.section.clone(),
                    id: doc.id,
                    question: doc.question.clone(),
                    options: doc.options.clone(),
                    correct_answer: doc.correct_answer.clone(),
                }),
                None => {
                    tracing::warn!(section = %r.section, id = r.id, "Selected question missing from bank");
                    None
                }
            })
            .collect()
    }

    async fn consume_attempt(&self, email: &str, now: DateTime<Utc>) -> Result<()> {
        let mut counter = self
            .store
            .get_attempt_counter(email)
            .await?
            .unwrap_or_else(|| AttemptCounter::new(email.to_string()));
        counter.attempts_used = (counter.attempts_used + 1).min(MAX_ATTEMPTS);
        counter.last_attempt = Some(now);
        self.store.upsert_attempt_counter(&counter).await
    }

    pub async fn get_status(&self, id: Uuid, requester: &Requester) -> Result<AssignmentStatus> {
        self.get_status_at(id, requester, Utc::now()).await
    }

    /// Reports lifecycle state and the remaining wall-clock time. Reading
    /// the status of an overdue in-progress assignment expires it as a
    /// side effect, so polling clients converge on the terminal state
    /// without a separate sweep.
    pub async fn get_status_at(
        &self,
        id: Uuid,
        requester: &Requester,
        now: DateTime<Utc>,
    ) -> Result<AssignmentStatus> {
        let mut assignment = self.require_assignment(id).await?;
        if !requester.can_access(&assignment) {
            return Err(Error::Forbidden("Not your assignment".to_string()));
        }

        if assignment.is_in_progress() {
            let started = assignment.started_at.unwrap_or(now);
            if (now - started).num_seconds() >= assignment.duration_seconds {
                self.apply_expiry(&mut assignment, now).await?;
            }
        }

        let remaining = match (assignment.started_at, assignment.is_terminal()) {
            (_, true) => 0,
            (None, _) => assignment.duration_seconds,
            (Some(started), false) => {
                (assignment.duration_seconds - (now - started).num_seconds()).max(0)
            }
        };

        Ok(AssignmentStatus {
            assignment_id: assignment.id,
            started: assignment.started_at.is_some(),
            finished: assignment.finished_at.is_some(),
            terminated: assignment.terminated,
            expired: assignment.expired,
            remaining_seconds: remaining,
            duration_seconds: assignment.duration_seconds,
            started_at: assignment.started_at,
            finished_at: assignment.finished_at,
            violations: assignment.violations,
            termination_reason: assignment.termination_reason,
            termination_message: assignment.termination_message.clone(),
        })
    }

    /// Marks an overdue assignment expired. The compare-and-set keeps a
    /// concurrent termination or submission authoritative.
    async fn apply_expiry(&self, assignment: &mut Assignment, now: DateTime<Utc>) -> Result<()> {
        assignment.expired = true;
        assignment.finished_at = Some(now);
        assignment.duration_used_seconds = Some(assignment.duration_seconds);
        if self.store.update_assignment_if_active(assignment).await? {
            tracing::info!(assignment_id = %assignment.id, "Assignment expired");
        } else if let Some(stored) = self.store.get_assignment(assignment.id).await? {
            *assignment = stored;
        }
        Ok(())
    }

    pub async fn record_violation(
        &self,
        id: Uuid,
        kind: ViolationKind,
        severity: Severity,
        message: String,
        captured_image: Option<Vec<u8>>,
    ) -> Result<ViolationOutcome> {
        self.record_violation_at(id, kind, severity, message, captured_image, Utc::now())
            .await
    }

    /// Appends a violation to the log; a critical kind also terminates
    /// the assignment. Recording against an already-terminal assignment
    /// is a no-op that reports the stored state.
    pub async fn record_violation_at(
        &self,
        id: Uuid,
        kind: ViolationKind,
        severity: Severity,
        message: String,
        captured_image: Option<Vec<u8>>,
        now: DateTime<Utc>,
    ) -> Result<ViolationOutcome> {
        let mut assignment = self.require_assignment(id).await?;
        if assignment.is_terminal() {
            return Ok(ViolationOutcome {
                terminated: assignment.terminated,
                violations: assignment.violations,
                termination_message: assignment.termination_message,
            });
        }

        assignment.violation_log.push(Violation {
            kind,
            severity,
            message: message.clone(),
            timestamp: now,
            captured_image,
        });
        assignment.violations += 1;

        if kind.is_critical() {
            assignment.terminated = true;
            assignment.termination_reason = Some(kind);
            assignment.termination_message = Some(message.clone());
            assignment.terminated_at = Some(now);
            if let Some(started) = assignment.started_at {
                assignment.duration_used_seconds = Some(
                    (now - started)
                        .num_seconds()
                        .clamp(0, assignment.duration_seconds),
                );
            }
        }

        if !self.store.update_assignment_if_active(&assignment).await? {
            // Raced another terminal transition; report what actually landed.
            let stored = self.require_assignment(id).await?;
            return Ok(ViolationOutcome {
                terminated: stored.terminated,
                violations: stored.violations,
                termination_message: stored.termination_message,
            });
        }

        if assignment.terminated {
            tracing::warn!(
                assignment_id = %assignment.id,
                reason = ?kind,
                "Assignment terminated by proctoring violation"
            );
            self.notifier
                .notify(
                    &assignment.candidate_email,
                    "exam_terminated",
                    "Exam terminated",
                    format!("Your exam was terminated: {}", message),
                    Some(assignment.id),
                    now,
                )
                .await;
        }

        Ok(ViolationOutcome {
            terminated: assignment.terminated,
            violations: assignment.violations,
            termination_message: assignment.termination_message,
        })
    }

    pub async fn submit_score(
        &self,
        id: Uuid,
        requester: &Requester,
        submission: ScoreSubmission,
    ) -> Result<ScoreOutcome> {
        self.submit_score_at(id, requester, submission, Utc::now())
            .await
    }

    /// Finalizes an in-progress assignment with its graded outcome. Late
    /// submissions expire the assignment instead; a pass burns all
    /// remaining attempts and records the pass on the counter.
    pub async fn submit_score_at(
        &self,
        id: Uuid,
        requester: &Requester,
        submission: ScoreSubmission,
        now: DateTime<Utc>,
    ) -> Result<ScoreOutcome> {
        let mut assignment = self.require_assignment(id).await?;
        if !requester.can_access(&assignment) {
            return Err(Error::Forbidden("Not your assignment".to_string()));
        }
        if assignment.terminated {
            return Err(Error::Forbidden(
                assignment
                    .termination_message
                    .unwrap_or_else(|| "Assignment was terminated".to_string()),
            ));
        }
        if assignment.finished_at.is_some() {
            if assignment.expired {
                return Err(Error::Expired);
            }
            return Err(Error::BadRequest("Assignment already submitted".to_string()));
        }
        let Some(started) = assignment.started_at else {
            return Err(Error::BadRequest("Assignment has not been started".to_string()));
        };

        let elapsed = (now - started).num_seconds();
        if elapsed >= assignment.duration_seconds {
            self.apply_expiry(&mut assignment, now).await?;
            return Err(Error::Expired);
        }

        // Client-graded totals are accepted only when no per-answer
        // detail is supplied; answers always win.
        let (attempted, correct, total_with_keys, per_section) = if submission.answers.is_empty() {
            (
                submission.attempted,
                submission.correct,
                submission.total_with_keys,
                None,
            )
        } else {
            let graded = scoring::grade(&self.bank, &assignment.selected, &submission.answers);
            (
                graded.attempted,
                graded.correct,
                graded.total_with_keys,
                Some(graded.per_section),
            )
        };

        let percentage = scoring::percentage_of(correct, total_with_keys);
        let passed = scoring::is_passing(percentage);

        assignment.score = Some(correct);
        assignment.attempted = Some(attempted);
        assignment.total_with_keys = Some(total_with_keys);
        assignment.percentage_score = Some(percentage);
        assignment.passed = Some(passed);
        assignment.per_section = per_section;
        assignment.finished_at = Some(now);
        assignment.duration_used_seconds = Some(elapsed.clamp(0, assignment.duration_seconds));

        if !self.store.update_assignment_if_active(&assignment).await? {
            return Err(Error::Expired);
        }

        let mut counter = self
            .store
            .get_attempt_counter(&assignment.candidate_email)
            .await?
            .unwrap_or_else(|| AttemptCounter::new(assignment.candidate_email.clone()));
        counter.last_attempt = Some(now);
        if passed {
            counter.attempts_used = MAX_ATTEMPTS;
            counter.passed = true;
            counter.pass_date = Some(now);
            counter.final_score = Some(percentage);
        }
        self.store.upsert_attempt_counter(&counter).await?;

        tracing::info!(
            assignment_id = %assignment.id,
            percentage = percentage,
            passed,
            "Score submitted"
        );
        self.notifier
            .notify(
                &assignment.candidate_email,
                if passed { "exam_passed" } else { "exam_failed" },
                if passed { "Exam passed" } else { "Exam result" },
                format!("You scored {:.1}%.", percentage),
                Some(assignment.id),
                now,
            )
            .await;

        Ok(ScoreOutcome {
            assignment_id: assignment.id,
            score: correct,
            total_with_keys,
            attempted,
            percentage_score: percentage,
            passed,
            attempts_remaining: counter.remaining(),
        })
    }

    /// Expires every started assignment whose deadline has passed.
    /// Returns how many transitions landed; run periodically by the
    /// background sweeper.
    pub async fn expire_overdue_at(&self, now: DateTime<Utc>) -> Result<u64> {
        let active = self.store.list_active_assignments().await?;
        let mut expired = 0u64;
        for mut assignment in active {
            let Some(started) = assignment.started_at else { continue };
            if now - started < Duration::seconds(assignment.duration_seconds) {
                continue;
            }
            assignment.expired = true;
            assignment.finished_at = Some(now);
            assignment.duration_used_seconds = Some(assignment.duration_seconds);
            if self.store.update_assignment_if_active(&assignment).await? {
                expired += 1;
                tracing::info!(assignment_id = %assignment.id, "Assignment expired by sweeper");
            }
        }
        Ok(expired)
    }

    /// Persists the validated reference image on the assignment document.
    pub async fn store_reference_image(
        &self,
        id: Uuid,
        requester: &Requester,
        image: Vec<u8>,
    ) -> Result<()> {
        let mut assignment = self.require_assignment(id).await?;
        if !requester.can_access(&assignment) {
            return Err(Error::Forbidden("Not your assignment".to_string()));
        }
        assignment.reference_image = Some(image);
        if !self.store.update_assignment_if_active(&assignment).await? {
            return Err(Error::Expired);
        }
        Ok(())
    }

    pub async fn get_assignment(&self, id: Uuid, requester: &Requester) -> Result<Assignment> {
        let assignment = self.require_assignment(id).await?;
        if !requester.can_access(&assignment) {
            return Err(Error::Forbidden("Not your assignment".to_string()));
        }
        Ok(assignment)
    }

    pub async fn list_all(&self) -> Result<Vec<Assignment>> {
        self.store.list_assignments().await
    }

    pub async fn list_for_candidate(&self, email: &str) -> Result<Vec<Assignment>> {
        self.store.list_assignments_for_candidate(email).await
    }

    pub async fn attempts_for(&self, email: &str) -> Result<AttemptsStatus> {
        let counter = self
            .store
            .get_attempt_counter(email)
            .await?
            .unwrap_or_else(|| AttemptCounter::new(email.to_string()));
        Ok(AttemptsStatus {
            email: counter.email.clone(),
            attempts_used: counter.attempts_used,
            attempts_remaining: counter.remaining(),
            passed: counter.passed,
        })
    }

    async fn require_assignment(&self, id: Uuid) -> Result<Assignment> {
        self.store
            .get_assignment(id)
            .await?
            .ok_or_else(|| Error::NotFound("Assignment not found".to_string()))
    }
}
