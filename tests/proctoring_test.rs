use chrono::{DateTime, Duration, Utc};
use examination_backend::error::Result;
use examination_backend::models::assignment::{Severity, ViolationKind};
use examination_backend::services::assignment_service::{AssignmentService, Requester};
use examination_backend::services::notification_service::NotificationService;
use examination_backend::services::proctoring_service::{MonitorConfig, ProctoringService};
use examination_backend::services::question_bank::QuestionBank;
use examination_backend::storage::memory::MemStore;
use examination_backend::vision::{FaceBox, FaceDetector};
use image::{GrayImage, Luma};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const CANDIDATE: &str = "pilot@example.com";

/// Replays a scripted sequence of face counts, one entry per frame; the
/// last entry repeats for any further frames.
struct ScriptedDetector {
    face_counts: Vec<usize>,
    cursor: AtomicUsize,
}

impl ScriptedDetector {
    fn new(face_counts: Vec<usize>) -> Arc<Self> {
        Arc::new(Self {
            face_counts,
            cursor: AtomicUsize::new(0),
        })
    }
}

impl FaceDetector for ScriptedDetector {
    fn detect_faces(&self, _frame: &GrayImage) -> Result<Vec<FaceBox>> {
        let idx = self.cursor.fetch_add(1, Ordering::SeqCst);
        let count = self
            .face_counts
            .get(idx)
            .copied()
            .unwrap_or_else(|| *self.face_counts.last().unwrap_or(&1));
        Ok(vec![
            FaceBox {
                x: 40,
                y: 40,
                width: 48,
                height: 48,
            };
            count
        ])
    }

    fn detect_eyes(&self, _region: &GrayImage) -> Result<Vec<FaceBox>> {
        Ok(vec![
            FaceBox {
                x: 4,
                y: 4,
                width: 8,
                height: 8,
            };
            2
        ])
    }
}

fn frame() -> GrayImage {
    GrayImage::from_fn(128, 128, |x, y| Luma([((x * 2 + y) % 256) as u8]))
}

fn inverted_frame() -> GrayImage {
    GrayImage::from_fn(128, 128, |x, _| Luma([(255 - (x * 4) % 256) as u8]))
}

fn t(secs: i64) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-02-01T09:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
        + Duration::seconds(secs)
}

fn bank() -> Arc<QuestionBank> {
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
    Arc::new(QuestionBank::from_json(&raw).unwrap())
}

fn services(detector: Arc<dyn FaceDetector>) -> (AssignmentService, ProctoringService) {
    let store = Arc::new(MemStore::new());
    let notifier = Arc::new(NotificationService::new(store.clone(), None, None));
    (
        AssignmentService::new(store, bank(), notifier),
        ProctoringService::new(Some(detector), MonitorConfig::default()),
    )
}

fn admin() -> Requester {
    Requester {
        email: "admin@example.com".to_string(),
        admin: true,
    }
}

fn candidate() -> Requester {
    Requester {
        email: CANDIDATE.to_string(),
        admin: false,
    }
}

/// Two faces in view from the start: no alert at nine seconds, a single
/// MULTIPLE_FACES termination once the condition has held past ten.
#[tokio::test]
async fn sustained_second_face_terminates_the_assignment() {
    let (assignments, monitor) = services(ScriptedDetector::new(vec![2]));
    let assignment = assignments
        .create_assignment_at(CANDIDATE, 10, &admin(), t(0))
        .await
        .unwrap();
    assignments
        .materialize_questions_at(assignment.id, &candidate(), t(0))
        .await
        .unwrap();

    let img = frame();
    assert!(monitor.process_frame(assignment.id, &img, t(0)).is_empty());
    assert!(monitor.process_frame(assignment.id, &img, t(9)).is_empty());

    let alerts = monitor.process_frame(assignment.id, &img, t(11));
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, ViolationKind::MultipleFaces);

    let outcome = assignments
        .record_violation_at(
            assignment.id,
            alerts[0].kind,
            alerts[0].severity,
            alerts[0].message.clone(),
            None,
            t(11),
        )
        .await
        .unwrap();
    assert!(outcome.terminated);

    let status = assignments
        .get_status_at(assignment.id, &candidate(), t(12))
        .await
        .unwrap();
    assert!(status.terminated);
    assert_eq!(status.termination_reason, Some(ViolationKind::MultipleFaces));
    assert_eq!(status.violations, 1);
    assert_eq!(status.remaining_seconds, 0);
}

#[tokio::test]
async fn transient_second_face_is_forgiven() {
    let (assignments, monitor) = services(ScriptedDetector::new(vec![2, 2, 1, 2]));
    let assignment = assignments
        .create_assignment_at(CANDIDATE, 10, &admin(), t(0))
        .await
        .unwrap();

    let img = frame();
    assert!(monitor.process_frame(assignment.id, &img, t(0)).is_empty());
    assert!(monitor.process_frame(assignment.id, &img, t(8)).is_empty());
    // A single-face frame resets the episode.
    assert!(monitor.process_frame(assignment.id, &img, t(9)).is_empty());
    assert!(monitor.process_frame(assignment.id, &img, t(15)).is_empty());
}

#[tokio::test]
async fn face_swap_past_debounce_reports_mismatch() {
    let (_, monitor) = services(ScriptedDetector::new(vec![1]));
    let id = uuid::Uuid::new_v4();

    monitor.setup_reference(id, &frame(), t(0)).unwrap();

    // A structurally different face stays in view past the 10s window.
    let other = inverted_frame();
    assert!(monitor.process_frame(id, &other, t(1)).is_empty());
    let alerts = monitor.process_frame(id, &other, t(12));
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, ViolationKind::FaceMismatch);
    assert_eq!(alerts[0].severity, Severity::Critical);

    // Back to the enrolled face: the episode clears without alerting.
    assert!(monitor.process_frame(id, &frame(), t(13)).is_empty());
}

#[tokio::test]
async fn disappearance_after_grace_is_critical() {
    let (assignments, monitor) = services(ScriptedDetector::new(vec![1, 0]));
    let assignment = assignments
        .create_assignment_at(CANDIDATE, 10, &admin(), t(0))
        .await
        .unwrap();
    assignments
        .materialize_questions_at(assignment.id, &candidate(), t(0))
        .await
        .unwrap();

    let img = frame();
    assert!(monitor.process_frame(assignment.id, &img, t(0)).is_empty());
    assert!(monitor.process_frame(assignment.id, &img, t(10)).is_empty());

    let alerts = monitor.process_frame(assignment.id, &img, t(26));
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, ViolationKind::NoFace);
    assert!(alerts[0].kind.is_critical());
}

#[tokio::test]
async fn violations_on_a_terminated_assignment_are_ignored() {
    let (assignments, _) = services(ScriptedDetector::new(vec![1]));
    let assignment = assignments
        .create_assignment_at(CANDIDATE, 10, &admin(), t(0))
        .await
        .unwrap();
    assignments
        .materialize_questions_at(assignment.id, &candidate(), t(0))
        .await
        .unwrap();

    assignments
        .record_violation_at(
            assignment.id,
            ViolationKind::FaceMismatch,
            Severity::Critical,
            "Face does not match the reference".to_string(),
            None,
            t(30),
        )
        .await
        .unwrap();

    // A racing frame delivers another critical alert after termination.
    let late = assignments
        .record_violation_at(
            assignment.id,
            ViolationKind::NoFace,
            Severity::Critical,
            "No face detected".to_string(),
            None,
            t(31),
        )
        .await
        .unwrap();
    assert!(late.terminated);
    assert_eq!(late.violations, 1);

    let stored = assignments
        .get_assignment(assignment.id, &admin())
        .await
        .unwrap();
    assert_eq!(stored.termination_reason, Some(ViolationKind::FaceMismatch));
    assert_eq!(stored.violation_log.len(), 1);
}
