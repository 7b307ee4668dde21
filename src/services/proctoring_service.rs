use crate::models::assignment::{Severity, ViolationKind};
use crate::vision::{crop_region, similarity, FaceBox, FaceDetector};
use chrono::{DateTime, Duration, Utc};
use image::GrayImage;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Thresholds for the frame analysis pipeline. Defaults mirror the
/// production tuning; tests shrink the windows where convenient.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub no_face_grace_secs: i64,
    pub multiple_faces_secs: i64,
    pub distance_secs: i64,
    pub mismatch_secs: i64,
    pub position_window: usize,
    pub position_recent: usize,
    pub position_drift: f64,
    pub distance_small_ratio: f64,
    pub distance_large_ratio: f64,
    pub similarity_threshold: f64,
    pub reference_min_area_ratio: f64,
    pub reference_max_area_ratio: f64,
    pub reference_min_brightness: f64,
    pub reference_max_brightness: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            no_face_grace_secs: 15,
            multiple_faces_secs: 10,
            distance_secs: 10,
            mismatch_secs: 10,
            position_window: 30,
            position_recent: 10,
            position_drift: 0.3,
            distance_small_ratio: 0.02,
            distance_large_ratio: 0.15,
            similarity_threshold: 0.7,
            reference_min_area_ratio: 0.05,
            reference_max_area_ratio: 0.3,
            reference_min_brightness: 50.0,
            reference_max_brightness: 200.0,
        }
    }
}

/// First-seen timestamp per anomaly kind. Armed on the first anomalous
/// observation, cleared the instant the condition normalizes; `fire`
/// reports true exactly once per sustained episode.
#[derive(Debug, Default, Clone)]
pub struct DebounceTimer {
    armed_at: Option<DateTime<Utc>>,
    fired: bool,
}

impl DebounceTimer {
    pub fn arm(&mut self, now: DateTime<Utc>) {
        if self.armed_at.is_none() {
            self.armed_at = Some(now);
        }
    }

    pub fn clear(&mut self) {
        self.armed_at = None;
        self.fired = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed_at.is_some()
    }

    pub fn elapsed_since(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.armed_at.map(|armed| now - armed)
    }

    /// True exactly once, the first time the armed duration exceeds the
    /// threshold. Stays silent on later frames of the same episode.
    pub fn fire(&mut self, now: DateTime<Utc>, threshold_secs: i64) -> bool {
        if self.fired {
            return false;
        }
        match self.elapsed_since(now) {
            Some(elapsed) if elapsed > Duration::seconds(threshold_secs) => {
                self.fired = true;
                true
            }
            _ => false,
        }
    }
}

/// Per-assignment scratch state, held in process memory only. Not safe
/// across multiple processes; frames for one assignment must stay pinned
/// to one instance.
struct ProctoringSession {
    reference: Option<GrayImage>,
    last_face_seen_at: DateTime<Utc>,
    movement: DebounceTimer,
    position_window: VecDeque<f64>,
    no_face: DebounceTimer,
    multiple_faces: DebounceTimer,
    distance_small: DebounceTimer,
    distance_large: DebounceTimer,
    mismatch: DebounceTimer,
}

impl ProctoringSession {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            reference: None,
            last_face_seen_at: now,
            movement: DebounceTimer::default(),
            position_window: VecDeque::new(),
            no_face: DebounceTimer::default(),
            multiple_faces: DebounceTimer::default(),
            distance_small: DebounceTimer::default(),
            distance_large: DebounceTimer::default(),
            mismatch: DebounceTimer::default(),
        }
    }
}

/// An alert produced by one frame analysis pass. Critical kinds terminate
/// the assignment once recorded through the state machine.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FrameAlert {
    pub kind: ViolationKind,
    pub severity: Severity,
    pub message: String,
}

/// Per-assignment frame analysis pipeline. Owns the in-memory session
/// map; storage and lifecycle transitions stay with the assignment
/// service.
pub struct ProctoringService {
    config: MonitorConfig,
    detector: Option<Arc<dyn FaceDetector>>,
    sessions: Mutex<HashMap<Uuid, ProctoringSession>>,
}

impl ProctoringService {
    pub fn new(detector: Option<Arc<dyn FaceDetector>>, config: MonitorConfig) -> Self {
        if detector.is_none() {
            tracing::warn!("No face detector configured; proctoring runs in advisory mode");
        }
        Self {
            config,
            detector,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn advisory_mode(&self) -> bool {
        self.detector.is_none()
    }

    /// Validates and stores the candidate's reference face. Rejects
    /// frames with zero or multiple faces, a face too small or too large
    /// in the frame, or out-of-range brightness.
    pub fn setup_reference(
        &self,
        assignment_id: Uuid,
        frame: &GrayImage,
        now: DateTime<Utc>,
    ) -> Result<(), String> {
        let mut sessions = self.sessions.lock().expect("proctoring session mutex poisoned");
        let session = sessions
            .entry(assignment_id)
            .or_insert_with(|| ProctoringSession::new(now));

        let Some(detector) = &self.detector else {
            // Advisory mode accepts the raw frame without validation.
            session.reference = Some(frame.clone());
            return Ok(());
        };

        let faces = detector
            .detect_faces(frame)
            .map_err(|e| format!("Face detection failed: {}", e))?;
        match faces.len() {
            0 => return Err("No face found in the reference image".to_string()),
            1 => {}
            n => return Err(format!("Expected one face in the reference image, found {}", n)),
        }

        let face = faces[0];
        let frame_area = u64::from(frame.width()) * u64::from(frame.height());
        let area_ratio = face.area() as f64 / frame_area.max(1) as f64;
        if area_ratio < self.config.reference_min_area_ratio {
            return Err("Face too small; move closer to the camera".to_string());
        }
        if area_ratio > self.config.reference_max_area_ratio {
            return Err("Face too large; move away from the camera".to_string());
        }

        let brightness = similarity::mean_brightness(frame);
        if brightness < self.config.reference_min_brightness {
            return Err("Image too dark for a usable reference".to_string());
        }
        if brightness > self.config.reference_max_brightness {
            return Err("Image too bright for a usable reference".to_string());
        }

        session.reference = Some(crop_region(frame, &face));
        session.last_face_seen_at = now;
        Ok(())
    }

    /// Analyzes one webcam frame for the given assignment and returns
    /// any alerts. Without a detector the monitor is advisory: one face
    /// assumed present, no alerts.
    pub fn process_frame(
        &self,
        assignment_id: Uuid,
        frame: &GrayImage,
        now: DateTime<Utc>,
    ) -> Vec<FrameAlert> {
        let Some(detector) = self.detector.clone() else {
            return Vec::new();
        };

        let mut sessions = self.sessions.lock().expect("proctoring session mutex poisoned");
        let session = sessions
            .entry(assignment_id)
            .or_insert_with(|| ProctoringSession::new(now));

        let faces = match detector.detect_faces(frame) {
            Ok(faces) => faces,
            Err(e) => {
                // Detection failure is recovered as a soft no-alert pass;
                // the candidate's exam flow must not be disrupted.
                tracing::warn!(assignment_id = %assignment_id, error = %e, "Face detection error");
                return Vec::new();
            }
        };

        let mut alerts = Vec::new();

        if faces.is_empty() {
            session.no_face.arm(now);
            session.multiple_faces.clear();
            if session.no_face.fire(now, self.config.no_face_grace_secs) {
                if session.movement.is_armed() {
                    alerts.push(FrameAlert {
                        kind: ViolationKind::SeatMovement,
                        severity: Severity::Critical,
                        message: "Candidate moved and then left the camera view".to_string(),
                    });
                } else {
                    let absent = (now - session.last_face_seen_at).num_seconds();
                    alerts.push(FrameAlert {
                        kind: ViolationKind::NoFace,
                        severity: Severity::Critical,
                        message: format!("No face detected for {} seconds", absent),
                    });
                }
            }
            return alerts;
        }

        session.last_face_seen_at = now;
        session.no_face.clear();

        if faces.len() > 1 {
            session.multiple_faces.arm(now);
            if session
                .multiple_faces
                .fire(now, self.config.multiple_faces_secs)
            {
                alerts.push(FrameAlert {
                    kind: ViolationKind::MultipleFaces,
                    severity: Severity::Critical,
                    message: format!(
                        "{} faces visible for more than {} seconds",
                        faces.len(),
                        self.config.multiple_faces_secs
                    ),
                });
            }
        } else {
            session.multiple_faces.clear();
        }

        let face = faces
            .iter()
            .max_by_key(|f| f.area())
            .copied()
            .unwrap_or(faces[0]);

        self.track_position(session, &face, frame, now, &mut alerts);
        self.track_distance(session, &face, frame, now, &mut alerts);
        self.check_identity(session, &face, frame, now, &mut alerts);
        self.check_eyes(detector.as_ref(), &face, frame, &mut alerts);

        alerts
    }

    /// Face-center-Y drift over a sliding window. Drift beyond the
    /// threshold produces a non-terminating alert and arms the movement
    /// timer consumed by the absence path; the timer clears once the
    /// position settles, so each drift episode can alert again.
    fn track_position(
        &self,
        session: &mut ProctoringSession,
        face: &FaceBox,
        frame: &GrayImage,
        now: DateTime<Utc>,
        alerts: &mut Vec<FrameAlert>,
    ) {
        let ratio = face.center_y() / f64::from(frame.height().max(1));

        let window = &session.position_window;
        let recent = self.config.position_recent;
        if window.len() >= recent {
            let mean: f64 =
                window.iter().rev().take(recent).sum::<f64>() / recent as f64;
            if (ratio - mean).abs() > self.config.position_drift {
                if !session.movement.is_armed() {
                    alerts.push(FrameAlert {
                        kind: ViolationKind::PositionChange,
                        severity: Severity::Low,
                        message: "Significant seat position change detected".to_string(),
                    });
                }
                session.movement.arm(now);
            } else {
                session.movement.clear();
            }
        }

        session.position_window.push_back(ratio);
        while session.position_window.len() > self.config.position_window {
            session.position_window.pop_front();
        }
    }

    /// Face-area ratio against the frame. Each direction keeps its own
    /// debounce timer, reset when the ratio returns to the normal range.
    fn track_distance(
        &self,
        session: &mut ProctoringSession,
        face: &FaceBox,
        frame: &GrayImage,
        now: DateTime<Utc>,
        alerts: &mut Vec<FrameAlert>,
    ) {
        let frame_area = u64::from(frame.width()) * u64::from(frame.height());
        let ratio = face.area() as f64 / frame_area.max(1) as f64;

        if ratio < self.config.distance_small_ratio {
            session.distance_small.arm(now);
            session.distance_large.clear();
            if session.distance_small.fire(now, self.config.distance_secs) {
                alerts.push(FrameAlert {
                    kind: ViolationKind::DistanceChange,
                    severity: Severity::Medium,
                    message: "Candidate moved away from the camera".to_string(),
                });
            }
        } else if ratio > self.config.distance_large_ratio {
            session.distance_large.arm(now);
            session.distance_small.clear();
            if session.distance_large.fire(now, self.config.distance_secs) {
                alerts.push(FrameAlert {
                    kind: ViolationKind::DistanceChange,
                    severity: Severity::Low,
                    message: "Candidate too close to the camera".to_string(),
                });
            }
        } else {
            session.distance_small.clear();
            session.distance_large.clear();
        }
    }

    /// Identity comparison against the stored reference. The first
    /// detected face becomes the reference when none was supplied via
    /// setup. Any processing failure here counts as a mismatch signal.
    fn check_identity(
        &self,
        session: &mut ProctoringSession,
        face: &FaceBox,
        frame: &GrayImage,
        now: DateTime<Utc>,
        alerts: &mut Vec<FrameAlert>,
    ) {
        let region = crop_region(frame, face);
        let Some(reference) = &session.reference else {
            session.reference = Some(region);
            return;
        };

        let score = similarity::compare_faces(reference, &region);
        if score < self.config.similarity_threshold {
            session.mismatch.arm(now);
            if session.mismatch.fire(now, self.config.mismatch_secs) {
                alerts.push(FrameAlert {
                    kind: ViolationKind::FaceMismatch,
                    severity: Severity::Critical,
                    message: format!(
                        "Face does not match the reference (similarity {:.2})",
                        score
                    ),
                });
            }
        } else {
            session.mismatch.clear();
        }
    }

    fn check_eyes(
        &self,
        detector: &dyn FaceDetector,
        face: &FaceBox,
        frame: &GrayImage,
        alerts: &mut Vec<FrameAlert>,
    ) {
        let region = crop_region(frame, face);
        let eyes = match detector.detect_eyes(&region) {
            Ok(eyes) => eyes,
            Err(e) => {
                tracing::debug!(error = %e, "Eye detection error; skipping eye check");
                return;
            }
        };
        if eyes.is_empty() {
            alerts.push(FrameAlert {
                kind: ViolationKind::NoEyes,
                severity: Severity::Medium,
                message: "Eyes not visible".to_string(),
            });
        } else if eyes.len() > 2 {
            alerts.push(FrameAlert {
                kind: ViolationKind::MultipleEyes,
                severity: Severity::High,
                message: format!("{} eye regions detected", eyes.len()),
            });
        }
    }

    /// Whether a session currently holds a reference face.
    pub fn has_reference(&self, assignment_id: Uuid) -> bool {
        self.sessions
            .lock()
            .expect("proctoring session mutex poisoned")
            .get(&assignment_id)
            .map(|s| s.reference.is_some())
            .unwrap_or(false)
    }

    /// Drops the in-memory session once the assignment is terminal, to
    /// bound memory growth.
    pub fn discard_session(&self, assignment_id: Uuid) {
        self.sessions
            .lock()
            .expect("proctoring session mutex poisoned")
            .remove(&assignment_id);
    }
}
