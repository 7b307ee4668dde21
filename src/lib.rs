pub mod config;
pub mod database;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod storage;
pub mod vision;

use crate::services::{
    assignment_service::AssignmentService,
    notification_service::NotificationService,
    proctoring_service::{MonitorConfig, ProctoringService},
    question_bank::QuestionBank,
};
use crate::storage::Store;
use crate::vision::FaceDetector;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub bank: Arc<QuestionBank>,
    pub assignment_service: Arc<AssignmentService>,
    pub proctoring_service: Arc<ProctoringService>,
    pub notification_service: Arc<NotificationService>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        bank: Arc<QuestionBank>,
        detector: Option<Arc<dyn FaceDetector>>,
    ) -> Self {
        let config = crate::config::get_config();

        let notification_service = Arc::new(NotificationService::new(
            store.clone(),
            config.notify_webhook_url.clone(),
            config.notify_webhook_secret.clone(),
        ));
        let assignment_service = Arc::new(AssignmentService::new(
            store.clone(),
            bank.clone(),
            notification_service.clone(),
        ));
        let proctoring_service =
            Arc::new(ProctoringService::new(detector, MonitorConfig::default()));

        Self {
            store,
            bank,
            assignment_service,
            proctoring_service,
            notification_service,
        }
    }
}
