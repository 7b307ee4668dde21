pub mod assignment_service;
pub mod notification_service;
pub mod proctoring_service;
pub mod question_bank;
pub mod scoring;
pub mod selection;
