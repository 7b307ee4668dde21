pub mod assignments;
pub mod health;
pub mod notifications;
pub mod proctoring;
