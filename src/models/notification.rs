use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub email: String,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub assignment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

impl Notification {
    pub fn new(
        email: String,
        kind: &str,
        title: &str,
        message: String,
        assignment_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            kind: kind.to_string(),
            title: title.to_string(),
            message,
            assignment_id,
            created_at: now,
            read: false,
        }
    }
}
