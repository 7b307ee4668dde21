pub mod memory;
pub mod postgres;

use crate::error::Result;
use crate::models::assignment::Assignment;
use crate::models::attempt_counter::AttemptCounter;
use crate::models::notification::Notification;
use async_trait::async_trait;
use uuid::Uuid;

/// Durable key-indexed storage for the exam core. Production uses
/// Postgres; the test suite runs against the in-memory implementation.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_assignment(&self, assignment: &Assignment) -> Result<()>;

    async fn get_assignment(&self, id: Uuid) -> Result<Option<Assignment>>;

    /// Compare-and-set against the terminal flags: the write only lands
    /// while the stored document has no `finished_at` and is not
    /// terminated. Returns false when the document is already terminal,
    /// which makes racing expiry/violation transitions a no-op.
    async fn update_assignment_if_active(&self, assignment: &Assignment) -> Result<bool>;

    /// Removes the candidate's unfinished, unterminated assignments.
    /// Used by admin re-assignment to keep at most one active assignment.
    async fn delete_unfinished_assignments(&self, email: &str) -> Result<u64>;

    async fn list_assignments(&self) -> Result<Vec<Assignment>>;

    async fn list_assignments_for_candidate(&self, email: &str) -> Result<Vec<Assignment>>;

    /// Started, unfinished assignments; scanned by the expiry sweeper.
    async fn list_active_assignments(&self) -> Result<Vec<Assignment>>;

    async fn get_attempt_counter(&self, email: &str) -> Result<Option<AttemptCounter>>;

    async fn upsert_attempt_counter(&self, counter: &AttemptCounter) -> Result<()>;

    async fn insert_notification(&self, notification: &Notification) -> Result<()>;

    async fn list_notifications(&self, email: &str) -> Result<Vec<Notification>>;

    async fn mark_notifications_read(&self, email: &str) -> Result<()>;
}
