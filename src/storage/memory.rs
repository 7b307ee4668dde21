use crate::error::Result;
use crate::models::assignment::Assignment;
use crate::models::attempt_counter::AttemptCounter;
use crate::models::notification::Notification;
use crate::storage::Store;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory store. Single-process only; backs the test suite and local
/// development without a database.
#[derive(Default)]
pub struct MemStore {
    assignments: RwLock<HashMap<Uuid, Assignment>>,
    counters: RwLock<HashMap<String, AttemptCounter>>,
    notifications: RwLock<Vec<Notification>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemStore {
    async fn insert_assignment(&self, assignment: &Assignment) -> Result<()> {
        self.assignments
            .write()
            .await
            .insert(assignment.id, assignment.clone());
        Ok(())
    }

    async fn get_assignment(&self, id: Uuid) -> Result<Option<Assignment>> {
        Ok(self.assignments.read().await.get(&id).cloned())
    }

    async fn update_assignment_if_active(&self, assignment: &Assignment) -> Result<bool> {
        let mut guard = self.assignments.write().await;
        match guard.get(&assignment.id) {
            Some(stored) if stored.is_terminal() => Ok(false),
            Some(_) => {
                guard.insert(assignment.id, assignment.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_unfinished_assignments(&self, email: &str) -> Result<u64> {
        let mut guard = self.assignments.write().await;
        let before = guard.len();
        guard.retain(|_, a| a.candidate_email != email || a.is_terminal());
        Ok((before - guard.len()) as u64)
    }

    async fn list_assignments(&self) -> Result<Vec<Assignment>> {
        let mut all: Vec<Assignment> = self.assignments.read().await.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn list_assignments_for_candidate(&self, email: &str) -> Result<Vec<Assignment>> {
        let mut mine: Vec<Assignment> = self
            .assignments
            .read()
            .await
            .values()
            .filter(|a| a.candidate_email == email)
            .cloned()
            .collect();
        mine.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(mine)
    }

    async fn list_active_assignments(&self) -> Result<Vec<Assignment>> {
        Ok(self
            .assignments
            .read()
            .await
            .values()
            .filter(|a| a.is_in_progress())
            .cloned()
            .collect())
    }

    async fn get_attempt_counter(&self, email: &str) -> Result<Option<AttemptCounter>> {
        Ok(self.counters.read().await.get(email).cloned())
    }

    async fn upsert_attempt_counter(&self, counter: &AttemptCounter) -> Result<()> {
        self.counters
            .write()
            .await
            .insert(counter.email.clone(), counter.clone());
        Ok(())
    }

    async fn insert_notification(&self, notification: &Notification) -> Result<()> {
        self.notifications.write().await.push(notification.clone());
        Ok(())
    }

    async fn list_notifications(&self, email: &str) -> Result<Vec<Notification>> {
        let mut mine: Vec<Notification> = self
            .notifications
            .read()
            .await
            .iter()
            .filter(|n| n.email == email)
            .cloned()
            .collect();
        mine.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(mine)
    }

    async fn mark_notifications_read(&self, email: &str) -> Result<()> {
        for n in self.notifications.write().await.iter_mut() {
            if n.email == email {
                n.read = true;
            }
        }
        Ok(())
    }
}
