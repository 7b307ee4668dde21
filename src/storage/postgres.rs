use crate::error::Result;
use crate::models::assignment::Assignment;
use crate::models::attempt_counter::AttemptCounter;
use crate::models::notification::Notification;
use crate::storage::Store;
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Postgres-backed store. Assignments are kept as one JSONB document per
/// row with the index fields (candidate, terminal flags) duplicated into
/// columns so lookups and the compare-and-set guard stay in SQL.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn decode_assignment(row: &sqlx::postgres::PgRow) -> Result<Assignment> {
        let doc: serde_json::Value = row.try_get("doc")?;
        Ok(serde_json::from_value(doc)?)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_assignment(&self, assignment: &Assignment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO assignments (id, candidate_email, created_at, started_at, finished_at, terminated, doc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(assignment.id)
        .bind(&assignment.candidate_email)
        .bind(assignment.created_at)
        .bind(assignment.started_at)
        .bind(assignment.finished_at)
        .bind(assignment.terminated)
        .bind(serde_json::to_value(assignment)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_assignment(&self, id: Uuid) -> Result<Option<Assignment>> {
        let row = sqlx::query(r#"SELECT doc FROM assignments WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::decode_assignment).transpose()
    }

    async fn update_assignment_if_active(&self, assignment: &Assignment) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE assignments
            SET started_at = $2, finished_at = $3, terminated = $4, doc = $5
            WHERE id = $1 AND finished_at IS NULL AND terminated = FALSE
            "#,
        )
        .bind(assignment.id)
        .bind(assignment.started_at)
        .bind(assignment.finished_at)
        .bind(assignment.terminated)
        .bind(serde_json::to_value(assignment)?)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_unfinished_assignments(&self, email: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM assignments
            WHERE candidate_email = $1 AND finished_at IS NULL AND terminated = FALSE
            "#,
        )
        .bind(email)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn list_assignments(&self) -> Result<Vec<Assignment>> {
        let rows = sqlx::query(r#"SELECT doc FROM assignments ORDER BY created_at DESC"#)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::decode_assignment).collect()
    }

    async fn list_assignments_for_candidate(&self, email: &str) -> Result<Vec<Assignment>> {
        let rows = sqlx::query(
            r#"SELECT doc FROM assignments WHERE candidate_email = $1 ORDER BY created_at DESC"#,
        )
        .bind(email)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::decode_assignment).collect()
    }

    async fn list_active_assignments(&self) -> Result<Vec<Assignment>> {
        let rows = sqlx::query(
            r#"
            SELECT doc FROM assignments
            WHERE started_at IS NOT NULL AND finished_at IS NULL AND terminated = FALSE
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::decode_assignment).collect()
    }

    async fn get_attempt_counter(&self, email: &str) -> Result<Option<AttemptCounter>> {
        let row = sqlx::query(r#"SELECT doc FROM attempt_counters WHERE email = $1"#)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let doc: serde_json::Value = row.try_get("doc")?;
                Ok(Some(serde_json::from_value(doc)?))
            }
            None => Ok(None),
        }
    }

    async fn upsert_attempt_counter(&self, counter: &AttemptCounter) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO attempt_counters (email, doc)
            VALUES ($1, $2)
            ON CONFLICT (email) DO UPDATE SET doc = EXCLUDED.doc
            "#,
        )
        .bind(&counter.email)
        .bind(serde_json::to_value(counter)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_notification(&self, notification: &Notification) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, email, created_at, doc)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(notification.id)
        .bind(&notification.email)
        .bind(notification.created_at)
        .bind(serde_json::to_value(notification)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_notifications(&self, email: &str) -> Result<Vec<Notification>> {
        let rows = sqlx::query(
            r#"SELECT doc FROM notifications WHERE email = $1 ORDER BY created_at DESC"#,
        )
        .bind(email)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| -> Result<Notification> {
                let doc: serde_json::Value = row.try_get("doc")?;
                Ok(serde_json::from_value(doc)?)
            })
            .collect()
    }

    async fn mark_notifications_read(&self, email: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE notifications
            SET doc = jsonb_set(doc, '{read}', 'true'::jsonb)
            WHERE email = $1 AND (doc->>'read')::boolean = FALSE
            "#,
        )
        .bind(email)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
