use crate::error::Result;
use crate::models::notification::Notification;
use crate::storage::Store;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Stores in-app notifications and optionally forwards each event to an
/// outbound webhook. Delivery is best-effort on both legs; a failure is
/// logged and never propagated into the calling workflow.
pub struct NotificationService {
    store: Arc<dyn Store>,
    client: reqwest::Client,
    webhook_url: Option<String>,
    webhook_secret: Option<String>,
}

impl NotificationService {
    pub fn new(
        store: Arc<dyn Store>,
        webhook_url: Option<String>,
        webhook_secret: Option<String>,
    ) -> Self {
        Self {
            store,
            client: reqwest::Client::new(),
            webhook_url,
            webhook_secret,
        }
    }

    pub async fn notify(
        &self,
        email: &str,
        kind: &str,
        title: &str,
        message: String,
        assignment_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) {
        let notification =
            Notification::new(email.to_string(), kind, title, message.clone(), assignment_id, now);
        if let Err(e) = self.store.insert_notification(&notification).await {
            tracing::warn!(email = %email, kind = %kind, error = %e, "Failed to store notification");
        }

        if let Some(url) = &self.webhook_url {
            let payload = json!({
                "email": email,
                "kind": kind,
                "title": title,
                "message": message,
                "assignment_id": assignment_id,
                "timestamp": now.to_rfc3339(),
            });
            let mut request = self.client.post(url).json(&payload);
            if let Some(secret) = &self.webhook_secret {
                request = request.header("X-Webhook-Secret", secret);
            }
            match request.send().await {
                Ok(resp) if !resp.status().is_success() => {
                    tracing::warn!(status = %resp.status(), "Notification webhook rejected event");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Notification webhook unreachable");
                }
            }
        }
    }

    pub async fn list_for(&self, email: &str) -> Result<Vec<Notification>> {
        self.store.list_notifications(email).await
    }

    pub async fn mark_all_read(&self, email: &str) -> Result<()> {
        self.store.mark_notifications_read(email).await
    }
}
