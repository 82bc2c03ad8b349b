use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    AddedToGroup,
    SubmissionReceived,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::AddedToGroup => "added_to_group",
            NotificationKind::SubmissionReceived => "submission_received",
        }
    }
}

/// Outbound notification channel. Delivery is best effort: callers log and drop failures.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(
        &self,
        user_ids: &[Uuid],
        kind: NotificationKind,
        payload: JsonValue,
    ) -> anyhow::Result<()>;
}

/// Default sink: records each notification in the service log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn notify(
        &self,
        user_ids: &[Uuid],
        kind: NotificationKind,
        payload: JsonValue,
    ) -> anyhow::Result<()> {
        info!(
            "Notification '{}' for {} user(s): {}",
            kind.as_str(),
            user_ids.len(),
            payload
        );
        Ok(())
    }
}

/// Sends a notification, swallowing any failure after logging it.
pub async fn notify_best_effort(
    sink: &dyn NotificationSink,
    user_ids: &[Uuid],
    kind: NotificationKind,
    payload: JsonValue,
) {
    if user_ids.is_empty() {
        return;
    }
    if let Err(e) = sink.notify(user_ids, kind, payload).await {
        warn!(
            "Failed to deliver '{}' notification to {} user(s): {:?}",
            kind.as_str(),
            user_ids.len(),
            e
        );
    }
}
