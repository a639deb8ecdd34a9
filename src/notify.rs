//! Outbound notifications.
//!
//! Notification delivery is best-effort and fire-and-forget: the clerk never
//! waits on it, never retries it, and a delivery failure must not disturb
//! ingestion or a decision in flight. Failures are logged and swallowed.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

/// What happened. The wire names match what downstream consumers already
/// expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyKind {
    NewCase,
    NewReply,
}

impl NotifyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewCase => "new_case",
            Self::NewReply => "new_reply",
        }
    }
}

#[async_trait]
pub trait Notify: Send + Sync {
    /// Announce an event. `target` is a judge nickname for targeted
    /// notifications; `None` broadcasts to everyone subscribed downstream.
    async fn notify(&self, kind: NotifyKind, title: &str, case_id: i64, target: Option<&str>);
}

/// POSTs each event as JSON to a configured webhook endpoint.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    kind: NotifyKind,
    title: &'a str,
    case_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<&'a str>,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl Notify for WebhookNotifier {
    async fn notify(&self, kind: NotifyKind, title: &str, case_id: i64, target: Option<&str>) {
        let payload = WebhookPayload {
            kind,
            title,
            case_id,
            target,
        };
        match self.client.post(&self.url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(kind = kind.as_str(), case_id, "notification delivered");
            }
            Ok(response) => {
                warn!(
                    kind = kind.as_str(),
                    case_id,
                    status = %response.status(),
                    "notification endpoint rejected the event"
                );
            }
            Err(e) => {
                warn!(kind = kind.as_str(), case_id, error = %e, "notification delivery failed");
            }
        }
    }
}

/// Drops every event. Used when no webhook is configured and in tests.
pub struct NoopNotifier;

#[async_trait]
impl Notify for NoopNotifier {
    async fn notify(&self, kind: NotifyKind, _title: &str, case_id: i64, _target: Option<&str>) {
        debug!(kind = kind.as_str(), case_id, "notification dropped (no notifier configured)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_wire_names_are_stable() {
        assert_eq!(NotifyKind::NewCase.as_str(), "new_case");
        assert_eq!(NotifyKind::NewReply.as_str(), "new_reply");
    }

    #[test]
    fn payload_serializes_without_null_target() {
        let payload = WebhookPayload {
            kind: NotifyKind::NewCase,
            title: "Case No. 41",
            case_id: 7,
            target: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], "new_case");
        assert!(json.get("target").is_none());
    }

    #[tokio::test]
    async fn webhook_failure_is_swallowed() {
        // Nothing listens on this port; notify must return without error.
        let notifier = WebhookNotifier::new("http://127.0.0.1:9/unreachable".to_string());
        notifier
            .notify(NotifyKind::NewReply, "Case No. 41", 7, Some("Themis"))
            .await;
    }
}
