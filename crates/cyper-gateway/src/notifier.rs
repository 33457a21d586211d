//! Typed helpers for pushing scan and security events to clients.

use std::sync::Arc;

use cyper_core::UserId;
use cyper_events::{EventHub, EventsResult, RealtimeEvent};
use serde_json::Value;

/// Publishes typed events through the hub.
#[derive(Debug, Clone)]
pub struct RealtimeNotifier {
    hub: Arc<EventHub>,
}

impl RealtimeNotifier {
    /// Wrap a hub.
    #[must_use]
    pub fn new(hub: Arc<EventHub>) -> Self {
        Self { hub }
    }

    /// Scan progress for `user`. `progress` is clamped to 100.
    ///
    /// # Errors
    ///
    /// Returns [`cyper_events::EventsError::HubClosed`] if the hub has stopped.
    pub async fn scan_progress(
        &self,
        user: &UserId,
        scan_id: &str,
        progress: u8,
        phase: &str,
    ) -> EventsResult<()> {
        self.hub
            .publish(
                Some(user),
                RealtimeEvent::ScanProgress {
                    scan_id: scan_id.to_owned(),
                    progress: progress.min(100),
                    phase: phase.to_owned(),
                },
            )
            .await
    }

    /// Scan finished.
    ///
    /// # Errors
    ///
    /// See [`scan_progress`](Self::scan_progress).
    pub async fn scan_complete(
        &self,
        user: &UserId,
        scan_id: &str,
        summary: Value,
    ) -> EventsResult<()> {
        self.hub
            .publish(
                Some(user),
                RealtimeEvent::ScanComplete {
                    scan_id: scan_id.to_owned(),
                    summary,
                },
            )
            .await
    }

    /// A finding reported mid-scan.
    ///
    /// # Errors
    ///
    /// See [`scan_progress`](Self::scan_progress).
    pub async fn vulnerability_found(
        &self,
        user: &UserId,
        scan_id: &str,
        finding: Value,
    ) -> EventsResult<()> {
        self.hub
            .publish(
                Some(user),
                RealtimeEvent::VulnerabilityFound {
                    scan_id: scan_id.to_owned(),
                    finding,
                },
            )
            .await
    }

    /// Security alert for one user.
    ///
    /// # Errors
    ///
    /// See [`scan_progress`](Self::scan_progress).
    pub async fn alert(&self, user: &UserId, alert: Value) -> EventsResult<()> {
        self.hub.publish(Some(user), RealtimeEvent::Alert(alert)).await
    }

    /// System status, sent to every connected client.
    ///
    /// # Errors
    ///
    /// See [`scan_progress`](Self::scan_progress).
    pub async fn system_status(&self, status: Value) -> EventsResult<()> {
        self.hub
            .publish(None, RealtimeEvent::SystemStatus(status))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyper_core::SystemClock;
    use cyper_events::{Envelope, HubOptions};
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    async fn next(client: &mut cyper_events::Client) -> Envelope {
        let frame = client.outbound.recv().await.unwrap();
        serde_json::from_str(&frame).unwrap()
    }

    #[tokio::test]
    async fn test_user_events_and_system_broadcast() {
        let hub = Arc::new(EventHub::new(HubOptions::default(), Arc::new(SystemClock)));
        let cancel = CancellationToken::new();
        let runner = {
            let hub = Arc::clone(&hub);
            let cancel = cancel.clone();
            tokio::spawn(async move { hub.run(cancel).await })
        };

        let notifier = RealtimeNotifier::new(Arc::clone(&hub));
        let u1 = UserId::new("u1");
        let mut c1 = hub.register_client(u1.clone()).await;
        let mut c2 = hub.register_client(UserId::new("u2")).await;

        notifier.scan_progress(&u1, "scan-9", 250, "crawl").await.unwrap();
        notifier.system_status(json!({"state": "degraded"})).await.unwrap();

        let progress = next(&mut c1).await;
        assert_eq!(progress.kind, "scan_progress");
        assert_eq!(progress.user_id, Some(u1));
        assert_eq!(progress.data["progress"], 100);
        assert_eq!(progress.data["phase"], "crawl");

        assert_eq!(next(&mut c1).await.kind, "system_status");
        let status = next(&mut c2).await;
        assert_eq!(status.kind, "system_status");
        assert!(status.user_id.is_none());

        cancel.cancel();
        runner.await.unwrap();
    }
}
