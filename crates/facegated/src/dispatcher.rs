//! Notification dispatcher.
//!
//! Request handlers never deliver notifications themselves; they hand the
//! alert id to a background worker through a [`DispatchHandle`]. Alerts
//! left with pending rows from a previous run are re-queued at startup.

use facegate_core::notify::is_internal;
use facegate_core::types::{Alert, Notification, NotificationStatus};
use facegate_store::{Store, StoreError};
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

const QUEUE_DEPTH: usize = 64;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Clone-safe handle to the dispatcher task.
#[derive(Clone)]
pub struct DispatchHandle {
    tx: mpsc::Sender<i64>,
}

impl DispatchHandle {
    /// Queue an alert for delivery. Returns false when the queue is full or
    /// the worker is gone; the rows stay pending either way.
    pub fn wake(&self, alert_id: i64) -> bool {
        match self.tx.try_send(alert_id) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(alert_id, error = %e, "dispatcher queue unavailable");
                false
            }
        }
    }
}

/// Payload POSTed to the notification webhook.
#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    notification_id: i64,
    alert_id: i64,
    channel: &'a str,
    destination: &'a str,
    alert_type: &'a str,
    detail: Option<&'a str>,
    point: Option<&'a str>,
    zone: Option<&'a str>,
    created_at: String,
}

/// Delivery tallies for one alert.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub sent: usize,
    pub failed: usize,
    pub pending: usize,
}

#[derive(Clone)]
pub struct Dispatcher {
    store: Store,
    http: Client,
    webhook_url: Option<String>,
}

impl Dispatcher {
    pub fn new(store: Store, http: Client, webhook_url: &str) -> Self {
        let webhook_url = (!webhook_url.trim().is_empty()).then(|| webhook_url.trim().to_string());
        Self {
            store,
            http,
            webhook_url,
        }
    }

    /// Deliver every pending notification of one alert.
    pub async fn deliver(&self, alert_id: i64) -> Result<Delivery, DispatchError> {
        let pending = self.store.pending_notifications(alert_id).await?;
        if pending.is_empty() {
            return Ok(Delivery::default());
        }
        let alert = self.store.get_alert(alert_id).await?;
        let mut tally = Delivery::default();
        for n in &pending {
            let status = if is_internal(&n.channel.name) {
                Some(NotificationStatus::Sent)
            } else if let Some(url) = &self.webhook_url {
                Some(self.post(url, &alert, n).await)
            } else {
                None
            };
            match status {
                Some(status) => {
                    self.store.set_notification_status(n.id, status).await?;
                    match status {
                        NotificationStatus::Sent => tally.sent += 1,
                        _ => tally.failed += 1,
                    }
                }
                None => tally.pending += 1,
            }
        }
        tracing::info!(
            alert_id,
            sent = tally.sent,
            failed = tally.failed,
            pending = tally.pending,
            "notifications dispatched"
        );
        Ok(tally)
    }

    async fn post(&self, url: &str, alert: &Alert, n: &Notification) -> NotificationStatus {
        let msg = WebhookMessage {
            notification_id: n.id,
            alert_id: alert.id,
            channel: &n.channel.name,
            destination: &n.destination,
            alert_type: &alert.alert_type.name,
            detail: alert.detail.as_deref(),
            point: alert.point.as_ref().map(|p| p.name.as_str()),
            zone: alert.point.as_ref().map(|p| p.zone_name.as_str()),
            created_at: alert.created_at.to_rfc3339(),
        };
        match self.http.post(url).json(&msg).send().await {
            Ok(resp) if resp.status().is_success() => NotificationStatus::Sent,
            Ok(resp) => {
                tracing::warn!(notification_id = n.id, status = %resp.status(), "webhook rejected notification");
                NotificationStatus::Failed
            }
            Err(e) => {
                tracing::warn!(notification_id = n.id, error = %e, "webhook unreachable");
                NotificationStatus::Failed
            }
        }
    }
}

/// Spawn the worker task. Pending alerts from earlier runs are delivered
/// before new wake-ups.
pub fn spawn_dispatcher(dispatcher: Dispatcher) -> DispatchHandle {
    let (tx, mut rx) = mpsc::channel::<i64>(QUEUE_DEPTH);

    tokio::spawn(async move {
        tracing::info!(webhook = dispatcher.webhook_url.is_some(), "dispatcher started");
        match dispatcher.store.alerts_with_pending().await {
            Ok(ids) => {
                if !ids.is_empty() {
                    tracing::info!(count = ids.len(), "re-queueing alerts with pending notifications");
                }
                for id in ids {
                    if let Err(e) = dispatcher.deliver(id).await {
                        tracing::error!(alert_id = id, error = %e, "dispatch failed");
                    }
                }
            }
            Err(e) => tracing::error!(error = %e, "could not list pending notifications"),
        }
        while let Some(alert_id) = rx.recv().await {
            if let Err(e) = dispatcher.deliver(alert_id).await {
                tracing::error!(alert_id, error = %e, "dispatch failed");
            }
        }
        tracing::info!("dispatcher exiting");
    });

    DispatchHandle { tx }
}
