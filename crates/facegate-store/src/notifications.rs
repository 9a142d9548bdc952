//! Per-channel notification rows for an alert.

use crate::{opt_ts_col, parse_col, to_ts, ts_col, Result, Store, StoreError};
use chrono::Utc;
use facegate_core::notify::{route, Destinations};
use facegate_core::types::{NamedRef, Notification, NotificationStatus};
use rusqlite::{params, Connection, OptionalExtension, Row};

const NOTIFICATION_SELECT: &str = "SELECT n.id, n.alert_id, c.id, c.name, n.destination, n.status, \
     n.attempts, n.sent_at, n.created_at \
     FROM notifications n JOIN notification_channels c ON c.id = n.channel_id";

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        alert_id: row.get(1)?,
        channel: NamedRef {
            id: row.get(2)?,
            name: row.get(3)?,
        },
        destination: row.get(4)?,
        status: parse_col(row, 5)?,
        attempts: row.get(6)?,
        sent_at: opt_ts_col(row, 7)?,
        created_at: ts_col(row, 8)?,
    })
}

fn notifications_where(conn: &Connection, clause: &str, alert_id: i64) -> rusqlite::Result<Vec<Notification>> {
    let mut stmt = conn.prepare(&format!("{NOTIFICATION_SELECT} WHERE {clause} ORDER BY n.id"))?;
    let rows = stmt.query_map([alert_id], notification_from_row)?;
    rows.collect()
}

impl Store {
    /// One pending row per routed channel. E-mail is left out when
    /// `skip_email` is set.
    pub async fn fan_out(&self, alert_id: i64, dest: &Destinations, skip_email: bool) -> Result<Vec<Notification>> {
        let dest = dest.clone();
        self.call(move |conn| {
            let tx = conn.transaction()?;
            if !crate::exists(&tx, "alerts", alert_id)? {
                return Err(StoreError::NotFound("alert"));
            }
            let channels: Vec<(i64, String)> = {
                let mut stmt = tx.prepare("SELECT id, name FROM notification_channels ORDER BY id")?;
                let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
                rows.collect::<rusqlite::Result<_>>()?
            };
            let now = to_ts(Utc::now());
            for (channel_id, name) in channels {
                if skip_email && name.eq_ignore_ascii_case("email") {
                    continue;
                }
                let Some(destination) = route(&name, &dest) else {
                    tracing::debug!(alert_id, channel = %name, "channel not routed");
                    continue;
                };
                tx.execute(
                    "INSERT INTO notifications (alert_id, channel_id, destination, status, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        alert_id,
                        channel_id,
                        destination,
                        NotificationStatus::Pending.as_str(),
                        now
                    ],
                )?;
            }
            let created = notifications_where(&tx, "n.alert_id = ?1", alert_id)?;
            tx.commit()?;
            tracing::info!(alert_id, count = created.len(), "notifications queued");
            Ok(created)
        })
        .await
    }

    pub async fn pending_notifications(&self, alert_id: i64) -> Result<Vec<Notification>> {
        self.call(move |conn| {
            Ok(notifications_where(
                conn,
                "n.alert_id = ?1 AND n.status = 'pending'",
                alert_id,
            )?)
        })
        .await
    }

    /// Alerts that still have undelivered notifications, oldest first.
    pub async fn alerts_with_pending(&self) -> Result<Vec<i64>> {
        self.call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT alert_id FROM notifications WHERE status = 'pending' ORDER BY alert_id",
            )?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            Ok(rows.collect::<rusqlite::Result<Vec<i64>>>()?)
        })
        .await
    }

    /// Record a delivery attempt.
    pub async fn set_notification_status(&self, id: i64, status: NotificationStatus) -> Result<Notification> {
        self.call(move |conn| {
            let now = to_ts(Utc::now());
            let changed = conn.execute(
                "UPDATE notifications
                 SET status = ?1, attempts = attempts + 1,
                     sent_at = CASE WHEN ?1 = 'sent' THEN ?2 ELSE sent_at END
                 WHERE id = ?3",
                params![status.as_str(), now, id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound("notification"));
            }
            conn.query_row(
                &format!("{NOTIFICATION_SELECT} WHERE n.id = ?1"),
                [id],
                notification_from_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound("notification"))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use facegate_core::types::AlertKind;
    use facegate_core::validate::NewAlert;

    async fn alert(store: &Store) -> i64 {
        store
            .create_alert(&NewAlert {
                type_id: AlertKind::UnknownUser.id(),
                detail: None,
                point_id: None,
                evidence_id: None,
            })
            .await
            .unwrap()
            .id
    }

    fn dest() -> Destinations {
        Destinations {
            admin_email: "admin@sistema.com".into(),
            telegram_chat_id: "-100123".into(),
        }
    }

    #[tokio::test]
    async fn test_fan_out_routes_channels() {
        let store = testutil::store().await;
        let id = alert(&store).await;
        let created = store.fan_out(id, &dest(), false).await.unwrap();
        let names: Vec<_> = created.iter().map(|n| n.channel.name.as_str()).collect();
        assert_eq!(names, ["Email", "Telegram", "Sistema interno"]);
        assert!(created.iter().all(|n| n.status == NotificationStatus::Pending));
        assert_eq!(created[0].destination, "admin@sistema.com");
    }

    #[tokio::test]
    async fn test_fan_out_skips_email() {
        let store = testutil::store().await;
        let id = alert(&store).await;
        let created = store.fan_out(id, &dest(), true).await.unwrap();
        assert!(created.iter().all(|n| n.channel.name != "Email"));
        assert_eq!(created.len(), 2);
    }

    #[tokio::test]
    async fn test_status_updates() {
        let store = testutil::store().await;
        let id = alert(&store).await;
        let created = store.fan_out(id, &dest(), false).await.unwrap();
        assert_eq!(store.alerts_with_pending().await.unwrap(), vec![id]);

        let sent = store
            .set_notification_status(created[0].id, NotificationStatus::Sent)
            .await
            .unwrap();
        assert_eq!(sent.attempts, 1);
        assert!(sent.sent_at.is_some());

        let failed = store
            .set_notification_status(created[1].id, NotificationStatus::Failed)
            .await
            .unwrap();
        assert!(failed.sent_at.is_none());

        let pending = store.pending_notifications(id).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].channel.name, "Sistema interno");
    }

    #[tokio::test]
    async fn test_fan_out_unknown_alert() {
        let store = testutil::store().await;
        assert!(matches!(
            store.fan_out(77, &dest(), false).await,
            Err(StoreError::NotFound("alert"))
        ));
    }
}
