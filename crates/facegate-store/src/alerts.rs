//! Security alerts and the operator notification feed.
//!
//! An alert is "read" once `read_at` is stamped. Delivery state lives on
//! the per-channel notification rows and is independent of it.

use crate::audit::{self, AuditRecord};
use crate::{exists, opt_ts_col, page_of, parse_col, to_ts, ts_col, Filter, Result, Store, StoreError};
use chrono::{DateTime, Utc};
use facegate_core::notify::{priority, Priority};
use facegate_core::types::{
    Alert, AlertKind, AuditAction, EvidenceRef, FeedItem, NamedRef, NotificationRef, Page, PageRequest,
    PointRef,
};
use facegate_core::validate::NewAlert;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

const ALERT_SELECT: &str = "SELECT a.id, a.uuid, t.id, t.name, a.detail, \
     p.id, p.name, z.name, \
     ev.id, ev.path, ev.mime_type, ev.size_bytes, \
     a.read_at, a.created_at \
     FROM alerts a \
     JOIN alert_types t ON t.id = a.type_id \
     LEFT JOIN control_points p ON p.id = a.point_id \
     LEFT JOIN zones z ON z.id = p.zone_id \
     LEFT JOIN evidence ev ON ev.id = a.evidence_id";

/// How many of the newest alerts "mark all read" touches.
pub const MARK_ALL_LIMIT: i64 = 100;

fn alert_from_row(row: &Row<'_>) -> rusqlite::Result<Alert> {
    let point_id: Option<i64> = row.get(5)?;
    let point = match point_id {
        Some(id) => Some(PointRef {
            id,
            name: row.get(6)?,
            zone_name: row.get(7)?,
        }),
        None => None,
    };
    let evidence_id: Option<i64> = row.get(8)?;
    let evidence = match evidence_id {
        Some(id) => Some(EvidenceRef {
            id,
            path: row.get(9)?,
            mime_type: row.get(10)?,
            size_bytes: row.get(11)?,
        }),
        None => None,
    };
    Ok(Alert {
        id: row.get(0)?,
        uuid: row.get(1)?,
        alert_type: NamedRef {
            id: row.get(2)?,
            name: row.get(3)?,
        },
        detail: row.get(4)?,
        point,
        evidence,
        read: opt_ts_col(row, 12)?.is_some(),
        notifications: Vec::new(),
        created_at: ts_col(row, 13)?,
    })
}

fn attach_notifications(conn: &Connection, alert: &mut Alert) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare_cached(
        "SELECT n.id, c.name, n.status FROM notifications n
         JOIN notification_channels c ON c.id = n.channel_id
         WHERE n.alert_id = ?1 ORDER BY n.id",
    )?;
    let rows = stmt.query_map([alert.id], |row| {
        Ok(NotificationRef {
            id: row.get(0)?,
            channel: row.get(1)?,
            status: parse_col(row, 2)?,
        })
    })?;
    alert.notifications = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(())
}

fn load_alert(conn: &Connection, id: i64) -> Result<Alert> {
    let mut alert = conn
        .query_row(&format!("{ALERT_SELECT} WHERE a.id = ?1"), [id], alert_from_row)
        .optional()?
        .ok_or(StoreError::NotFound("alert"))?;
    attach_notifications(conn, &mut alert)?;
    Ok(alert)
}

#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub type_id: Option<i64>,
    pub point_id: Option<i64>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl AlertFilter {
    fn to_filter(&self) -> Filter {
        let mut f = Filter::default();
        if let Some(id) = self.type_id {
            f.eq("a.type_id = ?", id);
        }
        if let Some(id) = self.point_id {
            f.eq("a.point_id = ?", id);
        }
        if let Some(from) = self.from {
            f.eq("a.created_at >= ?", to_ts(from));
        }
        if let Some(to) = self.to {
            f.eq("a.created_at <= ?", to_ts(to));
        }
        f
    }
}

/// The notification feed: recent alerts plus the unread total.
#[derive(Debug, Clone)]
pub struct Feed {
    pub items: Vec<FeedItem>,
    pub unread: i64,
}

impl Store {
    pub async fn list_alerts(&self, filter: AlertFilter, page: PageRequest) -> Result<Page<Alert>> {
        self.call(move |conn| {
            let f = filter.to_filter();
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM alerts a{}", f.where_sql()),
                params_from_iter(f.params()),
                |row| row.get(0),
            )?;
            let mut stmt = conn.prepare(&format!(
                "{ALERT_SELECT}{} ORDER BY a.created_at DESC, a.id DESC LIMIT ? OFFSET ?",
                f.where_sql()
            ))?;
            let mut items = stmt
                .query_map(params_from_iter(f.paged_params(page)), alert_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            for alert in &mut items {
                attach_notifications(conn, alert)?;
            }
            Ok(page_of(items, page, total))
        })
        .await
    }

    pub async fn get_alert(&self, id: i64) -> Result<Alert> {
        self.call(move |conn| load_alert(conn, id)).await
    }

    /// The alert type must exist; point and evidence, when given, too.
    pub async fn create_alert(&self, alert: &NewAlert) -> Result<Alert> {
        alert.validate()?;
        let alert = alert.clone();
        self.call(move |conn| {
            let tx = conn.transaction()?;
            if !exists(&tx, "alert_types", alert.type_id)? {
                return Err(StoreError::Invalid("alert type does not exist".into()));
            }
            if let Some(point) = alert.point_id {
                if !exists(&tx, "control_points", point)? {
                    return Err(StoreError::Invalid("control point does not exist".into()));
                }
            }
            if let Some(evidence) = alert.evidence_id {
                if !exists(&tx, "evidence", evidence)? {
                    return Err(StoreError::Invalid("evidence does not exist".into()));
                }
            }
            tx.execute(
                "INSERT INTO alerts (uuid, type_id, detail, point_id, evidence_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    uuid::Uuid::new_v4().to_string(),
                    alert.type_id,
                    alert.detail,
                    alert.point_id,
                    alert.evidence_id,
                    to_ts(Utc::now()),
                ],
            )?;
            let id = tx.last_insert_rowid();
            let stored = load_alert(&tx, id)?;
            tx.commit()?;
            tracing::warn!(alert_id = id, alert_type = %stored.alert_type.name, "alert raised");
            Ok(stored)
        })
        .await
    }

    /// Delete an alert. Its notifications go with it.
    pub async fn delete_alert(&self, id: i64, actor: Option<i64>) -> Result<()> {
        self.call(move |conn| {
            let tx = conn.transaction()?;
            let alert = load_alert(&tx, id)?;
            tx.execute("DELETE FROM notifications WHERE alert_id = ?1", [id])?;
            tx.execute("DELETE FROM alerts WHERE id = ?1", [id])?;
            audit::write(
                &tx,
                &AuditRecord::new(actor, AuditAction::Delete, "alerts", Some(id)).change(
                    "alert_type",
                    Some(alert.alert_type.name),
                    None,
                ),
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Returns whether the alert was unread before.
    pub async fn mark_alert_read(&self, id: i64) -> Result<bool> {
        self.call(move |conn| {
            let changed = conn.execute(
                "UPDATE alerts SET read_at = ?1 WHERE id = ?2 AND read_at IS NULL",
                params![to_ts(Utc::now()), id],
            )?;
            if changed == 0 && !exists(conn, "alerts", id)? {
                return Err(StoreError::NotFound("alert"));
            }
            Ok(changed == 1)
        })
        .await
    }

    /// Mark the newest alerts read. Returns how many changed.
    pub async fn mark_all_read(&self) -> Result<usize> {
        self.call(|conn| {
            Ok(conn.execute(
                "UPDATE alerts SET read_at = ?1
                 WHERE read_at IS NULL AND id IN (
                     SELECT id FROM alerts ORDER BY created_at DESC, id DESC LIMIT ?2
                 )",
                params![to_ts(Utc::now()), MARK_ALL_LIMIT],
            )?)
        })
        .await
    }

    pub async fn feed(&self, unread_only: bool, limit: u32) -> Result<Feed> {
        self.call(move |conn| {
            let unread_clause = if unread_only { " WHERE a.read_at IS NULL" } else { "" };
            let mut stmt = conn.prepare(&format!(
                "{ALERT_SELECT}{unread_clause} ORDER BY a.created_at DESC, a.id DESC LIMIT ?1"
            ))?;
            let items = stmt
                .query_map([limit as i64], alert_from_row)?
                .map(|row| {
                    row.map(|a| FeedItem {
                        id: a.id,
                        priority: AlertKind::from_id(a.alert_type.id)
                            .map(priority)
                            .unwrap_or(Priority::Medium),
                        detail: a.detail.unwrap_or_else(|| a.alert_type.name.clone()),
                        alert_type: a.alert_type.name,
                        created_at: a.created_at,
                        point_name: a.point.map(|p| p.name),
                        read: a.read,
                    })
                })
                .collect::<rusqlite::Result<Vec<_>>>()?;
            let unread: i64 = conn.query_row(
                "SELECT COUNT(*) FROM alerts WHERE read_at IS NULL",
                [],
                |row| row.get(0),
            )?;
            Ok(Feed { items, unread })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use facegate_core::notify::Destinations;

    fn new_alert(kind: AlertKind, point_id: Option<i64>) -> NewAlert {
        NewAlert {
            type_id: kind.id(),
            detail: Some(format!("{} test", kind.label())),
            point_id,
            evidence_id: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let store = testutil::store().await;
        let zone = testutil::zone(&store, "Lobby").await;
        let point = testutil::point(&store, zone, "Main door").await;

        let a = store
            .create_alert(&new_alert(AlertKind::UnknownUser, Some(point)))
            .await
            .unwrap();
        assert_eq!(a.alert_type.name, "Usuario desconocido");
        assert_eq!(a.point.as_ref().unwrap().zone_name, "Lobby");
        assert!(!a.read);
        store
            .create_alert(&new_alert(AlertKind::OutsideSchedule, None))
            .await
            .unwrap();

        let page = PageRequest::new(None, None, 20);
        let all = store.list_alerts(AlertFilter::default(), page).await.unwrap();
        assert_eq!(all.pagination.total, 2);
        let by_point = store
            .list_alerts(
                AlertFilter {
                    point_id: Some(point),
                    ..Default::default()
                },
                page,
            )
            .await
            .unwrap();
        assert_eq!(by_point.items.len(), 1);
        assert_eq!(by_point.items[0].id, a.id);
    }

    #[tokio::test]
    async fn test_unknown_type_rejected() {
        let store = testutil::store().await;
        let bad = NewAlert {
            type_id: 42,
            detail: None,
            point_id: None,
            evidence_id: None,
        };
        assert!(matches!(
            store.create_alert(&bad).await,
            Err(StoreError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_feed_and_read_state() {
        let store = testutil::store().await;
        let a = store
            .create_alert(&new_alert(AlertKind::Unauthorized, None))
            .await
            .unwrap();
        let b = store
            .create_alert(&new_alert(AlertKind::OutsideSchedule, None))
            .await
            .unwrap();

        let feed = store.feed(false, 10).await.unwrap();
        assert_eq!(feed.unread, 2);
        assert_eq!(feed.items[0].id, b.id);
        assert_eq!(feed.items[0].priority, Priority::Low);
        assert_eq!(feed.items[1].priority, Priority::High);

        assert!(store.mark_alert_read(a.id).await.unwrap());
        assert!(!store.mark_alert_read(a.id).await.unwrap());
        let unread = store.feed(true, 10).await.unwrap();
        assert_eq!(unread.unread, 1);
        assert_eq!(unread.items.len(), 1);
        assert_eq!(unread.items[0].id, b.id);

        assert_eq!(store.mark_all_read().await.unwrap(), 1);
        assert_eq!(store.feed(false, 10).await.unwrap().unread, 0);
        assert!(matches!(
            store.mark_alert_read(999).await,
            Err(StoreError::NotFound("alert"))
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_notifications() {
        let store = testutil::store().await;
        let a = store
            .create_alert(&new_alert(AlertKind::Unauthorized, None))
            .await
            .unwrap();
        let dest = Destinations {
            admin_email: "admin@sistema.com".into(),
            telegram_chat_id: String::new(),
        };
        store.fan_out(a.id, &dest, false).await.unwrap();
        assert_eq!(store.get_alert(a.id).await.unwrap().notifications.len(), 2);

        store.delete_alert(a.id, None).await.unwrap();
        assert!(store.pending_notifications(a.id).await.unwrap().is_empty());
        assert!(matches!(
            store.get_alert(a.id).await,
            Err(StoreError::NotFound("alert"))
        ));
    }
}
