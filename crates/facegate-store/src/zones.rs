//! Security zones and their per-zone settings.

use crate::audit::{self, AuditRecord};
use crate::error::conflict_on_unique;
use crate::events::latest_events;
use crate::points::point_summaries;
use crate::stats::{zone_counters, Bounds};
use crate::{exists, to_ts, ts_col, Filter, Result, Store, StoreError};
use chrono::Utc;
use facegate_core::settings::ZoneSettings;
use facegate_core::types::{AuditAction, Zone, ZoneCounts, ZoneDetail, ZoneSummary, ZoneTotals};
use facegate_core::validate::{NewZone, ZoneUpdate};
use rusqlite::{params, Connection, OptionalExtension, Row};

const ZONE_SELECT: &str = "SELECT z.id, z.name, z.description, z.active, z.created_at FROM zones z";

const DUPLICATE_NAME: &str = "a zone with this name already exists";

fn zone_from_row(row: &Row<'_>) -> rusqlite::Result<Zone> {
    Ok(Zone {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        active: row.get(3)?,
        created_at: ts_col(row, 4)?,
    })
}

pub(crate) fn load_zone(conn: &Connection, id: i64) -> rusqlite::Result<Option<Zone>> {
    conn.query_row(&format!("{ZONE_SELECT} WHERE z.id = ?1"), [id], zone_from_row)
        .optional()
}

fn name_taken(conn: &Connection, name: &str, except: i64) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM zones WHERE name = ?1 AND id != ?2)",
        params![name, except],
        |row| row.get(0),
    )
}

fn count_where(conn: &Connection, sql: &str, id: i64) -> rusqlite::Result<i64> {
    conn.query_row(sql, [id], |row| row.get(0))
}

pub(crate) fn load_settings(conn: &Connection, zone_id: i64) -> Result<ZoneSettings> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT settings FROM zone_settings WHERE zone_id = ?1",
            [zone_id],
            |row| row.get(0),
        )
        .optional()?;
    match raw {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Ok(ZoneSettings::default()),
    }
}

impl Store {
    /// Zones by name with point and rule counts, optionally with their points.
    pub async fn list_zones(&self, include_points: bool) -> Result<Vec<ZoneSummary>> {
        self.call(move |conn| {
            let zones = {
                let mut stmt = conn.prepare(
                    "SELECT z.id, z.name, z.description, z.active, z.created_at,
                        (SELECT COUNT(*) FROM control_points p WHERE p.zone_id = z.id),
                        (SELECT COUNT(*) FROM access_rules r WHERE r.zone_id = z.id)
                     FROM zones z ORDER BY z.name",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(ZoneSummary {
                        zone: zone_from_row(row)?,
                        counts: ZoneCounts {
                            control_points: row.get(5)?,
                            access_rules: row.get(6)?,
                        },
                        control_points: None,
                    })
                })?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };
            if !include_points {
                return Ok(zones);
            }
            let mut points = point_summaries(conn, None)?;
            Ok(zones
                .into_iter()
                .map(|mut z| {
                    let (mine, rest): (Vec<_>, Vec<_>) =
                        points.drain(..).partition(|p| p.point.zone.id == z.zone.id);
                    points = rest;
                    z.control_points = Some(mine);
                    z
                })
                .collect())
        })
        .await
    }

    pub async fn get_zone(&self, id: i64) -> Result<Zone> {
        self.call(move |conn| load_zone(conn, id)?.ok_or(StoreError::NotFound("zone")))
            .await
    }

    pub async fn create_zone(&self, form: &NewZone, actor: Option<i64>) -> Result<Zone> {
        form.validate()?;
        let form = form.clone();
        self.call(move |conn| {
            let tx = conn.transaction()?;
            if name_taken(&tx, &form.name, 0)? {
                return Err(StoreError::Conflict(DUPLICATE_NAME.into()));
            }
            tx.execute(
                "INSERT INTO zones (name, description, active, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![form.name, form.description, form.active, to_ts(Utc::now())],
            )
            .map_err(|e| conflict_on_unique(e, DUPLICATE_NAME))?;
            let id = tx.last_insert_rowid();
            audit::write(
                &tx,
                &AuditRecord::new(actor, AuditAction::Insert, "zones", Some(id)).value(form.name.clone()),
            )?;
            let zone = load_zone(&tx, id)?.ok_or(StoreError::NotFound("zone"))?;
            tx.commit()?;
            tracing::info!(zone_id = id, name = %zone.name, "zone created");
            Ok(zone)
        })
        .await
    }

    pub async fn update_zone(&self, id: i64, form: &ZoneUpdate, actor: Option<i64>) -> Result<Zone> {
        form.validate()?;
        let form = form.clone();
        self.call(move |conn| {
            let tx = conn.transaction()?;
            let current = load_zone(&tx, id)?.ok_or(StoreError::NotFound("zone"))?;
            if name_taken(&tx, &form.name, id)? {
                return Err(StoreError::Conflict(DUPLICATE_NAME.into()));
            }
            tx.execute(
                "UPDATE zones SET name = ?1, description = ?2, active = ?3 WHERE id = ?4",
                params![form.name, form.description, form.active, id],
            )
            .map_err(|e| conflict_on_unique(e, DUPLICATE_NAME))?;
            audit::write(
                &tx,
                &AuditRecord::new(actor, AuditAction::Update, "zones", Some(id)).change(
                    "name",
                    Some(current.name),
                    Some(form.name.clone()),
                ),
            )?;
            let zone = load_zone(&tx, id)?.ok_or(StoreError::NotFound("zone"))?;
            tx.commit()?;
            Ok(zone)
        })
        .await
    }

    /// Delete a zone with its rules, control points and their access events.
    pub async fn delete_zone(&self, id: i64, actor: Option<i64>) -> Result<()> {
        self.call(move |conn| {
            let tx = conn.transaction()?;
            let zone = load_zone(&tx, id)?.ok_or(StoreError::NotFound("zone"))?;
            tx.execute(
                "DELETE FROM access_events
                 WHERE point_id IN (SELECT id FROM control_points WHERE zone_id = ?1)",
                [id],
            )?;
            tx.execute("DELETE FROM access_rules WHERE zone_id = ?1", [id])?;
            tx.execute("DELETE FROM control_points WHERE zone_id = ?1", [id])?;
            tx.execute("DELETE FROM zones WHERE id = ?1", [id])?;
            audit::write(
                &tx,
                &AuditRecord::new(actor, AuditAction::Delete, "zones", Some(id)).change(
                    "name",
                    Some(zone.name),
                    None,
                ),
            )?;
            tx.commit()?;
            tracing::info!(zone_id = id, "zone deleted");
            Ok(())
        })
        .await
    }

    pub async fn zone_detail(&self, id: i64, bounds: Bounds) -> Result<ZoneDetail> {
        self.call(move |conn| {
            let zone = load_zone(conn, id)?.ok_or(StoreError::NotFound("zone"))?;
            let control_points = point_summaries(conn, Some(id))?;
            let stats = zone_counters(conn, id, &bounds)?;
            let mut f = Filter::default();
            f.eq("p.zone_id = ?", id);
            let recent_events = latest_events(conn, &f, 10)?;
            let totals = ZoneTotals {
                control_points: count_where(
                    conn,
                    "SELECT COUNT(*) FROM control_points WHERE zone_id = ?1",
                    id,
                )?,
                access_rules: count_where(conn, "SELECT COUNT(*) FROM access_rules WHERE zone_id = ?1", id)?,
                access_events: count_where(
                    conn,
                    "SELECT COUNT(*) FROM access_events e JOIN control_points p ON p.id = e.point_id
                     WHERE p.zone_id = ?1",
                    id,
                )?,
                alerts: count_where(
                    conn,
                    "SELECT COUNT(*) FROM alerts a JOIN control_points p ON p.id = a.point_id
                     WHERE p.zone_id = ?1",
                    id,
                )?,
            };
            Ok(ZoneDetail {
                zone,
                control_points,
                stats,
                recent_events,
                totals,
            })
        })
        .await
    }

    /// Stored settings, or the defaults when the zone was never configured.
    pub async fn zone_settings(&self, zone_id: i64) -> Result<ZoneSettings> {
        self.call(move |conn| {
            if !exists(conn, "zones", zone_id)? {
                return Err(StoreError::NotFound("zone"));
            }
            load_settings(conn, zone_id)
        })
        .await
    }

    pub async fn put_zone_settings(
        &self,
        zone_id: i64,
        settings: &ZoneSettings,
        actor: Option<i64>,
    ) -> Result<ZoneSettings> {
        settings.validate()?;
        let json = serde_json::to_string(settings)?;
        let settings = settings.clone();
        self.call(move |conn| {
            let tx = conn.transaction()?;
            if !exists(&tx, "zones", zone_id)? {
                return Err(StoreError::NotFound("zone"));
            }
            tx.execute(
                "INSERT INTO zone_settings (zone_id, settings, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(zone_id) DO UPDATE SET
                    settings = excluded.settings,
                    updated_at = excluded.updated_at",
                params![zone_id, json, to_ts(Utc::now())],
            )?;
            audit::write(
                &tx,
                &AuditRecord::new(actor, AuditAction::Update, "zone_settings", Some(zone_id)).value(json),
            )?;
            tx.commit()?;
            Ok(settings)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NewEvent;
    use crate::testutil;
    use facegate_core::types::Decision;

    fn zone_form(name: &str) -> NewZone {
        NewZone {
            name: name.into(),
            description: Some("ground floor".into()),
            active: true,
        }
    }

    #[tokio::test]
    async fn test_unique_name() {
        let store = testutil::store().await;
        store.create_zone(&zone_form("Lobby"), None).await.unwrap();
        assert!(matches!(
            store.create_zone(&zone_form("Lobby"), None).await,
            Err(StoreError::Conflict(_))
        ));
        let lab = store.create_zone(&zone_form("Lab"), None).await.unwrap();
        assert!(matches!(
            store.update_zone(lab.id, &zone_form("Lobby"), None).await,
            Err(StoreError::Conflict(_))
        ));
        assert!(store.update_zone(lab.id, &zone_form("Lab"), None).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_with_points() {
        let store = testutil::store().await;
        let lobby = testutil::zone(&store, "Lobby").await;
        let lab = testutil::zone(&store, "Lab").await;
        testutil::point(&store, lobby, "Main door").await;
        testutil::point(&store, lobby, "Side door").await;

        let zones = store.list_zones(true).await.unwrap();
        assert_eq!(zones[0].zone.name, "Lab");
        assert_eq!(zones[0].control_points.as_ref().unwrap().len(), 0);
        assert_eq!(zones[1].counts.control_points, 2);
        assert_eq!(zones[1].control_points.as_ref().unwrap().len(), 2);

        let bare = store.list_zones(false).await.unwrap();
        assert!(bare.iter().all(|z| z.control_points.is_none()));
        assert_eq!(bare.iter().find(|z| z.zone.id == lab).unwrap().counts.access_rules, 0);
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let store = testutil::store().await;
        let user = testutil::user(&store, "Ana", "100").await;
        let zone = testutil::zone(&store, "Lobby").await;
        let point = testutil::point(&store, zone, "Main door").await;
        store
            .record_event(NewEvent {
                user_id: user,
                point_id: point,
                decision: Decision::Granted,
                score: None,
                liveness_ok: None,
                evidence_id: None,
            })
            .await
            .unwrap();

        store.delete_zone(zone, None).await.unwrap();
        assert!(store.list_points(None).await.unwrap().is_empty());
        let user = store.get_user(user).await.unwrap();
        assert_eq!(user.counts.access_events, 0);
        assert!(matches!(store.get_zone(zone).await, Err(StoreError::NotFound("zone"))));
    }

    #[tokio::test]
    async fn test_detail_stats() {
        let store = testutil::store().await;
        let ana = testutil::user(&store, "Ana", "100").await;
        let bob = testutil::user(&store, "Bob", "200").await;
        let zone = testutil::zone(&store, "Lobby").await;
        let point = testutil::point(&store, zone, "Main door").await;
        for user in [ana, ana, bob] {
            store
                .record_event(NewEvent {
                    user_id: user,
                    point_id: point,
                    decision: Decision::Granted,
                    score: None,
                    liveness_ok: None,
                    evidence_id: None,
                })
                .await
                .unwrap();
        }
        let detail = store.zone_detail(zone, Bounds::at(Utc::now())).await.unwrap();
        assert_eq!(detail.stats.accesses_today, 3);
        assert_eq!(detail.stats.unique_users_this_week, 2);
        assert_eq!(detail.totals.access_events, 3);
        assert_eq!(detail.recent_events.len(), 3);
        assert_eq!(detail.control_points.len(), 1);
    }

    #[tokio::test]
    async fn test_settings_default_and_put() {
        let store = testutil::store().await;
        let zone = testutil::zone(&store, "Lobby").await;
        assert_eq!(store.zone_settings(zone).await.unwrap(), ZoneSettings::default());

        let custom = ZoneSettings {
            min_confidence: 95,
            notify_admin: false,
            ..Default::default()
        };
        store.put_zone_settings(zone, &custom, None).await.unwrap();
        assert_eq!(store.zone_settings(zone).await.unwrap(), custom);

        let invalid = ZoneSettings {
            min_confidence: 20,
            ..Default::default()
        };
        assert!(matches!(
            store.put_zone_settings(zone, &invalid, None).await,
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            store.zone_settings(999).await,
            Err(StoreError::NotFound("zone"))
        ));
    }
}
