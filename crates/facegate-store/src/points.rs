//! Control points (doors, turnstiles) and their camera settings.

use crate::audit::{self, AuditRecord};
use crate::events::latest_events;
use crate::{exists, to_ts, ts_col, Filter, Result, Store, StoreError};
use chrono::Utc;
use facegate_core::types::{
    AuditAction, CameraInfo, ControlPoint, ControlPointDetail, ControlPointSummary, NamedRef,
    PointCounts,
};
use facegate_core::validate::{ControlPointPatch, NewControlPoint};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

const POINT_COLUMNS: &str = "p.id, p.name, p.zone_id, z.name, p.type_id, t.name, p.location, \
     p.active, p.camera_url, p.camera_user, p.camera_secret IS NOT NULL, p.stream_type, p.created_at";

const POINT_COUNTS: &str = "(SELECT COUNT(*) FROM access_events e WHERE e.point_id = p.id), \
     (SELECT COUNT(*) FROM alerts a WHERE a.point_id = p.id)";

const POINT_FROM: &str = "FROM control_points p \
     JOIN zones z ON z.id = p.zone_id \
     JOIN point_types t ON t.id = p.type_id";

fn point_from_row(row: &Row<'_>) -> rusqlite::Result<ControlPoint> {
    Ok(ControlPoint {
        id: row.get(0)?,
        name: row.get(1)?,
        zone: NamedRef {
            id: row.get(2)?,
            name: row.get(3)?,
        },
        point_type: NamedRef {
            id: row.get(4)?,
            name: row.get(5)?,
        },
        location: row.get(6)?,
        active: row.get(7)?,
        camera: CameraInfo {
            url: row.get(8)?,
            user: row.get(9)?,
            has_password: row.get(10)?,
            stream_type: row.get(11)?,
        },
        created_at: ts_col(row, 12)?,
    })
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<ControlPointSummary> {
    Ok(ControlPointSummary {
        point: point_from_row(row)?,
        counts: PointCounts {
            access_events: row.get(13)?,
            alerts: row.get(14)?,
        },
    })
}

pub(crate) fn load_point(conn: &Connection, id: i64) -> rusqlite::Result<Option<ControlPoint>> {
    conn.query_row(
        &format!("SELECT {POINT_COLUMNS} {POINT_FROM} WHERE p.id = ?1"),
        [id],
        point_from_row,
    )
    .optional()
}

pub(crate) fn point_summaries(conn: &Connection, zone_id: Option<i64>) -> rusqlite::Result<Vec<ControlPointSummary>> {
    let mut f = Filter::default();
    if let Some(id) = zone_id {
        f.eq("p.zone_id = ?", id);
    }
    let mut stmt = conn.prepare(&format!(
        "SELECT {POINT_COLUMNS}, {POINT_COUNTS} {POINT_FROM}{} ORDER BY z.name, p.name",
        f.where_sql()
    ))?;
    let rows = stmt.query_map(params_from_iter(f.params()), summary_from_row)?;
    rows.collect()
}

fn check_refs(conn: &Connection, zone_id: Option<i64>, type_id: Option<i64>) -> Result<()> {
    if let Some(zone) = zone_id {
        if !exists(conn, "zones", zone)? {
            return Err(StoreError::Invalid("zone does not exist".into()));
        }
    }
    if let Some(kind) = type_id {
        if !exists(conn, "point_types", kind)? {
            return Err(StoreError::Invalid("control point type does not exist".into()));
        }
    }
    Ok(())
}

/// Camera settings to store. `sealed_password: None` keeps the current one.
#[derive(Debug, Clone, Default)]
pub struct CameraUpdate {
    pub url: Option<String>,
    pub user: Option<String>,
    pub sealed_password: Option<Vec<u8>>,
    pub stream_type: Option<String>,
}

impl Store {
    pub async fn list_points(&self, zone_id: Option<i64>) -> Result<Vec<ControlPointSummary>> {
        self.call(move |conn| Ok(point_summaries(conn, zone_id)?)).await
    }

    pub async fn get_point(&self, id: i64) -> Result<ControlPoint> {
        self.call(move |conn| load_point(conn, id)?.ok_or(StoreError::NotFound("control point")))
            .await
    }

    /// A control point with activity counts and its last 10 access events.
    pub async fn point_detail(&self, id: i64) -> Result<ControlPointDetail> {
        self.call(move |conn| {
            let summary = conn
                .query_row(
                    &format!("SELECT {POINT_COLUMNS}, {POINT_COUNTS} {POINT_FROM} WHERE p.id = ?1"),
                    [id],
                    summary_from_row,
                )
                .optional()?
                .ok_or(StoreError::NotFound("control point"))?;
            let mut f = Filter::default();
            f.eq("e.point_id = ?", id);
            let recent_events = latest_events(conn, &f, 10)?;
            Ok(ControlPointDetail {
                point: summary.point,
                counts: summary.counts,
                recent_events,
            })
        })
        .await
    }

    pub async fn create_point(&self, form: &NewControlPoint, actor: Option<i64>) -> Result<ControlPoint> {
        form.validate()?;
        let form = form.clone();
        self.call(move |conn| {
            let tx = conn.transaction()?;
            check_refs(&tx, Some(form.zone_id), Some(form.type_id))?;
            tx.execute(
                "INSERT INTO control_points (zone_id, name, type_id, location, active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    form.zone_id,
                    form.name,
                    form.type_id,
                    form.location,
                    form.active,
                    to_ts(Utc::now())
                ],
            )?;
            let id = tx.last_insert_rowid();
            audit::write(
                &tx,
                &AuditRecord::new(actor, AuditAction::Insert, "control_points", Some(id)).value(form.name.clone()),
            )?;
            let point = load_point(&tx, id)?.ok_or(StoreError::NotFound("control point"))?;
            tx.commit()?;
            tracing::info!(point_id = id, zone_id = form.zone_id, "control point created");
            Ok(point)
        })
        .await
    }

    pub async fn update_point(&self, id: i64, patch: &ControlPointPatch, actor: Option<i64>) -> Result<ControlPoint> {
        patch.validate()?;
        let patch = patch.clone();
        self.call(move |conn| {
            let tx = conn.transaction()?;
            if load_point(&tx, id)?.is_none() {
                return Err(StoreError::NotFound("control point"));
            }
            check_refs(&tx, patch.zone_id, patch.type_id)?;

            let mut sets: Vec<&str> = Vec::new();
            let mut values: Vec<Value> = Vec::new();
            if let Some(zone) = patch.zone_id {
                sets.push("zone_id = ?");
                values.push(zone.into());
            }
            if let Some(name) = &patch.name {
                sets.push("name = ?");
                values.push(name.trim().to_string().into());
            }
            if let Some(kind) = patch.type_id {
                sets.push("type_id = ?");
                values.push(kind.into());
            }
            if let Some(location) = &patch.location {
                sets.push("location = ?");
                let location = location
                    .as_deref()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(String::from);
                values.push(location.map_or(Value::Null, Value::Text));
            }
            if let Some(active) = patch.active {
                sets.push("active = ?");
                values.push(active.into());
            }
            if !sets.is_empty() {
                values.push(id.into());
                tx.execute(
                    &format!("UPDATE control_points SET {} WHERE id = ?", sets.join(", ")),
                    params_from_iter(values),
                )?;
                audit::write(
                    &tx,
                    &AuditRecord::new(actor, AuditAction::Update, "control_points", Some(id))
                        .value(sets.iter().map(|s| s.trim_end_matches(" = ?")).collect::<Vec<_>>().join(",")),
                )?;
            }
            let point = load_point(&tx, id)?.ok_or(StoreError::NotFound("control point"))?;
            tx.commit()?;
            Ok(point)
        })
        .await
    }

    pub async fn delete_point(&self, id: i64, actor: Option<i64>) -> Result<()> {
        self.call(move |conn| {
            let tx = conn.transaction()?;
            let point = load_point(&tx, id)?.ok_or(StoreError::NotFound("control point"))?;
            tx.execute("DELETE FROM control_points WHERE id = ?1", [id])?;
            audit::write(
                &tx,
                &AuditRecord::new(actor, AuditAction::Delete, "control_points", Some(id)).change(
                    "name",
                    Some(point.name),
                    None,
                ),
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    pub async fn camera(&self, id: i64) -> Result<CameraInfo> {
        Ok(self.get_point(id).await?.camera)
    }

    pub async fn set_camera(&self, id: i64, camera: CameraUpdate, actor: Option<i64>) -> Result<CameraInfo> {
        self.call(move |conn| {
            let tx = conn.transaction()?;
            if !exists(&tx, "control_points", id)? {
                return Err(StoreError::NotFound("control point"));
            }
            tx.execute(
                "UPDATE control_points
                 SET camera_url = ?1, camera_user = ?2, stream_type = ?3,
                     camera_secret = COALESCE(?4, camera_secret)
                 WHERE id = ?5",
                params![camera.url, camera.user, camera.stream_type, camera.sealed_password, id],
            )?;
            audit::write(
                &tx,
                &AuditRecord::new(actor, AuditAction::Update, "control_points", Some(id))
                    .change("camera", None, camera.url.clone()),
            )?;
            let point = load_point(&tx, id)?.ok_or(StoreError::NotFound("control point"))?;
            tx.commit()?;
            Ok(point.camera)
        })
        .await
    }

    pub async fn clear_camera(&self, id: i64, actor: Option<i64>) -> Result<()> {
        self.call(move |conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE control_points
                 SET camera_url = NULL, camera_user = NULL, camera_secret = NULL, stream_type = NULL
                 WHERE id = ?1",
                [id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound("control point"));
            }
            audit::write(
                &tx,
                &AuditRecord::new(actor, AuditAction::Update, "control_points", Some(id))
                    .change("camera", None, None),
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[tokio::test]
    async fn test_create_requires_zone_and_type() {
        let store = testutil::store().await;
        let form = NewControlPoint {
            zone_id: 99,
            name: "Door".into(),
            type_id: 1,
            location: None,
            active: true,
        };
        assert!(matches!(
            store.create_point(&form, None).await,
            Err(StoreError::Invalid(_))
        ));

        let zone = testutil::zone(&store, "Lobby").await;
        let form = NewControlPoint {
            zone_id: zone,
            type_id: 77,
            ..form
        };
        assert!(matches!(
            store.create_point(&form, None).await,
            Err(StoreError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_list_filters_by_zone() {
        let store = testutil::store().await;
        let lobby = testutil::zone(&store, "Lobby").await;
        let lab = testutil::zone(&store, "Lab").await;
        testutil::point(&store, lobby, "Main door").await;
        testutil::point(&store, lab, "Lab door").await;

        assert_eq!(store.list_points(None).await.unwrap().len(), 2);
        let lab_points = store.list_points(Some(lab)).await.unwrap();
        assert_eq!(lab_points.len(), 1);
        assert_eq!(lab_points[0].point.zone.name, "Lab");
    }

    #[tokio::test]
    async fn test_patch_clears_location() {
        let store = testutil::store().await;
        let zone = testutil::zone(&store, "Lobby").await;
        let id = testutil::point(&store, zone, "Main door").await;
        let patch = ControlPointPatch {
            location: Some(Some("North wing".into())),
            ..Default::default()
        };
        let p = store.update_point(id, &patch, None).await.unwrap();
        assert_eq!(p.location.as_deref(), Some("North wing"));

        let patch = ControlPointPatch {
            location: Some(None),
            active: Some(false),
            ..Default::default()
        };
        let p = store.update_point(id, &patch, None).await.unwrap();
        assert_eq!(p.location, None);
        assert!(!p.active);
    }

    #[tokio::test]
    async fn test_camera_password_is_kept_and_cleared() {
        let store = testutil::store().await;
        let zone = testutil::zone(&store, "Lobby").await;
        let id = testutil::point(&store, zone, "Main door").await;

        let cam = store
            .set_camera(
                id,
                CameraUpdate {
                    url: Some("rtsp://10.0.0.5/stream".into()),
                    user: Some("viewer".into()),
                    sealed_password: Some(vec![1, 2, 3]),
                    stream_type: Some("rtsp".into()),
                },
                None,
            )
            .await
            .unwrap();
        assert!(cam.has_password);

        // Updating without a password keeps the stored one.
        let cam = store
            .set_camera(
                id,
                CameraUpdate {
                    url: Some("rtsp://10.0.0.6/stream".into()),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        assert!(cam.has_password);
        assert_eq!(cam.user, None);

        store.clear_camera(id, None).await.unwrap();
        assert_eq!(store.camera(id).await.unwrap(), CameraInfo::default());
    }

    #[tokio::test]
    async fn test_detail_and_delete() {
        let store = testutil::store().await;
        let zone = testutil::zone(&store, "Lobby").await;
        let id = testutil::point(&store, zone, "Main door").await;
        let detail = store.point_detail(id).await.unwrap();
        assert_eq!(detail.counts.access_events, 0);
        assert!(detail.recent_events.is_empty());

        store.delete_point(id, None).await.unwrap();
        assert!(matches!(
            store.get_point(id).await,
            Err(StoreError::NotFound("control point"))
        ));
    }
}
