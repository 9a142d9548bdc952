//! Access events: one row per recognised person at a control point.

use crate::{parse_col, exists, page_of, to_ts, ts_col, Filter, Result, Store, StoreError};
use chrono::{DateTime, Utc};
use facegate_core::types::{AccessEvent, Decision, EvidenceRef, Page, PageRequest, PersonRef, PointRef};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

const EVENT_SELECT: &str = "SELECT e.id, e.uuid, e.decision, e.score, e.liveness_ok, e.created_at, \
     u.id, u.first_name, u.last_name, u.document, \
     p.id, p.name, z.name, \
     ev.id, ev.path, ev.mime_type, ev.size_bytes \
     FROM access_events e \
     JOIN users u ON u.id = e.user_id \
     JOIN control_points p ON p.id = e.point_id \
     JOIN zones z ON z.id = p.zone_id \
     LEFT JOIN evidence ev ON ev.id = e.evidence_id";

const EVENT_COUNT: &str = "SELECT COUNT(*) FROM access_events e \
     JOIN control_points p ON p.id = e.point_id";

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<AccessEvent> {
    let evidence_id: Option<i64> = row.get(13)?;
    let evidence = match evidence_id {
        Some(id) => Some(EvidenceRef {
            id,
            path: row.get(14)?,
            mime_type: row.get(15)?,
            size_bytes: row.get(16)?,
        }),
        None => None,
    };
    Ok(AccessEvent {
        id: row.get(0)?,
        uuid: row.get(1)?,
        decision: parse_col(row, 2)?,
        score: row.get(3)?,
        liveness_ok: row.get(4)?,
        created_at: ts_col(row, 5)?,
        user: PersonRef {
            id: row.get(6)?,
            first_name: row.get(7)?,
            last_name: row.get(8)?,
            document: row.get(9)?,
        },
        point: PointRef {
            id: row.get(10)?,
            name: row.get(11)?,
            zone_name: row.get(12)?,
        },
        evidence,
    })
}

/// Newest events matching `filter`, at most `limit`.
pub(crate) fn latest_events(conn: &Connection, filter: &Filter, limit: i64) -> rusqlite::Result<Vec<AccessEvent>> {
    let mut stmt = conn.prepare(&format!(
        "{EVENT_SELECT}{} ORDER BY e.created_at DESC, e.id DESC LIMIT ?",
        filter.where_sql()
    ))?;
    let mut params: Vec<Value> = filter.params().to_vec();
    params.push(Value::Integer(limit));
    let rows = stmt.query_map(params_from_iter(params), event_from_row)?;
    rows.collect()
}

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub user_id: Option<i64>,
    pub point_id: Option<i64>,
    pub zone_id: Option<i64>,
    pub decision: Option<Decision>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl EventFilter {
    fn to_filter(&self) -> Filter {
        let mut f = Filter::default();
        if let Some(id) = self.user_id {
            f.eq("e.user_id = ?", id);
        }
        if let Some(id) = self.point_id {
            f.eq("e.point_id = ?", id);
        }
        if let Some(id) = self.zone_id {
            f.eq("p.zone_id = ?", id);
        }
        if let Some(decision) = self.decision {
            f.eq("e.decision = ?", decision.as_str().to_string());
        }
        if let Some(from) = self.from {
            f.eq("e.created_at >= ?", to_ts(from));
        }
        if let Some(to) = self.to {
            f.eq("e.created_at <= ?", to_ts(to));
        }
        f
    }
}

/// An access event to store.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub user_id: i64,
    pub point_id: i64,
    pub decision: Decision,
    pub score: Option<f64>,
    pub liveness_ok: Option<bool>,
    pub evidence_id: Option<i64>,
}

impl Store {
    pub async fn list_events(&self, filter: EventFilter, page: PageRequest) -> Result<Page<AccessEvent>> {
        self.call(move |conn| {
            let f = filter.to_filter();
            let total: i64 = conn.query_row(
                &format!("{EVENT_COUNT}{}", f.where_sql()),
                params_from_iter(f.params()),
                |row| row.get(0),
            )?;
            let mut stmt = conn.prepare(&format!(
                "{EVENT_SELECT}{} ORDER BY e.created_at DESC, e.id DESC LIMIT ? OFFSET ?",
                f.where_sql()
            ))?;
            let items = stmt
                .query_map(params_from_iter(f.paged_params(page)), event_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(page_of(items, page, total))
        })
        .await
    }

    pub async fn record_event(&self, event: NewEvent) -> Result<AccessEvent> {
        self.call(move |conn| {
            let tx = conn.transaction()?;
            if !exists(&tx, "users", event.user_id)? {
                return Err(StoreError::Invalid("user does not exist".into()));
            }
            if !exists(&tx, "control_points", event.point_id)? {
                return Err(StoreError::Invalid("control point does not exist".into()));
            }
            if let Some(evidence) = event.evidence_id {
                if !exists(&tx, "evidence", evidence)? {
                    return Err(StoreError::Invalid("evidence does not exist".into()));
                }
            }
            tx.execute(
                "INSERT INTO access_events
                    (uuid, user_id, point_id, decision, score, liveness_ok, evidence_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    uuid::Uuid::new_v4().to_string(),
                    event.user_id,
                    event.point_id,
                    event.decision.as_str(),
                    event.score,
                    event.liveness_ok,
                    event.evidence_id,
                    to_ts(Utc::now()),
                ],
            )?;
            let id = tx.last_insert_rowid();
            let stored = tx
                .query_row(&format!("{EVENT_SELECT} WHERE e.id = ?1"), [id], event_from_row)
                .optional()?
                .ok_or(StoreError::NotFound("access event"))?;
            tx.commit()?;
            Ok(stored)
        })
        .await
    }
}
