//! Time-window access rules.

use crate::audit::{self, AuditRecord};
use crate::error::conflict_on_unique;
use crate::{parse_col, to_ts, ts_col, Filter, Result, Store, StoreError};
use chrono::Utc;
use facegate_core::schedule::weekday_name;
use facegate_core::types::{AccessRule, AccessRuleView, AuditAction, NamedRef, PersonRef};
use facegate_core::validate::{RulePatchSpec, RuleSpec};
use facegate_core::ValidationError;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

const RULE_SELECT: &str = "SELECT r.id, r.user_id, r.zone_id, r.start_time, r.end_time, r.weekday, \
     r.active, r.created_at, u.first_name, u.last_name, u.document, z.name \
     FROM access_rules r \
     JOIN users u ON u.id = r.user_id \
     JOIN zones z ON z.id = r.zone_id";

const DUPLICATE_RULE: &str = "a rule for this user, zone and day already exists";

fn rule_from_row(row: &Row<'_>) -> rusqlite::Result<AccessRule> {
    Ok(AccessRule {
        id: row.get(0)?,
        user_id: row.get(1)?,
        zone_id: row.get(2)?,
        start: parse_col(row, 3)?,
        end: parse_col(row, 4)?,
        weekday: row.get(5)?,
        active: row.get(6)?,
        created_at: ts_col(row, 7)?,
    })
}

fn view_from_row(row: &Row<'_>) -> rusqlite::Result<AccessRuleView> {
    let rule = rule_from_row(row)?;
    Ok(AccessRuleView {
        user: PersonRef {
            id: rule.user_id,
            first_name: row.get(8)?,
            last_name: row.get(9)?,
            document: row.get(10)?,
        },
        zone: NamedRef {
            id: rule.zone_id,
            name: row.get(11)?,
        },
        day_name: weekday_name(rule.weekday).to_string(),
        rule,
    })
}

#[derive(Debug, Clone, Default)]
pub struct RuleFilter {
    pub user_id: Option<i64>,
    pub zone_id: Option<i64>,
    pub active: Option<bool>,
}

pub(crate) fn rule_views(conn: &Connection, filter: &RuleFilter) -> rusqlite::Result<Vec<AccessRuleView>> {
    let mut f = Filter::default();
    if let Some(id) = filter.user_id {
        f.eq("r.user_id = ?", id);
    }
    if let Some(id) = filter.zone_id {
        f.eq("r.zone_id = ?", id);
    }
    if let Some(active) = filter.active {
        f.eq("r.active = ?", active);
    }
    let mut stmt = conn.prepare(&format!(
        "{RULE_SELECT}{} ORDER BY u.first_name, u.last_name, z.name, r.weekday, r.id",
        f.where_sql()
    ))?;
    let rows = stmt.query_map(params_from_iter(f.params()), view_from_row)?;
    rows.collect()
}

fn load_view(conn: &Connection, id: i64) -> rusqlite::Result<Option<AccessRuleView>> {
    conn.query_row(&format!("{RULE_SELECT} WHERE r.id = ?1"), [id], view_from_row)
        .optional()
}

fn ensure_active(conn: &Connection, table: &str, id: i64, what: &str) -> Result<()> {
    let active: Option<bool> = conn
        .query_row(&format!("SELECT active FROM {table} WHERE id = ?1"), [id], |row| {
            row.get(0)
        })
        .optional()?;
    match active {
        Some(true) => Ok(()),
        Some(false) => Err(StoreError::Invalid(format!("{what} is inactive"))),
        None => Err(StoreError::Invalid(format!("{what} does not exist"))),
    }
}

fn ensure_no_duplicate(conn: &Connection, user_id: i64, zone_id: i64, weekday: Option<u8>, except: i64) -> Result<()> {
    let dup: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM access_rules
            WHERE user_id = ?1 AND zone_id = ?2 AND IFNULL(weekday, -1) = IFNULL(?3, -1) AND id != ?4)",
        params![user_id, zone_id, weekday, except],
        |row| row.get(0),
    )?;
    if dup {
        return Err(StoreError::Conflict(DUPLICATE_RULE.into()));
    }
    Ok(())
}

impl Store {
    pub async fn list_rules(&self, filter: RuleFilter) -> Result<Vec<AccessRuleView>> {
        self.call(move |conn| Ok(rule_views(conn, &filter)?)).await
    }

    pub async fn get_rule(&self, id: i64) -> Result<AccessRuleView> {
        self.call(move |conn| load_view(conn, id)?.ok_or(StoreError::NotFound("access rule")))
            .await
    }

    /// Active and inactive rules of `user_id` for `zone_id`.
    pub async fn rules_for(&self, user_id: i64, zone_id: i64) -> Result<Vec<AccessRule>> {
        self.call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{RULE_SELECT} WHERE r.user_id = ?1 AND r.zone_id = ?2 ORDER BY r.id"
            ))?;
            let rows = stmt.query_map([user_id, zone_id], rule_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    /// The user and zone must exist and be active; one rule per day.
    pub async fn create_rule(&self, spec: &RuleSpec, actor: Option<i64>) -> Result<AccessRuleView> {
        if spec.start >= spec.end {
            return Err(ValidationError::single("end", "must be later than start").into());
        }
        let spec = spec.clone();
        self.call(move |conn| {
            let tx = conn.transaction()?;
            ensure_active(&tx, "users", spec.user_id, "user")?;
            ensure_active(&tx, "zones", spec.zone_id, "zone")?;
            ensure_no_duplicate(&tx, spec.user_id, spec.zone_id, spec.weekday, 0)?;
            tx.execute(
                "INSERT INTO access_rules (user_id, zone_id, start_time, end_time, weekday, active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    spec.user_id,
                    spec.zone_id,
                    spec.start.to_string(),
                    spec.end.to_string(),
                    spec.weekday,
                    spec.active,
                    to_ts(Utc::now()),
                ],
            )
            .map_err(|e| conflict_on_unique(e, DUPLICATE_RULE))?;
            let id = tx.last_insert_rowid();
            audit::write(
                &tx,
                &AuditRecord::new(actor, AuditAction::Insert, "access_rules", Some(id)).value(format!(
                    "user {} zone {} {}-{} {}",
                    spec.user_id,
                    spec.zone_id,
                    spec.start,
                    spec.end,
                    weekday_name(spec.weekday)
                )),
            )?;
            let view = load_view(&tx, id)?.ok_or(StoreError::NotFound("access rule"))?;
            tx.commit()?;
            tracing::info!(rule_id = id, user_id = spec.user_id, zone_id = spec.zone_id, "access rule created");
            Ok(view)
        })
        .await
    }

    /// Partial update. The merged window must still have start < end.
    pub async fn update_rule(&self, id: i64, patch: &RulePatchSpec, actor: Option<i64>) -> Result<AccessRuleView> {
        let patch = patch.clone();
        self.call(move |conn| {
            let tx = conn.transaction()?;
            let current = load_view(&tx, id)?.ok_or(StoreError::NotFound("access rule"))?.rule;
            let start = patch.start.unwrap_or(current.start);
            let end = patch.end.unwrap_or(current.end);
            let weekday = patch.weekday.unwrap_or(current.weekday);
            let active = patch.active.unwrap_or(current.active);
            if start >= end {
                return Err(ValidationError::single("end", "must be later than start").into());
            }
            if weekday != current.weekday {
                ensure_no_duplicate(&tx, current.user_id, current.zone_id, weekday, id)?;
            }
            tx.execute(
                "UPDATE access_rules SET start_time = ?1, end_time = ?2, weekday = ?3, active = ?4
                 WHERE id = ?5",
                params![start.to_string(), end.to_string(), weekday, active, id],
            )
            .map_err(|e| conflict_on_unique(e, DUPLICATE_RULE))?;

            let base = AuditRecord::new(actor, AuditAction::Update, "access_rules", Some(id));
            let changes = [
                ("start_time", current.start.to_string(), start.to_string()),
                ("end_time", current.end.to_string(), end.to_string()),
                (
                    "weekday",
                    weekday_name(current.weekday).to_string(),
                    weekday_name(weekday).to_string(),
                ),
                ("active", current.active.to_string(), active.to_string()),
            ];
            for (field, old, new) in changes {
                if old != new {
                    audit::write(&tx, &base.clone().change(field, Some(old), Some(new)))?;
                }
            }
            let view = load_view(&tx, id)?.ok_or(StoreError::NotFound("access rule"))?;
            tx.commit()?;
            Ok(view)
        })
        .await
    }

    pub async fn delete_rule(&self, id: i64, actor: Option<i64>) -> Result<()> {
        self.call(move |conn| {
            let tx = conn.transaction()?;
            let view = load_view(&tx, id)?.ok_or(StoreError::NotFound("access rule"))?;
            tx.execute("DELETE FROM access_rules WHERE id = ?1", [id])?;
            audit::write(
                &tx,
                &AuditRecord::new(actor, AuditAction::Delete, "access_rules", Some(id)).change(
                    "rule",
                    Some(format!(
                        "user {} zone {} {}-{} {}",
                        view.rule.user_id, view.rule.zone_id, view.rule.start, view.rule.end, view.day_name
                    )),
                    None,
                ),
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }
}
