//! Audit trail. Mutating repositories append entries inside their own
//! transaction so the trail never disagrees with the data.

use crate::{parse_col, page_of, to_ts, ts_col, Filter, Result, Store};
use chrono::Utc;
use facegate_core::types::{AuditAction, AuditEntry, Page, PageRequest};
use rusqlite::{params, params_from_iter, Connection};

#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub user_id: Option<i64>,
    pub action: AuditAction,
    pub table_name: &'static str,
    pub record_id: Option<i64>,
    pub field: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl AuditRecord {
    pub fn new(
        user_id: Option<i64>,
        action: AuditAction,
        table_name: &'static str,
        record_id: Option<i64>,
    ) -> Self {
        Self {
            user_id,
            action,
            table_name,
            record_id,
            field: None,
            old_value: None,
            new_value: None,
        }
    }

    /// Record a single field change.
    pub fn change(mut self, field: &str, old: Option<String>, new: Option<String>) -> Self {
        self.field = Some(field.to_string());
        self.old_value = old;
        self.new_value = new;
        self
    }

    pub fn value(mut self, new: impl Into<String>) -> Self {
        self.new_value = Some(new.into());
        self
    }
}

pub(crate) fn write(conn: &Connection, rec: &AuditRecord) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO audit_log
            (user_id, action, table_name, record_id, field, old_value, new_value, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            rec.user_id,
            rec.action.as_str(),
            rec.table_name,
            rec.record_id,
            rec.field,
            rec.old_value,
            rec.new_value,
            to_ts(Utc::now()),
        ],
    )?;
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub user_id: Option<i64>,
    pub action: Option<AuditAction>,
    pub table_name: Option<String>,
}

impl Store {
    pub async fn append_audit(&self, rec: AuditRecord) -> Result<()> {
        self.call(move |conn| Ok(write(conn, &rec)?)).await
    }

    /// Newest entries first.
    pub async fn list_audit(&self, filter: AuditFilter, page: PageRequest) -> Result<Page<AuditEntry>> {
        self.call(move |conn| {
            let mut f = Filter::default();
            if let Some(id) = filter.user_id {
                f.eq("user_id = ?", id);
            }
            if let Some(action) = filter.action {
                f.eq("action = ?", action.as_str().to_string());
            }
            if let Some(table) = filter.table_name {
                f.eq("table_name = ?", table);
            }
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM audit_log{}", f.where_sql()),
                params_from_iter(f.params()),
                |row| row.get(0),
            )?;
            let mut stmt = conn.prepare(&format!(
                "SELECT id, user_id, action, table_name, record_id, field, old_value, new_value, created_at
                 FROM audit_log{} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
                f.where_sql()
            ))?;
            let items = stmt
                .query_map(params_from_iter(f.paged_params(page)), |row| {
                    Ok(AuditEntry {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        action: parse_col(row, 2)?,
                        table_name: row.get(3)?,
                        record_id: row.get(4)?,
                        field: row.get(5)?,
                        old_value: row.get(6)?,
                        new_value: row.get(7)?,
                        created_at: ts_col(row, 8)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(page_of(items, page, total))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[tokio::test]
    async fn test_append_and_list_newest_first() {
        let store = testutil::store().await;
        store
            .append_audit(AuditRecord::new(Some(1), AuditAction::Login, "users", Some(1)).value("10.0.0.1"))
            .await
            .unwrap();
        store
            .append_audit(AuditRecord::new(Some(1), AuditAction::Logout, "users", Some(1)))
            .await
            .unwrap();

        let page = store
            .list_audit(AuditFilter::default(), PageRequest::new(None, None, 50))
            .await
            .unwrap();
        assert_eq!(page.items[0].action, AuditAction::Logout);
        assert_eq!(page.items[1].new_value.as_deref(), Some("10.0.0.1"));
    }

    #[tokio::test]
    async fn test_filter_by_action() {
        let store = testutil::store().await;
        testutil::user(&store, "Ana", "D1").await;
        store
            .append_audit(AuditRecord::new(None, AuditAction::Login, "users", Some(1)))
            .await
            .unwrap();
        let page = store
            .list_audit(
                AuditFilter {
                    action: Some(AuditAction::Login),
                    ..Default::default()
                },
                PageRequest::new(None, None, 50),
            )
            .await
            .unwrap();
        assert_eq!(page.pagination.total, 1);
    }
}
