//! People known to the console: enrolled employees, visitors and operators.

use crate::audit::{self, AuditRecord};
use crate::error::conflict_on_unique;
use crate::faces::faces_for;
use crate::rules::{rule_views, RuleFilter};
use crate::{exists, opt_ts_col, page_of, to_ts, ts_col, Filter, Result, Store, StoreError};
use chrono::{DateTime, Utc};
use facegate_core::types::{
    AuditAction, NamedRef, Page, PageRequest, User, UserCounts, UserCredentials, UserDetail,
    UserSummary,
};
use facegate_core::validate::{NewUser, UserPatch};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

const USER_COLUMNS: &str = "u.id, u.first_name, u.last_name, u.document, u.email, u.phone, \
     u.role_id, r.name, u.active, u.failed_attempts, u.last_access_at, u.created_at";

const COUNT_COLUMNS: &str = "(SELECT COUNT(*) FROM faces f WHERE f.user_id = u.id), \
     (SELECT COUNT(*) FROM access_events e WHERE e.user_id = u.id), \
     (SELECT COUNT(*) FROM access_rules a WHERE a.user_id = u.id)";

const USER_FROM: &str = "FROM users u JOIN roles r ON r.id = u.role_id";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        document: row.get(3)?,
        email: row.get(4)?,
        phone: row.get(5)?,
        role: NamedRef {
            id: row.get(6)?,
            name: row.get(7)?,
        },
        active: row.get(8)?,
        failed_attempts: row.get(9)?,
        last_access_at: opt_ts_col(row, 10)?,
        created_at: ts_col(row, 11)?,
    })
}

fn counts_from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<UserCounts> {
    Ok(UserCounts {
        faces: row.get(at)?,
        access_events: row.get(at + 1)?,
        access_rules: row.get(at + 2)?,
    })
}

pub(crate) fn load_user(conn: &Connection, id: i64) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} {USER_FROM} WHERE u.id = ?1"),
        [id],
        user_from_row,
    )
    .optional()
}

fn user_counts(conn: &Connection, id: i64) -> rusqlite::Result<UserCounts> {
    conn.query_row(
        &format!("SELECT {COUNT_COLUMNS} FROM users u WHERE u.id = ?1"),
        [id],
        |row| counts_from_row(row, 0),
    )
}

/// Fail with `Conflict` when `column = value` is taken by a user other than `except`.
fn ensure_unique(
    conn: &Connection,
    column: &str,
    value: &str,
    except: Option<i64>,
    message: &str,
) -> Result<()> {
    let taken: bool = conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM users WHERE {column} = ?1 AND id != ?2)"),
        params![value, except.unwrap_or(0)],
        |row| row.get(0),
    )?;
    if taken {
        return Err(StoreError::Conflict(message.to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// Matches first name, last name, document or e-mail.
    pub search: Option<String>,
    pub role_id: Option<i64>,
    pub active: Option<bool>,
}

impl Store {
    pub async fn list_users(&self, filter: UserFilter, page: PageRequest) -> Result<Page<UserSummary>> {
        self.call(move |conn| {
            let mut f = Filter::default();
            if let Some(term) = filter.search.filter(|s| !s.trim().is_empty()) {
                f.repeat(
                    "(u.first_name LIKE ? OR u.last_name LIKE ? OR u.document LIKE ? OR u.email LIKE ?)",
                    format!("%{}%", term.trim()),
                );
            }
            if let Some(role) = filter.role_id {
                f.eq("u.role_id = ?", role);
            }
            if let Some(active) = filter.active {
                f.eq("u.active = ?", active);
            }
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM users u{}", f.where_sql()),
                params_from_iter(f.params()),
                |row| row.get(0),
            )?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS}, {COUNT_COLUMNS} {USER_FROM}{} \
                 ORDER BY u.created_at DESC, u.id DESC LIMIT ? OFFSET ?",
                f.where_sql()
            ))?;
            let items = stmt
                .query_map(params_from_iter(f.paged_params(page)), |row| {
                    Ok(UserSummary {
                        user: user_from_row(row)?,
                        counts: counts_from_row(row, 12)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(page_of(items, page, total))
        })
        .await
    }

    /// A user with role, enrolled faces, access rules and activity counts.
    pub async fn get_user(&self, id: i64) -> Result<UserDetail> {
        self.call(move |conn| {
            let user = load_user(conn, id)?.ok_or(StoreError::NotFound("user"))?;
            let faces = faces_for(conn, id)?;
            let access_rules = rule_views(
                conn,
                &RuleFilter {
                    user_id: Some(id),
                    ..Default::default()
                },
            )?;
            let counts = user_counts(conn, id)?;
            Ok(UserDetail {
                user,
                faces,
                access_rules,
                counts,
            })
        })
        .await
    }

    pub async fn find_user(&self, id: i64) -> Result<Option<User>> {
        self.call(move |conn| Ok(load_user(conn, id)?)).await
    }

    /// `form` must already be normalized.
    pub async fn create_user(
        &self,
        form: &NewUser,
        password_hash: Option<String>,
        actor: Option<i64>,
    ) -> Result<User> {
        form.validate()?;
        let form = form.clone();
        self.call(move |conn| {
            let tx = conn.transaction()?;
            if !exists(&tx, "roles", form.role_id)? {
                return Err(StoreError::Invalid("role does not exist".into()));
            }
            ensure_unique(
                &tx,
                "document",
                &form.document,
                None,
                "a user with this document already exists",
            )?;
            if let Some(email) = &form.email {
                ensure_unique(&tx, "email", email, None, "a user with this e-mail already exists")?;
            }
            tx.execute(
                "INSERT INTO users
                    (first_name, last_name, document, email, phone, password_hash, role_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    form.first_name,
                    form.last_name,
                    form.document,
                    form.email,
                    form.phone,
                    password_hash,
                    form.role_id,
                    to_ts(Utc::now()),
                ],
            )
            .map_err(|e| conflict_on_unique(e, "user already exists"))?;
            let id = tx.last_insert_rowid();
            let user = load_user(&tx, id)?.ok_or(StoreError::NotFound("user"))?;
            audit::write(
                &tx,
                &AuditRecord::new(actor, AuditAction::Insert, "users", Some(id)).value(user.display_name()),
            )?;
            tx.commit()?;
            tracing::info!(user_id = id, "user created");
            Ok(user)
        })
        .await
    }

    /// Apply a partial update, auditing each changed field.
    pub async fn update_user(
        &self,
        id: i64,
        patch: &UserPatch,
        password_hash: Option<String>,
        actor: Option<i64>,
    ) -> Result<User> {
        patch.validate()?;
        let patch = patch.clone();
        self.call(move |conn| {
            let tx = conn.transaction()?;
            let current = load_user(&tx, id)?.ok_or(StoreError::NotFound("user"))?;
            if let Some(role) = patch.role_id {
                if !exists(&tx, "roles", role)? {
                    return Err(StoreError::Invalid("role does not exist".into()));
                }
            }
            if let Some(doc) = &patch.document {
                ensure_unique(&tx, "document", doc, Some(id), "a user with this document already exists")?;
            }
            if let Some(email) = &patch.email {
                ensure_unique(&tx, "email", email, Some(id), "a user with this e-mail already exists")?;
            }

            let mut sets: Vec<&str> = Vec::new();
            let mut values: Vec<Value> = Vec::new();
            let mut changes: Vec<AuditRecord> = Vec::new();
            let base = AuditRecord::new(actor, AuditAction::Update, "users", Some(id));

            let mut text = |column: &'static str, old: Option<String>, new: &Option<String>| {
                if let Some(new) = new {
                    if old.as_deref() != Some(new.as_str()) {
                        sets.push(column);
                        values.push(Value::Text(new.clone()));
                        changes.push(base.clone().change(column, old, Some(new.clone())));
                    }
                }
            };
            text("first_name", Some(current.first_name.clone()), &patch.first_name);
            text("last_name", current.last_name.clone(), &patch.last_name);
            text("document", current.document.clone(), &patch.document);
            text("email", current.email.clone(), &patch.email);
            text("phone", current.phone.clone(), &patch.phone);

            if let Some(role) = patch.role_id.filter(|r| *r != current.role.id) {
                sets.push("role_id");
                values.push(Value::Integer(role));
                changes.push(base.clone().change(
                    "role_id",
                    Some(current.role.id.to_string()),
                    Some(role.to_string()),
                ));
            }
            if let Some(active) = patch.active.filter(|a| *a != current.active) {
                sets.push("active");
                values.push(Value::Integer(active as i64));
                changes.push(base.clone().change(
                    "active",
                    Some(current.active.to_string()),
                    Some(active.to_string()),
                ));
            }
            if let Some(hash) = password_hash {
                sets.push("password_hash");
                values.push(Value::Text(hash));
                changes.push(base.clone().change("password", None, None));
            }

            if !sets.is_empty() {
                let assignments = sets
                    .iter()
                    .map(|c| format!("{c} = ?"))
                    .collect::<Vec<_>>()
                    .join(", ");
                values.push(Value::Integer(id));
                tx.execute(
                    &format!("UPDATE users SET {assignments} WHERE id = ?"),
                    params_from_iter(values),
                )
                .map_err(|e| conflict_on_unique(e, "user already exists"))?;
                for change in &changes {
                    audit::write(&tx, change)?;
                }
            }
            let user = load_user(&tx, id)?.ok_or(StoreError::NotFound("user"))?;
            tx.commit()?;
            Ok(user)
        })
        .await
    }

    /// Delete a user. Faces, rules and access events go with it.
    pub async fn delete_user(&self, id: i64, actor: Option<i64>) -> Result<User> {
        self.call(move |conn| {
            let tx = conn.transaction()?;
            let user = load_user(&tx, id)?.ok_or(StoreError::NotFound("user"))?;
            tx.execute("DELETE FROM users WHERE id = ?1", [id])?;
            audit::write(
                &tx,
                &AuditRecord::new(actor, AuditAction::Delete, "users", Some(id)).change(
                    "user",
                    Some(user.display_name()),
                    None,
                ),
            )?;
            tx.commit()?;
            tracing::info!(user_id = id, "user deleted");
            Ok(user)
        })
        .await
    }

    /// Login lookup. `email` must already be lower-cased.
    pub async fn find_login_by_email(&self, email: &str) -> Result<Option<UserCredentials>> {
        let email = email.to_string();
        self.call(move |conn| {
            let found = conn
                .query_row(
                    &format!("SELECT {USER_COLUMNS}, u.password_hash {USER_FROM} WHERE u.email = ?1"),
                    [email],
                    |row| {
                        Ok(UserCredentials {
                            user: user_from_row(row)?,
                            password_hash: row.get(12)?,
                        })
                    },
                )
                .optional()?;
            Ok(found)
        })
        .await
    }

    /// Update the failed-attempt counter after a decision and return its
    /// previous value. A grant resets the counter and stamps the last access.
    pub async fn record_access_result(&self, user_id: i64, granted: bool, at: DateTime<Utc>) -> Result<i64> {
        self.call(move |conn| {
            let tx = conn.transaction()?;
            let previous: i64 = tx
                .query_row(
                    "SELECT failed_attempts FROM users WHERE id = ?1",
                    [user_id],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or(StoreError::NotFound("user"))?;
            if granted {
                tx.execute(
                    "UPDATE users SET failed_attempts = 0, last_access_at = ?1 WHERE id = ?2",
                    params![to_ts(at), user_id],
                )?;
            } else {
                tx.execute(
                    "UPDATE users SET failed_attempts = failed_attempts + 1 WHERE id = ?1",
                    [user_id],
                )?;
            }
            tx.commit()?;
            Ok(previous)
        })
        .await
    }

    /// Remove people with no enrolled face. Console operators (users with a
    /// password) are never purged. Returns the affected users.
    pub async fn purge_users_without_faces(&self, dry_run: bool, actor: Option<i64>) -> Result<Vec<User>> {
        self.call(move |conn| {
            let tx = conn.transaction()?;
            let users = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {USER_COLUMNS} {USER_FROM}
                     WHERE u.password_hash IS NULL
                       AND NOT EXISTS (SELECT 1 FROM faces f WHERE f.user_id = u.id)
                     ORDER BY u.id"
                ))?;
                let rows = stmt.query_map([], user_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };
            if !dry_run {
                for user in &users {
                    tx.execute("DELETE FROM users WHERE id = ?1", [user.id])?;
                    audit::write(
                        &tx,
                        &AuditRecord::new(actor, AuditAction::Delete, "users", Some(user.id))
                            .change("user", Some(user.display_name()), None),
                    )?;
                }
                tx.commit()?;
            }
            Ok(users)
        })
        .await
    }
}
