//! facegate-store: SQLite persistence for the access control console.
//!
//! A single `tokio_rusqlite` connection runs every query on its own
//! thread. Repositories are `impl Store` blocks split by table family.

pub mod alerts;
pub mod audit;
pub mod catalog;
pub mod error;
pub mod events;
pub mod evidence;
pub mod faces;
pub mod notifications;
pub mod points;
pub mod rules;
mod schema;
pub mod stats;
pub mod users;
pub mod zones;

pub use error::StoreError;

use chrono::{DateTime, SecondsFormat, Utc};
use facegate_core::types::{Page, PageRequest, Pagination};
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, Row};
use std::path::Path;

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Handle to the console database. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    conn: tokio_rusqlite::Connection,
}

impl Store {
    /// Open (or create) the database file and apply the schema.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = tokio_rusqlite::Connection::open(path).await?;
        let store = Self { conn };
        store.call(|conn| {
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })?;
            Ok(())
        })
        .await?;
        store.init().await?;
        tracing::info!(path = %path.display(), "database opened");
        Ok(store)
    }

    pub async fn open_in_memory() -> Result<Self> {
        let conn = tokio_rusqlite::Connection::open_in_memory().await?;
        let store = Self { conn };
        store.init().await?;
        Ok(store)
    }

    async fn init(&self) -> Result<()> {
        self.call(|conn| {
            conn.pragma_update(None, "foreign_keys", true)?;
            schema::apply(conn)?;
            Ok(())
        })
        .await
    }

    /// Run `f` on the connection thread, carrying `StoreError` across it.
    pub(crate) async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        self.conn
            .call(move |conn| f(conn).map_err(|e| tokio_rusqlite::Error::Other(Box::new(e))))
            .await
            .map_err(StoreError::from)
    }
}

/// Timestamps are stored as fixed-width RFC 3339 UTC text so they sort lexically.
pub(crate) fn to_ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_ts(idx, &raw)
}

pub(crate) fn opt_ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|r| parse_ts(idx, &r)).transpose()
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Parse a text column through `FromStr`.
pub(crate) fn parse_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Accumulates `WHERE` clauses and their positional parameters.
#[derive(Debug, Default)]
pub(crate) struct Filter {
    clauses: Vec<String>,
    params: Vec<Value>,
}

impl Filter {
    /// Add a clause with one `?` placeholder.
    pub(crate) fn eq(&mut self, clause: &str, value: impl Into<Value>) {
        self.clauses.push(clause.to_string());
        self.params.push(value.into());
    }

    /// Add a clause whose `?` placeholders all bind the same value.
    pub(crate) fn repeat(&mut self, clause: &str, value: impl Into<Value> + Clone) {
        let n = clause.matches('?').count();
        self.clauses.push(clause.to_string());
        for _ in 0..n {
            self.params.push(value.clone().into());
        }
    }

    pub(crate) fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub(crate) fn params(&self) -> &[Value] {
        &self.params
    }

    /// Parameters followed by `LIMIT ? OFFSET ?` values.
    pub(crate) fn paged_params(&self, page: PageRequest) -> Vec<Value> {
        let mut params = self.params.clone();
        params.push(Value::Integer(page.limit as i64));
        params.push(Value::Integer(page.offset()));
        params
    }
}

pub(crate) fn page_of<T>(items: Vec<T>, page: PageRequest, total: i64) -> Page<T> {
    Page {
        items,
        pagination: Pagination::new(page, total),
    }
}

/// Whether a row with `id` exists in `table`. `table` is always a literal.
pub(crate) fn exists(conn: &Connection, table: &str, id: i64) -> rusqlite::Result<bool> {
    conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?1)"),
        [id],
        |row| row.get(0),
    )
}
