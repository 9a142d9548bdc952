//! Evidence metadata. The files themselves live under the daemon's
//! evidence directory; only the relative path is stored here.

use crate::{parse_col, to_ts, ts_col, Result, Store, StoreError};
use chrono::Utc;
use facegate_core::types::{Evidence, EvidenceKind};
use rusqlite::{params, OptionalExtension, Row};

#[derive(Debug, Clone)]
pub struct NewEvidence {
    pub kind: EvidenceKind,
    pub path: String,
    pub mime_type: Option<String>,
    pub size_bytes: i64,
    /// Lowercase hex digest of the file contents.
    pub sha256: String,
}

fn evidence_from_row(row: &Row<'_>) -> rusqlite::Result<Evidence> {
    Ok(Evidence {
        id: row.get(0)?,
        kind: parse_col(row, 1)?,
        path: row.get(2)?,
        mime_type: row.get(3)?,
        size_bytes: row.get(4)?,
        sha256: row.get(5)?,
        created_at: ts_col(row, 6)?,
    })
}

impl Store {
    pub async fn insert_evidence(&self, ev: NewEvidence) -> Result<Evidence> {
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO evidence (kind, path, mime_type, size_bytes, sha256, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    ev.kind.as_str(),
                    ev.path,
                    ev.mime_type,
                    ev.size_bytes,
                    ev.sha256,
                    to_ts(Utc::now()),
                ],
            )?;
            let id = conn.last_insert_rowid();
            tracing::debug!(evidence_id = id, path = %ev.path, "evidence stored");
            Ok(conn.query_row(
                "SELECT id, kind, path, mime_type, size_bytes, sha256, created_at
                 FROM evidence WHERE id = ?1",
                [id],
                evidence_from_row,
            )?)
        })
        .await
    }

    pub async fn get_evidence(&self, id: i64) -> Result<Evidence> {
        self.call(move |conn| {
            conn.query_row(
                "SELECT id, kind, path, mime_type, size_bytes, sha256, created_at
                 FROM evidence WHERE id = ?1",
                [id],
                evidence_from_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound("evidence"))
        })
        .await
    }
}
