//! Face enrollments. The embedding lives in the face service; this table
//! only keeps the reference, model and quality it reported.

use crate::audit::{self, AuditRecord};
use crate::{exists, to_ts, ts_col, Result, Store, StoreError};
use chrono::Utc;
use facegate_core::types::{AuditAction, Face, FaceModel};
use rusqlite::{params, Connection, OptionalExtension, Row};

const FACE_SELECT: &str = "SELECT f.id, f.user_id, f.quality, f.external_ref, f.created_at, \
     m.id, m.name, m.version \
     FROM faces f LEFT JOIN face_models m ON m.id = f.model_id";

fn face_from_row(row: &Row<'_>) -> rusqlite::Result<Face> {
    let model_id: Option<i64> = row.get(5)?;
    let model = match model_id {
        Some(id) => Some(FaceModel {
            id,
            name: row.get(6)?,
            version: row.get(7)?,
        }),
        None => None,
    };
    Ok(Face {
        id: row.get(0)?,
        user_id: row.get(1)?,
        quality: row.get(2)?,
        external_ref: row.get(3)?,
        created_at: ts_col(row, 4)?,
        model,
    })
}

pub(crate) fn faces_for(conn: &Connection, user_id: i64) -> rusqlite::Result<Vec<Face>> {
    let mut stmt = conn.prepare(&format!(
        "{FACE_SELECT} WHERE f.user_id = ?1 ORDER BY f.created_at DESC, f.id DESC"
    ))?;
    let rows = stmt.query_map([user_id], face_from_row)?;
    rows.collect()
}

fn load_face(conn: &Connection, id: i64) -> rusqlite::Result<Option<Face>> {
    conn.query_row(&format!("{FACE_SELECT} WHERE f.id = ?1"), [id], face_from_row)
        .optional()
}

#[derive(Debug, Clone)]
pub struct NewFace {
    pub user_id: i64,
    pub model_id: Option<i64>,
    pub quality: Option<f64>,
    pub external_ref: Option<String>,
}

impl Store {
    pub async fn list_faces(&self, user_id: i64) -> Result<Vec<Face>> {
        self.call(move |conn| {
            if !exists(conn, "users", user_id)? {
                return Err(StoreError::NotFound("user"));
            }
            Ok(faces_for(conn, user_id)?)
        })
        .await
    }

    pub async fn insert_face(&self, face: NewFace, actor: Option<i64>) -> Result<Face> {
        self.call(move |conn| {
            let tx = conn.transaction()?;
            if !exists(&tx, "users", face.user_id)? {
                return Err(StoreError::NotFound("user"));
            }
            tx.execute(
                "INSERT INTO faces (user_id, model_id, quality, external_ref, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    face.user_id,
                    face.model_id,
                    face.quality,
                    face.external_ref,
                    to_ts(Utc::now())
                ],
            )?;
            let id = tx.last_insert_rowid();
            audit::write(
                &tx,
                &AuditRecord::new(actor, AuditAction::Insert, "faces", Some(id))
                    .value(format!("user {}", face.user_id)),
            )?;
            let stored = load_face(&tx, id)?.ok_or(StoreError::NotFound("face"))?;
            tx.commit()?;
            tracing::info!(user_id = face.user_id, face_id = id, "face enrolled");
            Ok(stored)
        })
        .await
    }

    pub async fn delete_face(&self, id: i64, actor: Option<i64>) -> Result<Face> {
        self.call(move |conn| {
            let tx = conn.transaction()?;
            let face = load_face(&tx, id)?.ok_or(StoreError::NotFound("face"))?;
            tx.execute("DELETE FROM faces WHERE id = ?1", [id])?;
            audit::write(
                &tx,
                &AuditRecord::new(actor, AuditAction::Delete, "faces", Some(id)).change(
                    "user_id",
                    Some(face.user_id.to_string()),
                    None,
                ),
            )?;
            tx.commit()?;
            Ok(face)
        })
        .await
    }
}
