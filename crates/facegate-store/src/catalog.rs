//! Lookup tables: roles, control point types, alert types, notification
//! channels and face models.

use crate::{Result, Store, StoreError};
use facegate_core::types::{AlertKind, FaceModel, NamedRef, RoleSummary};
use rusqlite::{params, OptionalExtension};

pub const ROLES: [&str; 5] = [
    "Administrador",
    "Supervisor",
    "Empleado",
    "Visitante",
    "Contratista",
];

/// Role given to operators created from the CLI.
pub const ADMIN_ROLE_ID: i64 = 1;

pub const POINT_TYPES: [&str; 6] = [
    "Entrada principal",
    "Entrada secundaria",
    "Sala de servidores",
    "Oficina ejecutiva",
    "Laboratorio",
    "Almacén",
];

pub const CHANNELS: [&str; 4] = ["Email", "Telegram", "SMS", "Sistema interno"];

pub const FACE_MODELS: [(&str, &str); 3] = [
    ("FaceNet", "1.0.0"),
    ("ArcFace", "1.0.0"),
    ("DeepFace", "1.0.0"),
];

impl Store {
    /// Insert the catalog rows. Safe to run repeatedly.
    pub async fn seed_catalogs(&self) -> Result<()> {
        self.call(|conn| {
            let tx = conn.transaction()?;
            for (i, name) in ROLES.iter().enumerate() {
                tx.execute(
                    "INSERT OR IGNORE INTO roles (id, name) VALUES (?1, ?2)",
                    params![i as i64 + 1, name],
                )?;
            }
            for (i, name) in POINT_TYPES.iter().enumerate() {
                tx.execute(
                    "INSERT OR IGNORE INTO point_types (id, name) VALUES (?1, ?2)",
                    params![i as i64 + 1, name],
                )?;
            }
            for kind in AlertKind::ALL {
                tx.execute(
                    "INSERT OR IGNORE INTO alert_types (id, name) VALUES (?1, ?2)",
                    params![kind.id(), kind.label()],
                )?;
            }
            for (i, name) in CHANNELS.iter().enumerate() {
                tx.execute(
                    "INSERT OR IGNORE INTO notification_channels (id, name) VALUES (?1, ?2)",
                    params![i as i64 + 1, name],
                )?;
            }
            for (name, version) in FACE_MODELS {
                tx.execute(
                    "INSERT OR IGNORE INTO face_models (name, version) VALUES (?1, ?2)",
                    params![name, version],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await?;
        tracing::info!("catalogs seeded");
        Ok(())
    }

    /// Roles with the number of users holding each.
    pub async fn list_roles(&self) -> Result<Vec<RoleSummary>> {
        self.call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.id, r.name, (SELECT COUNT(*) FROM users u WHERE u.role_id = r.id)
                 FROM roles r ORDER BY r.id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(RoleSummary {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    users: row.get(2)?,
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    pub async fn list_point_types(&self) -> Result<Vec<NamedRef>> {
        self.named_list("SELECT id, name FROM point_types ORDER BY name")
            .await
    }

    pub async fn list_alert_types(&self) -> Result<Vec<NamedRef>> {
        self.named_list("SELECT id, name FROM alert_types ORDER BY id")
            .await
    }

    pub async fn list_channels(&self) -> Result<Vec<NamedRef>> {
        self.named_list("SELECT id, name FROM notification_channels ORDER BY id")
            .await
    }

    async fn named_list(&self, sql: &'static str) -> Result<Vec<NamedRef>> {
        self.call(move |conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map([], |row| {
                Ok(NamedRef {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    /// Find a face model by name and version, registering it when unknown.
    pub async fn ensure_face_model(&self, name: &str, version: &str) -> Result<FaceModel> {
        let name = name.trim().to_string();
        let version = version.trim().to_string();
        if name.is_empty() {
            return Err(StoreError::Invalid("face model name is empty".into()));
        }
        self.call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO face_models (name, version) VALUES (?1, ?2)",
                params![name, version],
            )?;
            let model = conn
                .query_row(
                    "SELECT id, name, version FROM face_models WHERE name = ?1 AND version = ?2",
                    params![name, version],
                    |row| {
                        Ok(FaceModel {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            version: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            model.ok_or(StoreError::NotFound("face model"))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use crate::testutil;

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let store = testutil::store().await;
        store.seed_catalogs().await.unwrap();
        assert_eq!(store.list_roles().await.unwrap().len(), 5);
        assert_eq!(store.list_point_types().await.unwrap().len(), 6);
        assert_eq!(store.list_channels().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_alert_type_ids_match_kinds() {
        let store = testutil::store().await;
        let types = store.list_alert_types().await.unwrap();
        assert_eq!(types.len(), 6);
        assert_eq!(types[4].id, 5);
        assert_eq!(types[4].name, "Acceso fuera de horario");
    }

    #[tokio::test]
    async fn test_role_user_counts() {
        let store = testutil::store().await;
        testutil::user(&store, "Ana", "D1").await;
        let roles = store.list_roles().await.unwrap();
        let employee = roles.iter().find(|r| r.name == "Empleado").unwrap();
        assert_eq!(employee.users, 1);
    }

    #[tokio::test]
    async fn test_ensure_face_model() {
        let store = testutil::store().await;
        let a = store.ensure_face_model("ArcFace", "1.0.0").await.unwrap();
        let b = store.ensure_face_model("ArcFace", "1.0.0").await.unwrap();
        assert_eq!(a.id, b.id);
        let c = store.ensure_face_model("Buffalo_L", "2.1").await.unwrap();
        assert_ne!(a.id, c.id);
    }
}
