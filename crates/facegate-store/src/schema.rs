//! Embedded schema. Every statement is idempotent so it runs on each open.

use rusqlite::Connection;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS roles (
    id   INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS point_types (
    id   INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS alert_types (
    id   INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS notification_channels (
    id   INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS face_models (
    id      INTEGER PRIMARY KEY,
    name    TEXT NOT NULL,
    version TEXT NOT NULL,
    UNIQUE (name, version)
);

CREATE TABLE IF NOT EXISTS users (
    id              INTEGER PRIMARY KEY,
    first_name      TEXT NOT NULL,
    last_name       TEXT,
    document        TEXT UNIQUE,
    email           TEXT UNIQUE,
    phone           TEXT,
    password_hash   TEXT,
    role_id         INTEGER NOT NULL REFERENCES roles(id),
    active          INTEGER NOT NULL DEFAULT 1,
    failed_attempts INTEGER NOT NULL DEFAULT 0,
    last_access_at  TEXT,
    created_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS faces (
    id           INTEGER PRIMARY KEY,
    user_id      INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    model_id     INTEGER REFERENCES face_models(id),
    quality      REAL,
    external_ref TEXT,
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS zones (
    id          INTEGER PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    description TEXT,
    active      INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS zone_settings (
    zone_id    INTEGER PRIMARY KEY REFERENCES zones(id) ON DELETE CASCADE,
    settings   TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS control_points (
    id            INTEGER PRIMARY KEY,
    zone_id       INTEGER NOT NULL REFERENCES zones(id) ON DELETE CASCADE,
    name          TEXT NOT NULL,
    type_id       INTEGER NOT NULL REFERENCES point_types(id),
    location      TEXT,
    active        INTEGER NOT NULL DEFAULT 1,
    camera_url    TEXT,
    camera_user   TEXT,
    camera_secret BLOB,
    stream_type   TEXT,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS access_rules (
    id         INTEGER PRIMARY KEY,
    user_id    INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    zone_id    INTEGER NOT NULL REFERENCES zones(id) ON DELETE CASCADE,
    start_time TEXT NOT NULL,
    end_time   TEXT NOT NULL,
    weekday    INTEGER CHECK (weekday BETWEEN 0 AND 6),
    active     INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

-- One rule per (user, zone, day); NULL day means every day.
CREATE UNIQUE INDEX IF NOT EXISTS access_rules_user_zone_day
    ON access_rules (user_id, zone_id, IFNULL(weekday, -1));

CREATE TABLE IF NOT EXISTS evidence (
    id         INTEGER PRIMARY KEY,
    kind       TEXT NOT NULL,
    path       TEXT NOT NULL,
    mime_type  TEXT,
    size_bytes INTEGER NOT NULL,
    sha256     TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS access_events (
    id          INTEGER PRIMARY KEY,
    uuid        TEXT NOT NULL UNIQUE,
    user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    point_id    INTEGER NOT NULL REFERENCES control_points(id) ON DELETE CASCADE,
    decision    TEXT NOT NULL CHECK (decision IN ('granted', 'denied', 'pending')),
    score       REAL,
    liveness_ok INTEGER,
    evidence_id INTEGER REFERENCES evidence(id) ON DELETE SET NULL,
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS access_events_created_at ON access_events (created_at);
CREATE INDEX IF NOT EXISTS access_events_user ON access_events (user_id);
CREATE INDEX IF NOT EXISTS access_events_point ON access_events (point_id);

CREATE TABLE IF NOT EXISTS alerts (
    id          INTEGER PRIMARY KEY,
    uuid        TEXT NOT NULL UNIQUE,
    type_id     INTEGER NOT NULL REFERENCES alert_types(id),
    detail      TEXT,
    point_id    INTEGER REFERENCES control_points(id) ON DELETE SET NULL,
    evidence_id INTEGER REFERENCES evidence(id) ON DELETE SET NULL,
    read_at     TEXT,
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS alerts_created_at ON alerts (created_at);

CREATE TABLE IF NOT EXISTS notifications (
    id          INTEGER PRIMARY KEY,
    alert_id    INTEGER NOT NULL REFERENCES alerts(id) ON DELETE CASCADE,
    channel_id  INTEGER NOT NULL REFERENCES notification_channels(id),
    destination TEXT NOT NULL,
    status      TEXT NOT NULL DEFAULT 'pending',
    attempts    INTEGER NOT NULL DEFAULT 0,
    sent_at     TEXT,
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS notifications_status ON notifications (status);

CREATE TABLE IF NOT EXISTS audit_log (
    id         INTEGER PRIMARY KEY,
    user_id    INTEGER,
    action     TEXT NOT NULL,
    table_name TEXT NOT NULL,
    record_id  INTEGER,
    field      TEXT,
    old_value  TEXT,
    new_value  TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS audit_log_created_at ON audit_log (created_at);
"#;

pub(crate) fn apply(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply(&conn).unwrap();
        apply(&conn).unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 16);
    }
}
