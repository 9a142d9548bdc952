//! Dashboard and zone statistics.
//!
//! "Today" and "this month" follow the operator's local calendar; the
//! caller supplies the clock through [`Bounds`].

use crate::{to_ts, Result, Store};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use facegate_core::types::{DashboardStats, DashboardSummary, HourBucket, NamedCount};
use rusqlite::{params, Connection};

/// Period starts, in UTC, as seen from a local clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub now: DateTime<Utc>,
    /// Local midnight today.
    pub day_start: DateTime<Utc>,
    /// Seven days before `now`.
    pub week_start: DateTime<Utc>,
    /// Local midnight on the first of the month.
    pub month_start: DateTime<Utc>,
    /// Local hour offset used to bucket today's events.
    utc_offset_secs: i32,
}

fn local_midnight<Tz: TimeZone>(tz: &Tz, date: NaiveDate, fallback: DateTime<Utc>) -> DateTime<Utc> {
    tz.from_local_datetime(&date.and_time(NaiveTime::MIN))
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(fallback)
}

impl Bounds {
    pub fn at<Tz: TimeZone>(now: DateTime<Tz>) -> Self {
        let tz = now.timezone();
        let utc_now = now.with_timezone(&Utc);
        let today = now.date_naive();
        let first = today.with_day(1).unwrap_or(today);
        let day_start = local_midnight(&tz, today, utc_now - Duration::hours(24));
        Self {
            now: utc_now,
            day_start,
            week_start: utc_now - Duration::days(7),
            month_start: local_midnight(&tz, first, day_start),
            utc_offset_secs: now.naive_local().signed_duration_since(now.naive_utc()).num_seconds() as i32,
        }
    }

    fn local_hour(&self, t: DateTime<Utc>) -> u32 {
        (t + Duration::seconds(self.utc_offset_secs as i64)).hour()
    }
}

fn count(conn: &Connection, sql: &str, since: DateTime<Utc>) -> rusqlite::Result<i64> {
    conn.query_row(sql, [to_ts(since)], |row| row.get(0))
}

fn named_counts(conn: &Connection, sql: &str, since: DateTime<Utc>) -> rusqlite::Result<Vec<NamedCount>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([to_ts(since)], |row| {
        Ok(NamedCount {
            name: row.get(0)?,
            count: row.get(1)?,
        })
    })?;
    rows.collect()
}

/// 24 buckets, "00:00" .. "23:00", of today's access events.
fn hourly(conn: &Connection, bounds: &Bounds) -> Result<Vec<HourBucket>> {
    let mut counts = [0i64; 24];
    let mut stmt = conn.prepare("SELECT created_at FROM access_events WHERE created_at >= ?1")?;
    let stamps = stmt.query_map([to_ts(bounds.day_start)], |row| crate::ts_col(row, 0))?;
    for stamp in stamps {
        let hour = bounds.local_hour(stamp?) as usize;
        if let Some(slot) = counts.get_mut(hour) {
            *slot += 1;
        }
    }
    Ok(counts
        .iter()
        .enumerate()
        .map(|(h, n)| HourBucket {
            hour: format!("{h:02}:00"),
            accesses: *n,
        })
        .collect())
}

impl Store {
    pub async fn dashboard_stats(&self, bounds: Bounds) -> Result<DashboardStats> {
        self.call(move |conn| {
            let summary = DashboardSummary {
                accesses_today: count(
                    conn,
                    "SELECT COUNT(*) FROM access_events WHERE created_at >= ?1",
                    bounds.day_start,
                )?,
                alerts_today: count(
                    conn,
                    "SELECT COUNT(*) FROM alerts WHERE created_at >= ?1",
                    bounds.day_start,
                )?,
                active_users: conn.query_row(
                    "SELECT COUNT(*) FROM users WHERE active = 1",
                    [],
                    |row| row.get(0),
                )?,
                active_points: conn.query_row(
                    "SELECT COUNT(*) FROM control_points WHERE active = 1",
                    [],
                    |row| row.get(0),
                )?,
                total_users: conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?,
                total_accesses: conn.query_row("SELECT COUNT(*) FROM access_events", [], |row| {
                    row.get(0)
                })?,
            };

            let alerts_by_type = named_counts(
                conn,
                "SELECT t.name, COUNT(a.id) FROM alert_types t
                 JOIN alerts a ON a.type_id = t.id AND a.created_at >= ?1
                 GROUP BY t.id ORDER BY COUNT(a.id) DESC, t.id",
                bounds.month_start,
            )?;

            let top_users = named_counts(
                conn,
                "SELECT u.first_name || COALESCE(' ' || u.last_name, ''), COUNT(e.id)
                 FROM access_events e JOIN users u ON u.id = e.user_id
                 WHERE e.created_at >= ?1
                 GROUP BY u.id ORDER BY COUNT(e.id) DESC, u.id LIMIT 5",
                bounds.month_start,
            )?;

            let decisions_today = named_counts(
                conn,
                "SELECT decision, COUNT(*) FROM access_events
                 WHERE created_at >= ?1 GROUP BY decision ORDER BY decision",
                bounds.day_start,
            )?;

            Ok(DashboardStats {
                summary,
                accesses_by_hour: hourly(conn, &bounds)?,
                alerts_by_type,
                top_users,
                decisions_today,
            })
        })
        .await
    }
}

/// Zone activity counters used by the zone detail view.
pub(crate) fn zone_counters(
    conn: &Connection,
    zone_id: i64,
    bounds: &Bounds,
) -> rusqlite::Result<facegate_core::types::ZoneStats> {
    let events_since = |since: DateTime<Utc>, distinct_users: bool| -> rusqlite::Result<i64> {
        let what = if distinct_users { "COUNT(DISTINCT e.user_id)" } else { "COUNT(*)" };
        conn.query_row(
            &format!(
                "SELECT {what} FROM access_events e JOIN control_points p ON p.id = e.point_id
                 WHERE p.zone_id = ?1 AND e.created_at >= ?2"
            ),
            params![zone_id, to_ts(since)],
            |row| row.get(0),
        )
    };
    Ok(facegate_core::types::ZoneStats {
        accesses_today: events_since(bounds.day_start, false)?,
        accesses_this_week: events_since(bounds.week_start, false)?,
        unique_users_this_week: events_since(bounds.week_start, true)?,
        alerts_last_7_days: conn.query_row(
            "SELECT COUNT(*) FROM alerts a JOIN control_points p ON p.id = a.point_id
             WHERE p.zone_id = ?1 AND a.created_at >= ?2",
            params![zone_id, to_ts(bounds.week_start)],
            |row| row.get(0),
        )?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NewEvent;
    use crate::testutil;
    use chrono::FixedOffset;
    use facegate_core::types::Decision;

    #[test]
    fn test_bounds_follow_local_calendar() {
        let tz = FixedOffset::west_opt(5 * 3600).unwrap();
        // 2024-06-03 01:30 local is 06:30 UTC.
        let now = tz.with_ymd_and_hms(2024, 6, 3, 1, 30, 0).unwrap();
        let b = Bounds::at(now);
        assert_eq!(b.day_start, Utc.with_ymd_and_hms(2024, 6, 3, 5, 0, 0).unwrap());
        assert_eq!(b.month_start, Utc.with_ymd_and_hms(2024, 6, 1, 5, 0, 0).unwrap());
        assert_eq!(b.week_start, Utc.with_ymd_and_hms(2024, 5, 27, 6, 30, 0).unwrap());
        assert_eq!(b.local_hour(b.now), 1);
    }

    #[tokio::test]
    async fn test_dashboard_counts_today() {
        let store = testutil::store().await;
        let user = testutil::user(&store, "Ana", "100").await;
        let zone = testutil::zone(&store, "Lobby").await;
        let point = testutil::point(&store, zone, "Main door").await;
        for decision in [Decision::Granted, Decision::Granted, Decision::Denied] {
            store
                .record_event(NewEvent {
                    user_id: user,
                    point_id: point,
                    decision,
                    score: None,
                    liveness_ok: None,
                    evidence_id: None,
                })
                .await
                .unwrap();
        }

        let stats = store.dashboard_stats(Bounds::at(Utc::now())).await.unwrap();
        assert_eq!(stats.summary.accesses_today, 3);
        assert_eq!(stats.summary.total_users, 1);
        assert_eq!(stats.summary.active_points, 1);
        assert_eq!(stats.accesses_by_hour.len(), 24);
        assert_eq!(stats.accesses_by_hour.iter().map(|b| b.accesses).sum::<i64>(), 3);
        assert_eq!(stats.top_users[0].name, "Ana Tester");
        assert_eq!(stats.top_users[0].count, 3);
        assert_eq!(
            stats.decisions_today,
            vec![
                NamedCount { name: "denied".into(), count: 1 },
                NamedCount { name: "granted".into(), count: 2 },
            ]
        );
    }
}
