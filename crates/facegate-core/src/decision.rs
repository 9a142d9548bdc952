//! Access decision.
//!
//! Combines the face service's answer with the control point, zone policy
//! and the candidate's access rules. The face service only identifies; the
//! console decides.

use crate::rules::{evaluate, RuleOutcome};
use crate::settings::ZoneSettings;
use crate::types::{AccessRule, AlertKind, Decision};
use chrono::NaiveDateTime;

/// Global recognition thresholds (0..1 scores).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Below this the person is treated as unknown.
    pub unknown_floor: f32,
    /// Minimum confidence to grant, raised by the zone's own minimum.
    pub confidence: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            unknown_floor: 0.80,
            confidence: 0.80,
        }
    }
}

/// The user the face service matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub user_id: i64,
    pub active: bool,
}

/// Everything `decide` looks at for one access attempt.
#[derive(Debug, Clone)]
pub struct AccessContext<'a> {
    pub candidate: Option<Candidate>,
    pub confidence: f32,
    pub liveness_ok: bool,
    pub liveness_required: bool,
    pub point_active: bool,
    pub zone_id: i64,
    pub zone_name: &'a str,
    pub zone_active: bool,
    pub settings: &'a ZoneSettings,
    pub rules: &'a [AccessRule],
    pub thresholds: Thresholds,
    /// Local wall-clock time of the attempt.
    pub now: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub decision: Decision,
    pub alert: Option<AlertKind>,
    pub message: String,
}

impl Verdict {
    fn granted(message: impl Into<String>) -> Self {
        Self {
            decision: Decision::Granted,
            alert: None,
            message: message.into(),
        }
    }

    fn denied(kind: AlertKind, message: impl Into<String>) -> Self {
        Self {
            decision: Decision::Denied,
            alert: Some(kind),
            message: message.into(),
        }
    }

    pub fn is_granted(&self) -> bool {
        self.decision == Decision::Granted
    }
}

fn pct(score: f32) -> String {
    format!("{:.1}%", score * 100.0)
}

pub fn decide(ctx: &AccessContext<'_>) -> Verdict {
    let candidate = match ctx.candidate {
        Some(c) if ctx.confidence >= ctx.thresholds.unknown_floor => c,
        _ => {
            return Verdict::denied(
                AlertKind::UnknownUser,
                format!("Unknown person (confidence {})", pct(ctx.confidence)),
            )
        }
    };

    let threshold = ctx.thresholds.confidence.max(ctx.settings.threshold());
    if ctx.confidence < threshold {
        return Verdict::denied(
            AlertKind::Unauthorized,
            format!(
                "Insufficient confidence ({} < {})",
                pct(ctx.confidence),
                pct(threshold)
            ),
        );
    }

    if ctx.liveness_required && !ctx.liveness_ok {
        return Verdict::denied(AlertKind::LivenessFailure, "Liveness check failed");
    }

    if !ctx.point_active {
        return Verdict::denied(AlertKind::RestrictedZone, "Control point is not active");
    }
    if !ctx.zone_active {
        return Verdict::denied(
            AlertKind::RestrictedZone,
            format!("Zone {} is not active", ctx.zone_name),
        );
    }
    if !candidate.active {
        return Verdict::denied(AlertKind::Unauthorized, "User is inactive");
    }

    if !ctx.settings.allows(ctx.now) {
        return Verdict::denied(
            AlertKind::OutsideSchedule,
            format!("Zone {} is closed at this time", ctx.zone_name),
        );
    }

    match evaluate(ctx.rules, candidate.user_id, ctx.zone_id, ctx.now) {
        RuleOutcome::Allowed { .. } => Verdict::granted(format!(
            "Access granted to {} (confidence {})",
            ctx.zone_name,
            pct(ctx.confidence)
        )),
        RuleOutcome::NoRule => Verdict::denied(
            AlertKind::RestrictedZone,
            format!("User is not authorised for zone {}", ctx.zone_name),
        ),
        RuleOutcome::OutsideWindow { start, end } => Verdict::denied(
            AlertKind::OutsideSchedule,
            format!("Access outside allowed hours ({start} - {end})"),
        ),
    }
}

/// Whether a denial that brings the counter from `previous` to `previous + 1`
/// should raise a multiple-failed-attempts alert. Fires each time the
/// counter reaches a multiple of `max`.
pub fn failed_attempts_alert(previous: i64, max: u8) -> bool {
    let max = i64::from(max.max(1));
    let now = previous.max(0) + 1;
    now % max == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    // 2024-06-03 is a Monday.
    fn monday(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 3)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn office_rule() -> AccessRule {
        AccessRule {
            id: 1,
            user_id: 7,
            zone_id: 2,
            start: "08:00".parse().unwrap(),
            end: "18:00".parse().unwrap(),
            weekday: None,
            active: true,
            created_at: Utc::now(),
        }
    }

    struct Fixture {
        settings: ZoneSettings,
        rules: Vec<AccessRule>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                settings: ZoneSettings::default(),
                rules: vec![office_rule()],
            }
        }

        fn ctx(&self, confidence: f32, now: NaiveDateTime) -> AccessContext<'_> {
            AccessContext {
                candidate: Some(Candidate {
                    user_id: 7,
                    active: true,
                }),
                confidence,
                liveness_ok: true,
                liveness_required: true,
                point_active: true,
                zone_id: 2,
                zone_name: "Lobby",
                zone_active: true,
                settings: &self.settings,
                rules: &self.rules,
                thresholds: Thresholds::default(),
                now,
            }
        }
    }

    #[test]
    fn test_grant_inside_window() {
        let f = Fixture::new();
        let v = decide(&f.ctx(0.92, monday(9, 30)));
        assert!(v.is_granted());
        assert_eq!(v.alert, None);
    }

    #[test]
    fn test_outside_window() {
        let f = Fixture::new();
        let v = decide(&f.ctx(0.92, monday(19, 0)));
        assert_eq!(v.decision, Decision::Denied);
        assert_eq!(v.alert, Some(AlertKind::OutsideSchedule));
        assert!(v.message.contains("08:00 - 18:00"));
    }

    #[test]
    fn test_no_rule_is_restricted_zone() {
        let mut f = Fixture::new();
        f.rules.clear();
        let v = decide(&f.ctx(0.92, monday(9, 30)));
        assert_eq!(v.alert, Some(AlertKind::RestrictedZone));
    }

    #[test]
    fn test_unknown_person() {
        let f = Fixture::new();
        let mut ctx = f.ctx(0.95, monday(9, 30));
        ctx.candidate = None;
        assert_eq!(decide(&ctx).alert, Some(AlertKind::UnknownUser));

        let ctx = f.ctx(0.42, monday(9, 30));
        let v = decide(&ctx);
        assert_eq!(v.alert, Some(AlertKind::UnknownUser));
        assert!(v.message.contains("42.0%"));
    }

    #[test]
    fn test_zone_min_confidence_raises_threshold() {
        let mut f = Fixture::new();
        f.settings.min_confidence = 95;
        let v = decide(&f.ctx(0.90, monday(9, 30)));
        assert_eq!(v.alert, Some(AlertKind::Unauthorized));
    }

    #[test]
    fn test_liveness_failure() {
        let f = Fixture::new();
        let mut ctx = f.ctx(0.92, monday(9, 30));
        ctx.liveness_ok = false;
        assert_eq!(decide(&ctx).alert, Some(AlertKind::LivenessFailure));

        ctx.liveness_required = false;
        assert!(decide(&ctx).is_granted());
    }

    #[test]
    fn test_inactive_point_zone_user() {
        let f = Fixture::new();
        let mut ctx = f.ctx(0.92, monday(9, 30));
        ctx.point_active = false;
        assert_eq!(decide(&ctx).alert, Some(AlertKind::RestrictedZone));

        let mut ctx = f.ctx(0.92, monday(9, 30));
        ctx.zone_active = false;
        assert_eq!(decide(&ctx).alert, Some(AlertKind::RestrictedZone));

        let mut ctx = f.ctx(0.92, monday(9, 30));
        ctx.candidate = Some(Candidate {
            user_id: 7,
            active: false,
        });
        assert_eq!(decide(&ctx).alert, Some(AlertKind::Unauthorized));
    }

    #[test]
    fn test_zone_schedule_closed() {
        let mut f = Fixture::new();
        f.settings.days = vec![0, 6];
        let v = decide(&f.ctx(0.92, monday(9, 30)));
        assert_eq!(v.alert, Some(AlertKind::OutsideSchedule));
        assert!(v.message.contains("closed"));
    }

    #[test]
    fn test_failed_attempts_alert() {
        assert!(!failed_attempts_alert(0, 3));
        assert!(!failed_attempts_alert(1, 3));
        assert!(failed_attempts_alert(2, 3));
        assert!(!failed_attempts_alert(3, 3));
        assert!(failed_attempts_alert(5, 3));
        assert!(failed_attempts_alert(0, 1));
    }
}
