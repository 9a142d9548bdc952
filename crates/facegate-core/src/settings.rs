//! Per-zone security configuration.

use crate::schedule::{weekday_index, TimeOfDay};
use crate::validate::{Checker, ValidationError};
use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Zone policy applied on top of per-user access rules.
///
/// Stored as JSON, so fields missing from an older document fall back to
/// their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneSettings {
    /// Minimum recognition confidence, in percent.
    pub min_confidence: u8,
    pub liveness_required: bool,
    pub dual_auth: bool,
    /// When false, the zone only opens between `start` and `end`.
    pub all_day: bool,
    pub start: Option<TimeOfDay>,
    pub end: Option<TimeOfDay>,
    /// Open days, 0 = Sunday. Empty means every day.
    pub days: Vec<u8>,
    pub max_failed_attempts: u8,
    pub immediate_alert: bool,
    pub notify_admin: bool,
    pub notify_supervisor: bool,
    pub evidence_required: bool,
    pub store_access_photos: bool,
}

impl Default for ZoneSettings {
    fn default() -> Self {
        Self {
            min_confidence: 80,
            liveness_required: true,
            dual_auth: false,
            all_day: true,
            start: TimeOfDay::new(8, 0),
            end: TimeOfDay::new(18, 0),
            days: (0..=6).collect(),
            max_failed_attempts: 3,
            immediate_alert: false,
            notify_admin: true,
            notify_supervisor: false,
            evidence_required: true,
            store_access_photos: true,
        }
    }
}

impl ZoneSettings {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut c = Checker::default();
        c.check(
            (50..=99).contains(&self.min_confidence),
            "min_confidence",
            "must be between 50 and 99",
        );
        c.check(
            (1..=10).contains(&self.max_failed_attempts),
            "max_failed_attempts",
            "must be between 1 and 10",
        );
        c.check(
            self.days.iter().all(|d| *d <= 6),
            "days",
            "must only contain day indexes 0 to 6",
        );
        if !self.all_day {
            match (self.start, self.end) {
                (Some(start), Some(end)) => {
                    c.check(start < end, "end", "must be later than start")
                }
                _ => c.check(false, "start", "opening hours are required unless all_day is set"),
            }
        }
        c.finish()
    }

    /// Minimum confidence as a 0..1 score.
    pub fn threshold(&self) -> f32 {
        self.min_confidence as f32 / 100.0
    }

    /// Whether the zone is open at local time `now`.
    pub fn allows(&self, now: NaiveDateTime) -> bool {
        let today = weekday_index(now.weekday());
        if !self.days.is_empty() && !self.days.contains(&today) {
            return false;
        }
        if self.all_day {
            return true;
        }
        match (self.start, self.end) {
            (Some(start), Some(end)) => TimeOfDay::window_contains(start, end, now.time()),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    // 2024-06-08 is a Saturday, 2024-06-10 a Monday.
    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_default_is_valid_and_open() {
        let s = ZoneSettings::default();
        assert!(s.validate().is_ok());
        assert!(s.allows(at(8, 3, 0)));
        assert!((s.threshold() - 0.80).abs() < 1e-6);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let s: ZoneSettings = serde_json::from_str(r#"{"min_confidence": 90}"#).unwrap();
        assert_eq!(s.min_confidence, 90);
        assert!(s.liveness_required);
        assert_eq!(s.max_failed_attempts, 3);
    }

    #[test]
    fn test_office_hours() {
        let s = ZoneSettings {
            all_day: false,
            days: vec![1, 2, 3, 4, 5],
            ..Default::default()
        };
        assert!(s.allows(at(10, 9, 0)));
        assert!(!s.allows(at(10, 19, 0)));
        assert!(!s.allows(at(8, 9, 0)));
    }

    #[test]
    fn test_validate_ranges() {
        let s = ZoneSettings {
            min_confidence: 40,
            max_failed_attempts: 0,
            days: vec![7],
            ..Default::default()
        };
        let err = s.validate().unwrap_err();
        assert_eq!(err.fields().len(), 3);
    }

    #[test]
    fn test_validate_requires_hours_when_not_all_day() {
        let s = ZoneSettings {
            all_day: false,
            start: None,
            ..Default::default()
        };
        assert!(s.validate().is_err());

        let s = ZoneSettings {
            all_day: false,
            start: TimeOfDay::new(18, 0),
            end: TimeOfDay::new(8, 0),
            ..Default::default()
        };
        assert!(s.validate().is_err());
    }
}
