//! Wall-clock helpers for access windows.

use chrono::{NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A minute-resolution time of day written as `HH:MM` (hour may be one digit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    minutes: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid time (expected HH:MM): {0}")]
pub struct InvalidTime(pub String);

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then(|| Self {
            minutes: hour as u16 * 60 + minute as u16,
        })
    }

    pub fn hour(&self) -> u8 {
        (self.minutes / 60) as u8
    }

    pub fn minute(&self) -> u8 {
        (self.minutes % 60) as u8
    }

    /// Seconds since midnight at the start of this minute.
    pub fn seconds(&self) -> u32 {
        self.minutes as u32 * 60
    }

    /// True when `start <= t <= end`, compared at second resolution.
    pub fn window_contains(start: TimeOfDay, end: TimeOfDay, t: NaiveTime) -> bool {
        let secs = t.num_seconds_from_midnight();
        start.seconds() <= secs && secs <= end.seconds()
    }
}

impl FromStr for TimeOfDay {
    type Err = InvalidTime;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidTime(s.to_string());
        let (h, m) = s.split_once(':').ok_or_else(invalid)?;
        let digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if !digits(h) || h.len() > 2 || !digits(m) || m.len() != 2 {
            return Err(invalid());
        }
        let hour: u8 = h.parse().map_err(|_| invalid())?;
        let minute: u8 = m.parse().map_err(|_| invalid())?;
        TimeOfDay::new(hour, minute).ok_or_else(invalid)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = InvalidTime;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(t: TimeOfDay) -> String {
        t.to_string()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

/// Day index used by rules and zone settings: 0 = Sunday .. 6 = Saturday.
pub fn weekday_index(day: Weekday) -> u8 {
    day.num_days_from_sunday() as u8
}

const DAY_NAMES: [&str; 7] = [
    "Domingo",
    "Lunes",
    "Martes",
    "Miércoles",
    "Jueves",
    "Viernes",
    "Sábado",
];

/// Display name for a rule's day. `None` means every day.
pub fn weekday_name(day: Option<u8>) -> &'static str {
    match day {
        None => "Todos los días",
        Some(d) => DAY_NAMES.get(d as usize).copied().unwrap_or("Desconocido"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_single_digit_hour() {
        let t: TimeOfDay = "8:05".parse().unwrap();
        assert_eq!((t.hour(), t.minute()), (8, 5));
        assert_eq!(t.to_string(), "08:05");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        for bad in ["24:00", "12:60", "12:5", "123:00", "ab:cd", "12", "", "-1:00", "12:00:00"] {
            assert!(bad.parse::<TimeOfDay>().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_boundaries() {
        assert!("00:00".parse::<TimeOfDay>().is_ok());
        assert!("23:59".parse::<TimeOfDay>().is_ok());
        assert!("19:59".parse::<TimeOfDay>().is_ok());
    }

    #[test]
    fn test_serde_as_string() {
        let t = TimeOfDay::new(18, 0).unwrap();
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"18:00\"");
        let back: TimeOfDay = serde_json::from_str("\"18:00\"").unwrap();
        assert_eq!(back, t);
        assert!(serde_json::from_str::<TimeOfDay>("\"25:00\"").is_err());
    }

    #[test]
    fn test_window_is_inclusive_to_the_minute() {
        let start = TimeOfDay::new(8, 0).unwrap();
        let end = TimeOfDay::new(18, 0).unwrap();
        let at = |h, m, s| NaiveTime::from_hms_opt(h, m, s).unwrap();
        assert!(TimeOfDay::window_contains(start, end, at(8, 0, 0)));
        assert!(TimeOfDay::window_contains(start, end, at(18, 0, 0)));
        assert!(!TimeOfDay::window_contains(start, end, at(18, 0, 1)));
        assert!(!TimeOfDay::window_contains(start, end, at(7, 59, 59)));
    }

    #[test]
    fn test_weekday_index_sunday_is_zero() {
        assert_eq!(weekday_index(Weekday::Sun), 0);
        assert_eq!(weekday_index(Weekday::Mon), 1);
        assert_eq!(weekday_index(Weekday::Sat), 6);
    }

    #[test]
    fn test_weekday_name() {
        assert_eq!(weekday_name(None), "Todos los días");
        assert_eq!(weekday_name(Some(0)), "Domingo");
        assert_eq!(weekday_name(Some(6)), "Sábado");
    }
}
