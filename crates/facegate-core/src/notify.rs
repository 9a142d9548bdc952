//! Alert priority and notification routing.

use crate::types::AlertKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

pub fn priority(kind: AlertKind) -> Priority {
    match kind {
        AlertKind::Unauthorized | AlertKind::LivenessFailure | AlertKind::UnknownUser => {
            Priority::High
        }
        AlertKind::MultipleFailedAttempts | AlertKind::RestrictedZone => Priority::Medium,
        AlertKind::OutsideSchedule => Priority::Low,
    }
}

/// Channel name of the in-console notification feed.
pub const INTERNAL_CHANNEL: &str = "sistema interno";

/// Where alert notifications are delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Destinations {
    pub admin_email: String,
    pub telegram_chat_id: String,
}

pub fn is_internal(channel_name: &str) -> bool {
    channel_name.trim().eq_ignore_ascii_case(INTERNAL_CHANNEL)
}

/// Destination for a notification channel, or None when the channel is not
/// routed (unconfigured or unsupported).
pub fn route(channel_name: &str, dest: &Destinations) -> Option<String> {
    let non_empty = |s: &str| (!s.trim().is_empty()).then(|| s.trim().to_string());
    match channel_name.trim().to_lowercase().as_str() {
        "email" => non_empty(&dest.admin_email),
        "telegram" => non_empty(&dest.telegram_chat_id),
        INTERNAL_CHANNEL => Some("dashboard".to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dest() -> Destinations {
        Destinations {
            admin_email: "admin@sistema.com".into(),
            telegram_chat_id: String::new(),
        }
    }

    #[test]
    fn test_priority_mapping() {
        assert_eq!(priority(AlertKind::UnknownUser), Priority::High);
        assert_eq!(priority(AlertKind::RestrictedZone), Priority::Medium);
        assert_eq!(priority(AlertKind::OutsideSchedule), Priority::Low);
    }

    #[test]
    fn test_route_channels() {
        assert_eq!(route("Email", &dest()).as_deref(), Some("admin@sistema.com"));
        assert_eq!(route("Sistema interno", &dest()).as_deref(), Some("dashboard"));
        assert_eq!(route("Telegram", &dest()), None);
        assert_eq!(route("SMS", &dest()), None);
    }

    #[test]
    fn test_route_telegram_when_configured() {
        let d = Destinations {
            telegram_chat_id: "-100123".into(),
            ..dest()
        };
        assert_eq!(route("telegram", &d).as_deref(), Some("-100123"));
    }

    #[test]
    fn test_is_internal() {
        assert!(is_internal("Sistema interno"));
        assert!(!is_internal("Email"));
    }
}
